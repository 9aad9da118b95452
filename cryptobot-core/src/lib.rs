pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod models;
pub mod notify;
pub mod policy;
pub mod service;
pub mod stats;
pub mod storage;

pub use error::{DashboardError, Result};
pub use service::Dashboard;
