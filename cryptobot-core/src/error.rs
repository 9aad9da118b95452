//! Error taxonomy shared by the storage layer, the lifecycle service and the API.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    /// Request body or field failed validation.
    #[error("{0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// A uniqueness constraint would be violated.
    #[error("{0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DashboardError>;

impl DashboardError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DashboardError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        DashboardError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        DashboardError::Conflict(msg.into())
    }

    /// True for the variants that are reported to callers verbatim.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DashboardError::Validation(_) | DashboardError::NotFound(_) | DashboardError::Conflict(_)
        )
    }
}

impl From<sqlx::Error> for DashboardError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                let what = match db.constraint() {
                    Some(c) if c.contains("address") => "Wallet address already exists",
                    Some(c) if c.contains("transaction_id") => "Transaction ID already exists",
                    _ => "Record already exists",
                };
                DashboardError::Conflict(what.to_string())
            }
            _ => DashboardError::Database(err),
        }
    }
}
