use anyhow::Result;
use cryptobot_api::{router, AppState};
use cryptobot_core::{
    config::DashboardConfig,
    db::{create_pool, run_migrations, PgStorage},
    memory::MemStorage,
    storage::Storage,
    Dashboard,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = DashboardConfig::from_env()?;
    tracing::info!("Starting dashboard API with config: {:?}", config.runtime);

    let storage: Arc<dyn Storage> = match &config.db {
        Some(db) => {
            let pool = create_pool(&db.url, db.max_connections).await?;
            run_migrations(&pool).await?;
            Arc::new(PgStorage::new(pool))
        }
        None => {
            tracing::warn!("no [db] configured, using in-memory storage; data is lost on restart");
            Arc::new(MemStorage::new())
        }
    };

    let state = AppState {
        dashboard: Dashboard::new(storage),
    };
    let app = router(state, &config.api)?;

    let addr: SocketAddr = config.api.bind_addr.parse()?;
    tracing::info!("Starting API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
