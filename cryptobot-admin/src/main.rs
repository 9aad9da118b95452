use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use cryptobot_core::{
    config::DashboardConfig,
    db::{create_pool, run_migrations, PgStorage},
    Dashboard,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Maintenance commands for the dashboard database", long_about = None)]
struct Args {
    /// Postgres URL; overrides the `[db]` section of the config
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending migrations
    Migrate,
    /// Print the stats row as JSON
    Stats,
    /// Rebuild transaction totals and the active wallet count from the tables
    RecomputeStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = DashboardConfig::from_env()?;

    let (url, max_connections) = match (args.database_url, config.db) {
        (Some(url), db) => (url, db.map_or(1, |d| d.max_connections)),
        (None, Some(db)) => (db.url, db.max_connections),
        (None, None) => {
            return Err(anyhow!(
                "no database configured; set [db] url, CRYPTOBOT__DB__URL or --database-url"
            ))
        }
    };

    let pool = create_pool(&url, max_connections).await?;
    run_migrations(&pool).await?;

    match args.command {
        Command::Migrate => {
            tracing::info!("migrations applied");
        }
        Command::Stats => {
            let dashboard = Dashboard::new(Arc::new(PgStorage::new(pool)));
            let stats = dashboard.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::RecomputeStats => {
            let dashboard = Dashboard::new(Arc::new(PgStorage::new(pool)));
            let stats = dashboard.recompute_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
