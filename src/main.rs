mod api;
mod config;
mod db;
mod error;
mod market;
mod materializer;
mod miners;
mod orchestrator;
mod stats;
mod types;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sqlx::sqlite::SqlitePoolOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::{Config, DB_MAX_CONNECTIONS};
use crate::db::store::KnowledgeStore;
use crate::error::Result;
use crate::orchestrator::Orchestrator;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = SqlitePoolOptions::new()
        .max_connections(DB_MAX_CONNECTIONS)
        .connect(&format!("sqlite:{}?mode=rwc", cfg.db_path))
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    let store = KnowledgeStore::new(pool);

    // --- Mining loop (first run immediate, then on the interval) ---
    let miner_store = store.clone();
    let miner_cfg = cfg.clone();
    tokio::spawn(async move {
        let orchestrator = Orchestrator::new(miner_cfg.clone(), miner_store);
        let mut ticker =
            tokio::time::interval(Duration::from_secs(miner_cfg.miner_interval_secs));
        loop {
            ticker.tick().await;
            match orchestrator.run_once(now_secs()).await {
                Ok(summary) => {
                    if !summary.errors.is_empty() {
                        error!(
                            errors = summary.errors.len(),
                            "mining run finished with partial failures: {:?}",
                            summary.errors,
                        );
                    }
                }
                Err(e) => error!("mining run aborted: {e}"),
            }
        }
    });

    // --- Retrieval API ---
    let api_state = ApiState { store };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Retrieval API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
