use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use parking_server::config::{Config, StoreBackend};
use parking_server::engine::clock::SystemClock;
use parking_server::engine::reconcile::spawn_reconciler;
use parking_server::engine::TicketEngine;
use parking_server::routes::create_routes;
use parking_server::store::{MemoryStore, PgStore, TicketStore};
use parking_server::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parking_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();
    let store = open_store(&config).await?;

    let engine = TicketEngine::new(store, Arc::new(SystemClock), config.retry);
    let state = AppState::new(engine);

    if let Some(every) = config.reconcile_interval {
        tracing::info!(interval_secs = every.as_secs(), "Reconciler scheduled");
        spawn_reconciler(state.engine.clone(), every);
    }

    let app: Router = create_routes(state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("🚀 Server running at http://{}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn TicketStore>, BoxError> {
    match config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; tickets are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.database_url)
                .await?;
            tracing::info!("Successfully connected to database");

            sqlx::migrate!().run(&pool).await?;
            tracing::info!("Migrations run successfully");

            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}
