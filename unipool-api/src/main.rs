use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unipool_api::{app, AppState, JwtIdentityResolver};
use unipool_core::Gateway;
use unipool_store::{Config, DbClient, MemoryStore, PgGateway, StoreBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unipool_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    info!("Starting UniPool API on port {}", config.server.port);

    let gateway: Arc<dyn Gateway> = match config.store.backend {
        StoreBackend::Postgres => {
            let db = DbClient::new(&config.database).await?;
            db.migrate().await?;
            Arc::new(PgGateway::new(db.pool.clone()))
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store; data does not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let identity = Arc::new(JwtIdentityResolver::new(&config.auth.jwt_secret));
    let state = AppState::new(gateway, identity, config.booking.clone(), config.matching.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
