use std::net::SocketAddr;
use std::sync::Arc;

use transita_api::{app, AppState};
use transita_store::{DbClient, PgBookingStore, PgScheduleDirectory, PgSeatStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transita_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = transita_store::Config::load()?;
    tracing::info!("Starting Transita API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url).await?;
    db.migrate().await?;

    let seat_store = Arc::new(PgSeatStore::new(db.pool.clone()));
    let booking_store = Arc::new(PgBookingStore::new(db.pool.clone()));
    let schedules = Arc::new(PgScheduleDirectory::new(db.pool.clone()));

    let state = AppState::build(
        seat_store,
        booking_store,
        schedules,
        &config.business_rules,
        &config.ticket.secret,
    )?;

    tokio::spawn(transita_api::worker::start_expiry_worker(
        state.sweeper.clone(),
        config.business_rules.sweep_interval_seconds,
    ));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
