use tokio::net::TcpListener;
use tracing::{error, info};
use triptab::config::AppConfig;
use triptab::db::{init_pool, migrate};
use triptab::error::AppError;
use triptab::realtime::hub::ChatHub;
use triptab::routes::create_router;
use triptab::services::trip_service::TripService;
use triptab::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    let config = AppConfig::from_env()?;
    let db = init_pool(&config.database_url).await?;

    if let Err(err) = migrate(&db).await {
        error!("migration failed: {err:?}");
        return Err(err);
    }

    let hub = ChatHub::new(config.chat_room_capacity);
    let trips = TripService::new(db.clone(), hub, config.chat_history_limit);
    let state = AppState::new(config.clone(), db, trips);

    let app = create_router(state);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,triptab=debug".into());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
