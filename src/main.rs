use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use recital_scheduler::config::AppConfig;
use recital_scheduler::db;
use recital_scheduler::services::notify::{self, LogNotifier, Notifier, Outbox, WebhookNotifier};
use recital_scheduler::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let notifier: Arc<dyn Notifier> = if config.notify_webhook_url.is_empty() {
        tracing::info!("no NOTIFY_WEBHOOK_URL set, notifications will only be logged");
        Arc::new(LogNotifier)
    } else {
        tracing::info!("delivering notifications to {}", config.notify_webhook_url);
        Arc::new(WebhookNotifier::new(
            config.notify_webhook_url.clone(),
            config.notify_webhook_secret.clone(),
        )?)
    };
    let (outbox, rx) = Outbox::channel();
    notify::spawn_dispatcher(rx, notifier);

    let state = Arc::new(AppState::new(conn, config.clone(), outbox));

    let app = recital_scheduler::app(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
