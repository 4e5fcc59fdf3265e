// main.rs
use axum::{Router, response::Redirect, routing::get};
use home_control::{
    ControlService, DeviceRegistry,
    devices::BrandAdapterFactory,
    docs,
    handlers::{self, AppState},
    metrics,
    registry::JsonFileStore,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = home_control::config::Settings::new()
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.filter)),
        )
        .init();

    if settings.metrics.enabled {
        metrics::setup_metrics(settings.metrics.port)?;
        tracing::info!(port = settings.metrics.port, "Metrics exporter listening");
    }

    let store = Arc::new(JsonFileStore::new(&settings.registry.snapshot_path));
    let registry = DeviceRegistry::load(store);
    let registry = if settings.registry.notes.is_empty() {
        registry
    } else {
        registry.with_notes(settings.registry.notes.clone())
    };
    tracing::info!(
        devices = registry.len(),
        snapshot = %settings.registry.snapshot_path.display(),
        "Registry ready"
    );

    let factory = Arc::new(BrandAdapterFactory::new(settings.adapters.clone()));
    let control = ControlService::new(Arc::new(registry), factory);
    let state = Arc::new(AppState::new(control));

    let app = Router::new()
        .route("/", get(|| async { Redirect::permanent("/docs/") }))
        .merge(handlers::routes(state))
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", docs::ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&settings.server.address)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind address: {}", e))?;

    tracing::info!("Server started on {}", settings.server.address);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
