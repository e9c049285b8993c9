use anyhow::Result;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::info;

use flashcard_generator::{
    api::{create_router, AppState},
    config::Config,
    log_system_event,
    logging::init_logging,
    CardStore, CompletionService, Database, ExportService, MochiClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _guard = init_logging(&config.logging)?;
    config.validate()?;

    log_system_event!(startup, component = "server", "Starting flashcard proxy server");

    let db = Database::new(&config.database.url).await?;
    info!("Database initialized successfully");
    let card_store = CardStore::new(Arc::new(db));

    let completion_service = CompletionService::from_config(&config.llm);
    info!(
        provider = ?completion_service.provider_name(),
        model = ?completion_service.model_name(),
        extraction_mode = %completion_service.extraction_mode(),
        "Initialized completion service"
    );

    let export_service = config.export.api_key.as_deref().map(|api_key| {
        let client = MochiClient::new(api_key, config.export.base_url.clone());
        info!(base_url = %client.base_url(), "Initialized Mochi client");
        ExportService::new(Arc::new(client)).with_max_concurrency(config.export.max_concurrency)
    });

    let state = AppState {
        card_store,
        completion_service,
        export_service,
    };

    let app = create_router(state).layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = config.server.address();
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
