//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{Argon2PasswordAdapter, DbAdapter, MemoryStore, OpenAiChatAdapter},
    config::Config,
    error::ApiError,
    web::{self, AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use consult_chat_core::{
    ports::{ConversationLogStore, CredentialStore},
    PromptAssembler, SessionServices,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Stores ---
    let (credentials, log): (Arc<dyn CredentialStore>, Arc<dyn ConversationLogStore>) =
        match &config.database_url {
            Some(database_url) => {
                info!("Connecting to database...");
                let db_pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect(database_url)
                    .await?;
                let db_adapter = Arc::new(DbAdapter::new(db_pool));
                info!("Running database migrations...");
                db_adapter.run_migrations().await?;
                info!("Database migrations complete.");
                (
                    db_adapter.clone() as Arc<dyn CredentialStore>,
                    db_adapter as Arc<dyn ConversationLogStore>,
                )
            }
            None => {
                warn!("DATABASE_URL is not set; accounts and chat history will only live in memory.");
                let store = Arc::new(MemoryStore::new());
                (
                    store.clone() as Arc<dyn CredentialStore>,
                    store as Arc<dyn ConversationLogStore>,
                )
            }
        };

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new()
        .with_api_base(&config.llm_api_base)
        .with_api_key(
            config
                .llm_api_key
                .as_ref()
                .ok_or_else(|| ApiError::Internal("LLM_API_KEY is required".to_string()))?,
        );
    let openai_client = Client::with_config(openai_config);
    let inference = Arc::new(OpenAiChatAdapter::new(
        openai_client,
        config.chat_model.clone(),
    ));

    let assembler = Arc::new(PromptAssembler::new(
        config.prompt_variant.template(),
        config.prompt_encoding,
    ));
    info!(
        "Using {:?} prompts with {:?} encoding on model {}",
        config.prompt_variant, config.prompt_encoding, config.chat_model
    );

    // --- 4. Build the Shared AppState ---
    let services = SessionServices {
        credentials,
        log,
        passwords: Arc::new(Argon2PasswordAdapter::new()),
        inference,
        assembler,
    };
    let app_state = Arc::new(AppState::new(config.clone(), services));
    app_state
        .sessions
        .clone()
        .spawn_idle_sweeper(config.session_idle_timeout);
    info!(
        "Idle sessions expire after {}s",
        config.session_idle_timeout.as_secs()
    );

    // --- 5. Create the Web Router ---
    let app = web::app(app_state)?;

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
