pub mod auth;
pub mod chat;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use consult_chat_core::{SessionError, ValidationError};
use tower_http::cors::CorsLayer;
use tracing::error;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ConfigError;
use crate::error::ApiError;

pub use middleware::require_session;
pub use state::{AppState, SessionHandle, SessionRegistry};

/// Builds the complete router: public session bootstrap, session-bound routes,
/// CORS, and the Swagger UI.
pub fn app(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = app_state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string()))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no session required)
    let public_routes = Router::new().route("/sessions", post(rest::create_session_handler));

    // Session-bound routes
    let session_routes = Router::new()
        .route(
            "/sessions/current",
            get(rest::get_session_handler).delete(rest::end_session_handler),
        )
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/toggle", post(auth::toggle_form_handler))
        .route("/patient", post(rest::submit_patient_handler))
        .route("/chat", get(chat::history_handler).post(chat::ask_handler))
        .route("/chat/{index}/feedback", post(chat::feedback_handler))
        .route("/suggestions", post(chat::suggestion_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_session,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .with_state(app_state);

    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", rest::ApiDoc::openapi())))
}

/// Maps a controller error to the status and message returned to the client.
pub fn reject(err: SessionError) -> (StatusCode, String) {
    let status = match &err {
        SessionError::Validation(
            ValidationError::UsernameTaken
            | ValidationError::EmailTaken
            | ValidationError::PatientInfoAlreadySubmitted,
        ) => StatusCode::CONFLICT,
        SessionError::Validation(_) | SessionError::NotFeedbackTarget(_) => StatusCode::BAD_REQUEST,
        SessionError::InvalidCredentials | SessionError::NotAuthenticated => {
            StatusCode::UNAUTHORIZED
        }
        SessionError::AlreadyAuthenticated | SessionError::FeedbackAlreadyGiven { .. } => {
            StatusCode::CONFLICT
        }
        SessionError::TurnNotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Prompt(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::Inference(_) => StatusCode::BAD_GATEWAY,
        SessionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", err);
    }
    (status, err.to_string())
}
