//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for session lifecycle and patient intake, the shared
//! response views, and the master definition for the OpenAPI specification.

use crate::web::{
    auth, chat,
    middleware::SESSION_COOKIE,
    reject,
    state::{AppState, SessionHandle},
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use consult_chat_core::{PatientFields, PatientInfo, SessionController};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_session_handler,
        get_session_handler,
        end_session_handler,
        submit_patient_handler,
        auth::login_handler,
        auth::signup_handler,
        auth::logout_handler,
        auth::toggle_form_handler,
        chat::history_handler,
        chat::ask_handler,
        chat::feedback_handler,
        chat::suggestion_handler,
    ),
    components(
        schemas(
            SessionView,
            PatientRequest,
            PatientView,
            auth::LoginRequest,
            auth::SignupRequest,
            chat::AskRequest,
            chat::TurnView,
            chat::FeedbackRequest,
            chat::FeedbackResponse,
            chat::SuggestionRequest,
            chat::SuggestionResponse,
        )
    ),
    tags(
        (name = "Consult Chat API", description = "Session, authentication and chat endpoints for the consultation assistant.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// A snapshot of the caller's session.
#[derive(Serialize, ToSchema)]
pub struct SessionView {
    pub session_id: Uuid,
    /// One of `anonymous`, `login_form`, `signup_form`, `authenticated`.
    pub auth_state: String,
    pub username: Option<String>,
    pub patient_collected: bool,
    pub turn_count: usize,
}

impl SessionView {
    pub fn from_controller(controller: &SessionController) -> Self {
        Self {
            session_id: controller.id(),
            auth_state: controller.auth_state().as_str().to_string(),
            username: controller.username().map(str::to_string),
            patient_collected: controller.patient().is_some(),
            turn_count: controller.rendered_turns().len(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct PatientRequest {
    pub name: String,
    pub age: Option<u32>,
    pub gender: String,
    pub location: String,
    /// Date of the visit, e.g. `2024-01-01`.
    pub date: String,
    pub habits: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PatientView {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub location: String,
    pub date: String,
    pub habits: Option<String>,
}

impl From<PatientInfo> for PatientView {
    fn from(patient: PatientInfo) -> Self {
        Self {
            name: patient.name,
            age: patient.age,
            gender: patient.gender,
            location: patient.location,
            date: patient.date,
            habits: patient.habits,
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Start a new conversation session.
///
/// Sets the `session` cookie used by every other endpoint.
#[utoipa::path(
    post,
    path = "/sessions",
    responses(
        (status = 201, description = "Session created", body = SessionView)
    )
)]
pub async fn create_session_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let (session_id, handle) = app_state.sessions.create().await;
    let view = SessionView::from_controller(&*handle.lock().await);

    let cookie = format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/",
        SESSION_COOKIE, session_id
    );

    (StatusCode::CREATED, [(header::SET_COOKIE, cookie)], Json(view))
}

/// Describe the current session.
#[utoipa::path(
    get,
    path = "/sessions/current",
    responses(
        (status = 200, description = "Current session state", body = SessionView),
        (status = 401, description = "No session cookie, or the session has ended")
    )
)]
pub async fn get_session_handler(Extension(session): Extension<SessionHandle>) -> Json<SessionView> {
    let controller = session.lock().await;
    Json(SessionView::from_controller(&controller))
}

/// End the current session and discard its in-memory state.
#[utoipa::path(
    delete,
    path = "/sessions/current",
    responses(
        (status = 204, description = "Session ended"),
        (status = 401, description = "No session cookie, or the session has ended")
    )
)]
pub async fn end_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session_id): Extension<Uuid>,
) -> impl IntoResponse {
    app_state.sessions.remove(session_id).await;
    let cookie = format!(
        "{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0",
        SESSION_COOKIE
    );
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)])
}

/// Submit the patient's demographic details. Accepted once per session.
#[utoipa::path(
    post,
    path = "/patient",
    request_body = PatientRequest,
    responses(
        (status = 201, description = "Patient details recorded", body = PatientView),
        (status = 400, description = "A required field is missing or invalid"),
        (status = 409, description = "Patient details were already submitted")
    )
)]
pub async fn submit_patient_handler(
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<PatientRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let fields = PatientFields {
        name: req.name,
        age: req.age,
        gender: req.gender,
        location: req.location,
        date: req.date,
        habits: req.habits,
    };

    let patient = session
        .lock()
        .await
        .submit_patient_info(fields)
        .await
        .map_err(reject)?;

    Ok((StatusCode::CREATED, Json(PatientView::from(patient))))
}
