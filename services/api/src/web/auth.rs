//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: login, signup, logout and the login/signup form toggle.
//! Each acts on the caller's conversation session.

use axum::{http::StatusCode, response::IntoResponse, Extension, Json};
use consult_chat_core::SignupFields;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::web::{reject, rest::SessionView, state::SessionHandle};

//=========================================================================================
// Request Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub location: Option<String>,
    pub profession: Option<String>,
    pub password: String,
    pub password_confirmation: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Sign in with an existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = SessionView),
        (status = 401, description = "Invalid username or password"),
        (status = 409, description = "Already signed in")
    )
)]
pub async fn login_handler(
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    let mut controller = session.lock().await;
    controller
        .login(&req.username, &req.password)
        .await
        .map_err(reject)?;
    Ok(Json(SessionView::from_controller(&controller)))
}

/// POST /auth/signup - Create a new account and sign in
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = SessionView),
        (status = 400, description = "Missing fields or mismatched passwords"),
        (status = 409, description = "Username or email already registered")
    )
)]
pub async fn signup_handler(
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let fields = SignupFields {
        username: req.username,
        email: req.email,
        location: req.location,
        profession: req.profession,
        password: req.password,
        password_confirmation: req.password_confirmation,
    };

    let mut controller = session.lock().await;
    controller.signup(fields).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(SessionView::from_controller(&controller))))
}

/// POST /auth/logout - Sign out and return to the login form
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful", body = SessionView)
    )
)]
pub async fn logout_handler(Extension(session): Extension<SessionHandle>) -> Json<SessionView> {
    let mut controller = session.lock().await;
    controller.logout();
    Json(SessionView::from_controller(&controller))
}

/// POST /auth/toggle - Switch between the login and signup forms
#[utoipa::path(
    post,
    path = "/auth/toggle",
    responses(
        (status = 200, description = "Form switched", body = SessionView)
    )
)]
pub async fn toggle_form_handler(Extension(session): Extension<SessionHandle>) -> Json<SessionView> {
    let mut controller = session.lock().await;
    controller.toggle_form();
    Json(SessionView::from_controller(&controller))
}
