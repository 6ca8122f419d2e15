//! Integration tests for the session and auth endpoints

mod test_utils;

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use consult_chat_core::TemplateVariant;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use crate::test_utils::{
        body_to_string, send, sign_up, start_session, test_app, test_config, ScriptedInference,
    };

    fn app() -> crate::test_utils::TestApp {
        test_app(
            test_config(TemplateVariant::HistoryArchive, true),
            ScriptedInference::replying(&[]),
        )
    }

    /// Tests that routes other than session creation need a session cookie
    #[tokio::test]
    async fn it_rejects_requests_without_a_session() {
        let app = app();
        let response = app
            .router
            .oneshot(Request::builder().uri("/chat").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    /// Tests that a new session starts on the login form and can toggle to signup
    #[tokio::test]
    async fn it_starts_on_the_login_form() {
        let app = app();
        let cookie = start_session(&app.router).await;

        let response = send(&app.router, "GET", "/sessions/current", &cookie, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_to_string(response.into_body()).await).unwrap();
        assert_eq!(body["auth_state"], "login_form");

        let response = send(&app.router, "POST", "/auth/toggle", &cookie, None).await;
        let body: Value = serde_json::from_str(&body_to_string(response.into_body()).await).unwrap();
        assert_eq!(body["auth_state"], "signup_form");
    }

    /// Tests signup, logout, and login with the stored hash
    #[tokio::test]
    async fn it_signs_up_logs_out_and_logs_in() {
        let app = app();
        let cookie = start_session(&app.router).await;

        let response = sign_up(&app.router, &cookie, "sani").await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = serde_json::from_str(&body_to_string(response.into_body()).await).unwrap();
        assert_eq!(body["auth_state"], "authenticated");
        assert_eq!(body["username"], "sani");

        let response = send(&app.router, "POST", "/auth/logout", &cookie, None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(
            &app.router,
            "POST",
            "/auth/login",
            &cookie,
            Some(json!({ "username": "sani", "password": "wrong" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            &app.router,
            "POST",
            "/auth/login",
            &cookie,
            Some(json!({ "username": "sani", "password": "hunter22" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Tests that a username can only be registered once across sessions
    #[tokio::test]
    async fn it_rejects_duplicate_accounts() {
        let app = app();
        let first = start_session(&app.router).await;
        let second = start_session(&app.router).await;

        assert_eq!(sign_up(&app.router, &first, "sani").await.status(), StatusCode::CREATED);
        let response = sign_up(&app.router, &second, "sani").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(body_to_string(response.into_body()).await.contains("Username already exists"));
        assert_eq!(app.store.user_count().await, 1);
    }

    /// Tests that mismatched passwords are reported as a bad request
    #[tokio::test]
    async fn it_rejects_mismatched_passwords() {
        let app = app();
        let cookie = start_session(&app.router).await;
        let response = send(
            &app.router,
            "POST",
            "/auth/signup",
            &cookie,
            Some(json!({
                "username": "sani",
                "email": "sani@example.com",
                "password": "hunter22",
                "password_confirmation": "hunter23"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_to_string(response.into_body()).await.contains("Passwords do not match"));
    }

    /// Tests that ending a session invalidates its cookie
    #[tokio::test]
    async fn it_ends_a_session() {
        let app = app();
        let cookie = start_session(&app.router).await;

        let response = send(&app.router, "DELETE", "/sessions/current", &cookie, None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app.router, "GET", "/sessions/current", &cookie, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
