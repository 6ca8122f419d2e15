//! Test utilities for integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use api_lib::adapters::{Argon2PasswordAdapter, MemoryStore};
use api_lib::config::Config;
use api_lib::web::{self, AppState};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use consult_chat_core::{
    ports::{FragmentStream, InferenceService, PortError, PortResult},
    PromptAssembler, PromptEncoding, PromptPayload, SessionServices, TemplateVariant,
};
use tower::util::ServiceExt;
use tracing::Level;

/// An inference service that streams a fixed reply and records what it was sent.
pub struct ScriptedInference {
    fragments: Vec<Option<String>>,
    fail: bool,
    pub payloads: Mutex<Vec<PromptPayload>>,
}

impl ScriptedInference {
    pub fn replying(parts: &[Option<&str>]) -> Self {
        Self {
            fragments: parts.iter().map(|p| p.map(str::to_string)).collect(),
            fail: false,
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fragments: Vec::new(),
            fail: true,
            payloads: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl InferenceService for ScriptedInference {
    async fn stream_completion(&self, payload: &PromptPayload) -> PortResult<FragmentStream> {
        self.payloads.lock().unwrap().push(payload.clone());
        if self.fail {
            return Err(PortError::Unexpected("provider unavailable".to_string()));
        }
        let items: Vec<PortResult<Option<String>>> =
            self.fragments.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub inference: Arc<ScriptedInference>,
}

pub fn test_config(variant: TemplateVariant, require_login: bool) -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: None,
        log_level: Level::INFO,
        llm_api_key: None,
        llm_api_base: "http://localhost".to_string(),
        chat_model: "test-model".to_string(),
        prompt_variant: variant,
        prompt_encoding: PromptEncoding::Single,
        require_login,
        logout_clears_history: true,
        session_idle_timeout: std::time::Duration::from_secs(3600),
        cors_origin: "http://localhost:3000".to_string(),
    }
}

/// Creates a router backed by the in-memory store and a scripted model.
pub fn test_app(config: Config, inference: ScriptedInference) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let inference = Arc::new(inference);
    let services = SessionServices {
        credentials: store.clone(),
        log: store.clone(),
        passwords: Arc::new(Argon2PasswordAdapter::new()),
        inference: inference.clone(),
        assembler: Arc::new(PromptAssembler::new(
            config.prompt_variant.template(),
            config.prompt_encoding,
        )),
    };
    let state = Arc::new(AppState::new(Arc::new(config), services));
    let router = web::app(state).expect("test router builds");

    TestApp {
        router,
        store,
        inference,
    }
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Starts a session and returns the `Cookie` header value for it.
pub async fn start_session(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sessions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    cookie: &str,
    json: Option<serde_json::Value>,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie);
    let body = match json {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

/// Signs up `username` on the session behind `cookie`.
pub async fn sign_up(app: &Router, cookie: &str, username: &str) -> Response<Body> {
    send(
        app,
        "POST",
        "/auth/signup",
        cookie,
        Some(serde_json::json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "location": "Dhaka",
            "password": "hunter22",
            "password_confirmation": "hunter22"
        })),
    )
    .await
}
