//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. Secrets may also be supplied as files
//! (`LLM_API_KEY_FILE`, `DATABASE_URL_FILE`), which is how hosted secret mounts
//! expose them.

use std::net::SocketAddr;
use std::time::Duration;

use consult_chat_core::{PromptEncoding, SessionConfig, TemplateVariant};
use tracing::Level;

/// Groq serves an OpenAI-compatible chat completions API under this base.
const DEFAULT_LLM_API_BASE: &str = "https://api.groq.com/openai/v1";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub llm_api_key: Option<String>,
    pub llm_api_base: String,
    pub chat_model: String,
    pub prompt_variant: TemplateVariant,
    pub prompt_encoding: PromptEncoding,
    pub require_login: bool,
    pub logout_clears_history: bool,
    /// Sessions with no request for this long are discarded.
    pub session_idle_timeout: Duration,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = read_secret("DATABASE_URL")?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Inference Settings ---
        let llm_api_key = read_secret("LLM_API_KEY")?;
        let llm_api_base =
            std::env::var("LLM_API_BASE").unwrap_or_else(|_| DEFAULT_LLM_API_BASE.to_string());
        let chat_model = std::env::var("CHAT_MODEL")
            .unwrap_or_else(|_| "llama-3.1-70b-versatile".to_string());

        // --- Load Conversation Settings ---
        let prompt_variant = std::env::var("PROMPT_VARIANT")
            .unwrap_or_else(|_| "history_archive".to_string())
            .parse::<TemplateVariant>()
            .map_err(|e| ConfigError::InvalidValue("PROMPT_VARIANT".to_string(), e))?;
        let prompt_encoding = std::env::var("PROMPT_ENCODING")
            .unwrap_or_else(|_| "single".to_string())
            .parse::<PromptEncoding>()
            .map_err(|e| ConfigError::InvalidValue("PROMPT_ENCODING".to_string(), e))?;
        let require_login = read_flag("REQUIRE_LOGIN", true)?;
        let logout_clears_history = read_flag("LOGOUT_CLEARS_HISTORY", true)?;
        let idle_secs_str =
            std::env::var("SESSION_IDLE_TIMEOUT_SECS").unwrap_or_else(|_| "3600".to_string());
        let session_idle_timeout = idle_secs_str
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "SESSION_IDLE_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", idle_secs_str),
                )
            })?;

        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            llm_api_key,
            llm_api_base,
            chat_model,
            prompt_variant,
            prompt_encoding,
            require_login,
            logout_clears_history,
            session_idle_timeout,
            cors_origin,
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            require_login: self.require_login,
            logout_clears_history: self.logout_clears_history,
        }
    }
}

/// Reads `name` from the environment, falling back to the file named by `<name>_FILE`.
fn read_secret(name: &str) -> Result<Option<String>, ConfigError> {
    if let Ok(value) = std::env::var(name) {
        return Ok(Some(value));
    }
    let file_var = format!("{}_FILE", name);
    match std::env::var(&file_var) {
        Ok(path) => std::fs::read_to_string(&path)
            .map(|contents| Some(contents.trim().to_string()))
            .map_err(|e| ConfigError::InvalidValue(file_var, e.to_string())),
        Err(_) => Ok(None),
    }
}

fn read_flag(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("'{}' is not a boolean", other),
            )),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_boolean_flags() {
        std::env::set_var("CONSULT_TEST_FLAG_ON", "Yes");
        std::env::set_var("CONSULT_TEST_FLAG_BAD", "maybe");

        assert!(read_flag("CONSULT_TEST_FLAG_ON", false).unwrap());
        assert!(!read_flag("CONSULT_TEST_FLAG_UNSET", false).unwrap());
        assert!(read_flag("CONSULT_TEST_FLAG_BAD", true).is_err());
    }

    #[test]
    fn secret_falls_back_to_file() {
        let path = std::env::temp_dir().join(format!("consult-secret-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, "sk-test\n").unwrap();
        std::env::set_var("CONSULT_TEST_SECRET_FILE", &path);

        let secret = read_secret("CONSULT_TEST_SECRET").unwrap();
        assert_eq!(secret.as_deref(), Some("sk-test"));
        assert_eq!(read_secret("CONSULT_TEST_MISSING").unwrap(), None);

        std::fs::remove_file(path).ok();
    }
}
