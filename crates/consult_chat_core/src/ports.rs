//! crates/consult_chat_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use uuid::Uuid;

use crate::domain::{ChatLogEntry, PatientInfo, UserAccount};
use crate::prompt::PromptPayload;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint was violated. Carries the offending field name.
    #[error("A record with this {0} already exists")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Incremental completion output. `None` items are fragments without content.
pub type FragmentStream = Pin<Box<dyn Stream<Item = PortResult<Option<String>>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_user_by_username(&self, username: &str) -> PortResult<UserAccount>;

    async fn username_exists(&self, username: &str) -> PortResult<bool>;

    async fn email_exists(&self, email: &str) -> PortResult<bool>;

    /// Inserts a new account. Fails with `PortError::Conflict` when the username
    /// or email is already taken, even if the caller checked beforehand.
    async fn create_user(&self, account: &UserAccount) -> PortResult<()>;
}

#[async_trait]
pub trait ConversationLogStore: Send + Sync {
    /// Inserts the entry, or replaces the stored entry with the same id.
    async fn save_chat_entry(&self, entry: &ChatLogEntry) -> PortResult<()>;

    async fn save_patient_info(&self, session_id: Uuid, patient: &PatientInfo) -> PortResult<()>;
}

#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Starts a streaming chat completion for the assembled payload.
    async fn stream_completion(&self, payload: &PromptPayload) -> PortResult<FragmentStream>;
}

/// Salted password hashing. Verification must run in constant time.
pub trait PasswordService: Send + Sync {
    fn hash_password(&self, password: &str) -> PortResult<String>;

    fn verify_password(&self, password: &str, password_hash: &str) -> PortResult<bool>;
}
