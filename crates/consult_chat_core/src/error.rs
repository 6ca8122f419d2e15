//! crates/consult_chat_core/src/error.rs
//!
//! Error types returned by the session controller.

use crate::domain::Feedback;
use crate::ports::PortError;
use crate::prompt::PromptError;

/// Problems with user-supplied input. These are reported back inline and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please fill in all required fields ({0} is missing)")]
    MissingField(&'static str),
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Email is already registered")]
    EmailTaken,
    #[error("Patient information has already been submitted for this session")]
    PatientInfoAlreadySubmitted,
    #[error("Age must be between 1 and 130, got {0}")]
    InvalidAge(u32),
    #[error("Please enter a question")]
    EmptyQuestion,
    #[error("Please enter a suggestion before submitting")]
    EmptySuggestion,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("You need to sign in first")]
    NotAuthenticated,

    #[error("Already signed in")]
    AlreadyAuthenticated,

    #[error("No turn at position {0}")]
    TurnNotFound(usize),

    #[error("Turn {0} is not an assistant reply and cannot take feedback")]
    NotFeedbackTarget(usize),

    #[error("Turn {index} already has feedback '{existing}'")]
    FeedbackAlreadyGiven { index: usize, existing: Feedback },

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Inference error: {0}")]
    Inference(PortError),

    #[error("Storage error: {0}")]
    Store(#[from] PortError),
}
