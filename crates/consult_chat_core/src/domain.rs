//! crates/consult_chat_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport format.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The label stored in the `user` slot of a persisted suggestion.
pub const SUGGESTION_LABEL: &str = "User Suggestion";

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
    /// Out-of-band note from the user. Persisted, never shown or sent as context.
    Suggestion,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
            Speaker::Suggestion => "suggestion",
        }
    }
}

/// Thumbs-up/down annotation on an assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Like,
    Dislike,
}

impl Feedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::Like => "like",
            Feedback::Dislike => "dislike",
        }
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feedback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "like" => Ok(Feedback::Like),
            "dislike" => Ok(Feedback::Dislike),
            other => Err(format!("'{}' is not a feedback value", other)),
        }
    }
}

/// One entry in the ordered conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub id: Uuid,
    pub speaker: Speaker,
    pub content: String,
    pub feedback: Option<Feedback>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker,
            content: content.into(),
            feedback: None,
            timestamp: Utc::now(),
        }
    }

    /// Suggestions are stored alongside the chat but are not part of it.
    pub fn is_conversational(&self) -> bool {
        self.speaker != Speaker::Suggestion
    }
}

/// Where the session is in the login/signup flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    LoginForm,
    SignupForm,
    Authenticated { username: String },
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthState::Anonymous => "anonymous",
            AuthState::LoginForm => "login_form",
            AuthState::SignupForm => "signup_form",
            AuthState::Authenticated { .. } => "authenticated",
        }
    }
}

/// In-memory state for one browser session.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub turns: Vec<Turn>,
    pub patient: Option<PatientInfo>,
    pub auth: AuthState,
    pub started_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self {
            turns: Vec::new(),
            patient: None,
            auth: AuthState::Anonymous,
            started_at: Utc::now(),
        }
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered account. Only the password hash is ever held.
#[derive(Debug, Clone)]
pub struct UserAccount {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub location: Option<String>,
    pub profession: Option<String>,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Raw values from the signup form, before validation.
#[derive(Debug, Clone, Default)]
pub struct SignupFields {
    pub username: String,
    pub email: String,
    pub location: Option<String>,
    pub profession: Option<String>,
    pub password: String,
    pub password_confirmation: String,
}

/// Demographic snapshot embedded into every prompt once collected.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientInfo {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub location: String,
    pub date: String,
    pub habits: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl PatientInfo {
    /// Placeholder names a template may use to reference patient metadata.
    pub const FIELDS: [&'static str; 6] = ["name", "age", "gender", "location", "date", "habits"];

    /// Returns the template value for a metadata field.
    pub fn field(&self, key: &str) -> Option<String> {
        match key {
            "name" => Some(self.name.clone()),
            "age" => Some(self.age.to_string()),
            "gender" => Some(self.gender.clone()),
            "location" => Some(self.location.clone()),
            "date" => Some(self.date.clone()),
            "habits" => Some(
                self.habits
                    .clone()
                    .unwrap_or_else(|| "not reported".to_string()),
            ),
            _ => None,
        }
    }
}

/// Raw values from the patient form, before validation.
#[derive(Debug, Clone, Default)]
pub struct PatientFields {
    pub name: String,
    pub age: Option<u32>,
    pub gender: String,
    pub location: String,
    pub date: String,
    pub habits: Option<String>,
}

/// A persisted `chat_history` document: one exchange, or one suggestion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatLogEntry {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user: String,
    pub response: String,
    pub feedback: Option<Feedback>,
    pub timestamp: DateTime<Utc>,
}

impl ChatLogEntry {
    /// Builds the document for an assistant turn and the question it answers.
    /// The entry shares the assistant turn's id so feedback updates replace it.
    pub fn exchange(session_id: Uuid, question: &str, answer: &Turn) -> Self {
        Self {
            id: answer.id,
            session_id,
            user: question.to_string(),
            response: answer.content.clone(),
            feedback: answer.feedback,
            timestamp: answer.timestamp,
        }
    }

    pub fn suggestion(session_id: Uuid, turn: &Turn) -> Self {
        Self {
            id: turn.id,
            session_id,
            user: SUGGESTION_LABEL.to_string(),
            response: turn.content.clone(),
            feedback: None,
            timestamp: turn.timestamp,
        }
    }

    pub fn is_suggestion(&self) -> bool {
        self.user == SUGGESTION_LABEL
    }
}
