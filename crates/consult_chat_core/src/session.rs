//! crates/consult_chat_core/src/session.rs
//!
//! The per-session controller. It owns the ordered turn list, the collected
//! patient snapshot and the login/signup state for one browser session, and is
//! the only thing allowed to mutate them.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{
    AuthState, ChatLogEntry, ConversationSession, Feedback, PatientFields, PatientInfo,
    SignupFields, Speaker, Turn, UserAccount,
};
use crate::error::{SessionError, ValidationError};
use crate::ports::{
    ConversationLogStore, CredentialStore, InferenceService, PasswordService, PortError,
};
use crate::prompt::{self, PromptAssembler, PromptPayload};
use crate::stream::collect_response;

//=========================================================================================
// Configuration and Collaborators
//=========================================================================================

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Chat, suggestions and feedback need an authenticated user.
    pub require_login: bool,
    /// Logging out also drops the turn list.
    pub logout_clears_history: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            require_login: true,
            logout_clears_history: true,
        }
    }
}

/// The ports every session talks to. Cheap to clone; shared across sessions.
#[derive(Clone)]
pub struct SessionServices {
    pub credentials: Arc<dyn CredentialStore>,
    pub log: Arc<dyn ConversationLogStore>,
    pub passwords: Arc<dyn PasswordService>,
    pub inference: Arc<dyn InferenceService>,
    pub assembler: Arc<PromptAssembler>,
}

//=========================================================================================
// Operation Results
//=========================================================================================

/// What happened to the remote copy of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    Saved,
    /// User turns are written together with the reply that completes the exchange.
    Pending,
    /// Nothing changed, so nothing was written.
    Unchanged,
    /// The write failed; the turn only exists in memory.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReceipt {
    pub index: usize,
    pub persistence: Persistence,
}

/// The assistant reply produced by `ask`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub receipt: TurnReceipt,
}

//=========================================================================================
// The Controller
//=========================================================================================

pub struct SessionController {
    id: Uuid,
    config: SessionConfig,
    services: SessionServices,
    session: ConversationSession,
}

impl SessionController {
    /// Creates the controller for a new browser session, starting at the login form.
    pub fn new(id: Uuid, config: SessionConfig, services: SessionServices) -> Self {
        let mut session = ConversationSession::new();
        session.auth = AuthState::LoginForm;
        Self {
            id,
            config,
            services,
            session,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn auth_state(&self) -> &AuthState {
        &self.session.auth
    }

    pub fn username(&self) -> Option<&str> {
        match &self.session.auth {
            AuthState::Authenticated { username } => Some(username),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.session.auth, AuthState::Authenticated { .. })
    }

    pub fn patient(&self) -> Option<&PatientInfo> {
        self.session.patient.as_ref()
    }

    /// Every recorded turn, suggestions included.
    pub fn turns(&self) -> &[Turn] {
        &self.session.turns
    }

    /// The turns shown in the chat, with their positions in `turns()`.
    pub fn rendered_turns(&self) -> Vec<(usize, &Turn)> {
        self.session
            .turns
            .iter()
            .enumerate()
            .filter(|(_, turn)| turn.is_conversational())
            .collect()
    }

    /// The turns sent to the model as context.
    pub fn context_turns(&self) -> Vec<&Turn> {
        prompt::context_turns(&self.session.turns).collect()
    }

    //-------------------------------------------------------------------------------------
    // Authentication
    //-------------------------------------------------------------------------------------

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), SessionError> {
        if self.is_authenticated() {
            return Err(SessionError::AlreadyAuthenticated);
        }
        let username = username.trim();
        if username.is_empty() {
            return Err(ValidationError::MissingField("username").into());
        }
        if password.is_empty() {
            return Err(ValidationError::MissingField("password").into());
        }

        let account = match self.services.credentials.get_user_by_username(username).await {
            Ok(account) => account,
            Err(PortError::NotFound(_)) => return Err(SessionError::InvalidCredentials),
            Err(e) => return Err(SessionError::Store(e)),
        };

        if !self
            .services
            .passwords
            .verify_password(password, &account.password_hash)?
        {
            warn!(session_id = %self.id, "Rejected login for '{}'", username);
            return Err(SessionError::InvalidCredentials);
        }

        info!(session_id = %self.id, "User '{}' signed in", account.username);
        self.session.auth = AuthState::Authenticated {
            username: account.username,
        };
        Ok(())
    }

    pub async fn signup(&mut self, fields: SignupFields) -> Result<(), SessionError> {
        if self.is_authenticated() {
            return Err(SessionError::AlreadyAuthenticated);
        }

        let username = fields.username.trim();
        let email = fields.email.trim();
        for (name, value) in [
            ("username", username),
            ("email", email),
            ("password", fields.password.as_str()),
            ("password confirmation", fields.password_confirmation.as_str()),
        ] {
            if value.is_empty() {
                return Err(ValidationError::MissingField(name).into());
            }
        }
        if fields.password != fields.password_confirmation {
            return Err(ValidationError::PasswordMismatch.into());
        }
        if self.services.credentials.username_exists(username).await? {
            return Err(ValidationError::UsernameTaken.into());
        }
        if self.services.credentials.email_exists(email).await? {
            return Err(ValidationError::EmailTaken.into());
        }

        let account = UserAccount {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            location: non_empty(fields.location),
            profession: non_empty(fields.profession),
            password_hash: self.services.passwords.hash_password(&fields.password)?,
            created_at: Utc::now(),
        };

        // The store enforces uniqueness too; a concurrent signup can still lose here.
        match self.services.credentials.create_user(&account).await {
            Ok(()) => {}
            Err(PortError::Conflict(field)) if field == "email" => {
                return Err(ValidationError::EmailTaken.into())
            }
            Err(PortError::Conflict(_)) => return Err(ValidationError::UsernameTaken.into()),
            Err(e) => return Err(SessionError::Store(e)),
        }

        info!(session_id = %self.id, "Registered new user '{}'", account.username);
        self.session.auth = AuthState::Authenticated {
            username: account.username,
        };
        Ok(())
    }

    pub fn logout(&mut self) {
        if let Some(username) = self.username() {
            info!(session_id = %self.id, "User '{}' signed out", username);
        }
        self.session.auth = AuthState::LoginForm;
        if self.config.logout_clears_history {
            self.session.turns.clear();
        }
    }

    /// Switches between the login and signup forms.
    pub fn toggle_form(&mut self) {
        self.session.auth = match self.session.auth {
            AuthState::Anonymous | AuthState::LoginForm => AuthState::SignupForm,
            AuthState::SignupForm => AuthState::LoginForm,
            AuthState::Authenticated { .. } => return,
        };
    }

    //-------------------------------------------------------------------------------------
    // Patient Intake
    //-------------------------------------------------------------------------------------

    /// Records the patient snapshot used by every later prompt.
    ///
    /// The snapshot is kept beside the turn list rather than in it, so it is never
    /// rendered as chat and cannot take feedback. It is written to the patient
    /// collection before being kept; a failed write leaves the session without it.
    pub async fn submit_patient_info(
        &mut self,
        fields: PatientFields,
    ) -> Result<PatientInfo, SessionError> {
        if self.session.patient.is_some() {
            return Err(ValidationError::PatientInfoAlreadySubmitted.into());
        }

        for (name, value) in [
            ("name", fields.name.as_str()),
            ("gender", fields.gender.as_str()),
            ("location", fields.location.as_str()),
            ("date", fields.date.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(name).into());
            }
        }
        let age = fields.age.ok_or(ValidationError::MissingField("age"))?;
        if !(1..=130).contains(&age) {
            return Err(ValidationError::InvalidAge(age).into());
        }

        let patient = PatientInfo {
            name: fields.name.trim().to_string(),
            age,
            gender: fields.gender.trim().to_string(),
            location: fields.location.trim().to_string(),
            date: fields.date.trim().to_string(),
            habits: non_empty(fields.habits),
            submitted_at: Utc::now(),
        };

        self.services.log.save_patient_info(self.id, &patient).await?;
        info!(session_id = %self.id, "Patient information collected");

        self.session.patient = Some(patient.clone());
        Ok(patient)
    }

    //-------------------------------------------------------------------------------------
    // Conversation
    //-------------------------------------------------------------------------------------

    /// Fails unless the session may use the chat.
    pub fn ensure_can_chat(&self) -> Result<(), SessionError> {
        if self.config.require_login && !self.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        Ok(())
    }

    /// Appends a turn. An assistant turn completes an exchange, which is written
    /// to the conversation log; storage failures are logged and reported in the receipt.
    pub async fn record_turn(&mut self, speaker: Speaker, text: &str) -> TurnReceipt {
        let turn = Turn::new(speaker, text);
        let index = self.session.turns.len();
        self.session.turns.push(turn);

        let persistence = match speaker {
            Speaker::User => Persistence::Pending,
            Speaker::Assistant => self.persist_exchange(index).await,
            Speaker::Suggestion => {
                let entry = ChatLogEntry::suggestion(self.id, &self.session.turns[index]);
                self.persist(&entry).await
            }
        };

        TurnReceipt { index, persistence }
    }

    /// Marks an assistant turn as liked or disliked.
    ///
    /// Repeating the value already set is accepted and writes nothing; changing it is refused.
    pub async fn set_feedback(
        &mut self,
        index: usize,
        feedback: Feedback,
    ) -> Result<Persistence, SessionError> {
        self.ensure_can_chat()?;

        let turn = self
            .session
            .turns
            .get_mut(index)
            .ok_or(SessionError::TurnNotFound(index))?;
        if turn.speaker != Speaker::Assistant {
            return Err(SessionError::NotFeedbackTarget(index));
        }
        match turn.feedback {
            Some(existing) if existing == feedback => return Ok(Persistence::Unchanged),
            Some(existing) => {
                return Err(SessionError::FeedbackAlreadyGiven { index, existing })
            }
            None => turn.feedback = Some(feedback),
        }

        Ok(self.persist_exchange(index).await)
    }

    pub async fn record_suggestion(&mut self, text: &str) -> Result<TurnReceipt, SessionError> {
        self.ensure_can_chat()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptySuggestion.into());
        }
        Ok(self.record_turn(Speaker::Suggestion, text).await)
    }

    /// Checks that `question` can be asked now and builds the prompt for it.
    pub fn prepare(&self, question: &str) -> Result<PromptPayload, SessionError> {
        self.ensure_can_chat()?;
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion.into());
        }

        Ok(self.services.assembler.assemble(
            self.session.patient.as_ref(),
            &self.session.turns,
            question,
        )?)
    }

    /// Runs one question/answer cycle against the inference service.
    ///
    /// The question is recorded locally before the remote call, so it survives an
    /// inference failure; only a completed reply is written to the log.
    pub async fn ask<F>(&mut self, question: &str, on_fragment: F) -> Result<Answer, SessionError>
    where
        F: FnMut(&str) + Send,
    {
        let payload = self.prepare(question)?;
        self.record_turn(Speaker::User, question.trim()).await;

        let inference = self.services.inference.clone();
        let stream = inference
            .stream_completion(&payload)
            .await
            .map_err(SessionError::Inference)?;
        let text = collect_response(stream, on_fragment)
            .await
            .map_err(SessionError::Inference)?;

        let receipt = self.record_turn(Speaker::Assistant, &text).await;
        Ok(Answer { text, receipt })
    }

    //-------------------------------------------------------------------------------------
    // Persistence Helpers
    //-------------------------------------------------------------------------------------

    /// Writes the exchange ending at the assistant turn `index`.
    async fn persist_exchange(&self, index: usize) -> Persistence {
        let answer = &self.session.turns[index];
        let question = self.session.turns[..index]
            .iter()
            .rev()
            .find(|turn| turn.is_conversational())
            .filter(|turn| turn.speaker == Speaker::User)
            .map(|turn| turn.content.as_str())
            .unwrap_or_default();

        let entry = ChatLogEntry::exchange(self.id, question, answer);
        self.persist(&entry).await
    }

    async fn persist(&self, entry: &ChatLogEntry) -> Persistence {
        match self.services.log.save_chat_entry(entry).await {
            Ok(()) => Persistence::Saved,
            Err(e) => {
                warn!(session_id = %self.id, "Failed to save chat history: {}", e);
                Persistence::Failed(e.to_string())
            }
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
