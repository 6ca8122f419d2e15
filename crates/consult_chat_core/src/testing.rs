//! In-memory port implementations for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use uuid::Uuid;

use crate::domain::{ChatLogEntry, PatientInfo, UserAccount};
use crate::ports::{
    ConversationLogStore, CredentialStore, FragmentStream, InferenceService, PasswordService,
    PortError, PortResult,
};
use crate::prompt::{PromptAssembler, PromptEncoding, PromptPayload, TemplateVariant};
use crate::session::{SessionConfig, SessionController, SessionServices};

#[derive(Default)]
pub struct FakeCredentials {
    pub users: Mutex<Vec<UserAccount>>,
    /// Yield inside the existence checks so concurrent signups interleave.
    pub yield_on_lookup: bool,
}

impl FakeCredentials {
    pub fn yielding() -> Self {
        Self {
            yield_on_lookup: true,
            ..Self::default()
        }
    }

    async fn lookup_pause(&self) {
        if self.yield_on_lookup {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl CredentialStore for FakeCredentials {
    async fn get_user_by_username(&self, username: &str) -> PortResult<UserAccount> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", username)))
    }

    async fn username_exists(&self, username: &str) -> PortResult<bool> {
        self.lookup_pause().await;
        Ok(self.users.lock().unwrap().iter().any(|u| u.username == username))
    }

    async fn email_exists(&self, email: &str) -> PortResult<bool> {
        self.lookup_pause().await;
        Ok(self.users.lock().unwrap().iter().any(|u| u.email == email))
    }

    async fn create_user(&self, account: &UserAccount) -> PortResult<()> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == account.username) {
            return Err(PortError::Conflict("username".to_string()));
        }
        if users.iter().any(|u| u.email == account.email) {
            return Err(PortError::Conflict("email".to_string()));
        }
        users.push(account.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLog {
    pub entries: Mutex<Vec<ChatLogEntry>>,
    pub patients: Mutex<Vec<(Uuid, PatientInfo)>>,
    pub fail_writes: Mutex<bool>,
}

#[async_trait]
impl ConversationLogStore for FakeLog {
    async fn save_chat_entry(&self, entry: &ChatLogEntry) -> PortResult<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(PortError::Unexpected("store unreachable".to_string()));
        }
        let mut entries = self.entries.lock().unwrap();
        match entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry.clone(),
            None => entries.push(entry.clone()),
        }
        Ok(())
    }

    async fn save_patient_info(&self, session_id: Uuid, patient: &PatientInfo) -> PortResult<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(PortError::Unexpected("store unreachable".to_string()));
        }
        self.patients.lock().unwrap().push((session_id, patient.clone()));
        Ok(())
    }
}

/// Reversible "hash" so tests can assert nothing is stored in the clear.
pub struct FakePasswords;

impl PasswordService for FakePasswords {
    fn hash_password(&self, password: &str) -> PortResult<String> {
        Ok(format!("hashed:{}", password.chars().rev().collect::<String>()))
    }

    fn verify_password(&self, password: &str, password_hash: &str) -> PortResult<bool> {
        Ok(self.hash_password(password)? == password_hash)
    }
}

/// Replies with a fixed list of fragments and remembers every payload it saw.
#[derive(Default)]
pub struct ScriptedInference {
    pub fragments: Vec<Option<String>>,
    pub fail: bool,
    pub payloads: Mutex<Vec<PromptPayload>>,
}

impl ScriptedInference {
    pub fn replying(parts: &[&str]) -> Self {
        Self {
            fragments: parts.iter().map(|p| Some(p.to_string())).collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
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
        Ok(Box::pin(stream::iter(items)))
    }
}

pub struct Harness {
    pub credentials: Arc<FakeCredentials>,
    pub log: Arc<FakeLog>,
    pub inference: Arc<ScriptedInference>,
    pub services: SessionServices,
}

impl Harness {
    pub fn new(variant: TemplateVariant, inference: ScriptedInference) -> Self {
        Self::with_credentials(variant, inference, FakeCredentials::default())
    }

    pub fn with_credentials(
        variant: TemplateVariant,
        inference: ScriptedInference,
        credentials: FakeCredentials,
    ) -> Self {
        let credentials = Arc::new(credentials);
        let log = Arc::new(FakeLog::default());
        let inference = Arc::new(inference);
        let services = SessionServices {
            credentials: credentials.clone(),
            log: log.clone(),
            passwords: Arc::new(FakePasswords),
            inference: inference.clone(),
            assembler: Arc::new(PromptAssembler::new(variant.template(), PromptEncoding::Single)),
        };
        Self {
            credentials,
            log,
            inference,
            services,
        }
    }

    pub fn controller(&self, config: SessionConfig) -> SessionController {
        SessionController::new(Uuid::new_v4(), config, self.services.clone())
    }
}
