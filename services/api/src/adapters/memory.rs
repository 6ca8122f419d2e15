//! services/api/src/adapters/memory.rs
//!
//! A process-local store implementing the same ports as `DbAdapter`. Used when
//! no `DATABASE_URL` is configured, and by the integration tests.

use async_trait::async_trait;
use consult_chat_core::domain::{ChatLogEntry, PatientInfo, UserAccount};
use consult_chat_core::ports::{ConversationLogStore, CredentialStore, PortError, PortResult};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    users: Vec<UserAccount>,
    chat_history: Vec<ChatLogEntry>,
    patient_data: Vec<(Uuid, PatientInfo)>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chat log rows for one session, in insertion order.
    pub async fn chat_history(&self, session_id: Uuid) -> Vec<ChatLogEntry> {
        self.tables
            .lock()
            .await
            .chat_history
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .cloned()
            .collect()
    }

    pub async fn patient_data(&self, session_id: Uuid) -> Vec<PatientInfo> {
        self.tables
            .lock()
            .await
            .patient_data
            .iter()
            .filter(|(id, _)| *id == session_id)
            .map(|(_, patient)| patient.clone())
            .collect()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.lock().await.users.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_user_by_username(&self, username: &str) -> PortResult<UserAccount> {
        self.tables
            .lock()
            .await
            .users
            .iter()
            .find(|user| user.username == username)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", username)))
    }

    async fn username_exists(&self, username: &str) -> PortResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().any(|user| user.username == username))
    }

    async fn email_exists(&self, email: &str) -> PortResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().any(|user| user.email == email))
    }

    async fn create_user(&self, account: &UserAccount) -> PortResult<()> {
        // Check and insert under one lock, like a unique index would.
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|user| user.username == account.username) {
            return Err(PortError::Conflict("username".to_string()));
        }
        if tables.users.iter().any(|user| user.email == account.email) {
            return Err(PortError::Conflict("email".to_string()));
        }
        tables.users.push(account.clone());
        Ok(())
    }
}

#[async_trait]
impl ConversationLogStore for MemoryStore {
    async fn save_chat_entry(&self, entry: &ChatLogEntry) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        match tables.chat_history.iter_mut().find(|row| row.id == entry.id) {
            Some(row) => row.feedback = entry.feedback,
            None => tables.chat_history.push(entry.clone()),
        }
        Ok(())
    }

    async fn save_patient_info(&self, session_id: Uuid, patient: &PatientInfo) -> PortResult<()> {
        self.tables
            .lock()
            .await
            .patient_data
            .push((session_id, patient.clone()));
        Ok(())
    }
}
