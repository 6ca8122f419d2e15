//! services/api/src/adapters/db.rs
//!
//! This module contains the PostgreSQL adapter, which implements the
//! `CredentialStore` and `ConversationLogStore` ports from the `core` crate
//! using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use consult_chat_core::domain::{ChatLogEntry, PatientInfo, UserAccount};
use consult_chat_core::ports::{ConversationLogStore, CredentialStore, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Postgres error code for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the store ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    location: Option<String>,
    profession: Option<String>,
    password_hash: String,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> UserAccount {
        UserAccount {
            id: self.id,
            username: self.username,
            email: self.email,
            location: self.location,
            profession: self.profession,
            password_hash: self.password_hash,
            created_at: self.created_at,
        }
    }
}

/// Maps an insert failure, turning unique violations into `PortError::Conflict`.
fn insert_error(e: sqlx::Error) -> PortError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            let field = match db_err.constraint() {
                Some(c) if c.contains("email") => "email",
                _ => "username",
            };
            return PortError::Conflict(field.to_string());
        }
    }
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// `CredentialStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CredentialStore for DbAdapter {
    async fn get_user_by_username(&self, username: &str) -> PortResult<UserAccount> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, email, location, profession, password_hash, created_at \
             FROM user_data WHERE username = $1",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", username)),
            _ => PortError::Unexpected(e.to_string()),
        })?;
        Ok(record.to_domain())
    }

    async fn username_exists(&self, username: &str) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM user_data WHERE username = $1)")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    async fn email_exists(&self, email: &str) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM user_data WHERE email = $1)")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))
    }

    async fn create_user(&self, account: &UserAccount) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_data (id, username, email, location, profession, password_hash, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(account.id)
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.location)
        .bind(&account.profession)
        .bind(&account.password_hash)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(insert_error)?;
        Ok(())
    }
}

//=========================================================================================
// `ConversationLogStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ConversationLogStore for DbAdapter {
    async fn save_chat_entry(&self, entry: &ChatLogEntry) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO chat_history (id, session_id, user_text, response_text, feedback, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET feedback = EXCLUDED.feedback",
        )
        .bind(entry.id)
        .bind(entry.session_id)
        .bind(&entry.user)
        .bind(&entry.response)
        .bind(entry.feedback.map(|f| f.as_str()))
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }

    async fn save_patient_info(&self, session_id: Uuid, patient: &PatientInfo) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO patient_data (id, session_id, name, age, gender, location, visit_date, habits, submitted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(&patient.name)
        .bind(patient.age as i32)
        .bind(&patient.gender)
        .bind(&patient.location)
        .bind(&patient.date)
        .bind(&patient.habits)
        .bind(patient.submitted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(())
    }
}
