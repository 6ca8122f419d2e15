//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the registry of per-browser
//! conversation sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use consult_chat_core::{SessionConfig, SessionController, SessionServices};
use tokio::{
    sync::{Mutex, MutexGuard, OwnedMutexGuard, RwLock},
    task::JoinHandle,
};
use tracing::info;
use uuid::Uuid;

use crate::config::Config;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: Arc<Config>, services: SessionServices) -> Self {
        let sessions = Arc::new(SessionRegistry::new(services, config.session_config()));
        Self { config, sessions }
    }
}

//=========================================================================================
// Session Handle
//=========================================================================================

/// One browser session's controller. The mutex serializes its interactions, so a
/// question/answer cycle finishes before the next action on the same session starts.
#[derive(Clone)]
pub struct SessionHandle {
    controller: Arc<Mutex<SessionController>>,
    last_active: Arc<StdMutex<Instant>>,
}

impl SessionHandle {
    fn new(controller: SessionController) -> Self {
        Self {
            controller: Arc::new(Mutex::new(controller)),
            last_active: Arc::new(StdMutex::new(Instant::now())),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, SessionController> {
        self.controller.lock().await
    }

    /// A guard that can be moved into a spawned task.
    pub async fn lock_owned(&self) -> OwnedMutexGuard<SessionController> {
        self.controller.clone().lock_owned().await
    }

    /// Marks the session as used now.
    pub fn touch(&self) {
        *self
            .last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

//=========================================================================================
// Session Registry
//=========================================================================================

pub struct SessionRegistry {
    services: SessionServices,
    config: SessionConfig,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(services: SessionServices, config: SessionConfig) -> Self {
        Self {
            services,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Starts a new session.
    pub async fn create(&self) -> (Uuid, SessionHandle) {
        let id = Uuid::new_v4();
        let controller = SessionController::new(id, self.config.clone(), self.services.clone());
        let handle = SessionHandle::new(controller);
        self.sessions.write().await.insert(id, handle.clone());
        info!("Started session {}", id);
        (id, handle)
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Discards a session and everything held in memory for it.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            info!("Ended session {}", id);
        }
        removed
    }

    /// Discards every session unused for at least `max_idle`. Returns how many went.
    pub async fn remove_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| handle.idle_for() < max_idle);
        let removed = before - sessions.len();
        if removed > 0 {
            info!("Expired {} idle sessions ({} remain)", removed, sessions.len());
        }
        removed
    }

    /// Runs `remove_idle` periodically for the lifetime of the process.
    pub fn spawn_idle_sweeper(self: Arc<Self>, max_idle: Duration) -> JoinHandle<()> {
        let period = (max_idle / 4).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                self.remove_idle(max_idle).await;
            }
        })
    }
}
