//! Session registry.
//!
//! Each session owns its own [`DialogController`]; the catalog, ledger and
//! provider are shared through the [`OrderEngine`].
//!
//! # Lock Invariant
//!
//! - The session map sits behind a std `Mutex`, held only for insert, remove
//!   and lookup. It is never held across an `.await`.
//! - Each session sits behind its own tokio `Mutex`, held for the whole turn.
//!   Turns of one session are therefore strictly sequential while different
//!   sessions proceed in parallel.
//! - Eviction uses `try_lock`, so a session in the middle of a turn is never
//!   evicted.

use roomservice_dialog::{DialogState, PendingQuery};
use roomservice_ids::SessionId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tracing::Instrument;

use crate::controller::{DialogController, TurnInput, TurnOutcome};
use crate::engine::OrderEngine;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),
}

struct Session {
    controller: DialogController,
    last_active: Instant,
}

type SessionSlot = Arc<tokio::sync::Mutex<Session>>;

pub struct SessionManager {
    engine: OrderEngine,
    /// INVARIANT: held only for map operations, never across an await.
    sessions: Mutex<HashMap<SessionId, SessionSlot>>,
    idle_ttl: Duration,
}

impl SessionManager {
    pub fn new(engine: OrderEngine, idle_ttl: Duration) -> Self {
        Self {
            engine,
            sessions: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    pub fn engine(&self) -> &OrderEngine {
        &self.engine
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SessionSlot>> {
        // The map holds no cross-entry invariant, so a poisoned map is usable.
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self, id: &SessionId) -> Result<SessionSlot, SessionError> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSession(id.clone()))
    }

    pub fn open_session(&self) -> SessionId {
        let id = SessionId::new();
        let session = Session {
            controller: DialogController::new(self.engine.settings().history_window),
            last_active: Instant::now(),
        };
        self.lock()
            .insert(id.clone(), Arc::new(tokio::sync::Mutex::new(session)));
        tracing::info!(session_id = %id, "session opened");
        id
    }

    /// Run one turn. Waits for any turn already running in the same session.
    pub async fn handle_turn(
        &self,
        id: &SessionId,
        input: TurnInput,
    ) -> Result<TurnOutcome, SessionError> {
        let slot = self.slot(id)?;
        let span = tracing::info_span!("turn", session_id = %id.short());

        let outcome = async {
            let mut session = slot.lock().await;
            let outcome = session.controller.handle_turn(&self.engine, input).await;
            session.last_active = Instant::now();
            tracing::info!(state = %session.controller.state(), "turn finished");
            outcome
        }
        .instrument(span)
        .await;
        Ok(outcome)
    }

    /// Back to Initial with an empty context.
    pub async fn reset_session(&self, id: &SessionId) -> Result<bool, SessionError> {
        let slot = self.slot(id)?;
        let mut session = slot.lock().await;
        session.last_active = Instant::now();
        Ok(session.controller.reset("reset requested"))
    }

    /// Drop a session and anything it was waiting on.
    pub fn close_session(&self, id: &SessionId) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            tracing::info!(session_id = %id, "session closed");
        }
        removed
    }

    pub async fn session_state(&self, id: &SessionId) -> Result<DialogState, SessionError> {
        let slot = self.slot(id)?;
        let session = slot.lock().await;
        Ok(session.controller.state())
    }

    pub async fn active_query(&self, id: &SessionId) -> Result<Option<PendingQuery>, SessionError> {
        let slot = self.slot(id)?;
        let session = slot.lock().await;
        Ok(session.controller.active_query().cloned())
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    pub fn evict_idle(&self) -> Vec<SessionId> {
        self.evict_idle_at(Instant::now())
    }

    /// Remove sessions idle for longer than the TTL as of `now`. Sessions
    /// in the middle of a turn are skipped.
    pub fn evict_idle_at(&self, now: Instant) -> Vec<SessionId> {
        let mut sessions = self.lock();
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, slot)| match slot.try_lock() {
                Ok(session) => now.saturating_duration_since(session.last_active) > self.idle_ttl,
                Err(_) => false,
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(slot) = sessions.remove(id) {
                let dropped_query = slot
                    .try_lock()
                    .ok()
                    .and_then(|s| s.controller.active_query().map(|q| q.kind()));
                tracing::info!(
                    session_id = %id,
                    dropped_query = dropped_query.map(|k| k.as_str()).unwrap_or("none"),
                    "idle session evicted"
                );
            }
        }
        expired
    }

    /// Evict idle sessions every `interval` until the manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    tracing::debug!("session manager dropped, sweeper exiting");
                    break;
                };
                let evicted = manager.evict_idle();
                if !evicted.is_empty() {
                    tracing::info!(count = evicted.len(), "sweeper evicted idle sessions");
                }
            }
        })
    }
}
