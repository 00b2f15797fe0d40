use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::credentials::{CredentialStore, clear_credential};
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Restoring,
    BiometricPending,
    Authenticated,
    Unauthenticated,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Restoring => "restoring",
            SessionState::BiometricPending => "biometric_pending",
            SessionState::Authenticated => "authenticated",
            SessionState::Unauthenticated => "unauthenticated",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Authenticated | SessionState::Unauthenticated)
    }

    /// Forward-only transitions of a single restore run.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Uninitialized, Restoring)
                | (Restoring, BiometricPending)
                | (Restoring, Authenticated)
                | (Restoring, Unauthenticated)
                | (BiometricPending, Authenticated)
                | (BiometricPending, Unauthenticated)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What session observers see.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Parsed user profile; only set while authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    pub terms_accepted: bool,
}

impl SessionSnapshot {
    fn bare(state: SessionState) -> Self {
        Self {
            state,
            user: None,
            terms_accepted: false,
        }
    }

    /// `user.id` of an authenticated session, as a string.
    pub fn user_id(&self) -> Option<String> {
        if self.state != SessionState::Authenticated {
            return None;
        }
        match self.user.as_ref()?.get("id")? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

/// Process-wide session state cell.
///
/// Written by the bootstrapper and by logout; everything else subscribes.
#[derive(Clone)]
pub struct Session {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(SessionSnapshot::bare(
                SessionState::Uninitialized,
            ))),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.tx.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    /// Move to `next` if the transition is legal. Returns whether it applied.
    pub(crate) fn advance(&self, next: SessionSnapshot) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|current| {
            if !current.state.can_advance_to(next.state) {
                return false;
            }
            let user = if next.state == SessionState::Authenticated {
                next.user.clone()
            } else {
                None
            };
            *current = SessionSnapshot { user, ..next.clone() };
            applied = true;
            true
        });
        if applied {
            tracing::debug!(state = %next.state, "session state changed");
        } else {
            tracing::warn!(
                from = %self.state(),
                to = %next.state,
                "ignoring illegal session transition"
            );
        }
        applied
    }

    pub(crate) fn advance_to(&self, state: SessionState) -> bool {
        self.advance(SessionSnapshot::bare(state))
    }

    /// Back to `Uninitialized`. Only logout does this.
    pub fn reset(&self) {
        self.tx
            .send_replace(SessionSnapshot::bare(SessionState::Uninitialized));
        tracing::info!("session reset");
    }
}

/// Forget the persisted credential and reset the session.
pub async fn logout(store: &dyn CredentialStore, session: &Session) -> Result<(), StoreError> {
    clear_credential(store).await?;
    session.reset();
    Ok(())
}
