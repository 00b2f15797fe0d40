use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Bearer for the AI endpoints; refreshed for the whole process lifetime.
    Ai,
    /// Bearer for the base API; only refreshed while a session is authenticated.
    Base,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Ai => "ai",
            TokenKind::Base => "base",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The most recent successful fetch for one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BearerToken {
    pub value: String,
    pub fetched_at: DateTime<Utc>,
}

/// Current bearer per [`TokenKind`].
///
/// Created once by the composition root and cloned into every caller. The
/// refresh scheduler for a kind is its only writer. Readers never block on a
/// fetch in flight and may observe a value that is about to be replaced.
#[derive(Clone)]
pub struct TokenStore {
    ai: Arc<watch::Sender<Option<BearerToken>>>,
    base: Arc<watch::Sender<Option<BearerToken>>>,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            ai: Arc::new(watch::Sender::new(None)),
            base: Arc::new(watch::Sender::new(None)),
        }
    }

    fn slot(&self, kind: TokenKind) -> &watch::Sender<Option<BearerToken>> {
        match kind {
            TokenKind::Ai => &self.ai,
            TokenKind::Base => &self.base,
        }
    }

    /// Current bearer string, if any fetch has succeeded yet.
    pub fn current(&self, kind: TokenKind) -> Option<String> {
        self.slot(kind).borrow().as_ref().map(|t| t.value.clone())
    }

    pub fn snapshot(&self, kind: TokenKind) -> Option<BearerToken> {
        self.slot(kind).borrow().clone()
    }

    pub fn set(&self, kind: TokenKind, value: impl Into<String>) {
        self.slot(kind).send_replace(Some(BearerToken {
            value: value.into(),
            fetched_at: Utc::now(),
        }));
    }

    /// Receiver that wakes on every write for `kind`.
    pub fn subscribe(&self, kind: TokenKind) -> watch::Receiver<Option<BearerToken>> {
        self.slot(kind).subscribe()
    }
}
