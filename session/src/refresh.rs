//! Background token refresh.
//!
//! One [`RefreshScheduler`] exists per [`TokenKind`]. Each owns at most one
//! armed timer; fetches run in detached tasks so that stopping the timer never
//! interrupts a fetch that is already on the wire.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use url::Url;

use crate::config::TokenEndpoint;
use crate::error::FetchError;
use crate::session::SessionSnapshot;
use crate::token::{TokenKind, TokenStore};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Something that can mint a fresh bearer token.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self) -> Result<String, FetchError>;

    /// Whether a fetch can succeed at all. Schedulers with an unconfigured
    /// fetcher never arm their timer.
    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// `POST {url}` with `{"user_id": ..}` and a static bearer, answering
/// `{"access_token": ..}`.
///
/// The user id is the signed-in user's `id` when a session is attached and
/// authenticated, otherwise the configured fallback.
pub struct HttpTokenFetcher {
    client: reqwest::Client,
    url: Url,
    secret: Option<String>,
    user_id: String,
    session: Option<watch::Receiver<SessionSnapshot>>,
}

impl HttpTokenFetcher {
    pub fn new(client: reqwest::Client, endpoint: &TokenEndpoint, user_id: impl Into<String>) -> Self {
        Self {
            client,
            url: endpoint.url.clone(),
            secret: endpoint.secret.clone(),
            user_id: user_id.into(),
            session: None,
        }
    }

    pub fn with_session(mut self, session: watch::Receiver<SessionSnapshot>) -> Self {
        self.session = Some(session);
        self
    }

    fn user_id(&self) -> String {
        self.session
            .as_ref()
            .and_then(|rx| rx.borrow().user_id())
            .unwrap_or_else(|| self.user_id.clone())
    }
}

#[async_trait]
impl TokenFetcher for HttpTokenFetcher {
    async fn fetch(&self) -> Result<String, FetchError> {
        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| FetchError::NotConfigured(format!("no secret for {}", self.url)))?;

        let resp = self
            .client
            .post(self.url.clone())
            .bearer_auth(secret)
            .json(&json!({ "user_id": self.user_id() }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = resp.json().await?;
        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(FetchError::MissingToken)
    }

    fn is_configured(&self) -> bool {
        self.secret.is_some()
    }
}

/// The armed timer of one scheduler.
pub struct RefreshJob {
    pub kind: TokenKind,
    pub interval: Duration,
    handle: JoinHandle<()>,
}

impl RefreshJob {
    pub fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }
}

pub struct RefreshScheduler {
    kind: TokenKind,
    interval: Duration,
    task: RefreshTask,
    job: Mutex<Option<RefreshJob>>,
}

impl RefreshScheduler {
    pub fn new(
        kind: TokenKind,
        interval: Duration,
        fetch_timeout: Duration,
        fetcher: Arc<dyn TokenFetcher>,
        tokens: TokenStore,
    ) -> Self {
        Self {
            kind,
            interval: interval.max(MIN_INTERVAL),
            task: RefreshTask {
                kind,
                fetcher,
                tokens,
                fetch_timeout,
                in_flight: Arc::new(AtomicUsize::new(0)),
            },
            job: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fetch once now without waiting for it, then arm the periodic timer.
    ///
    /// A timer already armed on this scheduler is cancelled first, so repeated
    /// calls never stack timers. The immediate fetch is skipped while another
    /// fetch is in flight. Does nothing when the fetcher is not configured.
    /// Must be called inside a tokio runtime.
    pub fn start(&self) {
        if !self.task.fetcher.is_configured() {
            tracing::warn!(kind = %self.kind, "token refresh disabled: fetcher is not configured");
            return;
        }

        let mut job = self.job.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = job.take() {
            previous.handle.abort();
            tracing::debug!(kind = %self.kind, "replacing armed refresh timer");
        }

        if self.task.in_flight.load(Ordering::Acquire) == 0 {
            self.task.spawn_fetch();
        } else {
            tracing::debug!(kind = %self.kind, "token fetch already in flight; skipping immediate fetch");
        }

        let task = self.task.clone();
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task.spawn_fetch();
            }
        });

        *job = Some(RefreshJob {
            kind: self.kind,
            interval,
            handle,
        });
        tracing::info!(kind = %self.kind, interval_secs = interval.as_secs(), "token refresh started");
    }

    /// Cancel future ticks. A fetch already in flight still lands.
    pub fn stop(&self) {
        let mut job = self.job.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = job.take() {
            previous.handle.abort();
            tracing::info!(kind = %self.kind, "token refresh stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(RefreshJob::is_live)
    }

    /// Last token written for this kind. Never waits on a fetch.
    pub fn current_token(&self) -> Option<String> {
        self.task.tokens.current(self.kind)
    }

    /// Fetch once and wait for the result, bypassing the timer.
    pub async fn refresh_now(&self) -> Result<String, FetchError> {
        let token = self.task.fetch_bounded().await?;
        self.task.tokens.set(self.kind, token.clone());
        Ok(token)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Clone)]
struct RefreshTask {
    kind: TokenKind,
    fetcher: Arc<dyn TokenFetcher>,
    tokens: TokenStore,
    fetch_timeout: Duration,
    in_flight: Arc<AtomicUsize>,
}

impl RefreshTask {
    fn spawn_fetch(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlight(self.in_flight.clone());
        let task = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            task.refresh_once().await;
        });
    }

    async fn refresh_once(&self) {
        match self.fetch_bounded().await {
            Ok(token) => {
                self.tokens.set(self.kind, token);
                tracing::debug!(kind = %self.kind, "token refreshed");
            }
            Err(err) => {
                tracing::warn!(kind = %self.kind, error = %err, "token refresh failed; keeping previous token");
            }
        }
    }

    async fn fetch_bounded(&self) -> Result<String, FetchError> {
        match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.fetch_timeout)),
        }
    }
}

/// Releases the in-flight count even if the fetch task panics or is dropped.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
