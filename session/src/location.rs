//! Side effects tied to the authenticated state: the one-shot nearby lookup and
//! the lifetime of the base token refresh.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use crate::error::LocationError;
use crate::refresh::RefreshScheduler;
use crate::session::{SessionSnapshot, SessionState};
use crate::token::{TokenKind, TokenStore};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Platform location services.
#[async_trait]
pub trait LocationPlatform: Send + Sync {
    /// Ask for foreground permission. `Ok(false)` means the user declined.
    async fn request_foreground_permission(&self) -> Result<bool, LocationError>;
    async fn current_position(&self) -> Result<Coordinate, LocationError>;
}

/// Location source for hosts without a GPS: a configured point, or nothing.
pub struct FixedLocation(pub Option<Coordinate>);

#[async_trait]
impl LocationPlatform for FixedLocation {
    async fn request_foreground_permission(&self) -> Result<bool, LocationError> {
        Ok(self.0.is_some())
    }

    async fn current_position(&self) -> Result<Coordinate, LocationError> {
        self.0
            .ok_or_else(|| LocationError::Unavailable("no fixed location configured".to_string()))
    }
}

/// Query for resources near a coordinate.
#[async_trait]
pub trait NearbyLookup: Send + Sync {
    async fn lookup(&self, at: Coordinate) -> Result<Value, LocationError>;
}

/// `GET {url}?latitude=..&longitude=..`, authorized with the base token when
/// one is available.
pub struct HttpNearbyLookup {
    client: reqwest::Client,
    url: Url,
    tokens: TokenStore,
}

impl HttpNearbyLookup {
    pub fn new(client: reqwest::Client, url: Url, tokens: TokenStore) -> Self {
        Self { client, url, tokens }
    }
}

#[async_trait]
impl NearbyLookup for HttpNearbyLookup {
    async fn lookup(&self, at: Coordinate) -> Result<Value, LocationError> {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("latitude", &at.latitude.to_string())
            .append_pair("longitude", &at.longitude.to_string());

        let mut req = self.client.get(url);
        if let Some(token) = self.tokens.current(TokenKind::Base) {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(LocationError::Status {
                status: status.as_u16(),
            });
        }
        Ok(resp.json().await?)
    }
}

/// Reacts to session transitions.
///
/// Entering `Authenticated` starts the base token refresh and fires one
/// location permission request plus at most one nearby lookup. Leaving it
/// stops the base refresh. The AI refresh is not this trigger's concern.
pub struct LocationSideEffectTrigger {
    platform: Arc<dyn LocationPlatform>,
    nearby: Arc<dyn NearbyLookup>,
    base_refresh: Arc<RefreshScheduler>,
}

impl LocationSideEffectTrigger {
    pub fn new(
        platform: Arc<dyn LocationPlatform>,
        nearby: Arc<dyn NearbyLookup>,
        base_refresh: Arc<RefreshScheduler>,
    ) -> Self {
        Self {
            platform,
            nearby,
            base_refresh,
        }
    }

    /// Apply the side effects of one transition. Returns the lookup task when
    /// one was dispatched.
    pub fn on_transition(
        &self,
        previous: SessionState,
        next: SessionState,
    ) -> Option<JoinHandle<()>> {
        if previous == next {
            return None;
        }
        if next == SessionState::Authenticated {
            self.base_refresh.start();
            return Some(self.dispatch_lookup());
        }
        if previous == SessionState::Authenticated {
            self.base_refresh.stop();
        }
        None
    }

    fn dispatch_lookup(&self) -> JoinHandle<()> {
        let platform = self.platform.clone();
        let nearby = self.nearby.clone();
        tokio::spawn(async move {
            match platform.request_foreground_permission().await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!("location permission denied; skipping nearby lookup");
                    return;
                }
                Err(err) => {
                    tracing::info!(error = %err, "location permission request failed; skipping nearby lookup");
                    return;
                }
            }

            let at = match platform.current_position().await {
                Ok(at) => at,
                Err(err) => {
                    tracing::warn!(error = %err, "could not resolve position");
                    return;
                }
            };

            match nearby.lookup(at).await {
                Ok(_) => tracing::info!(
                    latitude = at.latitude,
                    longitude = at.longitude,
                    "nearby lookup complete"
                ),
                Err(err) => tracing::warn!(error = %err, "nearby lookup failed"),
            }
        })
    }

    /// Follow `session` until its sender is dropped, applying every transition.
    pub fn spawn(self: Arc<Self>, mut session: watch::Receiver<SessionSnapshot>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut previous = session.borrow_and_update().state;
            if previous == SessionState::Authenticated {
                self.on_transition(SessionState::Uninitialized, previous);
            }
            while session.changed().await.is_ok() {
                let next = session.borrow_and_update().state;
                self.on_transition(previous, next);
                previous = next;
            }
        })
    }
}
