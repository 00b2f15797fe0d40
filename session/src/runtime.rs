use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::biometric::{BiometricGate, BiometricPlatform};
use crate::bootstrap::SessionBootstrapper;
use crate::config::SessionConfig;
use crate::credentials::CredentialStore;
use crate::error::StoreError;
use crate::location::{
    FixedLocation, HttpNearbyLookup, LocationPlatform, LocationSideEffectTrigger, NearbyLookup,
};
use crate::refresh::{HttpTokenFetcher, RefreshScheduler, TokenFetcher};
use crate::session::{self, Session, SessionSnapshot};
use crate::token::{TokenKind, TokenStore};

/// Collaborators the runtime is assembled from.
pub struct RuntimeParts {
    pub store: Arc<dyn CredentialStore>,
    pub biometric: Arc<dyn BiometricPlatform>,
    pub location: Arc<dyn LocationPlatform>,
    pub nearby: Arc<dyn NearbyLookup>,
    pub ai_fetcher: Arc<dyn TokenFetcher>,
    pub base_fetcher: Arc<dyn TokenFetcher>,
    pub ai_interval: Duration,
    pub base_interval: Duration,
    pub fetch_timeout: Duration,
    pub loading_floor: Duration,
}

/// Composition root for the session core.
///
/// Owns the session cell, the token store and both refresh schedulers, and
/// wires the location trigger to session transitions.
pub struct SessionRuntime {
    session: Session,
    tokens: TokenStore,
    store: Arc<dyn CredentialStore>,
    ai_refresh: Arc<RefreshScheduler>,
    base_refresh: Arc<RefreshScheduler>,
    bootstrapper: SessionBootstrapper,
    trigger: Arc<LocationSideEffectTrigger>,
    trigger_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionRuntime {
    pub fn new(parts: RuntimeParts) -> Self {
        Self::assemble(parts, TokenStore::new(), Session::new())
    }

    fn assemble(parts: RuntimeParts, tokens: TokenStore, session: Session) -> Self {
        let ai_refresh = Arc::new(RefreshScheduler::new(
            TokenKind::Ai,
            parts.ai_interval,
            parts.fetch_timeout,
            parts.ai_fetcher,
            tokens.clone(),
        ));
        let base_refresh = Arc::new(RefreshScheduler::new(
            TokenKind::Base,
            parts.base_interval,
            parts.fetch_timeout,
            parts.base_fetcher,
            tokens.clone(),
        ));
        let bootstrapper = SessionBootstrapper::new(
            parts.store.clone(),
            BiometricGate::new(parts.biometric),
            session.clone(),
            parts.loading_floor,
        );
        let trigger = Arc::new(LocationSideEffectTrigger::new(
            parts.location,
            parts.nearby,
            base_refresh.clone(),
        ));

        Self {
            session,
            tokens,
            store: parts.store,
            ai_refresh,
            base_refresh,
            bootstrapper,
            trigger,
            trigger_task: Mutex::new(None),
        }
    }

    /// Wire HTTP fetchers and the configured fixed location.
    ///
    /// Token requests carry the signed-in user's id once the session is
    /// authenticated, and `config.user_id` before that.
    pub fn from_config(
        config: &SessionConfig,
        http: reqwest::Client,
        store: Arc<dyn CredentialStore>,
        biometric: Arc<dyn BiometricPlatform>,
    ) -> Self {
        let tokens = TokenStore::new();
        let session = Session::new();
        let parts = RuntimeParts {
            store,
            biometric,
            location: Arc::new(FixedLocation(config.location)),
            nearby: Arc::new(HttpNearbyLookup::new(
                http.clone(),
                config.nearby_url.clone(),
                tokens.clone(),
            )),
            ai_fetcher: Arc::new(
                HttpTokenFetcher::new(http.clone(), &config.ai_token, config.user_id.clone())
                    .with_session(session.subscribe()),
            ),
            base_fetcher: Arc::new(
                HttpTokenFetcher::new(http, &config.base_token, config.user_id.clone())
                    .with_session(session.subscribe()),
            ),
            ai_interval: config.ai_token.interval,
            base_interval: config.base_token.interval,
            fetch_timeout: config.fetch_timeout,
            loading_floor: config.loading_floor,
        };
        Self::assemble(parts, tokens, session)
    }

    /// Start the AI refresh, attach the trigger, then restore the session.
    pub async fn boot(&self) -> SessionSnapshot {
        self.ai_refresh.start();
        {
            let mut task = self
                .trigger_task
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if task.is_none() {
                *task = Some(self.trigger.clone().spawn(self.session.subscribe()));
            }
        }
        self.bootstrapper.run().await
    }

    pub async fn logout(&self) -> Result<(), StoreError> {
        session::logout(self.store.as_ref(), &self.session).await
    }

    /// Stop both refresh loops and detach the trigger.
    pub fn shutdown(&self) {
        self.ai_refresh.stop();
        self.base_refresh.stop();
        if let Some(task) = self
            .trigger_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        tracing::info!("session runtime shut down");
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn ai_refresh(&self) -> &RefreshScheduler {
        &self.ai_refresh
    }

    pub fn base_refresh(&self) -> &RefreshScheduler {
        &self.base_refresh
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::biometric::NoBiometrics;
    use crate::credentials::{Credential, MemoryCredentialStore, save_credential};
    use crate::http_stub::{self, StubServer};
    use crate::session::SessionState;

    fn config_for(stub: &StubServer) -> SessionConfig {
        let api = stub.url("/");
        let vars: HashMap<&str, String> = HashMap::from([
            ("MEALSENSE_API_URL", api.to_string()),
            ("MEALSENSE_AI_TOKEN_SECRET", "ai-secret".to_string()),
            ("MEALSENSE_BASE_TOKEN_SECRET", "base-secret".to_string()),
            ("MEALSENSE_LOADING_FLOOR_MS", "0".to_string()),
            ("MEALSENSE_LATITUDE", "52.5".to_string()),
            ("MEALSENSE_LONGITUDE", "13.25".to_string()),
        ]);
        SessionConfig::from_lookup(move |name: &str| vars.get(name).cloned()).unwrap()
    }

    #[tokio::test]
    async fn base_token_is_requested_for_the_restored_user() {
        let mut stub = StubServer::start(200, r#"{"access_token": "tok"}"#).await;
        let store = Arc::new(MemoryCredentialStore::new());
        save_credential(
            store.as_ref(),
            &Credential {
                token: "session-tok".to_string(),
                user: json!({"id": "user-9"}),
                terms_accepted: true,
                biometric_enabled: false,
            },
        )
        .await
        .unwrap();

        let runtime = SessionRuntime::from_config(
            &config_for(&stub),
            http_stub::client(),
            store,
            Arc::new(NoBiometrics),
        );
        assert_eq!(runtime.boot().await.state, SessionState::Authenticated);

        let mut base_body = None;
        for _ in 0..3 {
            let request = stub.next_request().await;
            if request.path() == "/v1/auth/token" {
                assert_eq!(request.header("authorization"), Some("Bearer base-secret"));
                base_body = Some(request.json());
                break;
            }
        }
        assert_eq!(base_body, Some(json!({"user_id": "user-9"})));

        runtime.shutdown();
    }

    #[tokio::test]
    async fn missing_secrets_leave_both_refreshes_idle() {
        let stub = StubServer::start(200, r#"{"access_token": "tok"}"#).await;
        let mut config = config_for(&stub);
        config.ai_token.secret = None;
        config.base_token.secret = None;

        let runtime = SessionRuntime::from_config(
            &config,
            http_stub::client(),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(NoBiometrics),
        );
        runtime.boot().await;
        assert!(!runtime.ai_refresh().is_running());
        assert!(!runtime.base_refresh().is_running());
        runtime.shutdown();
    }
}
