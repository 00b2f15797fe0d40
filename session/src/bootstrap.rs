//! One-shot session restore at process start.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::biometric::{BiometricGate, BiometricVerdict, PromptOptions};
use crate::credentials::{
    AUTH_TOKEN_KEY, BIOMETRIC_ENABLED_KEY, CredentialStore, TERMS_ACCEPTED_KEY, USER_KEY,
};
use crate::session::{Session, SessionSnapshot, SessionState};

pub struct SessionBootstrapper {
    store: Arc<dyn CredentialStore>,
    gate: BiometricGate,
    session: Session,
    prompt: PromptOptions,
    loading_floor: Duration,
    started: AtomicBool,
}

struct SavedSession {
    user: Value,
    terms_accepted: bool,
    biometric_enabled: bool,
}

impl SessionBootstrapper {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        gate: BiometricGate,
        session: Session,
        loading_floor: Duration,
    ) -> Self {
        Self {
            store,
            gate,
            session,
            prompt: PromptOptions::default(),
            loading_floor,
            started: AtomicBool::new(false),
        }
    }

    pub fn with_prompt(mut self, prompt: PromptOptions) -> Self {
        self.prompt = prompt;
        self
    }

    /// Restore the persisted session and publish a terminal state.
    ///
    /// Runs once per bootstrapper; later calls return the current snapshot.
    /// The terminal state is published no earlier than `loading_floor` after
    /// the call started.
    pub async fn run(&self) -> SessionSnapshot {
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::warn!("session bootstrap already ran; returning current state");
            return self.session.snapshot();
        }

        let started_at = Instant::now();
        self.session.advance_to(SessionState::Restoring);

        let terminal = self.restore().await;

        tokio::time::sleep_until(started_at + self.loading_floor).await;
        self.session.advance(terminal);

        let snapshot = self.session.snapshot();
        tracing::info!(state = %snapshot.state, "session bootstrap complete");
        snapshot
    }

    async fn restore(&self) -> SessionSnapshot {
        let Some(saved) = self.load_saved_session().await else {
            return unauthenticated();
        };

        if !saved.biometric_enabled {
            return authenticated(saved);
        }

        self.session.advance_to(SessionState::BiometricPending);
        match self.gate.verify(&self.prompt).await {
            BiometricVerdict::Verified => authenticated(saved),
            BiometricVerdict::Unavailable => {
                tracing::info!("biometrics unavailable; restoring session without a check");
                authenticated(saved)
            }
            BiometricVerdict::Rejected => {
                tracing::info!("biometric check failed; sign-in required");
                unauthenticated()
            }
            // Fail-open: a platform error during the challenge still restores
            // the session. Kept as-is pending a product decision.
            BiometricVerdict::Errored => {
                tracing::warn!("biometric challenge errored; restoring session (fail-open)");
                authenticated(saved)
            }
        }
    }

    async fn load_saved_session(&self) -> Option<SavedSession> {
        let (token, user, terms, biometric) = tokio::join!(
            self.read(AUTH_TOKEN_KEY),
            self.read(USER_KEY),
            self.read(TERMS_ACCEPTED_KEY),
            self.read(BIOMETRIC_ENABLED_KEY),
        );

        let (Some(_token), Some(raw_user)) = (token, user) else {
            tracing::info!("no saved session");
            return None;
        };

        let user = match serde_json::from_str::<Value>(&raw_user) {
            Ok(Value::Null) => {
                tracing::warn!("saved user is null; treating as no saved session");
                return None;
            }
            Ok(user) => user,
            Err(err) => {
                tracing::warn!(error = %err, "saved user is not valid JSON; treating as no saved session");
                return None;
            }
        };

        Some(SavedSession {
            user,
            terms_accepted: terms.as_deref() == Some("true"),
            biometric_enabled: biometric.as_deref() == Some("true"),
        })
    }

    /// A failed or empty read counts as absent.
    async fn read(&self, key: &'static str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(err) => {
                tracing::warn!(key, error = %err, "credential read failed; treating as absent");
                None
            }
        }
    }
}

fn authenticated(saved: SavedSession) -> SessionSnapshot {
    SessionSnapshot {
        state: SessionState::Authenticated,
        user: Some(saved.user),
        terms_accepted: saved.terms_accepted,
    }
}

fn unauthenticated() -> SessionSnapshot {
    SessionSnapshot {
        state: SessionState::Unauthenticated,
        user: None,
        terms_accepted: false,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::biometric::testing::FakePlatform;
    use crate::biometric::{BiometricPlatform, NoBiometrics};
    use crate::credentials::MemoryCredentialStore;
    use crate::error::{BiometricError, StoreError};

    const FLOOR: Duration = Duration::from_millis(1000);

    fn saved(biometric: bool) -> MemoryCredentialStore {
        let mut entries = vec![
            (AUTH_TOKEN_KEY, "tok_abc"),
            (USER_KEY, r#"{"id": 42, "name": "Ada"}"#),
            (TERMS_ACCEPTED_KEY, "true"),
        ];
        if biometric {
            entries.push((BIOMETRIC_ENABLED_KEY, "true"));
        }
        MemoryCredentialStore::with_entries(entries)
    }

    fn bootstrapper(
        store: impl CredentialStore + 'static,
        platform: Arc<dyn BiometricPlatform>,
    ) -> (SessionBootstrapper, Session) {
        let session = Session::new();
        let boot = SessionBootstrapper::new(
            Arc::new(store),
            BiometricGate::new(platform),
            session.clone(),
            FLOOR,
        );
        (boot, session)
    }

    #[tokio::test(start_paused = true)]
    async fn empty_store_is_unauthenticated() {
        let (boot, session) = bootstrapper(MemoryCredentialStore::new(), Arc::new(NoBiometrics));
        let snapshot = boot.run().await;
        assert_eq!(snapshot.state, SessionState::Unauthenticated);
        assert_eq!(snapshot.user, None);
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn saved_session_without_biometrics_is_authenticated() {
        let platform = Arc::new(FakePlatform::new(true, true, Ok(false)));
        let (boot, _) = bootstrapper(saved(false), platform.clone());
        let snapshot = boot.run().await;
        assert_eq!(snapshot.state, SessionState::Authenticated);
        assert_eq!(snapshot.user, Some(json!({"id": 42, "name": "Ada"})));
        assert!(snapshot.terms_accepted);
        assert_eq!(platform.challenges(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn biometric_success_is_authenticated_with_user() {
        let platform = Arc::new(FakePlatform::new(true, true, Ok(true)));
        let (boot, _) = bootstrapper(saved(true), platform.clone());
        let snapshot = boot.run().await;
        assert_eq!(snapshot.state, SessionState::Authenticated);
        assert_eq!(snapshot.user.unwrap()["id"], 42);
        assert_eq!(platform.challenges(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_hardware_falls_back_to_authenticated() {
        let platform = Arc::new(FakePlatform::new(false, false, Ok(false)));
        let (boot, _) = bootstrapper(saved(true), platform.clone());
        assert_eq!(boot.run().await.state, SessionState::Authenticated);
        assert_eq!(platform.challenges(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_challenge_is_unauthenticated() {
        let platform = Arc::new(FakePlatform::new(true, true, Ok(false)));
        let (boot, _) = bootstrapper(saved(true), platform.clone());
        let snapshot = boot.run().await;
        assert_eq!(snapshot.state, SessionState::Unauthenticated);
        assert_eq!(snapshot.user, None);
        assert_eq!(platform.challenges(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn challenge_error_fails_open() {
        let platform = Arc::new(FakePlatform::new(true, true, Err(())));
        let (boot, _) = bootstrapper(saved(true), platform);
        assert_eq!(boot.run().await.state, SessionState::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_user_is_unauthenticated() {
        let store = MemoryCredentialStore::with_entries([
            (AUTH_TOKEN_KEY, "tok"),
            (USER_KEY, "{not json"),
        ]);
        let (boot, _) = bootstrapper(store, Arc::new(NoBiometrics));
        assert_eq!(boot.run().await.state, SessionState::Unauthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn token_without_user_is_unauthenticated() {
        let store = MemoryCredentialStore::with_entries([(AUTH_TOKEN_KEY, "tok")]);
        let (boot, _) = bootstrapper(store, Arc::new(NoBiometrics));
        assert_eq!(boot.run().await.state, SessionState::Unauthenticated);
    }

    struct BrokenStore;

    #[async_trait]
    impl CredentialStore for BrokenStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable(format!("keychain locked reading {key}")))
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("keychain locked".into()))
        }

        async fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("keychain locked".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failing_store_forces_sign_in() {
        let (boot, _) = bootstrapper(BrokenStore, Arc::new(NoBiometrics));
        assert_eq!(boot.run().await.state, SessionState::Unauthenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_state_waits_for_loading_floor() {
        let (boot, session) = bootstrapper(saved(false), Arc::new(NoBiometrics));
        let started = Instant::now();
        boot.run().await;
        assert!(started.elapsed() >= FLOOR);
        assert!(session.state().is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn second_run_does_not_restore_again() {
        let platform = Arc::new(FakePlatform::new(true, true, Ok(true)));
        let (boot, _) = bootstrapper(saved(true), platform.clone());
        boot.run().await;
        let again = boot.run().await;
        assert_eq!(again.state, SessionState::Authenticated);
        assert_eq!(platform.challenges(), 1);
    }

    /// Challenge that blocks until released, to observe the pending state.
    struct HeldChallenge {
        release: Notify,
    }

    #[async_trait]
    impl BiometricPlatform for HeldChallenge {
        async fn has_hardware(&self) -> Result<bool, BiometricError> {
            Ok(true)
        }

        async fn is_enrolled(&self) -> Result<bool, BiometricError> {
            Ok(true)
        }

        async fn challenge(&self, _options: &PromptOptions) -> Result<bool, BiometricError> {
            self.release.notified().await;
            Ok(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn biometric_pending_is_published_before_decision() {
        let platform = Arc::new(HeldChallenge {
            release: Notify::new(),
        });
        let (boot, session) = bootstrapper(saved(true), platform.clone());
        let mut rx = session.subscribe();

        let run = tokio::spawn(async move { boot.run().await });
        rx.wait_for(|s| s.state == SessionState::BiometricPending)
            .await
            .unwrap();
        assert_eq!(session.snapshot().user, None);

        platform.release.notify_one();
        let snapshot = run.await.unwrap();
        assert_eq!(snapshot.state, SessionState::Authenticated);
    }
}
