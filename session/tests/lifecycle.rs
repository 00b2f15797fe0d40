use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mealsense_session::biometric::NoBiometrics;
use mealsense_session::credentials::{Credential, MemoryCredentialStore, save_credential};
use mealsense_session::error::{FetchError, LocationError};
use mealsense_session::location::{Coordinate, FixedLocation, NearbyLookup};
use mealsense_session::refresh::TokenFetcher;
use mealsense_session::{RuntimeParts, SessionRuntime, SessionState, TokenKind};
use serde_json::{Value, json};

struct PrefixFetcher {
    prefix: &'static str,
    calls: AtomicUsize,
}

impl PrefixFetcher {
    fn new(prefix: &'static str) -> Arc<Self> {
        Arc::new(Self {
            prefix,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TokenFetcher for PrefixFetcher {
    async fn fetch(&self) -> Result<String, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{}-{n}", self.prefix))
    }
}

#[derive(Default)]
struct CountingLookup {
    calls: AtomicUsize,
}

#[async_trait]
impl NearbyLookup for CountingLookup {
    async fn lookup(&self, _at: Coordinate) -> Result<Value, LocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"results": []}))
    }
}

struct Harness {
    runtime: SessionRuntime,
    store: Arc<MemoryCredentialStore>,
    nearby: Arc<CountingLookup>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryCredentialStore::new());
    let nearby = Arc::new(CountingLookup::default());
    let runtime = SessionRuntime::new(RuntimeParts {
        store: store.clone(),
        biometric: Arc::new(NoBiometrics),
        location: Arc::new(FixedLocation(Some(Coordinate {
            latitude: 48.137,
            longitude: 11.575,
        }))),
        nearby: nearby.clone(),
        ai_fetcher: PrefixFetcher::new("ai"),
        base_fetcher: PrefixFetcher::new("base"),
        ai_interval: Duration::from_secs(300),
        base_interval: Duration::from_secs(600),
        fetch_timeout: Duration::from_secs(10),
        loading_floor: Duration::from_millis(1000),
    });
    Harness {
        runtime,
        store,
        nearby,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test(start_paused = true)]
async fn saved_session_restores_and_drives_side_effects() {
    let h = harness();
    save_credential(
        h.store.as_ref(),
        &Credential {
            token: "tok".to_string(),
            user: json!({"id": 9}),
            terms_accepted: true,
            biometric_enabled: false,
        },
    )
    .await
    .unwrap();

    let snapshot = h.runtime.boot().await;
    assert_eq!(snapshot.state, SessionState::Authenticated);
    assert_eq!(snapshot.user, Some(json!({"id": 9})));

    settle().await;
    assert_eq!(h.runtime.tokens().current(TokenKind::Ai).as_deref(), Some("ai-1"));
    assert_eq!(h.runtime.tokens().current(TokenKind::Base).as_deref(), Some("base-1"));
    assert!(h.runtime.base_refresh().is_running());
    assert_eq!(h.nearby.calls.load(Ordering::SeqCst), 1);

    h.runtime.logout().await.unwrap();
    settle().await;
    assert_eq!(h.runtime.session().state(), SessionState::Uninitialized);
    assert!(!h.runtime.base_refresh().is_running());
    assert!(h.runtime.ai_refresh().is_running());
    assert_eq!(h.nearby.calls.load(Ordering::SeqCst), 1);

    h.runtime.shutdown();
    assert!(!h.runtime.ai_refresh().is_running());
}

#[tokio::test(start_paused = true)]
async fn no_saved_session_still_refreshes_ai_token() {
    let h = harness();

    let snapshot = h.runtime.boot().await;
    assert_eq!(snapshot.state, SessionState::Unauthenticated);

    settle().await;
    assert_eq!(h.runtime.tokens().current(TokenKind::Ai).as_deref(), Some("ai-1"));
    assert_eq!(h.runtime.tokens().current(TokenKind::Base), None);
    assert!(!h.runtime.base_refresh().is_running());
    assert_eq!(h.nearby.calls.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.runtime.tokens().current(TokenKind::Ai).as_deref(), Some("ai-2"));

    h.runtime.shutdown();
}
