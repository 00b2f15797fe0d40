use std::sync::Arc;

use mealsense_session::biometric::NoBiometrics;
use mealsense_session::{SessionConfig, SessionRuntime, TokenKind};
use serde_json::json;

use crate::util::{client, open_store, print_json};

/// Restore the session, start both refresh loops and stay up until Ctrl-C.
///
/// With `once`, print the restored state and exit immediately.
pub async fn run(config: &SessionConfig, once: bool) -> i32 {
    if config.ai_token.secret.is_none() {
        tracing::warn!("MEALSENSE_AI_TOKEN_SECRET is not set; AI token refresh is disabled");
    }

    let runtime = SessionRuntime::from_config(
        config,
        client(),
        open_store(config),
        Arc::new(NoBiometrics),
    );

    let snapshot = runtime.boot().await;
    let code = print_json(&snapshot);
    if once {
        runtime.shutdown();
        return code;
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
    }
    runtime.shutdown();

    print_json(&json!({
        "status": "stopped",
        "state": runtime.session().state(),
        "ai_token": runtime.tokens().snapshot(TokenKind::Ai).map(|t| t.fetched_at),
        "base_token": runtime.tokens().snapshot(TokenKind::Base).map(|t| t.fetched_at)
    }))
}
