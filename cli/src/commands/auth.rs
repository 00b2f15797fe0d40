use mealsense_session::credentials::{
    ALL_KEYS, AUTH_TOKEN_KEY, BIOMETRIC_ENABLED_KEY, Credential, save_credential,
};
use mealsense_session::{Session, SessionConfig, session};
use serde_json::json;

use crate::util::{exit_error, open_store, print_json};

pub async fn login(
    config: &SessionConfig,
    token: &str,
    user: &str,
    terms_accepted: bool,
    biometric: bool,
) -> i32 {
    let user: serde_json::Value = match serde_json::from_str(user) {
        Ok(v) => v,
        Err(e) => exit_error(
            &format!("Invalid JSON in --user: {e}"),
            Some("Pass the user profile as a JSON object, e.g. --user '{\"id\": 1}'"),
        ),
    };
    if token.trim().is_empty() {
        exit_error("--token must not be empty", None);
    }

    let store = open_store(config);
    let credential = Credential {
        token: token.to_string(),
        user,
        terms_accepted,
        biometric_enabled: biometric,
    };
    if let Err(e) = save_credential(store.as_ref(), &credential).await {
        exit_error(&format!("Failed to save credentials: {e}"), None);
    }

    print_json(&json!({
        "status": "saved",
        "biometric_enabled": biometric,
        "credentials_path": config.credentials_path.to_string_lossy()
    }))
}

pub async fn logout(config: &SessionConfig) -> i32 {
    let store = open_store(config);
    if let Err(e) = session::logout(store.as_ref(), &Session::new()).await {
        exit_error(&format!("Failed to clear credentials: {e}"), None);
    }
    print_json(&json!({
        "status": "logged_out",
        "credentials_path": config.credentials_path.to_string_lossy()
    }))
}

/// Report which session keys are stored, without restoring anything.
pub async fn status(config: &SessionConfig) -> i32 {
    let store = open_store(config);
    let mut keys = serde_json::Map::new();
    for key in ALL_KEYS {
        let present = match store.get(key).await {
            Ok(value) => json!(value.is_some()),
            Err(e) => json!({ "error": e.to_string() }),
        };
        keys.insert(key.to_string(), present);
    }

    let token_prefix = store
        .get(AUTH_TOKEN_KEY)
        .await
        .ok()
        .flatten()
        .map(|t| format!("{}...", t.chars().take(8).collect::<String>()));
    let biometric = store.get(BIOMETRIC_ENABLED_KEY).await.ok().flatten();

    print_json(&json!({
        "credentials_path": config.credentials_path.to_string_lossy(),
        "keys": keys,
        "token_prefix": token_prefix,
        "biometric_enabled": biometric.as_deref() == Some("true")
    }))
}
