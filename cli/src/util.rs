use std::io::Read;
use std::sync::Arc;

use mealsense_core::{ErrorKind, ErrorRecord};
use mealsense_session::credentials::{CredentialStore, FileCredentialStore};
use mealsense_session::error::FetchError;
use mealsense_session::refresh::{HttpTokenFetcher, RefreshScheduler};
use mealsense_session::{SessionConfig, TokenKind, TokenStore};
use serde::Serialize;
use serde_json::json;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| message.to_string())
    );
    std::process::exit(1);
}

/// Print `value` as pretty JSON on stdout. Returns the exit code.
pub fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{s}");
            0
        }
        Err(e) => exit_error(&format!("Failed to encode output: {e}"), None),
    }
}

/// Environment configuration, with command-line values taking precedence.
pub fn load_config(overrides: &ConfigOverrides) -> SessionConfig {
    let lookup = |name: &str| {
        let flag = match name {
            "MEALSENSE_API_URL" => overrides.api_url.clone(),
            "MEALSENSE_CREDENTIALS_PATH" => overrides.credentials_path.clone(),
            _ => None,
        };
        flag.or_else(|| std::env::var(name).ok())
    };
    SessionConfig::from_lookup(lookup).unwrap_or_else(|e| {
        exit_error(
            &e.to_string(),
            Some("Check the MEALSENSE_* environment variables or your .env file."),
        )
    })
}

#[derive(Default)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub credentials_path: Option<String>,
}

pub fn open_store(config: &SessionConfig) -> Arc<dyn CredentialStore> {
    Arc::new(FileCredentialStore::new(&config.credentials_path))
}

/// Read JSON from a file path or stdin (when path is "-").
pub fn read_json_from_file(path: &str) -> Result<serde_json::Value, String> {
    let raw = if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("Failed to read stdin: {e}"))?;
        buf
    } else {
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read file '{path}': {e}"))?
    };
    serde_json::from_str(&raw).map_err(|e| format!("Invalid JSON in '{path}': {e}"))
}

/// Fetch one token of `kind` into a fresh store, bounded by the fetch timeout.
pub async fn fetch_token(
    config: &SessionConfig,
    kind: TokenKind,
) -> Result<TokenStore, FetchError> {
    let endpoint = match kind {
        TokenKind::Ai => &config.ai_token,
        TokenKind::Base => &config.base_token,
    };
    let tokens = TokenStore::new();
    let scheduler = RefreshScheduler::new(
        kind,
        endpoint.interval,
        config.fetch_timeout,
        Arc::new(HttpTokenFetcher::new(client(), endpoint, config.user_id.clone())),
        tokens.clone(),
    );
    scheduler.refresh_now().await?;
    Ok(tokens)
}

/// Exit code for a failed token fetch: 3 for connection trouble, 1 otherwise.
pub fn fetch_exit_code(error: &FetchError) -> i32 {
    match error {
        FetchError::Transport(_) | FetchError::Timeout(_) => 3,
        _ => 1,
    }
}

/// Exit code for a classified API failure: 3 for network trouble, 1 otherwise.
pub fn record_exit_code(record: &ErrorRecord) -> i32 {
    match record.kind {
        ErrorKind::NetworkError => 3,
        _ => 1,
    }
}
