use clap::ValueEnum;
use mealsense_session::{SessionConfig, TokenKind};
use serde_json::json;

use crate::util::{exit_error, fetch_exit_code, fetch_token, print_json};

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Ai,
    Base,
}

impl From<KindArg> for TokenKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Ai => TokenKind::Ai,
            KindArg::Base => TokenKind::Base,
        }
    }
}

/// Fetch one token and print a redacted view of it.
pub async fn run(config: &SessionConfig, kind: KindArg, reveal: bool) -> i32 {
    let kind = TokenKind::from(kind);
    let tokens = match fetch_token(config, kind).await {
        Ok(tokens) => tokens,
        Err(e) => {
            let code = fetch_exit_code(&e);
            eprintln!(
                "{}",
                json!({ "error": "token_fetch_failed", "kind": kind, "message": e.to_string() })
            );
            return code;
        }
    };
    let Some(token) = tokens.snapshot(kind) else {
        exit_error("Token endpoint returned no token", None);
    };

    let value = if reveal {
        token.value.clone()
    } else {
        format!("{}...", token.value.chars().take(12).collect::<String>())
    };
    print_json(&json!({
        "kind": kind,
        "token": value,
        "fetched_at": token.fetched_at
    }))
}
