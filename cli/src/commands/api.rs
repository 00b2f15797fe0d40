use clap::Args;
use mealsense_session::SessionConfig;
use mealsense_session::api::ApiClient;
use serde_json::Value;

use super::token::KindArg;
use crate::util::{
    client, exit_error, fetch_exit_code, fetch_token, print_json, read_json_from_file,
    record_exit_code,
};

#[derive(Args)]
pub struct ApiArgs {
    /// HTTP method (GET, POST, PUT, DELETE, PATCH)
    pub method: String,

    /// API path (e.g. /v1/meals)
    pub path: String,

    /// Request body as JSON string
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Read request body from file (use '-' for stdin)
    #[arg(long, short = 'f', conflicts_with = "data")]
    pub data_file: Option<String>,

    /// Which bearer token to fetch and attach
    #[arg(long, value_enum, default_value = "base")]
    pub token: KindArg,
}

/// Send one authenticated request. Failures are printed as classified error records.
pub async fn run(config: &SessionConfig, args: ApiArgs) -> i32 {
    let method = match args.method.to_uppercase().as_str() {
        "GET" => reqwest::Method::GET,
        "POST" => reqwest::Method::POST,
        "PUT" => reqwest::Method::PUT,
        "DELETE" => reqwest::Method::DELETE,
        "PATCH" => reqwest::Method::PATCH,
        other => exit_error(
            &format!("Unknown HTTP method: {other}"),
            Some("Supported methods: GET, POST, PUT, DELETE, PATCH"),
        ),
    };

    let body: Option<Value> = if let Some(raw) = &args.data {
        match serde_json::from_str(raw) {
            Ok(v) => Some(v),
            Err(e) => exit_error(&format!("Invalid JSON in --data: {e}"), None),
        }
    } else if let Some(path) = &args.data_file {
        Some(read_json_from_file(path).unwrap_or_else(|e| exit_error(&e, None)))
    } else {
        None
    };

    let kind = args.token.into();
    let tokens = match fetch_token(config, kind).await {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({ "error": "token_fetch_failed", "kind": kind, "message": e.to_string() })
            );
            return fetch_exit_code(&e);
        }
    };

    let api = ApiClient::new(client(), config.api_url.clone(), tokens);
    match api.request_json(method, &args.path, kind, body.as_ref()).await {
        Ok(value) => print_json(&value),
        Err(record) => {
            print_json(&record);
            record_exit_code(&record)
        }
    }
}
