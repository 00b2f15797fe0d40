use mealsense_core::{
    ErrorRecord, HealthConditionProfile, PromptValidation, classify, error::MEDICAL_SAFETY_VIOLATION,
    validate_prompt,
};
use serde::Serialize;
use serde_json::{Value, json};
use url::Url;

use crate::token::{TokenKind, TokenStore};

/// Result of [`ApiClient::submit_prompt`]: the local screen plus the backend answer.
#[derive(Debug, Clone, Serialize)]
pub struct PromptResponse {
    pub validation: PromptValidation,
    pub body: Value,
}

/// Outbound JSON calls authorized with the current bearer of one token kind.
///
/// Every failure comes back as an [`ErrorRecord`]; callers never see raw
/// error bodies.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: TokenStore,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, base_url: Url, tokens: TokenStore) -> Self {
        Self {
            http,
            base_url,
            tokens,
        }
    }

    pub async fn request_json(
        &self,
        method: reqwest::Method,
        path: &str,
        kind: TokenKind,
        body: Option<&Value>,
    ) -> Result<Value, ErrorRecord> {
        let url = self.base_url.join(path).map_err(|e| {
            classify(&Value::Null, Some(&format!("invalid request path '{path}': {e}")))
        })?;

        let request_id = uuid::Uuid::now_v7().to_string();
        let mut req = self
            .http
            .request(method, url)
            .header("x-request-id", &request_id);
        if let Some(token) = self.tokens.current(kind) {
            req = req.bearer_auth(token);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                let record = classify(&Value::Null, Some(&e));
                tracing::warn!(request_id = %request_id, kind = %record.kind, error = %e, "request failed");
                return Err(record);
            }
        };

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if !status.is_success() {
            let record = classify(&error_body(status.as_u16(), parsed, text), None);
            tracing::warn!(request_id = %request_id, status = status.as_u16(), kind = %record.kind, "request rejected");
            return Err(record);
        }

        if parsed.get("rejection_reason").and_then(Value::as_str) == Some(MEDICAL_SAFETY_VIOLATION) {
            let record = classify(&parsed, None);
            tracing::info!(request_id = %request_id, kind = %record.kind, "request blocked by safety review");
            return Err(record);
        }

        Ok(parsed)
    }

    /// Screen `prompt` locally, then send it regardless.
    ///
    /// Local warnings are informational; the backend decides whether the
    /// request is blocked.
    pub async fn submit_prompt(
        &self,
        path: &str,
        prompt: &str,
        profile: &HealthConditionProfile,
    ) -> Result<PromptResponse, ErrorRecord> {
        let validation = validate_prompt(prompt, profile);
        if !validation.is_valid {
            tracing::info!(warnings = validation.warnings.len(), "prompt flagged by local screen");
        }

        let body = json!({
            "prompt": prompt,
            "health_profile": profile,
        });
        let body = self
            .request_json(reqwest::Method::POST, path, TokenKind::Ai, Some(&body))
            .await?;
        Ok(PromptResponse { validation, body })
    }
}

/// Attach the HTTP status to whatever the server sent so the classifier's
/// status table applies.
fn error_body(status: u16, parsed: Value, raw: String) -> Value {
    match parsed {
        Value::Object(mut map) => {
            if !map.contains_key("status_code") && !map.contains_key("statusCode") {
                map.insert("status_code".to_string(), json!(status));
            }
            Value::Object(map)
        }
        _ if raw.trim().is_empty() => json!({ "status_code": status }),
        _ => json!({ "status_code": status, "message": raw }),
    }
}
