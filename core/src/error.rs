use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized failure for anything that talks to the backend.
///
/// Every call site consumes this record instead of the raw response body, so
/// the two backend error shapes never leak past [`classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Exactly one member of the closed taxonomy.
    pub kind: ErrorKind,
    /// Message to show the user. Canned for modal kinds, contextual otherwise.
    pub message: String,
    /// Only `Auth` and `Server` set this. Callers must pass it through untouched.
    #[serde(default)]
    pub should_show_modal: bool,
    /// Present for `Forbidden` and `SafetyViolation`; rendered verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_advisory: Option<SafetyAdvisory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    Forbidden,
    NotFound,
    RateLimited,
    Server,
    Unavailable,
    SafetyViolation,
    NetworkError,
    GenericHttp,
    Generic,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Auth => codes::AUTH,
            ErrorKind::Forbidden => codes::FORBIDDEN,
            ErrorKind::NotFound => codes::NOT_FOUND,
            ErrorKind::RateLimited => codes::RATE_LIMITED,
            ErrorKind::Server => codes::SERVER,
            ErrorKind::Unavailable => codes::UNAVAILABLE,
            ErrorKind::SafetyViolation => codes::SAFETY_VIOLATION,
            ErrorKind::NetworkError => codes::NETWORK_ERROR,
            ErrorKind::GenericHttp => codes::GENERIC_HTTP,
            ErrorKind::Generic => codes::GENERIC,
        }
    }

    /// Kinds that carry a fixed, non-technical modal message.
    pub fn shows_modal(self) -> bool {
        matches!(self, ErrorKind::Auth | ErrorKind::Server)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable codes for the error taxonomy
pub mod codes {
    pub const AUTH: &str = "auth";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not_found";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const SERVER: &str = "server";
    pub const UNAVAILABLE: &str = "unavailable";
    pub const SAFETY_VIOLATION: &str = "safety_violation";
    pub const NETWORK_ERROR: &str = "network_error";
    pub const GENERIC_HTTP: &str = "generic_http";
    pub const GENERIC: &str = "generic";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

impl Severity {
    fn parse(value: Option<&str>, default: Severity) -> Severity {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("critical") | Some("high") => Severity::Critical,
            Some("warning") | Some("medium") | Some("low") => Severity::Warning,
            _ => default,
        }
    }
}

/// Structured guidance attached to a blocked or flagged request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyAdvisory {
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safe_alternatives: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_action: Option<String>,
}

pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";
pub const SERVER_ERROR_MESSAGE: &str =
    "Something went wrong on our side. Please try again in a moment.";
pub const FALLBACK_MESSAGE: &str = "An unexpected error occurred.";

pub const MEDICAL_SAFETY_VIOLATION: &str = "medical_safety_violation";

/// Lower-case substrings that identify a transport-level failure.
const NETWORK_SIGNATURES: &[&str] = &[
    "network request failed",
    "failed to fetch",
    "fetch failed",
    "networkerror",
    "network error",
    "error sending request",
    "connection refused",
    "connection reset",
    "dns error",
    "timed out",
];

/// Map any backend response and/or transport failure onto an [`ErrorRecord`].
///
/// Resolution order, first match wins: HTTP status code, medical safety
/// rejection, network failure signature, generic fallback. Never panics.
pub fn classify(response: &Value, failure: Option<&dyn fmt::Display>) -> ErrorRecord {
    let failure_message = failure.map(|f| f.to_string());

    if let Some(status) = status_code(response) {
        return classify_status(status, response);
    }

    if let Some(record) = classify_safety_rejection(response) {
        return record;
    }

    let response_message = message_text(response.get("message"));
    let network_failure = [failure_message.as_deref(), response_message.as_deref()]
        .into_iter()
        .flatten()
        .any(is_network_failure);
    if network_failure {
        return ErrorRecord {
            kind: ErrorKind::NetworkError,
            message: response_message
                .or(failure_message)
                .unwrap_or_else(|| FALLBACK_MESSAGE.to_string()),
            should_show_modal: false,
            safety_advisory: None,
        };
    }

    let message = response_message
        .or(failure_message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| dump(response));
    ErrorRecord {
        kind: ErrorKind::Generic,
        message,
        should_show_modal: false,
        safety_advisory: None,
    }
}

/// True when `message` carries one of the known transport failure signatures.
pub fn is_network_failure(message: &str) -> bool {
    let lowered = message.to_lowercase();
    NETWORK_SIGNATURES.iter().any(|sig| lowered.contains(sig))
}

fn status_code(response: &Value) -> Option<i64> {
    let raw = response
        .get("status_code")
        .or_else(|| response.get("statusCode"))?;
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn classify_status(status: i64, response: &Value) -> ErrorRecord {
    let kind = match status {
        401 => ErrorKind::Auth,
        403 => ErrorKind::Forbidden,
        404 => ErrorKind::NotFound,
        429 => ErrorKind::RateLimited,
        500 => ErrorKind::Server,
        502..=504 => ErrorKind::Unavailable,
        _ => ErrorKind::GenericHttp,
    };

    let raw_message = response.get("message");
    let message = match kind {
        ErrorKind::Auth => SESSION_EXPIRED_MESSAGE.to_string(),
        ErrorKind::Server => SERVER_ERROR_MESSAGE.to_string(),
        _ => message_text(raw_message).unwrap_or_else(|| default_status_message(kind, status)),
    };

    let safety_advisory = (kind == ErrorKind::Forbidden).then(|| forbidden_advisory(response));

    ErrorRecord {
        kind,
        message,
        should_show_modal: kind.shows_modal(),
        safety_advisory,
    }
}

/// 403 bodies may nest the advisory inside `message` or spread it over the root.
fn forbidden_advisory(response: &Value) -> SafetyAdvisory {
    let nested = response.get("message").filter(|m| m.is_object());
    let field = |name: &str| advisory_field(response, nested, name);

    SafetyAdvisory {
        severity: Severity::parse(
            field("safety_level").and_then(Value::as_str),
            Severity::Critical,
        ),
        suggestion: field("suggestion").and_then(non_empty_str),
        safe_alternatives: field("safe_alternatives")
            .map(string_list)
            .unwrap_or_default(),
        required_action: field("required_action").and_then(non_empty_str),
    }
}

fn advisory_field<'a>(
    response: &'a Value,
    nested: Option<&'a Value>,
    name: &str,
) -> Option<&'a Value> {
    nested
        .and_then(|m| m.get(name))
        .or_else(|| response.get(name))
}

fn classify_safety_rejection(response: &Value) -> Option<ErrorRecord> {
    if response.get("rejection_reason").and_then(Value::as_str) != Some(MEDICAL_SAFETY_VIOLATION) {
        return None;
    }
    let first_flag = response
        .get("validation_flags")
        .and_then(Value::as_array)
        .and_then(|flags| flags.first())?;

    let message = first_flag
        .get("message")
        .and_then(non_empty_str)
        .or_else(|| message_text(response.get("message")))
        .unwrap_or_else(|| "This request was blocked for medical safety reasons.".to_string());

    Some(ErrorRecord {
        kind: ErrorKind::SafetyViolation,
        message,
        should_show_modal: false,
        safety_advisory: Some(SafetyAdvisory {
            severity: Severity::parse(
                first_flag.get("severity").and_then(Value::as_str),
                Severity::Warning,
            ),
            suggestion: first_flag.get("suggestion").and_then(non_empty_str),
            safe_alternatives: response
                .get("safe_alternatives")
                .map(string_list)
                .unwrap_or_default(),
            required_action: None,
        }),
    })
}

/// `message` is either a string or an object that itself carries `message`.
fn message_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(map) => map.get("message").and_then(non_empty_str),
        _ => None,
    }
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(non_empty_str).collect())
        .unwrap_or_default()
}

fn default_status_message(kind: ErrorKind, status: i64) -> String {
    match kind {
        ErrorKind::Forbidden => "This request is not allowed.".to_string(),
        ErrorKind::NotFound => "The requested resource was not found.".to_string(),
        ErrorKind::RateLimited => "Too many requests. Please slow down and try again.".to_string(),
        ErrorKind::Unavailable => {
            "The service is temporarily unavailable. Please try again later.".to_string()
        }
        _ => format!("Request failed with status {status}."),
    }
}

fn dump(response: &Value) -> String {
    match response {
        Value::Null => FALLBACK_MESSAGE.to_string(),
        Value::Object(map) if map.is_empty() => FALLBACK_MESSAGE.to_string(),
        Value::String(s) if s.trim().is_empty() => FALLBACK_MESSAGE.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
