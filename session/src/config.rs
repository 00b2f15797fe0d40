use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::location::Coordinate;

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_REFRESH_SECS: u64 = 3000;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOADING_FLOOR_MS: u64 = 1000;

/// One token endpoint plus the static credential used to call it.
#[derive(Debug, Clone)]
pub struct TokenEndpoint {
    pub url: Url,
    /// Static bearer for the endpoint. `None` disables refresh for this kind.
    pub secret: Option<String>,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub api_url: Url,
    pub user_id: String,
    pub ai_token: TokenEndpoint,
    pub base_token: TokenEndpoint,
    pub fetch_timeout: Duration,
    pub loading_floor: Duration,
    pub nearby_url: Url,
    /// Fixed position for hosts without a location service. `None` reads as
    /// "permission denied".
    pub location: Option<Coordinate>,
    pub credentials_path: PathBuf,
}

impl SessionConfig {
    /// Read configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` beforehand to pick up a local `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = parse_url(
            "MEALSENSE_API_URL",
            &var("MEALSENSE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        )?;
        let api_base = api_url.as_str().trim_end_matches('/').to_string();

        let ai_token = TokenEndpoint {
            url: parse_url(
                "MEALSENSE_AI_TOKEN_URL",
                &var("MEALSENSE_AI_TOKEN_URL").unwrap_or_else(|| format!("{api_base}/v1/ai/token")),
            )?,
            secret: var("MEALSENSE_AI_TOKEN_SECRET"),
            interval: Duration::from_secs(parse_u64(
                "MEALSENSE_AI_REFRESH_SECS",
                var("MEALSENSE_AI_REFRESH_SECS"),
                DEFAULT_REFRESH_SECS,
            )?),
        };

        let base_token = TokenEndpoint {
            url: parse_url(
                "MEALSENSE_BASE_TOKEN_URL",
                &var("MEALSENSE_BASE_TOKEN_URL")
                    .unwrap_or_else(|| format!("{api_base}/v1/auth/token")),
            )?,
            secret: var("MEALSENSE_BASE_TOKEN_SECRET"),
            interval: Duration::from_secs(parse_u64(
                "MEALSENSE_BASE_REFRESH_SECS",
                var("MEALSENSE_BASE_REFRESH_SECS"),
                DEFAULT_REFRESH_SECS,
            )?),
        };

        let nearby_url = parse_url(
            "MEALSENSE_NEARBY_URL",
            &var("MEALSENSE_NEARBY_URL").unwrap_or_else(|| format!("{api_base}/v1/nearby")),
        )?;

        let location = match (var("MEALSENSE_LATITUDE"), var("MEALSENSE_LONGITUDE")) {
            (Some(lat), Some(lng)) => Some(Coordinate {
                latitude: parse_coordinate("MEALSENSE_LATITUDE", &lat)?,
                longitude: parse_coordinate("MEALSENSE_LONGITUDE", &lng)?,
            }),
            _ => None,
        };

        Ok(Self {
            user_id: var("MEALSENSE_USER_ID").unwrap_or_else(|| "anonymous".to_string()),
            ai_token,
            base_token,
            fetch_timeout: Duration::from_secs(parse_u64(
                "MEALSENSE_FETCH_TIMEOUT_SECS",
                var("MEALSENSE_FETCH_TIMEOUT_SECS"),
                DEFAULT_FETCH_TIMEOUT_SECS,
            )?),
            loading_floor: Duration::from_millis(parse_u64(
                "MEALSENSE_LOADING_FLOOR_MS",
                var("MEALSENSE_LOADING_FLOOR_MS"),
                DEFAULT_LOADING_FLOOR_MS,
            )?),
            nearby_url,
            location,
            credentials_path: var("MEALSENSE_CREDENTIALS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_credentials_path),
            api_url,
        })
    }
}

pub fn default_credentials_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mealsense");
    config_dir.join("credentials.json")
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn parse_u64(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
    }
}

fn parse_coordinate(name: &'static str, value: &str) -> Result<f64, ConfigError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConfigError::InvalidCoordinate {
            name,
            value: value.to_string(),
        })
}
