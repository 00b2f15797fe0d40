use clap::Args;
use mealsense_core::{HealthConditionProfile, validate_prompt};
use mealsense_session::{SessionConfig, TokenKind, TokenStore};

use crate::util::{
    client, exit_error, fetch_exit_code, fetch_token, print_json, read_json_from_file,
    record_exit_code,
};

#[derive(Args)]
pub struct ProfileArgs {
    /// Read the health profile from a JSON file (use '-' for stdin)
    #[arg(long, conflicts_with_all = ["hypertension", "diabetes", "immune_disorder", "cancer", "allergy"])]
    pub profile: Option<String>,

    #[arg(long)]
    pub hypertension: bool,

    #[arg(long)]
    pub diabetes: bool,

    #[arg(long)]
    pub immune_disorder: bool,

    #[arg(long)]
    pub cancer: bool,

    /// Allergen (repeatable)
    #[arg(long)]
    pub allergy: Vec<String>,
}

impl ProfileArgs {
    fn resolve(&self) -> HealthConditionProfile {
        if let Some(path) = &self.profile {
            let value = read_json_from_file(path).unwrap_or_else(|e| exit_error(&e, None));
            return serde_json::from_value(value).unwrap_or_else(|e| {
                exit_error(
                    &format!("Invalid health profile: {e}"),
                    Some("Expected {\"hypertension\": bool, \"diabetes\": bool, \"allergies\": [..]}"),
                )
            });
        }
        HealthConditionProfile {
            hypertension: self.hypertension,
            diabetes: self.diabetes,
            immune_disorder: self.immune_disorder,
            cancer: self.cancer,
            allergies: self.allergy.clone(),
        }
    }
}

/// Screen a prompt locally. Exit code 0 when clean, 2 when flagged.
pub fn check(prompt: &str, profile: &ProfileArgs) -> i32 {
    let validation = validate_prompt(prompt, &profile.resolve());
    let code = print_json(&validation);
    if validation.is_valid { code } else { 2 }
}

/// Screen a prompt, then send it to the backend with a fresh AI token.
pub async fn submit(config: &SessionConfig, path: &str, prompt: &str, profile: &ProfileArgs) -> i32 {
    let profile = profile.resolve();
    let tokens: TokenStore = match fetch_token(config, TokenKind::Ai).await {
        Ok(tokens) => tokens,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({ "error": "token_fetch_failed", "message": e.to_string() })
            );
            return fetch_exit_code(&e);
        }
    };

    let api = mealsense_session::api::ApiClient::new(client(), config.api_url.clone(), tokens);
    match api.submit_prompt(path, prompt, &profile).await {
        Ok(response) => print_json(&response),
        Err(record) => {
            print_json(&record);
            record_exit_code(&record)
        }
    }
}
