use serde::{Deserialize, Serialize};

/// Medical flags and allergies for the signed-in user. Owned by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConditionProfile {
    pub hypertension: bool,
    pub diabetes: bool,
    pub immune_disorder: bool,
    pub cancer: bool,
    pub allergies: Vec<String>,
}

/// Outcome of the client-side pre-flight screen.
///
/// This is advisory only. The backend safety block remains the enforcement
/// point and runs regardless of what this says.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptValidation {
    pub is_valid: bool,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

const HIGH_SODIUM_TERMS: &[&str] = &[
    "salt",
    "sodium",
    "soy sauce",
    "bacon",
    "sausage",
    "salami",
    "pepperoni",
    "pickled",
    "cured",
    "fries",
    "chips",
    "instant noodle",
    "ramen",
    "processed meat",
    "fast food",
];

const HIGH_SUGAR_TERMS: &[&str] = &[
    "sugar",
    "sweet",
    "candy",
    "dessert",
    "cake",
    "cookie",
    "pastry",
    "donut",
    "doughnut",
    "ice cream",
    "soda",
    "syrup",
    "honey",
    "milkshake",
    "chocolate",
];

const RAW_FOOD_TERMS: &[&str] = &[
    "raw",
    "undercooked",
    "rare steak",
    "medium rare",
    "sushi",
    "sashimi",
    "tartare",
    "carpaccio",
    "ceviche",
    "oyster",
    "runny egg",
    "soft-boiled",
    "unpasteurized",
];

/// Screen free-text input against the user's health profile.
///
/// Each enabled category contributes at most one warning; `is_valid` holds iff
/// no category matched.
pub fn validate_prompt(prompt: &str, profile: &HealthConditionProfile) -> PromptValidation {
    let text = prompt.to_lowercase();
    let mut result = PromptValidation::default();

    if profile.hypertension {
        let hits = matches(&text, HIGH_SODIUM_TERMS);
        if !hits.is_empty() {
            result.warnings.push(format!(
                "High-sodium ingredients ({}) may raise blood pressure.",
                hits.join(", ")
            ));
            result
                .suggestions
                .push("Ask for low-sodium dishes seasoned with herbs, citrus or spices.".into());
            result
                .suggestions
                .push("Try baked or roasted sides instead of fried or cured foods.".into());
        }
    }

    if profile.diabetes {
        let hits = matches(&text, HIGH_SUGAR_TERMS);
        if !hits.is_empty() {
            result.warnings.push(format!(
                "High-sugar ingredients ({}) may spike blood glucose.",
                hits.join(", ")
            ));
            result
                .suggestions
                .push("Ask for low-glycemic meals or fruit-based desserts without added sugar.".into());
        }
    }

    if profile.immune_disorder || profile.cancer {
        let hits = matches(&text, RAW_FOOD_TERMS);
        if !hits.is_empty() {
            result.warnings.push(format!(
                "Raw or undercooked foods ({}) carry an infection risk for a weakened immune system.",
                hits.join(", ")
            ));
            result
                .suggestions
                .push("Ask for fully cooked versions, e.g. seared fish or hard-boiled eggs.".into());
        }
    }

    let allergens: Vec<String> = profile
        .allergies
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect();
    let hits: Vec<&str> = allergens
        .iter()
        .map(String::as_str)
        .filter(|allergen| text.contains(allergen))
        .collect();
    if !hits.is_empty() {
        result.warnings.push(format!(
            "Your request mentions ingredients you are allergic to: {}.",
            hits.join(", ")
        ));
        for allergen in &hits {
            result
                .suggestions
                .push(format!("Ask for a {allergen}-free alternative."));
        }
    }

    result.is_valid = result.warnings.is_empty();
    result
}

fn matches<'a>(text: &str, terms: &[&'a str]) -> Vec<&'a str> {
    terms
        .iter()
        .copied()
        .filter(|term| text.contains(term))
        .collect()
}
