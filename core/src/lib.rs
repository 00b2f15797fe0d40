pub mod error;
pub mod safety;

pub use error::{ErrorKind, ErrorRecord, SafetyAdvisory, Severity, classify};
pub use safety::{HealthConditionProfile, PromptValidation, validate_prompt};
