use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::BiometricError;

/// Options shown on the platform biometric sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptOptions {
    pub prompt_message: String,
    pub cancel_label: String,
    /// Whether the platform may offer the device passcode instead.
    pub allow_device_credential: bool,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            prompt_message: "Unlock Mealsense".to_string(),
            cancel_label: "Cancel".to_string(),
            allow_device_credential: false,
        }
    }
}

/// Raw platform biometric API. Implementations may fail in any call.
#[async_trait]
pub trait BiometricPlatform: Send + Sync {
    async fn has_hardware(&self) -> Result<bool, BiometricError>;
    async fn is_enrolled(&self) -> Result<bool, BiometricError>;
    /// `Ok(true)` on a verified match, `Ok(false)` on mismatch or user cancel.
    async fn challenge(&self, options: &PromptOptions) -> Result<bool, BiometricError>;
}

/// Platform for hosts without any biometric capability.
pub struct NoBiometrics;

#[async_trait]
impl BiometricPlatform for NoBiometrics {
    async fn has_hardware(&self) -> Result<bool, BiometricError> {
        Ok(false)
    }

    async fn is_enrolled(&self) -> Result<bool, BiometricError> {
        Ok(false)
    }

    async fn challenge(&self, _options: &PromptOptions) -> Result<bool, BiometricError> {
        Ok(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeResult {
    Success,
    /// Mismatch, lockout or user cancel.
    Failed,
    /// The platform call itself raised.
    Errored,
}

/// What the gate decided for a restore attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometricVerdict {
    Verified,
    /// No hardware or nothing enrolled; the check was skipped, not failed.
    Unavailable,
    Rejected,
    Errored,
}

/// Wraps a [`BiometricPlatform`] so that nothing it raises reaches the caller.
#[derive(Clone)]
pub struct BiometricGate {
    platform: Arc<dyn BiometricPlatform>,
}

impl BiometricGate {
    pub fn new(platform: Arc<dyn BiometricPlatform>) -> Self {
        Self { platform }
    }

    pub async fn has_hardware(&self) -> bool {
        self.platform.has_hardware().await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "biometric hardware probe failed; treating as absent");
            false
        })
    }

    pub async fn is_enrolled(&self) -> bool {
        self.platform.is_enrolled().await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "biometric enrollment probe failed; treating as not enrolled");
            false
        })
    }

    pub async fn challenge(&self, options: &PromptOptions) -> ChallengeResult {
        match self.platform.challenge(options).await {
            Ok(true) => ChallengeResult::Success,
            Ok(false) => ChallengeResult::Failed,
            Err(err) => {
                tracing::warn!(error = %err, "biometric challenge raised");
                ChallengeResult::Errored
            }
        }
    }

    /// Probe capability, then challenge only when hardware and enrollment exist.
    pub async fn verify(&self, options: &PromptOptions) -> BiometricVerdict {
        if !self.has_hardware().await || !self.is_enrolled().await {
            return BiometricVerdict::Unavailable;
        }
        match self.challenge(options).await {
            ChallengeResult::Success => BiometricVerdict::Verified,
            ChallengeResult::Failed => BiometricVerdict::Rejected,
            ChallengeResult::Errored => BiometricVerdict::Errored,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Scripted platform that counts challenges.
    pub struct FakePlatform {
        pub hardware: Result<bool, ()>,
        pub enrolled: bool,
        pub outcome: Result<bool, ()>,
        pub challenges: AtomicUsize,
    }

    impl FakePlatform {
        pub fn new(hardware: bool, enrolled: bool, outcome: Result<bool, ()>) -> Self {
            Self {
                hardware: Ok(hardware),
                enrolled,
                outcome,
                challenges: AtomicUsize::new(0),
            }
        }

        pub fn challenges(&self) -> usize {
            self.challenges.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BiometricPlatform for FakePlatform {
        async fn has_hardware(&self) -> Result<bool, BiometricError> {
            self.hardware
                .map_err(|_| BiometricError::Platform("sensor probe crashed".to_string()))
        }

        async fn is_enrolled(&self) -> Result<bool, BiometricError> {
            Ok(self.enrolled)
        }

        async fn challenge(&self, _options: &PromptOptions) -> Result<bool, BiometricError> {
            self.challenges.fetch_add(1, Ordering::SeqCst);
            self.outcome.map_err(|_| BiometricError::SystemCancel)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakePlatform;
    use super::*;

    fn gate(platform: &Arc<FakePlatform>) -> BiometricGate {
        BiometricGate::new(platform.clone())
    }

    #[tokio::test]
    async fn verified_when_challenge_succeeds() {
        let platform = Arc::new(FakePlatform::new(true, true, Ok(true)));
        assert_eq!(
            gate(&platform).verify(&PromptOptions::default()).await,
            BiometricVerdict::Verified
        );
        assert_eq!(platform.challenges(), 1);
    }

    #[tokio::test]
    async fn unavailable_without_hardware_skips_challenge() {
        let platform = Arc::new(FakePlatform::new(false, true, Ok(true)));
        assert_eq!(
            gate(&platform).verify(&PromptOptions::default()).await,
            BiometricVerdict::Unavailable
        );
        assert_eq!(platform.challenges(), 0);
    }

    #[tokio::test]
    async fn unavailable_when_not_enrolled() {
        let platform = Arc::new(FakePlatform::new(true, false, Ok(true)));
        assert_eq!(
            gate(&platform).verify(&PromptOptions::default()).await,
            BiometricVerdict::Unavailable
        );
        assert_eq!(platform.challenges(), 0);
    }

    #[tokio::test]
    async fn hardware_probe_error_reads_as_absent() {
        let mut platform = FakePlatform::new(true, true, Ok(true));
        platform.hardware = Err(());
        let gate = BiometricGate::new(Arc::new(platform));
        assert!(!gate.has_hardware().await);
    }

    #[tokio::test]
    async fn rejected_and_errored_are_distinct() {
        let rejected = Arc::new(FakePlatform::new(true, true, Ok(false)));
        let errored = Arc::new(FakePlatform::new(true, true, Err(())));
        let options = PromptOptions::default();

        assert_eq!(gate(&rejected).verify(&options).await, BiometricVerdict::Rejected);
        assert_eq!(gate(&errored).challenge(&options).await, ChallengeResult::Errored);
        assert_eq!(gate(&errored).verify(&options).await, BiometricVerdict::Errored);
    }

    #[tokio::test]
    async fn no_biometrics_is_unavailable() {
        let gate = BiometricGate::new(Arc::new(NoBiometrics));
        assert_eq!(
            gate.verify(&PromptOptions::default()).await,
            BiometricVerdict::Unavailable
        );
    }
}
