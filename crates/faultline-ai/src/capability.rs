use crate::client::{LlmBackend, OpenAiCompatibleBackend};
use faultline_config::AiConfig;
use std::fmt;
use tracing::{debug, warn};

/// Whether AI features can be used in this process.
///
/// Probed once at startup. Call sites branch on the flag instead of
/// re-reading configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AiCapability {
    Available,
    Unavailable(UnavailableReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnavailableReason {
    Disabled,
    MissingApiKey,
    /// The backend could not be constructed.
    Setup(String),
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("AI features are disabled (set AI_FEATURES_ENABLED=true)"),
            Self::MissingApiKey => f.write_str("OPENAI_API_KEY is not set"),
            Self::Setup(msg) => write!(f, "AI backend setup failed: {msg}"),
        }
    }
}

impl AiCapability {
    /// Check configuration only. No network call is made.
    pub fn probe(config: &AiConfig) -> Self {
        if !config.enabled {
            return Self::Unavailable(UnavailableReason::Disabled);
        }
        if !config.is_usable() {
            return Self::Unavailable(UnavailableReason::MissingApiKey);
        }
        Self::Available
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    /// Probe and build the backend in one step.
    pub fn backend(config: &AiConfig) -> (Self, Option<Box<dyn LlmBackend>>) {
        match Self::probe(config) {
            Self::Available => match OpenAiCompatibleBackend::from_config(config) {
                Ok(backend) => {
                    debug!(model = backend.model(), "AI features available");
                    (Self::Available, Some(Box::new(backend)))
                }
                Err(e) => {
                    warn!(error = %e, "AI backend setup failed, AI features off");
                    (
                        Self::Unavailable(UnavailableReason::Setup(e.to_string())),
                        None,
                    )
                }
            },
            unavailable => (unavailable, None),
        }
    }
}
