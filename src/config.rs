use std::ops::RangeInclusive;

use crate::error::ModelLoadError;

/// Model loaded when no identifier is given.
pub const DEFAULT_MODEL_IDENTIFIER: &str = "google/paligemma-3b-mix-224";

/// Default bound on the number of generated answer tokens.
pub const DEFAULT_MAX_ANSWER_TOKENS: usize = 50;

/// Range of answer lengths offered to users by the front-ends.
pub const ANSWER_TOKENS_RANGE: RangeInclusive<usize> = 10..=100;

/// Clamps a user supplied answer length into [`ANSWER_TOKENS_RANGE`].
pub fn clamp_answer_tokens(max_tokens: usize) -> usize {
    max_tokens.clamp(*ANSWER_TOKENS_RANGE.start(), *ANSWER_TOKENS_RANGE.end())
}

/// Where the caller would like inference to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DevicePreference {
    /// Use an accelerator when one is present, fall back to the cpu otherwise.
    #[default]
    Accelerator,
    /// Always run on the cpu.
    Cpu,
}

impl DevicePreference {
    /// Builds the preference from an "use accelerator" toggle.
    pub fn from_toggle(use_accelerator: bool) -> Self {
        if use_accelerator {
            DevicePreference::Accelerator
        } else {
            DevicePreference::Cpu
        }
    }

    /// Returns the preference as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DevicePreference::Accelerator => "accelerator",
            DevicePreference::Cpu => "cpu",
        }
    }
}

/// Configuration of an [`crate::InferenceEngine`].
///
/// The value is fixed when the engine is built. Changing any field means
/// building a new engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Identifier resolving to the processor and model weights.
    pub model_identifier: String,
    /// Requested compute device.
    pub device: DevicePreference,
    /// Upper bound on the generated answer length, in tokens.
    pub max_answer_tokens: usize,
}

impl EngineConfig {
    /// Creates a configuration for the given model with default settings.
    pub fn new(model_identifier: impl Into<String>) -> Self {
        Self {
            model_identifier: model_identifier.into(),
            device: DevicePreference::default(),
            max_answer_tokens: DEFAULT_MAX_ANSWER_TOKENS,
        }
    }

    /// Sets the requested compute device.
    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }

    /// Sets the upper bound on the generated answer length.
    pub fn with_max_answer_tokens(mut self, max_answer_tokens: usize) -> Self {
        self.max_answer_tokens = max_answer_tokens;
        self
    }

    /// Checks that the configuration can be used to build an engine.
    pub fn validate(&self) -> Result<(), ModelLoadError> {
        if self.model_identifier.trim().is_empty() {
            return Err(ModelLoadError::InvalidConfig(
                "model identifier is empty".to_string(),
            ));
        }
        if self.max_answer_tokens == 0 {
            return Err(ModelLoadError::InvalidConfig(
                "max answer tokens must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_IDENTIFIER)
    }
}
