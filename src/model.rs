use crate::{config::EngineConfig, device::ComputeDevice, error::ModelLoadError, upload::RgbImage};

/// A single question about an image.
pub struct VqaRequest<'a> {
    /// The rgb8 image the question refers to.
    pub image: &'a RgbImage,
    /// The natural-language question.
    pub question: &'a str,
    /// Upper bound on the number of generated tokens.
    pub max_tokens: usize,
}

/// Trait for visual question answering models driven by the [`crate::InferenceEngine`].
///
/// Implementations encode the image and question jointly, run one generation
/// pass capped at `max_tokens` and decode the generated tokens to text.
pub trait VqaModel {
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Answers the question about the image.
    fn answer(&mut self, request: VqaRequest<'_>) -> Result<String, Self::Error>;
}

/// Trait for resolving a model identifier into a loaded [`VqaModel`].
pub trait ModelLoader {
    /// The model type produced by the loader.
    type Model: VqaModel + Send + 'static;

    /// Whether the host offers an accelerator this loader can use.
    fn accelerator_available(&self) -> bool;

    /// Loads the processor and weights named by the configuration on the given device.
    fn load(
        &self,
        config: &EngineConfig,
        device: ComputeDevice,
    ) -> Result<Self::Model, ModelLoadError>;
}
