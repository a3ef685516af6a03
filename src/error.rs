use crate::device::ComputeDevice;

/// Errors raised while building an inference engine.
#[derive(thiserror::Error, Debug)]
pub enum ModelLoadError {
    /// The engine configuration cannot be used.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// The loader does not know the requested model.
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    /// The loader cannot run on the selected device.
    #[error("The model cannot run on the {0} device")]
    DeviceUnavailable(ComputeDevice),

    /// The model artifacts are missing, corrupt or incompatible.
    #[error("Failed to load the model. {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ModelLoadError {
    /// Wraps any backend error raised while loading the model.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        ModelLoadError::Backend(Box::new(err))
    }
}

/// Errors raised while decoding an uploaded image.
#[derive(thiserror::Error, Debug)]
pub enum ImageDecodeError {
    /// No bytes were uploaded.
    #[error("The uploaded image is empty")]
    Empty,

    /// The bytes do not start with any known image signature.
    #[error("Unrecognized image format")]
    UnrecognizedFormat,

    /// The image format is known but not accepted.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The bytes could not be decoded.
    #[error("Failed to decode the image. {0}")]
    Malformed(#[from] image::ImageError),

    /// The decoded pixels do not form a valid image.
    #[error("Failed to create image. {0}")]
    InvalidImage(#[from] kornia_image::ImageError),

    /// The image file could not be read.
    #[error("Failed to read the image file. {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a single inference call.
#[derive(thiserror::Error, Debug)]
pub enum InferenceError {
    /// The question is blank.
    #[error("The question is empty")]
    EmptyQuestion,

    /// The answer length bound is zero.
    #[error("The answer length must be positive")]
    InvalidMaxTokens,

    /// Another call is being processed by the engine.
    #[error("Engine is still processing")]
    Busy,

    /// The model failed to encode, generate or decode.
    #[error("{0}")]
    Model(String),

    /// Nothing was left after removing the control tokens.
    #[error("The model produced an empty answer")]
    EmptyAnswer,

    /// The inference thread is gone.
    #[error("Inference worker stopped")]
    WorkerStopped,
}

/// Errors raised by a conversation session.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// No engine has been attached to the session.
    #[error("No inference engine initialized")]
    NoEngine,

    /// No image has been loaded.
    #[error("No image loaded")]
    NoImage,

    /// The question is blank.
    #[error("The question is empty")]
    EmptyQuestion,

    /// The shared engine is answering another question.
    #[error("Engine is still processing")]
    Busy,

    /// The sample question index is out of range.
    #[error("No sample question at index {0}")]
    UnknownSample(usize),

    /// The uploaded image could not be decoded.
    #[error(transparent)]
    ImageDecode(#[from] ImageDecodeError),

    /// The engine failed to answer.
    #[error(transparent)]
    Inference(#[from] InferenceError),
}
