//! # Kornia VQA
//!
//! Chat with an image through a visual question answering model.
//!
//! The crate is split in two layers:
//!
//! - [`InferenceEngine`] owns a [`VqaModel`] on a dedicated thread and answers
//!   one question about one image at a time.
//! - [`ConversationSession`] holds the current image and the transcript, and
//!   dispatches every question to the engine.
//!
//! The model itself is plugged in through the [`VqaModel`] and [`ModelLoader`]
//! traits.

/// Engine configuration.
pub mod config;

/// Compute device selection.
pub mod device;

/// The inference engine running the model.
pub mod engine;

/// Error types.
pub mod error;

/// Traits implemented by the model backends.
pub mod model;

/// Cleanup of decoded answers.
pub mod postprocess;

/// Conversation state and transcript.
pub mod session;

/// Decoding of uploaded images.
pub mod upload;

#[cfg(test)]
mod mock;

pub use config::{DEFAULT_MAX_ANSWER_TOKENS, DEFAULT_MODEL_IDENTIFIER, DevicePreference, EngineConfig};
pub use device::ComputeDevice;
pub use engine::{Answer, EngineState, InferenceEngine};
pub use error::{ImageDecodeError, InferenceError, ModelLoadError, SessionError};
pub use model::{ModelLoader, VqaModel, VqaRequest};
pub use session::{
    ConversationSession, Exchange, FailurePolicy, Role, SAMPLE_QUESTIONS, SessionState, Transcript,
    Turn,
};
pub use upload::{RgbImage, UploadFormat, decode_image, read_image_file};
