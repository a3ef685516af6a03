use kornia_vqa::Turn;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AskResponse {
    pub question: Turn,
    pub answer: Turn,
    pub duration: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusResponse {
    pub state: String,
    pub engine: String,
    pub model: String,
    pub device: String,
    pub max_answer_tokens: usize,
    /// `None` while a question holds the session
    pub turns: Option<usize>,
}
