use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    engine::InferenceEngine,
    error::{InferenceError, SessionError},
    upload::{RgbImage, decode_image},
};

/// Preset questions offered once an image is loaded.
pub const SAMPLE_QUESTIONS: [&str; 8] = [
    "What is the main object in this image?",
    "What colors do you see?",
    "How many objects are there?",
    "What is happening in this scene?",
    "Where was this photo taken?",
    "What time of day is it?",
    "Describe this image in detail",
    "What's the weather like in this image?",
];

/// Author of a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking questions.
    User,
    /// The model answering them.
    Assistant,
}

impl Role {
    /// Returns the role as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who wrote the turn.
    pub role: Role,
    /// The question, the answer or the inline error.
    pub content: String,
}

impl Turn {
    /// Creates a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered, append-only list of turns.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript(Vec<Turn>);

impl Transcript {
    /// Returns the turns in conversation order.
    pub fn turns(&self) -> &[Turn] {
        &self.0
    }

    /// Returns the number of turns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the transcript has no turns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the turns in conversation order.
    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.0.iter()
    }

    /// Returns the most recent turn.
    pub fn last(&self) -> Option<&Turn> {
        self.0.last()
    }

    fn push_exchange(&mut self, exchange: &Exchange) {
        self.0.push(exchange.question.clone());
        self.0.push(exchange.answer.clone());
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The user turn and the assistant turn appended by one question.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exchange {
    /// The user turn.
    pub question: Turn,
    /// The assistant turn that follows it.
    pub answer: Turn,
}

/// Lifecycle of a conversation session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No engine has been attached.
    Uninitialized,
    /// An engine is attached but no image is loaded.
    EngineReady,
    /// An image is loaded and the transcript is empty.
    ImageReady,
    /// An image is loaded and the transcript has turns.
    Chatting,
}

impl SessionState {
    /// Whether questions can be asked in this state.
    pub fn accepts_questions(&self) -> bool {
        matches!(self, SessionState::ImageReady | SessionState::Chatting)
    }

    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::EngineReady => "engine_ready",
            SessionState::ImageReady => "image_ready",
            SessionState::Chatting => "chatting",
        }
    }
}

/// What [`ConversationSession::ask`] does when the engine fails to answer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record `"Error: <cause>"` as the assistant turn.
    #[default]
    Inline,
    /// Return the error and leave the transcript untouched.
    Propagate,
}

/// A conversation about one image at a time.
///
/// The session owns the current image and the transcript, and shares the
/// inference engine with any other session built on the same `Arc`.
#[derive(Default)]
pub struct ConversationSession {
    engine: Option<Arc<InferenceEngine>>,
    image: Option<Arc<RgbImage>>,
    transcript: Transcript,
    failure_policy: FailurePolicy,
}

impl ConversationSession {
    /// Creates an uninitialized session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session with the engine already attached.
    pub fn with_engine(engine: Arc<InferenceEngine>) -> Self {
        let mut session = Self::new();
        session.init(engine);
        session
    }

    /// Attaches the inference engine, replacing any previous one.
    pub fn init(&mut self, engine: Arc<InferenceEngine>) {
        log::info!(
            "Session uses model {} on the {} device",
            engine.config().model_identifier,
            engine.device()
        );
        self.engine = Some(engine);
    }

    /// Sets the failure policy of a new session.
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Returns the current failure policy.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Changes the failure policy for the next questions.
    pub fn set_failure_policy(&mut self, failure_policy: FailurePolicy) {
        self.failure_policy = failure_policy;
    }

    /// Returns the lifecycle state derived from the engine, image and transcript.
    pub fn state(&self) -> SessionState {
        match (&self.engine, &self.image) {
            (None, _) => SessionState::Uninitialized,
            (Some(_), None) => SessionState::EngineReady,
            (Some(_), Some(_)) if self.transcript.is_empty() => SessionState::ImageReady,
            (Some(_), Some(_)) => SessionState::Chatting,
        }
    }

    /// Returns the attached engine.
    pub fn engine(&self) -> Option<&Arc<InferenceEngine>> {
        self.engine.as_ref()
    }

    /// Returns the current image.
    pub fn image(&self) -> Option<&RgbImage> {
        self.image.as_deref()
    }

    /// Returns the conversation so far.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Decodes uploaded bytes and makes them the current image.
    ///
    /// On failure the previous image is kept. The transcript is never touched.
    pub fn load_image(&mut self, bytes: &[u8]) -> Result<&RgbImage, SessionError> {
        let image = decode_image(bytes)?;
        Ok(self.set_image(image))
    }

    /// Makes an already decoded image the current image.
    pub fn set_image(&mut self, image: RgbImage) -> &RgbImage {
        log::info!("Loaded image of {}", image.size());
        self.image.insert(Arc::new(image))
    }

    /// Asks a question about the current image.
    ///
    /// Validation happens before the engine is invoked: the session must have
    /// an engine and an image, and the question must not be blank. On success
    /// the user turn and the assistant turn are appended back to back.
    pub fn ask(&mut self, question: &str) -> Result<Exchange, SessionError> {
        let engine = self.engine.as_ref().ok_or(SessionError::NoEngine)?;
        let image = self.image.as_ref().ok_or(SessionError::NoImage)?;
        if question.trim().is_empty() {
            return Err(SessionError::EmptyQuestion);
        }

        let max_tokens = engine.config().max_answer_tokens;
        let content = match engine.answer(image.clone(), question, max_tokens) {
            Ok(answer) => answer.text,
            Err(InferenceError::Busy) => return Err(SessionError::Busy),
            Err(e) => match self.failure_policy {
                FailurePolicy::Inline => {
                    log::warn!("Inference failed: {e}");
                    format!("Error: {e}")
                }
                FailurePolicy::Propagate => return Err(e.into()),
            },
        };

        let exchange = Exchange {
            question: Turn::user(question),
            answer: Turn::assistant(content),
        };
        self.transcript.push_exchange(&exchange);
        Ok(exchange)
    }

    /// Asks one of the [`SAMPLE_QUESTIONS`].
    pub fn ask_sample(&mut self, index: usize) -> Result<Exchange, SessionError> {
        let question = SAMPLE_QUESTIONS
            .get(index)
            .copied()
            .ok_or(SessionError::UnknownSample(index))?;
        self.ask(question)
    }

    /// Empties the transcript. The engine and the image are kept.
    pub fn clear(&mut self) {
        self.transcript.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::EngineConfig,
        device::ComputeDevice,
        engine::EngineState,
        mock::{ColorModel, FailingModel, GateModel, solid_image},
        upload::tests::encode_solid,
    };
    use std::sync::{
        Mutex, TryLockError,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    };

    fn color_session() -> Result<(ConversationSession, Arc<AtomicUsize>), Box<dyn std::error::Error>>
    {
        let (model, calls) = ColorModel::new();
        let engine =
            InferenceEngine::from_model(model, EngineConfig::default(), ComputeDevice::Cpu)?;
        Ok((ConversationSession::with_engine(Arc::new(engine)), calls))
    }

    #[test]
    fn lifecycle_states() -> Result<(), Box<dyn std::error::Error>> {
        let mut session = ConversationSession::new();
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(matches!(session.ask("What?"), Err(SessionError::NoEngine)));

        let (model, _) = ColorModel::new();
        let engine =
            InferenceEngine::from_model(model, EngineConfig::default(), ComputeDevice::Cpu)?;
        session.init(Arc::new(engine));
        assert_eq!(session.state(), SessionState::EngineReady);
        assert!(!session.state().accepts_questions());

        session.set_image(solid_image(2, 2, [255, 0, 0]));
        assert_eq!(session.state(), SessionState::ImageReady);

        session.ask("What color is it?")?;
        assert_eq!(session.state(), SessionState::Chatting);

        session.clear();
        assert_eq!(session.state(), SessionState::ImageReady);
        Ok(())
    }

    #[test]
    fn ask_without_image_never_invokes_engine() -> Result<(), Box<dyn std::error::Error>> {
        let (mut session, calls) = color_session()?;
        assert!(matches!(session.ask("What is it?"), Err(SessionError::NoImage)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(session.transcript().is_empty());
        Ok(())
    }

    #[test]
    fn blank_question_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let (mut session, calls) = color_session()?;
        session.set_image(solid_image(2, 2, [0, 255, 0]));
        assert!(matches!(session.ask(" \n"), Err(SessionError::EmptyQuestion)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(session.transcript().is_empty());
        Ok(())
    }

    #[test]
    fn ask_appends_two_turns() -> Result<(), Box<dyn std::error::Error>> {
        let (mut session, _) = color_session()?;
        session.set_image(solid_image(2, 2, [0, 0, 255]));

        session.ask("What colors do you see?")?;
        let before = session.transcript().turns().to_vec();

        let exchange = session.ask("And now?")?;
        assert_eq!(exchange.question, Turn::user("And now?"));
        assert_eq!(exchange.answer, Turn::assistant("blue"));

        let turns = session.transcript().turns();
        assert_eq!(turns.len(), before.len() + 2);
        assert_eq!(&turns[..before.len()], &before[..]);
        assert_eq!(turns[before.len()], exchange.question);
        assert_eq!(turns[before.len() + 1], exchange.answer);
        Ok(())
    }

    #[test]
    fn inline_failure_is_recorded() -> Result<(), Box<dyn std::error::Error>> {
        let engine = InferenceEngine::from_model(
            FailingModel("device lost".to_string()),
            EngineConfig::default(),
            ComputeDevice::Cpu,
        )?;
        let mut session = ConversationSession::with_engine(Arc::new(engine));
        session.set_image(solid_image(2, 2, [9, 9, 9]));

        let exchange = session.ask("What is it?")?;
        assert_eq!(exchange.answer, Turn::assistant("Error: device lost"));
        assert_eq!(session.transcript().len(), 2);
        Ok(())
    }

    #[test]
    fn propagated_failure_leaves_transcript() -> Result<(), Box<dyn std::error::Error>> {
        let engine = InferenceEngine::from_model(
            FailingModel("device lost".to_string()),
            EngineConfig::default(),
            ComputeDevice::Cpu,
        )?;
        let mut session = ConversationSession::with_engine(Arc::new(engine))
            .with_failure_policy(FailurePolicy::Propagate);
        session.set_image(solid_image(2, 2, [9, 9, 9]));

        assert!(matches!(
            session.ask("What is it?"),
            Err(SessionError::Inference(InferenceError::Model(_)))
        ));
        assert!(session.transcript().is_empty());
        Ok(())
    }

    #[test]
    fn bad_upload_keeps_previous_image() -> Result<(), Box<dyn std::error::Error>> {
        let (mut session, _) = color_session()?;
        session.load_image(&encode_solid(3, 2, [255, 0, 0], image::ImageFormat::Png))?;
        session.ask("What color is the object?")?;

        assert!(matches!(
            session.load_image(b"not an image"),
            Err(SessionError::ImageDecode(_))
        ));
        let image = session.image().ok_or("image was dropped")?;
        assert_eq!(image.width(), 3);
        assert_eq!(image.height(), 2);
        assert_eq!(session.transcript().len(), 2);
        Ok(())
    }

    #[test]
    fn new_image_keeps_transcript() -> Result<(), Box<dyn std::error::Error>> {
        let (mut session, _) = color_session()?;
        session.set_image(solid_image(2, 2, [255, 0, 0]));
        session.ask("What color?")?;

        session.load_image(&encode_solid(2, 2, [0, 255, 0], image::ImageFormat::Bmp))?;
        assert_eq!(session.transcript().len(), 2);

        let exchange = session.ask("What color?")?;
        assert_eq!(exchange.answer.content, "green");
        Ok(())
    }

    #[test]
    fn engine_readable_while_session_asks() -> Result<(), Box<dyn std::error::Error>> {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let engine = Arc::new(InferenceEngine::from_model(
            GateModel {
                entered: entered_tx,
                release: release_rx,
            },
            EngineConfig::default().with_max_answer_tokens(20),
            ComputeDevice::Cpu,
        )?);
        let mut session = ConversationSession::with_engine(engine.clone());
        session.set_image(solid_image(2, 2, [255, 0, 0]));
        let session = Arc::new(Mutex::new(session));

        let asking = std::thread::spawn({
            let session = session.clone();
            move || {
                let mut session = session.lock().expect("session lock poisoned");
                session.ask("What is it?").map(|exchange| exchange.answer.content)
            }
        });

        entered_rx.recv()?;
        assert!(matches!(session.try_lock(), Err(TryLockError::WouldBlock)));
        assert_eq!(engine.state(), EngineState::Processing);
        assert_eq!(engine.device(), ComputeDevice::Cpu);
        assert_eq!(engine.config().max_answer_tokens, 20);

        release_tx.send(())?;
        assert_eq!(asking.join().expect("asking thread panicked")?, "done");
        assert_eq!(engine.state(), EngineState::Idle);
        Ok(())
    }

    #[test]
    fn sample_questions() -> Result<(), Box<dyn std::error::Error>> {
        let (mut session, _) = color_session()?;
        session.set_image(solid_image(2, 2, [255, 0, 0]));

        let exchange = session.ask_sample(1)?;
        assert_eq!(exchange.question.content, "What colors do you see?");
        assert!(matches!(
            session.ask_sample(SAMPLE_QUESTIONS.len()),
            Err(SessionError::UnknownSample(8))
        ));
        assert_eq!(session.transcript().len(), 2);
        Ok(())
    }

    #[test]
    fn roles_serialize_lowercase() -> Result<(), Box<dyn std::error::Error>> {
        let (mut session, _) = color_session()?;
        session.set_image(solid_image(1, 1, [255, 0, 0]));
        session.ask("What color?")?;

        let json = serde_json::to_value(session.transcript())?;
        assert_eq!(
            json,
            serde_json::json!([
                { "role": "user", "content": "What color?" },
                { "role": "assistant", "content": "red" },
            ])
        );
        Ok(())
    }
}
