use crate::{
    config::EngineConfig,
    device::ComputeDevice,
    error::{InferenceError, ModelLoadError},
    model::{ModelLoader, VqaModel, VqaRequest},
    postprocess::strip_control_tokens,
    upload::RgbImage,
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

/// Represents the current state of the inference engine.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineState {
    /// The engine is idle and ready to accept a question.
    Idle,
    /// The engine is answering a question.
    Processing,
}

impl EngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Processing => "processing",
        }
    }
}

// request handed over to the inference thread
struct EngineRequest {
    image: Arc<RgbImage>,
    question: String,
    max_tokens: usize,
    reply_tx: mpsc::Sender<Result<String, String>>,
}

/// Answer returned by the engine with its telemetry.
#[derive(Clone, Debug)]
pub struct Answer {
    /// Identifier of the inference call.
    pub id: u64,
    /// The decoded answer with control tokens removed.
    pub text: String,
    /// Timestamp when the inference started.
    pub start_time: Instant,
    /// Total time taken for the inference.
    pub duration: Duration,
}

/// Inference engine that owns a [`VqaModel`] and runs it on a dedicated thread.
///
/// The model is moved to the inference thread at construction. Calls to
/// [`InferenceEngine::answer`] block until the model has answered. At most one
/// call is processed at a time: a call arriving while another one is in flight
/// is rejected with [`InferenceError::Busy`] instead of being queued.
pub struct InferenceEngine {
    config: EngineConfig,
    device: ComputeDevice,
    state: Mutex<EngineState>,
    req_tx: Option<mpsc::Sender<EngineRequest>>,
    inference_handle: Option<JoinHandle<()>>,
    id_counter: AtomicU64,
    invocations: AtomicU64,
}

impl InferenceEngine {
    /// Creates a new inference engine by loading a model.
    ///
    /// # Arguments
    /// * `loader` - Resolves the configured model identifier into a model
    /// * `config` - The engine configuration, fixed for the engine's lifetime
    ///
    /// # Returns
    /// A new `InferenceEngine` bound to the selected device, or the reason the
    /// model could not be loaded
    pub fn new<L: ModelLoader>(loader: &L, config: EngineConfig) -> Result<Self, ModelLoadError> {
        config.validate()?;

        let device = ComputeDevice::select(config.device, loader.accelerator_available());
        log::info!(
            "Loading model {} on the {} device",
            config.model_identifier,
            device
        );

        let model = loader.load(&config, device)?;
        log::info!("Model loaded on the {} device", device);

        Self::from_model(model, config, device)
    }

    /// Creates a new inference engine around an already loaded model.
    pub fn from_model<M: VqaModel + Send + 'static>(
        mut model: M,
        config: EngineConfig,
        device: ComputeDevice,
    ) -> Result<Self, ModelLoadError> {
        config.validate()?;

        let (req_tx, req_rx) = mpsc::channel::<EngineRequest>();

        let inference_handle = std::thread::spawn(move || {
            while let Ok(req) = req_rx.recv() {
                log::debug!("Scheduling a new inference");

                let result = model
                    .answer(VqaRequest {
                        image: &req.image,
                        question: &req.question,
                        max_tokens: req.max_tokens,
                    })
                    .map_err(|e| e.to_string());

                log::debug!("Inference completed");

                let _ = req.reply_tx.send(result);
            }
        });

        Ok(Self {
            config,
            device,
            state: Mutex::new(EngineState::Idle),
            req_tx: Some(req_tx),
            inference_handle: Some(inference_handle),
            id_counter: AtomicU64::new(0),
            invocations: AtomicU64::new(0),
        })
    }

    /// Returns the configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the device selected at construction.
    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    /// Returns the current state of the inference engine.
    pub fn state(&self) -> EngineState {
        self.state.lock().unwrap().clone()
    }

    /// Returns the number of questions dispatched to the model so far.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Answers a question about an image.
    ///
    /// The input is validated before the model is invoked. The decoded answer
    /// has its control tokens removed.
    ///
    /// # Arguments
    /// * `image` - The rgb8 image the question refers to
    /// * `question` - A non-empty question
    /// * `max_tokens` - Upper bound on the generated answer length
    pub fn answer(
        &self,
        image: Arc<RgbImage>,
        question: &str,
        max_tokens: usize,
    ) -> Result<Answer, InferenceError> {
        if question.trim().is_empty() {
            return Err(InferenceError::EmptyQuestion);
        }
        if max_tokens == 0 {
            return Err(InferenceError::InvalidMaxTokens);
        }

        let Some(tx) = &self.req_tx else {
            return Err(InferenceError::WorkerStopped);
        };

        let _processing = self.begin_processing()?;

        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = mpsc::channel();
        let start_time = Instant::now();

        tx.send(EngineRequest {
            image,
            question: question.to_string(),
            max_tokens,
            reply_tx,
        })
        .map_err(|_| {
            log::error!("Request channel disconnected");
            InferenceError::WorkerStopped
        })?;
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let raw = reply_rx
            .recv()
            .map_err(|_| {
                log::error!("Response channel disconnected");
                InferenceError::WorkerStopped
            })?
            .map_err(InferenceError::Model)?;

        let duration = start_time.elapsed();
        log::debug!("Inference {id} took {duration:?}");

        let text = strip_control_tokens(&raw);
        if text.is_empty() {
            return Err(InferenceError::EmptyAnswer);
        }

        Ok(Answer {
            id,
            text,
            start_time,
            duration,
        })
    }

    /// Stops the inference engine and shuts down the background thread.
    ///
    /// Later calls to [`InferenceEngine::answer`] fail with
    /// [`InferenceError::WorkerStopped`].
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.inference_handle.take() {
            let _ = handle.join();
        }
    }

    fn begin_processing(&self) -> Result<ProcessingGuard<'_>, InferenceError> {
        let mut state = self.state.lock().unwrap();
        if *state == EngineState::Processing {
            log::warn!("Engine is still processing");
            return Err(InferenceError::Busy);
        }
        *state = EngineState::Processing;
        Ok(ProcessingGuard(&self.state))
    }
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// resets the engine to idle when the call finishes, whatever the outcome
struct ProcessingGuard<'a>(&'a Mutex<EngineState>);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.lock() {
            *state = EngineState::Idle;
        }
    }
}
