use argh::FromArgs;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use kornia_vqa::{
    ConversationSession, DevicePreference, EngineConfig, InferenceEngine, SessionError,
    config::clamp_answer_tokens,
};
use reqwest::StatusCode;
use serde_json::json;
use std::{
    sync::{Arc, Mutex, TryLockError},
    time::Instant,
};

mod messages;
mod paligemma;

use paligemma::{PALIGEMMA_MODEL, PaligemmaLoader};

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;

#[derive(FromArgs)]
/// Serve a visual question answering session over http.
struct ServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// the model to load
    #[argh(option, short = 'm', default = "PALIGEMMA_MODEL.to_string()")]
    model: String,

    /// maximum number of answer tokens, between 10 and 100
    #[argh(option, default = "kornia_vqa::DEFAULT_MAX_ANSWER_TOKENS")]
    max_tokens: usize,

    /// run on the cpu even if an accelerator is available
    #[argh(switch)]
    cpu: bool,
}

type SharedSession = Arc<Mutex<ConversationSession>>;

// the engine is shared with the session so status reads never wait on a question
#[derive(Clone)]
struct AppState {
    session: SharedSession,
    engine: Arc<InferenceEngine>,
}

fn busy() -> (StatusCode, Json<serde_json::Value>) {
    log::debug!("Session is still processing");
    (
        StatusCode::CONFLICT,
        Json(json!({ "error": "Engine is still processing" })),
    )
}

// only one request may hold the session, the others are rejected
fn with_session<T>(
    session: &SharedSession,
    f: impl FnOnce(&mut ConversationSession) -> T,
) -> Result<T, (StatusCode, Json<serde_json::Value>)> {
    match session.try_lock() {
        Ok(mut session) => Ok(f(&mut session)),
        Err(TryLockError::WouldBlock) => Err(busy()),
        Err(TryLockError::Poisoned(_)) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Session lock poisoned" })),
        )),
    }
}

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let engine = &state.engine;
    let session = match state.session.try_lock() {
        Ok(session) => Some((session.state().as_str(), session.transcript().len())),
        Err(TryLockError::WouldBlock) => None,
        Err(TryLockError::Poisoned(_)) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Session lock poisoned" })),
            );
        }
    };

    let status = messages::StatusResponse {
        state: session.map_or("busy", |(state, _)| state).to_string(),
        engine: engine.state().as_str().to_string(),
        model: engine.config().model_identifier.clone(),
        device: engine.device().as_str().to_string(),
        max_answer_tokens: engine.config().max_answer_tokens,
        turns: session.map(|(_, turns)| turns),
    };
    (StatusCode::OK, Json(json!(status)))
}

async fn post_image(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let loaded = with_session(&state.session, |session| {
        session.load_image(&body).map(|image| image.size())
    });

    match loaded {
        Ok(Ok(size)) => {
            log::info!("Image loaded: {size}");
            (
                StatusCode::OK,
                Json(json!({ "status": "loaded", "width": size.width, "height": size.height })),
            )
        }
        Ok(Err(e)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        ),
        Err(rejection) => rejection,
    }
}

async fn post_ask(
    State(state): State<AppState>,
    Json(payload): Json<messages::AskRequest>,
) -> impl IntoResponse {
    let start_time = Instant::now();

    // inference blocks, keep it off the async workers
    let asked = tokio::task::spawn_blocking(move || {
        with_session(&state.session, |session| session.ask(&payload.question))
    })
    .await;

    match asked {
        Ok(Ok(Ok(exchange))) => {
            log::info!("Question answered");
            let response = messages::AskResponse {
                question: exchange.question,
                answer: exchange.answer,
                duration: start_time.elapsed(),
            };
            (
                StatusCode::OK,
                Json(json!({ "status": "success", "response": response })),
            )
        }
        Ok(Ok(Err(SessionError::Busy))) => busy(),
        Ok(Ok(Err(e))) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        ),
        Ok(Err(rejection)) => rejection,
        Err(e) => {
            log::error!("Inference task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn post_clear(State(state): State<AppState>) -> impl IntoResponse {
    match with_session(&state.session, |session| session.clear()) {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "cleared" }))),
        Err(rejection) => rejection,
    }
}

async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    match with_session(&state.session, |session| json!(session.transcript())) {
        Ok(transcript) => (
            StatusCode::OK,
            Json(json!({ "transcript": transcript })),
        ),
        Err(rejection) => rejection,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ServerArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let config = EngineConfig::new(args.model)
        .with_device(DevicePreference::from_toggle(!args.cpu))
        .with_max_answer_tokens(clamp_answer_tokens(args.max_tokens));

    let engine = tokio::task::spawn_blocking(move || {
        InferenceEngine::new(&PaligemmaLoader, config)
    })
    .await??;
    let engine = Arc::new(engine);
    let state = AppState {
        session: Arc::new(Mutex::new(ConversationSession::with_engine(engine.clone()))),
        engine,
    };

    let app = Router::new()
        .route("/", get(|| async { "Chat with an image!" }))
        .route("/status", get(get_status))
        .route("/image", post(post_image))
        .route("/ask", post(post_ask))
        .route("/clear", post(post_clear))
        .route("/transcript", get(get_transcript))
        .with_state(state);

    log::info!("Starting the server");
    log::info!("Listening on: {}", addr);
    log::info!("Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
