use argh::FromArgs;
use kornia_vqa::{
    ConversationSession, DevicePreference, EngineConfig, Exchange, InferenceEngine,
    SAMPLE_QUESTIONS, SessionError, config::clamp_answer_tokens,
};
use std::{
    io::{BufRead, Write},
    path::PathBuf,
    sync::Arc,
};

mod paligemma;

use paligemma::{PALIGEMMA_MODEL, PaligemmaLoader};

#[derive(FromArgs)]
/// Chat with an image from the terminal.
struct ChatArgs {
    /// the image to load at startup
    #[argh(option, short = 'i')]
    image: Option<PathBuf>,

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

fn print_help() {
    println!("Commands:");
    println!("  /load <path>   load a png, jpeg, gif or bmp image");
    println!("  /samples       list the sample questions");
    println!("  /sample <n>    ask a sample question");
    println!("  /clear         clear the conversation");
    println!("  /status        show the session status");
    println!("  /quit          exit");
    println!("Anything else is asked as a question about the image.");
}

fn load_image(session: &mut ConversationSession, path: &str) {
    match std::fs::read(path) {
        Ok(bytes) => match session.load_image(&bytes) {
            Ok(image) => println!("Image loaded: {path} ({})", image.size()),
            Err(e) => println!("Error loading image: {e}"),
        },
        Err(e) => println!("Error reading {path}: {e}"),
    }
}

fn print_answer(result: Result<Exchange, SessionError>) {
    match result {
        Ok(exchange) => println!("{}: {}", exchange.answer.role, exchange.answer.content),
        Err(SessionError::NoImage) => println!("Please load an image first to start chatting!"),
        Err(e) => println!("{e}"),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ChatArgs = argh::from_env();

    let config = EngineConfig::new(args.model)
        .with_device(DevicePreference::from_toggle(!args.cpu))
        .with_max_answer_tokens(clamp_answer_tokens(args.max_tokens));

    log::info!("Loading model...");
    let engine = InferenceEngine::new(&PaligemmaLoader, config)?;
    println!("Model loaded on {}!", engine.device().as_str().to_uppercase());

    let mut session = ConversationSession::with_engine(Arc::new(engine));
    if let Some(path) = &args.image {
        load_image(&mut session, &path.to_string_lossy());
    }

    print_help();

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("user: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let line = line.trim();

        match line.split_once(' ').unwrap_or((line, "")) {
            ("", _) => continue,
            ("/quit", _) => break,
            ("/help", _) => print_help(),
            ("/load", path) => load_image(&mut session, path.trim()),
            ("/clear", _) => {
                session.clear();
                println!("Conversation cleared");
            }
            ("/status", _) => {
                println!("state: {}", session.state().as_str());
                println!("turns: {}", session.transcript().len());
                if let Some(image) = session.image() {
                    println!("image: {}", image.size());
                }
            }
            ("/samples", _) => {
                for (i, question) in SAMPLE_QUESTIONS.iter().enumerate() {
                    println!("  {i}: {question}");
                }
            }
            ("/sample", index) => match index.trim().parse::<usize>() {
                Ok(index) => print_answer(session.ask_sample(index)),
                Err(_) => println!("Usage: /sample <n>"),
            },
            _ => print_answer(session.ask(line)),
        }
    }

    Ok(())
}
