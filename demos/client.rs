use argh::FromArgs;
use std::path::PathBuf;

mod messages;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3000;

#[derive(FromArgs)]
/// Client for the image chat server
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "image", "ask", "clear", "transcript" or "status"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Image(ImageCommand),
    Ask(AskCommand),
    Clear(ClearCommand),
    Transcript(TranscriptCommand),
    Status(StatusCommand),
}

#[derive(FromArgs)]
/// Upload the image to chat about
#[argh(subcommand, name = "image")]
struct ImageCommand {
    /// the path to the image
    #[argh(positional)]
    image_path: PathBuf,
}

#[derive(FromArgs)]
/// Ask a question about the loaded image
#[argh(subcommand, name = "ask")]
struct AskCommand {
    /// the question to ask
    #[argh(positional)]
    question: String,
}

#[derive(FromArgs)]
/// Clear the conversation
#[argh(subcommand, name = "clear")]
struct ClearCommand {}

#[derive(FromArgs)]
/// Show the conversation
#[argh(subcommand, name = "transcript")]
struct TranscriptCommand {}

#[derive(FromArgs)]
/// Show the session status
#[argh(subcommand, name = "status")]
struct StatusCommand {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let request = match args.command {
        ClientCommands::Image(image_command) => {
            let bytes = tokio::fs::read(&image_command.image_path).await?;
            client.post(format!("http://{}/image", addr)).body(bytes)
        }
        ClientCommands::Ask(ask_command) => client
            .post(format!("http://{}/ask", addr))
            .json(&messages::AskRequest {
                question: ask_command.question,
            }),
        ClientCommands::Clear(_) => client.post(format!("http://{}/clear", addr)),
        ClientCommands::Transcript(_) => client.get(format!("http://{}/transcript", addr)),
        ClientCommands::Status(_) => client.get(format!("http://{}/status", addr)),
    };

    let response = request.send().await?;
    let result = response.json::<serde_json::Value>().await?;
    println!("Result: {}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
