//! azgpt CLI - chat with Azure OpenAI and synthesize speech.
//!
//! Credentials and endpoints come from the environment (optionally a `.env`
//! file in the working directory). Bearer tokens are cached in
//! `~/.azure-gpt-config.json` between runs.

#![allow(clippy::print_stdout, clippy::print_stderr)] // CLI program intentionally prints

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use azgpt::config::{AppConfig, IssueLevel};
use azgpt::prelude::*;
use azgpt::util::timestamp_ms;
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// A command-line interface for interacting with Azure OpenAI
#[derive(Parser)]
#[command(name = "azgpt")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true, arg_required_else_help = true)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the Azure OpenAI bot
    Chat(ChatArgs),

    /// Convert text to speech with Azure Speech
    Speak(SpeakArgs),

    /// Inspect or renew the cached bearer token
    Token(TokenArgs),
}

/// Arguments for the chat command
#[derive(Args)]
struct ChatArgs {
    /// Message to send
    message: String,
}

/// Arguments for the speak command
#[derive(Args)]
struct SpeakArgs {
    /// Text to speak
    text: String,

    /// Output audio file (.wav or .mp3)
    #[arg(short, long, default_value = azgpt::audio::DEFAULT_OUTPUT_FILE)]
    output: PathBuf,

    /// Voice name (overrides AZURE_SPEECH_VOICE)
    #[arg(long)]
    voice: Option<String>,

    /// Play the audio after saving it
    #[arg(short, long)]
    play: bool,
}

/// Arguments for the token command
#[derive(Args)]
struct TokenArgs {
    #[command(subcommand)]
    command: TokenCommands,
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Show the cached token's state without contacting the token endpoint
    Status,
    /// Fetch and cache a new token now
    Refresh,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Loaded before logging so RUST_LOG may come from .env.
    let dotenv = dotenv::dotenv();

    init_logging(cli.verbose);

    match dotenv {
        Ok(path) => tracing::debug!("loaded {}", path.display()),
        // A missing .env file is fine: variables may come from the shell.
        Err(dotenv::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("no .env file loaded");
        }
        Err(e) => tracing::warn!("Failed to load .env file: {e}"),
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(Error::Config { issues }) => {
            eprintln!("Invalid environment variables:");
            for issue in issues {
                eprintln!("- {}: {}", issue.path, issue.message);
            }
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    for issue in config.validate() {
        if issue.level == IssueLevel::Warning {
            tracing::warn!("{issue}");
        }
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli.command, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("azgpt={level},azgpt_cli={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(command: Commands, config: AppConfig) -> Result<()> {
    let tokens = TokenManager::from_config(&config.token)?;

    match command {
        Commands::Chat(args) => cmd_chat(args, config, tokens).await,
        Commands::Speak(args) => cmd_speak(args, config, tokens).await,
        Commands::Token(args) => cmd_token(args, &config, &tokens).await,
    }
}

/// Send one chat message and print the reply.
async fn cmd_chat(args: ChatArgs, config: AppConfig, tokens: TokenManager) -> Result<()> {
    let chat = ChatClient::new(config.chat, Arc::new(tokens))?;
    let reply = chat.complete(&args.message).await?;
    println!("{reply}");
    Ok(())
}

/// Synthesize speech to a file and optionally play it.
async fn cmd_speak(args: SpeakArgs, config: AppConfig, tokens: TokenManager) -> Result<()> {
    let speech = SpeechClient::new(config.speech, Arc::new(tokens))?;

    let mut request = SpeechRequest::new(args.text).output(args.output);
    if let Some(voice) = args.voice {
        request = request.voice(voice);
    }

    let (path, bytes) = speech.synthesize(&request).await?.into_result()?;
    println!(
        "Speech synthesized successfully. Audio saved to {} ({bytes} bytes)",
        path.display()
    );

    if args.play {
        println!("Playing audio file: {}", path.display());
        if let Err(e) = AudioPlayer::new().play(&path).await {
            tracing::warn!("Error playing audio: {e}");
        }
    }

    Ok(())
}

/// Token cache management.
async fn cmd_token(args: TokenArgs, config: &AppConfig, tokens: &TokenManager) -> Result<()> {
    match args.command {
        TokenCommands::Status => {
            println!("Token cache: {}", config.token.cache_path.display());
            println!("Endpoint:    {}", config.token.endpoint);
            match tokens.cached().await {
                None => println!("State:       none cached"),
                Some(record) => match record.remaining_at(timestamp_ms()) {
                    Some(left) => println!(
                        "State:       valid, expires in {}m {}s",
                        left.as_secs() / 60,
                        left.as_secs() % 60
                    ),
                    None => println!("State:       expired"),
                },
            }
        }
        TokenCommands::Refresh => {
            let refreshed = tokens.refresh().await?;
            if refreshed.persisted {
                println!(
                    "Token refreshed, valid for {} minutes",
                    tokens.validity_margin().as_secs() / 60
                );
                tracing::debug!(
                    expiration_time = refreshed.record.expiration_time,
                    "token cached"
                );
            } else {
                println!("Token refreshed, but the cache could not be written");
            }
        }
    }

    Ok(())
}
