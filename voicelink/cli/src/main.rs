//! voicelink - Interactive Speech Streaming Client
//!
//! Reads requests from stdin, prints the response text as it streams and
//! paces audio playback through a clocked output. Typing a new line while a
//! response is still playing interrupts it (barge-in).
//!
//! # Usage
//!
//! ```bash
//! # Connect to a local synthesis service
//! voicelink --url ws://localhost:3001 --persona yuki
//!
//! # With config file
//! voicelink --config ~/.config/voicelink/client.toml
//!
//! # Verbose logging
//! RUST_LOG=debug voicelink
//! ```
//!
//! # Commands
//!
//! - `/stop`: interrupt the current response
//! - `/stats`: print playback counters
//! - `/quit`: disconnect and exit

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use voicelink_core::{
    load_config, AudioOutput, Base64Decoder, ClockedOutput, ConfigOverrides, NullOutput, Session,
    SessionEvent,
};

/// voicelink - interruptible speech streaming client
#[derive(Parser, Debug)]
#[command(name = "voicelink")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Synthesis service address (ws:// or wss://)
    #[arg(short = 'u', long, env = "VOICELINK_URL", value_name = "URL")]
    url: Option<String>,

    /// Persona to address
    #[arg(short = 'p', long, env = "VOICELINK_PERSONA")]
    persona: Option<String>,

    /// Voice to synthesize with
    #[arg(short = 'v', long, env = "VOICELINK_VOICE")]
    voice: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "VOICELINK_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bitrate used to pace playback (bits per second)
    #[arg(long, value_name = "BPS")]
    bitrate: Option<u32>,

    /// Finish every chunk immediately instead of pacing it
    #[arg(long)]
    null_output: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "VOICELINK_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so they never interleave with response text.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("voicelink={level},voicelink_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// What a line of input asks for
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Stop,
    Stats,
    Quit,
    Request(&'a str),
    Empty,
}

fn parse_command(line: &str) -> Command<'_> {
    match line.trim() {
        "" => Command::Empty,
        "/stop" => Command::Stop,
        "/stats" => Command::Stats,
        "/quit" | "/exit" => Command::Quit,
        text => Command::Request(text),
    }
}

fn print_event(event: SessionEvent) {
    match event {
        SessionEvent::PartialText { text, .. } => {
            print!("{text}");
            if !text.ends_with(char::is_whitespace) {
                print!(" ");
            }
        }
        SessionEvent::TextOnly { text, error } => {
            match error {
                Some(error) => println!("[voice unavailable: {error}]"),
                None => println!("[voice unavailable]"),
            }
            println!("{text}");
        }
        SessionEvent::Complete { duration, .. } => {
            println!();
            println!("[done in {} ms]", duration.as_millis());
        }
        SessionEvent::Passthrough { kind, .. } => {
            info!(kind = %kind, "Ignoring unhandled message");
        }
    }
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let overrides = ConfigOverrides {
        config_path: args.config,
        server_url: args.url,
        persona_id: args.persona,
        voice_id: args.voice,
        playback_bitrate_bps: args.bitrate,
    };
    let (config, source) = load_config(&overrides).context("Failed to load configuration")?;
    info!(source = ?source, url = %config.server_url, "voicelink starting");

    let output: Box<dyn AudioOutput> = if args.null_output {
        Box::new(NullOutput)
    } else {
        Box::new(ClockedOutput::new(config.playback_bitrate_bps))
    };

    let url = config.server_url.clone();
    let persona = config.persona_id.clone();
    let voice = config.voice_id.clone();

    let mut session = Session::new(config, output, Arc::new(Base64Decoder::default()));
    session.on_event(print_event);
    session.on_error(|error| {
        if error.is_terminal() {
            eprintln!("error: {error}");
        } else {
            warn!(error = %error, "Stream error");
        }
    });

    session
        .connect(&url)
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    if let Some(client_id) = session.client_id() {
        eprintln!("connected to {url} as {client_id}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let line = line.context("Failed to read stdin")?;
                let Some(line) = line else {
                    // EOF: let the current response finish, then exit
                    if !session.is_busy() {
                        break;
                    }
                    stdin_open = false;
                    continue;
                };

                match parse_command(&line) {
                    Command::Empty => {}
                    Command::Stop => {
                        let report = session.interrupt().await;
                        eprintln!("[stopped, {} chunks discarded]", report.discarded_units);
                    }
                    Command::Stats => {
                        let queue = session.queue_stats();
                        let handler = session.handler_stats();
                        eprintln!(
                            "[played {} / enqueued {}, discarded {}, decode failures {}]",
                            queue.played, queue.enqueued, queue.discarded, handler.decode_failures
                        );
                    }
                    Command::Quit => break,
                    Command::Request(text) => {
                        if let Err(e) = session.send_request(text, &persona, voice.as_deref()).await {
                            eprintln!("error: {e}");
                        }
                    }
                }
            }

            alive = session.step() => {
                if !alive {
                    break;
                }
                if !stdin_open && !session.is_busy() {
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
        }
    }

    session.disconnect().await;
    Ok(())
}
