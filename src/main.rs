use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

use talkback::api::ApiServerBuilder;
use talkback::voice::{
    KeyboardInput, Speaker, SpeechState, UiUpdate, VoiceSelection, VoiceSession,
    build_synthesizer,
};
use talkback::{Config, ConversationSession, Gateway, HttpChatClient};

/// Talkback - voice conversation client and chat gateway
#[derive(Parser)]
#[command(name = "talkback", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Directory served for paths outside /api
    #[arg(long, env = "TALKBACK_STATIC_DIR", default_value = ".")]
    static_dir: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the chat gateway (default)
    Serve,
    /// Talk to a running gateway; typed lines stand in for speech
    Talk {
        /// Voice backend: device or voicevox
        #[arg(long, env = "TALKBACK_VOICE", default_value = "device")]
        voice: VoiceSelection,
    },
    /// Speak a line through the configured synthesizer
    TestTts {
        /// Voice backend: device or voicevox
        #[arg(long, env = "TALKBACK_VOICE", default_value = "device")]
        voice: VoiceSelection,
        /// Text to speak
        #[arg(default_value = "こんにちは！音声合成のテストです。")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,talkback=info",
        1 => "info,talkback=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    config.validate()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, cli.port, cli.static_dir).await,
        Command::Talk { voice } => talk(config, voice).await,
        Command::TestTts { voice, text } => test_tts(&config, voice, &text).await,
    }
}

/// Run the gateway until interrupted
async fn serve(config: Config, port: u16, static_dir: PathBuf) -> anyhow::Result<()> {
    tracing::info!(
        port,
        upstream = %config.upstream.url,
        format = ?config.upstream.format,
        "starting talkback gateway"
    );

    let gateway = Gateway::from_config(config.upstream)?;
    let server = ApiServerBuilder::new(gateway, port)
        .static_dir(Some(static_dir))
        .build();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    Ok(())
}

/// Terminal voice session against a running gateway
async fn talk(config: Config, voice: VoiceSelection) -> anyhow::Result<()> {
    let transport = Arc::new(HttpChatClient::new(&config.gateway_url));
    let conversation = ConversationSession::new(transport);

    let (line_tx, line_rx) = mpsc::channel(8);
    let keyboard = Arc::new(KeyboardInput::new(line_rx));
    let synthesizer = build_synthesizer(voice, &config.voice);

    let (session, handle) =
        VoiceSession::new(conversation, keyboard.clone(), keyboard, synthesizer);
    let session_task = session.spawn();

    let stdin_task = tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let printer = tokio::spawn(print_updates(handle.subscribe()));

    tracing::info!(gateway = %config.gateway_url, "type a line and press enter to talk");

    // Keep listening whenever the session returns to idle
    let mut state = handle.watch_state();
    handle.start();
    while state.changed().await.is_ok() {
        if *state.borrow_and_update() != SpeechState::Idle {
            continue;
        }
        if stdin_task.is_finished() {
            break;
        }
        handle.start();
    }

    drop(handle);
    session_task.await?;
    printer.await?;
    Ok(())
}

async fn print_updates(mut updates: broadcast::Receiver<UiUpdate>) {
    loop {
        let update = match updates.recv().await {
            Ok(update) => update,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match update {
            UiUpdate::Status(text) => println!("[{text}]"),
            UiUpdate::Log {
                speaker: Speaker::User,
                text,
            } => println!("あなた: {text}"),
            UiUpdate::Log {
                speaker: Speaker::Assistant,
                text,
            } => println!("AI: {text}"),
            UiUpdate::Interim(text) if !text.is_empty() => println!("… {text}"),
            UiUpdate::Interim(_) => {}
            UiUpdate::Error(text) => eprintln!("{text}"),
        }
        let _ = std::io::stdout().flush();
    }
}

/// Speak a line through the configured synthesizer
async fn test_tts(config: &Config, voice: VoiceSelection, text: &str) -> anyhow::Result<()> {
    let synthesizer = build_synthesizer(voice, &config.voice);
    println!("Speaking with {}: {text}", synthesizer.name());

    synthesizer.speak(text).await?;

    println!("If you heard the voice, synthesis is working!");
    Ok(())
}
