use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use keyvoice::api::ApiServer;
use keyvoice::voice::{ClipPlayer, Microphone, RecordingController};
use keyvoice::{App, Config, TerminalPresenter, ToggleOutcome, artifact_key};

/// keyvoice - Keyword-triggered voice responses
#[derive(Parser)]
#[command(name = "keyvoice", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/keyvoice/config.toml)
    #[arg(short, long, env = "KEYVOICE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Record from the microphone; Enter toggles, q quits
    Record {
        /// Play the resolved clip after each run
        #[arg(long)]
        play: bool,
        /// Input device name (defaults to the system microphone)
        #[arg(long)]
        device: Option<String>,
    },
    /// List stored clips
    List,
    /// Delete a stored clip
    Delete {
        /// Storage key, e.g. "usa.mp3"
        key: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Play the stored clip for a keyword
    Play {
        /// Keyword, e.g. "wikipedia"
        keyword: String,
    },
    /// Show the keyword dictionary
    Keywords,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,keyvoice=info",
        1 => "info,keyvoice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load_from(cli.config.as_deref())?;

    let command = cli.command.unwrap_or(Command::Serve { port: None });
    if let Command::Keywords = command {
        return keywords(&config);
    }

    if let Command::Serve { port: Some(port) } = command {
        config.server.port = port;
    }

    let app = App::from_config(&config)?;

    match command {
        Command::Serve { .. } => serve(app, &config).await,
        Command::Record { play, device } => record(&app, play, device).await,
        Command::List => list(&app).await,
        Command::Delete { key, yes } => delete(&app, &key, yes).await,
        Command::Play { keyword } => play_keyword(&app, &keyword).await,
        Command::Keywords => keywords(&config),
    }
}

async fn serve(app: App, config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        port = config.server.port,
        keywords = app.dictionary().entries().len(),
        "starting keyvoice"
    );

    ApiServer::new(app, &config.server).run().await?;
    Ok(())
}

/// Interactive microphone loop
#[allow(clippy::future_not_send)]
async fn record(app: &App, play: bool, device: Option<String>) -> anyhow::Result<()> {
    let microphone = device.map_or_else(Microphone::new, Microphone::with_device);
    let recorder = RecordingController::new(Arc::new(microphone));
    let mut session = app
        .session(Arc::new(TerminalPresenter::default()))
        .with_recorder(recorder);
    session.refresh().await;

    println!("Press Enter to start/stop recording, q + Enter to quit.");
    println!("Keywords: {}", keyword_list(app));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().eq_ignore_ascii_case("q") {
            break;
        }

        match session.toggle().await {
            Ok(ToggleOutcome::Started) => println!("Recording... press Enter to stop."),
            Ok(ToggleOutcome::Completed(artifact)) => {
                println!("{} -> {}", artifact.trigger, artifact.url);
                if play {
                    if let Err(e) = play_url(&artifact.url).await {
                        tracing::warn!(error = %e, "playback failed");
                    }
                }
            }
            // Already reported through the presenter
            Err(e) => tracing::debug!(error = %e, "toggle failed"),
        }

        println!("{}", session.placeholder_text());
    }

    session.teardown();
    Ok(())
}

async fn list(app: &App) -> anyhow::Result<()> {
    let gateway = app.gateway();
    let listing = gateway.list().await;

    if listing.is_empty() {
        println!("No stored clips.");
        return Ok(());
    }

    for entry in listing.entries() {
        println!("{:<20} {}", entry.key, gateway.playback_url(&entry.key));
    }
    Ok(())
}

async fn delete(app: &App, key: &str, yes: bool) -> anyhow::Result<()> {
    let mut session = app.session(Arc::new(TerminalPresenter::new(yes)));
    session.refresh().await;
    session.delete_artifact(key).await?;
    Ok(())
}

async fn play_keyword(app: &App, keyword: &str) -> anyhow::Result<()> {
    let entry = app
        .dictionary()
        .get(keyword)
        .ok_or_else(|| anyhow::anyhow!("unknown keyword: {keyword}"))?;

    let url = app.gateway().playback_url(&artifact_key(&entry.trigger));
    println!("Playing {url}");
    play_url(&url).await
}

async fn play_url(url: &str) -> anyhow::Result<()> {
    let audio = reqwest::get(url).await?.error_for_status()?.bytes().await?;
    tokio::task::spawn_blocking(move || ClipPlayer::play_mp3(&audio)).await??;
    Ok(())
}

fn keywords(config: &Config) -> anyhow::Result<()> {
    let dictionary = config.dictionary()?;
    for entry in dictionary.entries() {
        println!("{:<12} {}", entry.trigger, entry.response);
    }
    Ok(())
}

fn keyword_list(app: &App) -> String {
    app.dictionary()
        .entries()
        .iter()
        .map(|e| e.trigger.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
