#![allow(clippy::print_stdout, clippy::print_stderr)]

mod render;
mod session;

use std::env;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use venom_link::config::{ENV_ORIGIN, ENV_TOKEN};
use venom_link::{CommandChannel, CommandOutcome, HistoryLog, LinkConfig, StateStreamClient};

#[derive(Parser, Debug)]
#[command(name = "venom-console", about = "Watch and command the Venom neural core")]
struct Cli {
    /// Dashboard origin, e.g. http://localhost:4200. Overrides VENOM_ORIGIN.
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Bearer token for the backend. Overrides VENOM_TOKEN.
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream live state; lines typed on stdin are sent as commands.
    Watch {
        /// Number of recent activities to keep.
        #[arg(long, default_value_t = venom_link::history::DEFAULT_HISTORY_CAPACITY)]
        history: usize,
    },
    /// Send one command and print the acknowledgement.
    Send {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Print the backend's current state snapshot.
    State,
    /// Probe backend health.
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Watch { history } => watch(&config, history).await,
        Command::Send { text } => send(&config, &text.join(" ")).await,
        Command::State => {
            let state = command_channel(&config)?.fetch_state().await?;
            println!("{}", render::state_line(Local::now(), &state));
            Ok(())
        }
        Command::Health => {
            let report = command_channel(&config)?.health().await?;
            println!(
                "{} ({})",
                report.status,
                report.service.as_deref().unwrap_or("unknown service")
            );
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<LinkConfig> {
    LinkConfig::from_lookup(|key| match key {
        ENV_ORIGIN if cli.origin.is_some() => cli.origin.clone(),
        ENV_TOKEN if cli.token.is_some() => cli.token.clone(),
        _ => env::var(key).ok(),
    })
    .context("load link configuration")
}

fn command_channel(config: &LinkConfig) -> Result<CommandChannel> {
    let endpoints = config.endpoints().context("resolve backend endpoints")?;
    CommandChannel::new(config.command_config(&endpoints)).context("build command channel")
}

async fn send(config: &LinkConfig, text: &str) -> Result<()> {
    match command_channel(config)?.send_command(text).await? {
        CommandOutcome::Skipped => println!("nothing to send"),
        CommandOutcome::Sent(ack) => println!(
            "{}: {}",
            ack.status.as_deref().unwrap_or("sent"),
            ack.message.as_deref().unwrap_or("command delivered")
        ),
    }
    Ok(())
}

async fn watch(config: &LinkConfig, history_capacity: usize) -> Result<()> {
    let endpoints = config.endpoints().context("resolve backend endpoints")?;
    let commands = command_channel(config)?;
    let mut history = HistoryLog::with_capacity(history_capacity);

    match commands.fetch_state().await {
        Ok(snapshot) => {
            history.record(&snapshot);
            println!("{}", render::state_line(Local::now(), &snapshot));
        }
        Err(error) => warn!("state snapshot unavailable: {}", error),
    }

    let stream =
        StateStreamClient::start_websocket(config.stream_config(&endpoints), config.bearer_token.clone());
    let (_, states) = stream.subscribe_channel();
    let feeds = session::Feeds {
        states,
        connection: stream.watch_connection(),
        input: BufReader::new(tokio::io::stdin()).lines(),
    };
    info!("watching {}", stream.url());

    let outcome = session::run(
        feeds,
        &commands,
        &mut history,
        &mut std::io::stdout(),
        tokio::signal::ctrl_c(),
    )
    .await;

    stream.shutdown().await;
    outcome?;
    println!("recent activity:\n{}", render::history_block(&history));
    Ok(())
}
