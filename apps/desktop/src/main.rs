use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use session_core::{
    load_settings, ControlStatus, LoopbackRelay, Participant, RelayConnector, SessionEvent,
    WebSocketConnector,
};
use shared::domain::{ControlId, RoomStatus};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast::error::RecvError, mpsc},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{parse_command, Command};

#[derive(Parser, Debug)]
struct Args {
    /// Relay base url; overrides the config file.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    room: Option<String>,
    #[arg(long)]
    nickname: Option<String>,
    /// TOML file with dial definitions and timing.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Use an in-process relay instead of connecting to a server.
    #[arg(long)]
    offline: bool,
}

#[derive(Default)]
struct Snapshot {
    room: RoomStatus,
    controls: BTreeMap<ControlId, ControlStatus>,
}

impl Snapshot {
    fn record(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::Status(status) => self.room = status.clone(),
            SessionEvent::Control(status) => {
                self.controls
                    .insert(status.control_id.clone(), status.clone());
            }
            SessionEvent::Error(_) => {}
        }
    }

    fn print(&self) -> Result<()> {
        println!("{}", serde_json::to_string(&self.room)?);
        for status in self.controls.values() {
            println!("{}", serde_json::to_string(status)?);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref()).context("failed to load settings")?;
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(room) = args.room {
        settings.room = room;
    }
    let nickname = args
        .nickname
        .unwrap_or_else(|| format!("Player {}", std::process::id() % 1000));

    let connector: Box<dyn RelayConnector> = if args.offline {
        Box::new(LoopbackRelay::new())
    } else {
        Box::new(WebSocketConnector::new(settings.server_url.clone()))
    };
    let link = connector
        .join(&settings.room, &nickname)
        .await
        .with_context(|| format!("failed to join room '{}'", settings.room))?;

    let participant = Participant::new(settings, link);
    let Some(default_dial) = participant.control_ids().next().cloned() else {
        anyhow::bail!("no usable dials configured");
    };
    info!(participant_id = %participant.local(), nickname = %nickname, "joined as participant");

    let mut events = participant.subscribe();
    let (input, input_rx) = mpsc::channel(64);
    let mut session = tokio::spawn(participant.run(input_rx));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut snapshot = Snapshot::default();

    loop {
        tokio::select! {
            finished = &mut session => {
                finished
                    .context("session task failed")?
                    .context("session ended")?;
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(event) => {
                    snapshot.record(&event);
                    println!("{}", serde_json::to_string(&event)?);
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                Err(RecvError::Closed) => {}
            },
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match parse_command(&line, &default_dial) {
                    Ok(Some(Command::Pointer(command))) => {
                        if input.send(command).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Command::Status)) => snapshot.print()?,
                    Ok(Some(Command::Quit)) => break,
                    Ok(None) => {}
                    Err(err) => eprintln!("{err}"),
                }
            }
        }
    }

    drop(input);
    session
        .await
        .context("session task failed")?
        .context("session ended")?;
    Ok(())
}
