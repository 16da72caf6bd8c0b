use std::future::Future;
use std::io::Write;

use anyhow::Result;
use chrono::Local;
use tokio::io::{AsyncBufRead, Lines};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use venom_link::{CommandChannel, CommandOutcome, ConnectionState, HistoryLog, SystemState};

use crate::render;

/// Live feeds of one `watch` session.
pub struct Feeds<R> {
    pub states: mpsc::UnboundedReceiver<SystemState>,
    pub connection: watch::Receiver<ConnectionState>,
    pub input: Lines<R>,
}

/// Print states and link changes to `out` and forward input lines as
/// commands until `stop` resolves or the stream goes away.
pub async fn run<R, W, S>(
    mut feeds: Feeds<R>,
    commands: &CommandChannel,
    history: &mut HistoryLog,
    out: &mut W,
    stop: S,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    S: Future,
{
    tokio::pin!(stop);
    let mut input_open = true;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            state = feeds.states.recv() => match state {
                Some(state) => {
                    history.record(&state);
                    writeln!(out, "{}", render::state_line(Local::now(), &state))?;
                }
                None => break,
            },
            changed = feeds.connection.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *feeds.connection.borrow_and_update();
                writeln!(out, "{}", render::link_line(Local::now(), current))?;
            }
            line = feeds.input.next_line(), if input_open => match line {
                Ok(Some(line)) => {
                    let commands = commands.clone();
                    tokio::spawn(async move {
                        match commands.send_command(&line).await {
                            Ok(CommandOutcome::Skipped) => {}
                            Ok(CommandOutcome::Sent(_)) => info!("command sent: {}", line.trim()),
                            Err(error) => warn!("command failed: {}", error),
                        }
                    });
                }
                Ok(None) => input_open = false,
                Err(error) => {
                    warn!("stdin closed: {}", error);
                    input_open = false;
                }
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use venom_link::{LinkConfig, PageOrigin, SystemStatus, Vitals};

    fn channel() -> CommandChannel {
        let config = LinkConfig::new(PageOrigin::new("http", "127.0.0.1", Some(9)));
        let endpoints = config.endpoints().expect("endpoints");
        CommandChannel::new(config.command_config(&endpoints)).expect("channel")
    }

    fn state(detail: &str) -> SystemState {
        SystemState {
            status: SystemStatus::Processing,
            detail: detail.to_string(),
            vitals: Vitals::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_survives_a_busy_stream() {
        let (tx, states) = mpsc::unbounded_channel();
        let (_connection_tx, connection) = watch::channel(ConnectionState::Connected);
        let feeds = Feeds {
            states,
            connection,
            input: BufReader::new(&b""[..]).lines(),
        };
        // Frames keep arriving faster than the stop deadline.
        let feeder = tokio::spawn(async move {
            let mut tick = 0u32;
            loop {
                tokio::time::sleep(Duration::from_millis(300)).await;
                tick += 1;
                if tx.send(state(&format!("tick {tick}"))).is_err() {
                    break;
                }
            }
        });
        let mut history = HistoryLog::new();
        let mut out = Vec::new();

        tokio::time::timeout(
            Duration::from_secs(60),
            run(
                feeds,
                &channel(),
                &mut history,
                &mut out,
                tokio::time::sleep(Duration::from_secs(1)),
            ),
        )
        .await
        .expect("session stops at its deadline")
        .expect("session output");
        feeder.abort();

        let printed = String::from_utf8(out).expect("utf8");
        assert_eq!(printed.lines().count(), 3);
        assert_eq!(history.newest(), Some("tick 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn link_changes_are_printed() {
        let (_tx, states) = mpsc::unbounded_channel();
        let (connection_tx, connection) = watch::channel(ConnectionState::Connected);
        let feeds = Feeds {
            states,
            connection,
            input: BufReader::new(&b""[..]).lines(),
        };
        connection_tx.send_replace(ConnectionState::ReconnectScheduled);
        let mut history = HistoryLog::new();
        let mut out = Vec::new();

        run(
            feeds,
            &channel(),
            &mut history,
            &mut out,
            tokio::time::sleep(Duration::from_secs(1)),
        )
        .await
        .expect("session output");

        let printed = String::from_utf8(out).expect("utf8");
        assert_eq!(printed.lines().count(), 1);
        assert!(printed.contains("link:reconnect_scheduled"));
        assert!(history.is_empty());
    }
}
