//! Terminal controls for a running session.
//!
//! Any line typed counts as user activity. A few words are commands:
//! `start`, `end`, `retry`, `online`, `offline`, `quit`.

use interview_core::{ActivitySink, SessionCommand, SessionHandle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(SessionCommand),
    Network { online: bool },
    Activity,
}

pub fn parse_line(line: &str) -> ConsoleInput {
    match line.trim().to_lowercase().as_str() {
        "start" => ConsoleInput::Command(SessionCommand::Start),
        "end" | "stop" => ConsoleInput::Command(SessionCommand::EndCall),
        "retry" => ConsoleInput::Command(SessionCommand::Retry),
        "quit" | "exit" | "q" => ConsoleInput::Command(SessionCommand::Shutdown),
        "online" => ConsoleInput::Network { online: true },
        "offline" => ConsoleInput::Network { online: false },
        _ => ConsoleInput::Activity,
    }
}

/// Feeds lines from `reader` into the session until the reader ends or the
/// session stops listening. End of input shuts the session down.
pub async fn run<R>(reader: R, handle: SessionHandle)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("failed to read console input: {e}");
                break;
            }
        };

        handle.report_activity();
        let delivered = match parse_line(&line) {
            ConsoleInput::Command(command) => {
                tracing::debug!(?command, "console command");
                handle.send(command).await
            }
            ConsoleInput::Network { online } => handle.network_changed(online).await,
            ConsoleInput::Activity => true,
        };
        if !delivered {
            return;
        }
    }
    handle.send(SessionCommand::Shutdown).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_line(" END \n"),
            ConsoleInput::Command(SessionCommand::EndCall)
        );
        assert_eq!(
            parse_line("retry"),
            ConsoleInput::Command(SessionCommand::Retry)
        );
        assert_eq!(
            parse_line("q"),
            ConsoleInput::Command(SessionCommand::Shutdown)
        );
        assert_eq!(
            parse_line("offline"),
            ConsoleInput::Network { online: false }
        );
    }

    #[test]
    fn anything_else_is_activity() {
        assert_eq!(parse_line("still here"), ConsoleInput::Activity);
        assert_eq!(parse_line(""), ConsoleInput::Activity);
    }
}
