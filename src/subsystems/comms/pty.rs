//! PTY (console) comms channel: reads lines from stdin, hands them to the
//! consulting agent, prints the reply to stdout.
//!
//! One console is one session; its id is generated at startup. Lines
//! starting with `/` are console commands (see [`ConsoleCommand`]). Runs
//! until the `shutdown` token is cancelled (Ctrl-C), `/quit`, or stdin is
//! closed.

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::subsystems::agents::ConsultingAgent;
use crate::subsystems::memory::SessionMemory;

// ── ConsoleCommand ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Plain text for the agent.
    Message(String),
    /// `/reset`: drop the consulting history and topic for this session.
    Reset,
    /// `/info`: print per-channel turn counts.
    Info,
    /// `/quit` or `/exit`.
    Quit,
    /// Any other `/word`.
    Unknown(String),
}

impl ConsoleCommand {
    /// `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let cmd = match line {
            "/reset" | "/clear" => Self::Reset,
            "/info" => Self::Info,
            "/quit" | "/exit" => Self::Quit,
            other if other.starts_with('/') => Self::Unknown(other.to_string()),
            other => Self::Message(other.to_string()),
        };
        Some(cmd)
    }
}

// ── PtyChannel ───────────────────────────────────────────────────────────────

pub struct PtyChannel {
    channel_id: String,
    session_id: String,
    agent: Arc<ConsultingAgent>,
    memory: Arc<SessionMemory>,
}

impl PtyChannel {
    pub fn new(
        channel_id: impl Into<String>,
        agent: Arc<ConsultingAgent>,
        memory: Arc<SessionMemory>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            session_id: format!("pty-{}", uuid::Uuid::now_v7()),
            agent,
            memory,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Respond to one parsed command. `None` means the console should close.
    pub async fn respond(&self, command: ConsoleCommand) -> Option<String> {
        match command {
            ConsoleCommand::Message(text) => Some(self.agent.handle(&self.session_id, &text).await),
            ConsoleCommand::Reset => {
                self.agent.reset(&self.session_id);
                Some("[history cleared]".to_string())
            }
            ConsoleCommand::Info => Some(match self.memory.session_info(&self.session_id) {
                None => "[no history yet]".to_string(),
                Some(info) => {
                    let mut out = format!("session {}", info.session_id);
                    for ch in &info.channels {
                        out.push_str(&format!("\n  {}: {} turns", ch.channel, ch.message_count));
                    }
                    out
                }
            }),
            ConsoleCommand::Unknown(cmd) => {
                Some(format!("[unknown command {cmd}; try /reset, /info, /quit]"))
            }
            ConsoleCommand::Quit => None,
        }
    }
}

// ── run_pty ──────────────────────────────────────────────────────────────────

pub async fn run_pty(channel: PtyChannel, shutdown: CancellationToken) -> Result<(), AppError> {
    info!(
        channel_id = %channel.channel_id,
        session_id = %channel.session_id,
        "pty channel started"
    );
    println!("─────────────────────────────────");
    println!(" Concierge console  (Ctrl-C to quit)");
    println!("─────────────────────────────────");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                println!("\n[pty] shutdown signal received, closing console");
                info!("pty channel shutting down");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Err(e) => {
                        warn!("pty read error: {e}");
                        return Err(AppError::Io(e));
                    }
                    Ok(None) => {
                        info!("pty stdin closed");
                        break;
                    }
                    Ok(Some(input)) => {
                        let Some(command) = ConsoleCommand::parse(&input) else { continue };
                        debug!(?command, "pty received line");

                        match channel.respond(command).await {
                            Some(reply) => println!("{reply}"),
                            None => break,
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
