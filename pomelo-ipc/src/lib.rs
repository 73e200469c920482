//! Inter-process communication between pomelo and pomeloctl
//!
//! We use Unix domain sockets for local IPC. Every message is one JSON
//! document terminated by a newline, one command in and one response out.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Commands that pomeloctl can send to pomelo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Start,
    Pause,
    /// Pause when running, start otherwise.
    Toggle,
    Reset,
    Status,
    SetLabel { name: String },
    /// Durations in minutes.
    Configure {
        work: u64,
        short_break: u64,
        long_break: u64,
        sessions_until_long_break: u32,
    },
    History { limit: Option<usize> },
    Export { format: ExportFormat },
}

/// Responses from pomelo back to pomeloctl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Status(SessionStatus),
    History(Vec<HistoryEntry>),
    Export(String),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Work,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub fn title(self) -> &'static str {
        match self {
            Phase::Work => "Work Session",
            Phase::ShortBreak => "Short Break",
            Phase::LongBreak => "Long Break",
        }
    }

    pub fn is_break(self) -> bool {
        !matches!(self, Phase::Work)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Stopped,
    Running,
    Paused,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Stopped => "stopped",
            RunState::Running => "running",
            RunState::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub phase: Phase,
    pub state: RunState,
    pub label: String,
    pub remaining: u64, // seconds
    pub total: u64,     // seconds
    pub completed_work_sessions: u32,
    pub work_ordinal: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub name: String,
    pub start_time: DateTime<Local>,
    pub planned: u64, // seconds
    pub actual: u64,  // seconds
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Json,
    Csv,
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection closed before a message arrived")]
    Closed,

    #[error("Connection refused - is pomelo running?")]
    ConnectionRefused,
}

const SOCKET_NAME: &str = "pomelo.sock";

/// Socket location: `$XDG_RUNTIME_DIR/pomelo.sock`, else the temp dir.
pub fn socket_path() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join(SOCKET_NAME),
        _ => std::env::temp_dir().join(SOCKET_NAME),
    }
}

/// Write one newline-terminated JSON message.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf = serde_json::to_vec(message)?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one newline-terminated JSON message.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T, IpcError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(IpcError::Closed);
    }
    Ok(serde_json::from_str(line.trim_end())?)
}
