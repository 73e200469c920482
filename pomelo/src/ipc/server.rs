//! Unix domain socket server for IPC
//!
//! The server never touches the session itself. Each command is forwarded
//! to the app loop together with a oneshot sender, and the app's answer is
//! written back to the client.

use crate::event::{AppEvent, RemoteRequest};
use anyhow::{anyhow, bail, Context, Result};
use pomelo_ipc::{read_message, write_message, Command, Response};
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use tracing::{debug, error, info};

/// Removes the socket file when dropped. Only handed out by a successful
/// [`bind`], so an instance never deletes a socket it does not own.
#[derive(Debug)]
pub struct SocketGuard {
    path: PathBuf,
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

/// Bind the socket, replacing a stale one left by an earlier run. Fails if
/// another instance is still accepting on it.
/// Must be called inside a tokio runtime.
pub fn bind(path: &Path) -> Result<(UnixListener, SocketGuard)> {
    if std::os::unix::net::UnixStream::connect(path).is_ok() {
        bail!("Another pomelo instance is listening on {:?}", path);
    }
    let _ = std::fs::remove_file(path);
    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind IPC socket at {:?}", path))?;
    info!("IPC server listening on {}", path.display());
    Ok((
        listener,
        SocketGuard {
            path: path.to_path_buf(),
        },
    ))
}

pub async fn serve(listener: UnixListener, events: UnboundedSender<AppEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let events = events.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, events).await {
                        error!("Error handling client: {:#}", e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

async fn handle_client(stream: UnixStream, events: UnboundedSender<AppEvent>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let command: Command = read_message(&mut reader).await?;
    debug!(?command, "received command");

    let (reply, answer) = oneshot::channel();
    events
        .send(AppEvent::Remote(RemoteRequest { command, reply }))
        .map_err(|_| anyhow!("pomelo is shutting down"))?;
    let response = answer
        .await
        .unwrap_or_else(|_| Response::Error("Request was dropped".to_string()));

    write_message(&mut writer, &response).await?;
    Ok(())
}
