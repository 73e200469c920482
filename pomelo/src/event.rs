use pomelo_ipc::{Command, Response};
use tokio::sync::oneshot;

use crate::ticker::Tick;

/// Everything that reaches the app from outside the terminal.
#[derive(Debug)]
pub enum AppEvent {
    Tick(Tick),
    Remote(RemoteRequest),
}

/// A command from pomeloctl waiting for the app's answer.
#[derive(Debug)]
pub struct RemoteRequest {
    pub command: Command,
    pub reply: oneshot::Sender<Response>,
}
