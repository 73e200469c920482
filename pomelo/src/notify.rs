//! Completion alerts and the ambient status indicator.
//!
//! The terminal title plays the part a tray icon would on a desktop: it
//! always shows the current phase and whether the countdown is running.

use std::io::{self, Stdout, Write};

use anyhow::Context;
use crossterm::{execute, terminal::SetTitle};
use pomelo_ipc::{Phase, RunState};
use tracing::info;

use crate::config::{Icons, NotificationConfig};
use crate::cycle::{Notifier, StatusObserver};

pub struct DesktopNotifier {
    config: NotificationConfig,
}

impl DesktopNotifier {
    pub fn new(config: NotificationConfig) -> Self {
        Self { config }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&mut self, title: &str, body: &str) -> anyhow::Result<()> {
        if self.config.bell {
            let mut stdout = io::stdout();
            stdout.write_all(b"\x07")?;
            stdout.flush()?;
        }
        if self.config.enabled {
            notify_rust::Notification::new()
                .summary(title)
                .body(body)
                .appname("pomelo")
                .show()
                .context("Failed to send notification")?;
        }
        Ok(())
    }
}

/// Clears the title again when dropped.
pub struct TitleIndicator<W: Write = Stdout> {
    icons: Icons,
    out: W,
}

impl TitleIndicator {
    pub fn new(icons: Icons) -> Self {
        Self::with_writer(icons, io::stdout())
    }
}

impl<W: Write> TitleIndicator<W> {
    pub fn with_writer(icons: Icons, out: W) -> Self {
        Self { icons, out }
    }
}

impl<W: Write> StatusObserver for TitleIndicator<W> {
    fn on_state_changed(&mut self, phase: Phase, state: RunState) -> anyhow::Result<()> {
        execute!(self.out, SetTitle(status_title(&self.icons, phase, state)))?;
        Ok(())
    }
}

impl<W: Write> Drop for TitleIndicator<W> {
    fn drop(&mut self) {
        let _ = execute!(self.out, SetTitle(""));
    }
}

pub fn status_title(icons: &Icons, phase: Phase, state: RunState) -> String {
    let state_icon = match state {
        RunState::Running => &icons.play,
        RunState::Paused => &icons.pause,
        RunState::Stopped => &icons.stop,
    };
    format!(
        "{} pomelo {} {} {}",
        icons.phase(phase),
        icons.separator,
        phase.title(),
        state_icon
    )
}

/// Writes every state change to the log.
pub struct LogObserver;

impl StatusObserver for LogObserver {
    fn on_state_changed(&mut self, phase: Phase, state: RunState) -> anyhow::Result<()> {
        info!(?phase, state = state.as_str(), "state changed");
        Ok(())
    }
}
