//! The one-second periodic trigger.
//!
//! Each `restart()` spawns a fresh interval task and bumps the generation.
//! Ticks carry the generation of the task that produced them, so a tick that
//! was already queued when its task was replaced can be recognised and
//! dropped.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::event::AppEvent;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub generation: u64,
}

pub struct Ticker {
    period: Duration,
    generation: u64,
    handle: Option<JoinHandle<()>>,
    events: UnboundedSender<AppEvent>,
}

impl Ticker {
    pub fn new(period: Duration, events: UnboundedSender<AppEvent>) -> Self {
        Self {
            period,
            generation: 0,
            handle: None,
            events,
        }
    }

    /// Replace any running trigger with a new one whose first tick lands one
    /// full period from now. Must be called inside a tokio runtime.
    pub fn restart(&mut self) {
        self.stop();
        self.generation += 1;
        let generation = self.generation;
        let period = self.period;
        let events = self.events.clone();
        self.handle = Some(tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if events.send(AppEvent::Tick(Tick { generation })).is_err() {
                    break;
                }
            }
        }));
        debug!(generation, "ticker restarted");
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            // Anything the old task already queued is now stale.
            self.generation += 1;
            debug!(generation = self.generation, "ticker stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn is_current(&self, tick: &Tick) -> bool {
        self.handle.is_some() && tick.generation == self.generation
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
