//! Session cycle state machine.
//!
//! The machine owns every counter of a Pomodoro run and advances only when
//! the caller invokes `tick()` once per elapsed second. It never spawns
//! anything itself: the periodic trigger lives in [`crate::ticker`].
//!
//! ## Phase transitions
//!
//! ```text
//! Work -> ShortBreak -> Work -> ... -> Work -> LongBreak -> Work
//! ```
//!
//! Every `sessions_until_long_break`-th completed Work phase is followed by a
//! LongBreak. After a phase completes the machine waits one tick and then
//! resumes on its own.

use chrono::{DateTime, Local};
use pomelo_ipc::{Phase, RunState, SessionStatus};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::history::HistoryRecord;

pub const DEFAULT_LABEL: &str = "General Work";
const UNNAMED_LABEL: &str = "Unnamed Session";

/// Durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub work_duration: u64,
    pub short_break: u64,
    pub long_break: u64,
    pub sessions_until_long_break: u32,
}

impl Settings {
    pub fn from_minutes(work: u64, short_break: u64, long_break: u64, cycle: u32) -> Self {
        Self {
            work_duration: work.saturating_mul(60),
            short_break: short_break.saturating_mul(60),
            long_break: long_break.saturating_mul(60),
            sessions_until_long_break: cycle,
        }
    }

    pub fn validate(&self) -> Result<(), CycleError> {
        let durations = [
            ("work duration", self.work_duration),
            ("short break", self.short_break),
            ("long break", self.long_break),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, secs)| *secs == 0) {
            return Err(CycleError::InvalidConfig(format!("{name} must be positive")));
        }
        if self.sessions_until_long_break < 1 {
            return Err(CycleError::InvalidConfig(
                "sessions until long break must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn duration_for(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Work => self.work_duration,
            Phase::ShortBreak => self.short_break,
            Phase::LongBreak => self.long_break,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_minutes(25, 5, 15, 4)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CycleError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot {0} while the timer is running")]
    IllegalStateTransition(&'static str),
}

pub trait Clock {
    fn now(&self) -> DateTime<Local>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Receives one record per completed Work phase.
pub trait HistorySink {
    fn append(&mut self, record: &HistoryRecord) -> anyhow::Result<()>;
}

/// Surfaces a user-visible alert when a phase completes.
pub trait Notifier {
    fn notify(&mut self, title: &str, body: &str) -> anyhow::Result<()>;
}

/// Fired on start, pause, reset and every phase transition.
pub trait StatusObserver {
    fn on_state_changed(&mut self, phase: Phase, state: RunState) -> anyhow::Result<()>;
}

/// What a single `tick()` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running and nothing pending.
    Idle,
    Progress { remaining: u64, total: u64 },
    Completed { finished: Phase, next: Phase },
    /// The pending auto-resume fired. Observers are not told again: the
    /// gap before it is already reported as running.
    Resumed,
}

pub struct CycleMachine {
    settings: Settings,
    phase: Phase,
    remaining: u64,
    total: u64,
    completed_work_sessions: u32,
    work_ordinal: u32,
    run_state: RunState,
    label: String,
    started_at: Option<DateTime<Local>>,
    resume_pending: bool,
    clock: Box<dyn Clock>,
    history: Option<Box<dyn HistorySink>>,
    notifier: Option<Box<dyn Notifier>>,
    observers: Vec<Box<dyn StatusObserver>>,
}

impl CycleMachine {
    /// Create a stopped machine at the start of a Work phase.
    pub fn new(settings: Settings, clock: Box<dyn Clock>) -> Result<Self, CycleError> {
        settings.validate()?;
        Ok(Self {
            settings,
            phase: Phase::Work,
            remaining: settings.work_duration,
            total: settings.work_duration,
            completed_work_sessions: 0,
            work_ordinal: 1,
            run_state: RunState::Stopped,
            label: DEFAULT_LABEL.to_string(),
            started_at: None,
            resume_pending: false,
            clock,
            history: None,
            notifier: None,
            observers: Vec::new(),
        })
    }

    pub fn with_history(mut self, sink: Box<dyn HistorySink>) -> Self {
        self.history = Some(sink);
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Observers are notified in registration order.
    pub fn add_observer(&mut self, observer: Box<dyn StatusObserver>) {
        self.observers.push(observer);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn completed_work_sessions(&self) -> u32 {
        self.completed_work_sessions
    }

    pub fn work_ordinal(&self) -> u32 {
        self.work_ordinal
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    pub fn resume_pending(&self) -> bool {
        self.resume_pending
    }

    /// The state shown to observers and remote clients. The one-tick gap
    /// before an auto-resume counts as running.
    pub fn reported_state(&self) -> RunState {
        if self.resume_pending {
            RunState::Running
        } else {
            self.run_state
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.started_at
    }

    /// 0.0 .. 1.0 progress within the current phase.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.total - self.remaining) as f64 / self.total as f64
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            state: self.reported_state(),
            label: self.label.clone(),
            remaining: self.remaining,
            total: self.total,
            completed_work_sessions: self.completed_work_sessions,
            work_ordinal: self.work_ordinal,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Replace the settings. Only allowed while not running; the current
    /// phase restarts with its new duration.
    pub fn configure(&mut self, settings: Settings) -> Result<(), CycleError> {
        settings.validate()?;
        if self.is_running() {
            return Err(CycleError::IllegalStateTransition("reconfigure"));
        }
        self.settings = settings;
        self.total = settings.duration_for(self.phase);
        self.remaining = self.total;
        info!(?settings, phase = ?self.phase, "settings applied");
        Ok(())
    }

    pub fn set_label(&mut self, label: &str) {
        let trimmed = label.trim();
        self.label = if trimmed.is_empty() {
            UNNAMED_LABEL.to_string()
        } else {
            trimmed.to_string()
        };
    }

    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let was_pending = self.resume_pending;
        self.run_state = RunState::Running;
        self.resume_pending = false;
        self.started_at = Some(self.clock.now());
        info!(phase = ?self.phase, remaining = self.remaining, "timer started");
        if !was_pending {
            self.emit_status();
        }
    }

    /// Halts the countdown. Also cancels an auto-resume that is waiting
    /// for its tick.
    pub fn pause(&mut self) {
        if self.resume_pending {
            self.resume_pending = false;
            info!(phase = ?self.phase, "auto-resume cancelled");
            self.emit_status();
            return;
        }
        if !self.is_running() {
            return;
        }
        self.run_state = RunState::Paused;
        info!(phase = ?self.phase, remaining = self.remaining, "timer paused");
        self.emit_status();
    }

    pub fn reset(&mut self) {
        self.run_state = RunState::Stopped;
        self.resume_pending = false;
        self.phase = Phase::Work;
        self.completed_work_sessions = 0;
        self.work_ordinal = 1;
        self.started_at = None;
        self.total = self.settings.work_duration;
        self.remaining = self.total;
        info!("timer reset");
        self.emit_status();
    }

    /// Call once per elapsed second.
    pub fn tick(&mut self) -> TickOutcome {
        match self.run_state {
            RunState::Running if self.remaining > 0 => {
                self.remaining = self.remaining.saturating_sub(1);
                debug!(remaining = self.remaining, "tick");
                TickOutcome::Progress {
                    remaining: self.remaining,
                    total: self.total,
                }
            }
            RunState::Running => self.complete_phase(),
            _ if self.resume_pending => {
                self.start();
                TickOutcome::Resumed
            }
            _ => TickOutcome::Idle,
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn complete_phase(&mut self) -> TickOutcome {
        let finished = self.phase;
        let ended_at = self.clock.now();

        if finished == Phase::Work {
            let started_at = self.started_at.unwrap_or(ended_at);
            let record =
                HistoryRecord::work(&self.label, self.total, started_at, ended_at, &self.settings);
            if let Some(sink) = self.history.as_mut() {
                if let Err(e) = sink.append(&record) {
                    warn!(error = %e, "failed to record session history");
                }
            }
        }

        let (title, body) = completion_message(finished);
        if let Some(notifier) = self.notifier.as_mut() {
            if let Err(e) = notifier.notify(title, body) {
                warn!(error = %e, "failed to send completion notification");
            }
        }

        let next = match finished {
            Phase::Work => {
                self.completed_work_sessions += 1;
                if self.completed_work_sessions % self.settings.sessions_until_long_break == 0 {
                    Phase::LongBreak
                } else {
                    Phase::ShortBreak
                }
            }
            Phase::ShortBreak | Phase::LongBreak => {
                self.work_ordinal += 1;
                Phase::Work
            }
        };

        self.phase = next;
        self.total = self.settings.duration_for(next);
        self.remaining = self.total;
        self.run_state = RunState::Paused;
        self.resume_pending = true;
        info!(
            ?finished,
            ?next,
            completed = self.completed_work_sessions,
            "phase completed"
        );
        self.emit_status();

        TickOutcome::Completed { finished, next }
    }

    fn emit_status(&mut self) {
        let (phase, state) = (self.phase, self.reported_state());
        for observer in &mut self.observers {
            if let Err(e) = observer.on_state_changed(phase, state) {
                warn!(error = %e, "status observer failed");
            }
        }
    }
}

pub fn completion_message(finished: Phase) -> (&'static str, &'static str) {
    match finished {
        Phase::Work => ("Work Session Complete!", "Time for a break. Great job!"),
        Phase::ShortBreak | Phase::LongBreak => {
            ("Break Time Over!", "Ready to get back to work?")
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use proptest::prelude::*;

    struct FailingCollaborator;

    impl HistorySink for FailingCollaborator {
        fn append(&mut self, _record: &HistoryRecord) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    impl Notifier for FailingCollaborator {
        fn notify(&mut self, _title: &str, _body: &str) -> anyhow::Result<()> {
            anyhow::bail!("no notification daemon")
        }
    }

    impl StatusObserver for FailingCollaborator {
        fn on_state_changed(&mut self, _phase: Phase, _state: RunState) -> anyhow::Result<()> {
            anyhow::bail!("terminal gone")
        }
    }

    fn machine(settings: Settings) -> CycleMachine {
        CycleMachine::new(settings, Box::new(ManualClock::new())).unwrap()
    }

    #[test]
    fn new_machine_is_stopped_at_first_work_phase() {
        let m = machine(Settings::default());
        assert_eq!(m.phase(), Phase::Work);
        assert_eq!(m.run_state(), RunState::Stopped);
        assert_eq!(m.remaining(), 1500);
        assert_eq!(m.total(), 1500);
        assert_eq!(m.work_ordinal(), 1);
        assert_eq!(m.completed_work_sessions(), 0);
        assert_eq!(m.label(), DEFAULT_LABEL);
    }

    #[test]
    fn ticks_are_ignored_until_started() {
        let mut m = machine(Settings::default());
        assert_eq!(m.tick(), TickOutcome::Idle);
        assert_eq!(m.remaining(), 1500);
    }

    #[test]
    fn pause_then_start_resumes_from_exact_remaining() {
        let mut m = machine(Settings::default());
        m.start();
        for _ in 0..7 {
            m.tick();
        }
        m.pause();
        assert_eq!(m.run_state(), RunState::Paused);
        assert_eq!(m.tick(), TickOutcome::Idle);
        m.start();
        assert_eq!(m.remaining(), 1493);
        assert_eq!(
            m.tick(),
            TickOutcome::Progress {
                remaining: 1492,
                total: 1500
            }
        );
    }

    #[test]
    fn start_and_pause_are_idempotent() {
        let observer = RecordingObserver::default();
        let mut m = machine(Settings::default());
        m.add_observer(Box::new(observer.clone()));

        m.pause();
        m.start();
        m.start();
        m.pause();
        m.pause();

        assert_eq!(
            *observer.0.borrow(),
            vec![
                (Phase::Work, RunState::Running),
                (Phase::Work, RunState::Paused)
            ]
        );
    }

    #[test]
    fn tick_never_goes_below_zero() {
        let mut m = machine(short_settings(4));
        m.start();
        for _ in 0..3 {
            m.tick();
        }
        assert_eq!(m.remaining(), 0);
        assert_eq!(m.progress(), 1.0);
        // The zero tick completes the phase instead of decrementing.
        assert!(matches!(m.tick(), TickOutcome::Completed { .. }));
        assert_eq!(m.remaining(), m.total());
    }

    #[test]
    fn completion_waits_one_tick_then_resumes() {
        let observer = RecordingObserver::default();
        let mut m = machine(short_settings(4));
        m.add_observer(Box::new(observer.clone()));
        m.start();
        for _ in 0..3 {
            m.tick();
        }

        assert_eq!(
            m.tick(),
            TickOutcome::Completed {
                finished: Phase::Work,
                next: Phase::ShortBreak
            }
        );
        assert_eq!(m.run_state(), RunState::Paused);
        assert!(m.resume_pending());
        assert_eq!(m.remaining(), 1);

        assert_eq!(m.reported_state(), RunState::Running);
        assert_eq!(m.status().state, RunState::Running);

        assert_eq!(m.tick(), TickOutcome::Resumed);
        assert!(m.is_running());
        assert_eq!(m.remaining(), 1);

        assert_eq!(
            *observer.0.borrow(),
            vec![
                (Phase::Work, RunState::Running),
                (Phase::ShortBreak, RunState::Running),
            ]
        );
    }

    #[test]
    fn pause_during_resume_gap_cancels_auto_resume() {
        let observer = RecordingObserver::default();
        let mut m = machine(short_settings(4));
        m.add_observer(Box::new(observer.clone()));
        m.start();
        finish_phase_without_resume(&mut m);
        m.pause();
        assert!(!m.resume_pending());
        assert_eq!(m.tick(), TickOutcome::Idle);
        assert_eq!(m.run_state(), RunState::Paused);
        assert_eq!(m.status().state, RunState::Paused);
        assert_eq!(
            observer.0.borrow().last(),
            Some(&(Phase::ShortBreak, RunState::Paused))
        );
    }

    fn finish_phase_without_resume(m: &mut CycleMachine) {
        while !matches!(m.tick(), TickOutcome::Completed { .. }) {}
    }

    #[test]
    fn fourth_work_completion_selects_long_break() {
        let mut m = machine(Settings {
            work_duration: 1500,
            short_break: 300,
            long_break: 900,
            sessions_until_long_break: 4,
        });
        m.start();
        let mut breaks = Vec::new();
        for _ in 0..4 {
            let (finished, next) = finish_phase(&mut m);
            assert_eq!(finished, Phase::Work);
            breaks.push(next);
            let (finished, next) = finish_phase(&mut m);
            assert!(finished.is_break());
            assert_eq!(next, Phase::Work);
        }
        assert_eq!(
            breaks,
            vec![
                Phase::ShortBreak,
                Phase::ShortBreak,
                Phase::ShortBreak,
                Phase::LongBreak
            ]
        );
        assert_eq!(m.completed_work_sessions(), 4);
        assert_eq!(m.work_ordinal(), 5);
    }

    #[test]
    fn long_break_uses_long_break_duration() {
        let mut m = machine(short_settings(1));
        m.start();
        let (_, next) = finish_phase(&mut m);
        assert_eq!(next, Phase::LongBreak);
        assert_eq!(m.total(), 2);
        assert_eq!(m.remaining(), 2);
    }

    #[test]
    fn one_history_record_per_work_phase_and_none_for_breaks() {
        let sink = RecordingSink::default();
        let clock = ManualClock::new();
        let mut m = CycleMachine::new(short_settings(2), Box::new(clock.clone()))
            .unwrap()
            .with_history(Box::new(sink.clone()));
        m.set_label("Deep focus");
        m.start();

        for _ in 0..6 {
            finish_phase(&mut m);
        }

        let records = sink.0.borrow();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.name == "Deep focus"));
        assert!(records.iter().all(|r| r.planned_duration == 3));
    }

    #[test]
    fn history_record_measures_wall_clock_since_start() {
        let sink = RecordingSink::default();
        let clock = ManualClock::new();
        let mut m = CycleMachine::new(short_settings(4), Box::new(clock.clone()))
            .unwrap()
            .with_history(Box::new(sink.clone()));
        m.start();
        let started = clock.now();
        for _ in 0..3 {
            clock.advance_secs(1);
            m.tick();
        }
        clock.advance_secs(1);
        m.tick();

        let records = sink.0.borrow();
        let record = &records[0];
        assert_eq!(record.start_time, started);
        assert_eq!(record.actual_duration, 4);
        assert_eq!(record.end_time - record.start_time, chrono::Duration::seconds(4));
    }

    #[test]
    fn notifications_carry_phase_specific_messages() {
        let notifier = RecordingNotifier::default();
        let mut m = machine(short_settings(4)).with_notifier(Box::new(notifier.clone()));
        m.start();
        finish_phase(&mut m);
        finish_phase(&mut m);

        let sent = notifier.0.borrow();
        assert_eq!(sent[0].0, "Work Session Complete!");
        assert_eq!(sent[1].0, "Break Time Over!");
    }

    #[test]
    fn configure_rejects_zero_work_and_keeps_state() {
        let mut m = machine(Settings::default());
        m.start();
        m.tick();
        m.pause();

        let err = m
            .configure(Settings {
                work_duration: 0,
                ..Settings::default()
            })
            .unwrap_err();
        assert!(matches!(err, CycleError::InvalidConfig(_)));
        assert_eq!(m.remaining(), 1499);
        assert_eq!(m.total(), 1500);
        assert_eq!(m.settings(), &Settings::default());
    }

    #[test]
    fn configure_rejects_cycle_below_one() {
        let mut m = machine(Settings::default());
        let err = m.configure(short_settings(0)).unwrap_err();
        assert!(matches!(err, CycleError::InvalidConfig(_)));
    }

    #[test]
    fn configure_is_refused_while_running() {
        let mut m = machine(Settings::default());
        m.start();
        assert_eq!(
            m.configure(short_settings(2)),
            Err(CycleError::IllegalStateTransition("reconfigure"))
        );
        assert_eq!(m.total(), 1500);
    }

    #[test]
    fn configure_restarts_current_phase_only() {
        let mut m = machine(short_settings(4));
        m.start();
        finish_phase(&mut m);
        m.pause();
        assert_eq!(m.phase(), Phase::ShortBreak);

        m.configure(Settings::default()).unwrap();
        assert_eq!(m.phase(), Phase::ShortBreak);
        assert_eq!(m.total(), 300);
        assert_eq!(m.remaining(), 300);
        assert_eq!(m.completed_work_sessions(), 1);
    }

    #[test]
    fn reset_returns_to_first_work_phase_and_keeps_label() {
        let observer = RecordingObserver::default();
        let mut m = machine(short_settings(4));
        m.add_observer(Box::new(observer.clone()));
        m.set_label("Writing");
        m.start();
        finish_phase(&mut m);
        finish_phase(&mut m);

        m.reset();
        assert_eq!(m.phase(), Phase::Work);
        assert_eq!(m.run_state(), RunState::Stopped);
        assert_eq!(m.completed_work_sessions(), 0);
        assert_eq!(m.work_ordinal(), 1);
        assert_eq!(m.remaining(), 3);
        assert_eq!(m.label(), "Writing");
        assert_eq!(
            observer.0.borrow().last(),
            Some(&(Phase::Work, RunState::Stopped))
        );
    }

    #[test]
    fn blank_label_becomes_unnamed() {
        let mut m = machine(Settings::default());
        m.set_label("   ");
        assert_eq!(m.label(), "Unnamed Session");
    }

    #[test]
    fn failing_collaborators_do_not_disturb_the_cycle() {
        let mut m = machine(short_settings(2))
            .with_history(Box::new(FailingCollaborator))
            .with_notifier(Box::new(FailingCollaborator));
        m.add_observer(Box::new(FailingCollaborator));
        let observer = RecordingObserver::default();
        m.add_observer(Box::new(observer.clone()));

        m.start();
        assert_eq!(finish_phase(&mut m), (Phase::Work, Phase::ShortBreak));
        assert_eq!(finish_phase(&mut m), (Phase::ShortBreak, Phase::Work));
        assert_eq!(finish_phase(&mut m), (Phase::Work, Phase::LongBreak));
        assert!(m.is_running());
        // Later observers still hear about every change.
        assert_eq!(observer.0.borrow().len(), 4);
    }

    #[test]
    fn progress_ratio_tracks_elapsed_share() {
        let mut m = machine(Settings {
            work_duration: 4,
            ..short_settings(4)
        });
        assert_eq!(m.progress(), 0.0);
        m.start();
        m.tick();
        assert_eq!(m.progress(), 0.25);
    }

    proptest! {
        #[test]
        fn long_break_follows_every_kth_work_phase(n in 1u32..30, k in 1u32..8) {
            let mut m = machine(short_settings(k));
            m.start();
            let mut last_break = None;
            for _ in 0..n {
                let (finished, next) = finish_phase(&mut m);
                prop_assert_eq!(finished, Phase::Work);
                last_break = Some(next);
                finish_phase(&mut m);
            }
            let expected = if n % k == 0 { Phase::LongBreak } else { Phase::ShortBreak };
            prop_assert_eq!(last_break, Some(expected));
            prop_assert_eq!(m.completed_work_sessions(), n);
        }

        #[test]
        fn remaining_stays_within_total(ticks in 0usize..200) {
            let mut m = machine(short_settings(3));
            m.start();
            for _ in 0..ticks {
                m.tick();
                prop_assert!(m.remaining() <= m.total());
            }
        }
    }
}
