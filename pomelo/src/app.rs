use crate::config::Config;
use crate::cycle::{CycleError, CycleMachine, Settings, TickOutcome};
use crate::history::{self, HistoryFilter, HistoryRecord, SharedHistory};
use crate::persistence::Persistence;
use crate::presets::{Presets, SessionPreset};
use crate::ticker::{Tick, Ticker};
use anyhow::Context;
use chrono::Local;
use pomelo_ipc::{Command, ExportFormat, HistoryEntry, Response};
use tracing::{debug, warn};

#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum AppMode {
    #[default]
    Normal,
    EditingLabel,
    EditingSettings,
    NamingPreset,
    ShowHistory,
    FilteringHistory,
}

pub struct App {
    pub machine: CycleMachine,
    pub history: SharedHistory,
    pub presets: Presets,
    pub selected_preset: Option<String>,
    pub history_filter: HistoryFilter,
    pub mode: AppMode,
    pub input_buffer: String,
    pub config: Config,
    pub status_message: Option<String>,
    pub should_quit: bool,
    /// Settings refused while running; applied on the next reset.
    pending_settings: Option<Settings>,
    ticker: Ticker,
    store: Option<Persistence>,
}

impl App {
    pub fn new(
        config: Config,
        machine: CycleMachine,
        history: SharedHistory,
        presets: Presets,
        ticker: Ticker,
        store: Option<Persistence>,
    ) -> Self {
        Self {
            machine,
            history,
            presets,
            selected_preset: None,
            history_filter: HistoryFilter::default(),
            mode: AppMode::Normal,
            input_buffer: String::new(),
            config,
            status_message: None,
            should_quit: false,
            pending_settings: None,
            ticker,
            store,
        }
    }

    // ── Timer control ────────────────────────────────────────────────

    pub fn start(&mut self) {
        if self.machine.is_running() {
            return;
        }
        self.machine.start();
        self.ticker.restart();
    }

    pub fn pause(&mut self) {
        self.machine.pause();
        if !self.machine.is_running() {
            self.ticker.stop();
        }
    }

    pub fn toggle(&mut self) {
        if self.machine.is_running() || self.machine.resume_pending() {
            self.pause();
        } else {
            self.start();
        }
    }

    pub fn reset(&mut self) {
        self.ticker.stop();
        self.machine.reset();
        if let Some(settings) = self.pending_settings.take() {
            match self.machine.configure(settings) {
                Ok(()) => self.status_message = Some("Queued settings applied".to_string()),
                Err(e) => self.status_message = Some(e.to_string()),
            }
        }
    }

    /// Feed one tick from the ticker. Ticks from a replaced trigger are
    /// dropped.
    pub fn handle_tick(&mut self, tick: Tick) -> Option<TickOutcome> {
        if !self.ticker.is_current(&tick) {
            debug!(generation = tick.generation, "dropping stale tick");
            return None;
        }
        let outcome = self.machine.tick();
        match outcome {
            TickOutcome::Completed { finished, next } => {
                self.status_message = Some(format!(
                    "{} finished, {} starts shortly",
                    finished.title(),
                    next.title()
                ));
            }
            TickOutcome::Idle => self.ticker.stop(),
            TickOutcome::Progress { .. } | TickOutcome::Resumed => {}
        }
        Some(outcome)
    }

    /// Apply settings now, or queue them until reset when the timer runs.
    pub fn configure(&mut self, settings: Settings) -> Result<(), CycleError> {
        match self.machine.configure(settings) {
            Ok(()) => {
                self.pending_settings = None;
                Ok(())
            }
            Err(e @ CycleError::IllegalStateTransition(_)) => {
                self.pending_settings = Some(settings);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub fn pending_settings(&self) -> Option<&Settings> {
        self.pending_settings.as_ref()
    }

    // ── Presets ──────────────────────────────────────────────────────

    pub fn save_preset(&mut self, name: &str) {
        let settings = self
            .pending_settings
            .unwrap_or(*self.machine.settings());
        match self.presets.save(SessionPreset::from_settings(name, &settings)) {
            Ok(()) => {
                let name = name.trim().to_string();
                self.persist_presets();
                self.status_message = Some(format!("Session \"{}\" saved!", name));
                self.selected_preset = Some(name);
            }
            Err(e) => self.status_message = Some(e.to_string()),
        }
    }

    /// Select the next saved preset and load it.
    pub fn cycle_preset(&mut self) {
        let next = self
            .presets
            .next_name(self.selected_preset.as_deref())
            .map(str::to_string);
        match next {
            Some(name) => self.load_preset(&name),
            None => self.status_message = Some("No saved sessions".to_string()),
        }
    }

    pub fn load_preset(&mut self, name: &str) {
        let Some(preset) = self.presets.get(name).cloned() else {
            self.status_message = Some(format!("No saved session named '{}'", name));
            return;
        };
        self.selected_preset = Some(preset.name.clone());
        self.machine.set_label(&preset.name);
        self.status_message = Some(match self.configure(preset.settings()) {
            Ok(()) => format!("Loaded \"{}\"", preset.name),
            Err(CycleError::IllegalStateTransition(_)) => {
                format!("Loaded \"{}\"; durations apply after reset", preset.name)
            }
            Err(e) => e.to_string(),
        });
    }

    pub fn delete_selected_preset(&mut self) {
        let Some(name) = self.selected_preset.take() else {
            self.status_message = Some("Please select a session to delete".to_string());
            return;
        };
        match self.presets.remove(&name) {
            Ok(_) => {
                self.persist_presets();
                self.status_message = Some(format!("Session \"{}\" deleted!", name));
            }
            Err(e) => self.status_message = Some(e.to_string()),
        }
    }

    fn persist_presets(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_presets(&self.presets) {
                warn!("Failed to save presets: {:#}", e);
            }
        }
    }

    // ── History ──────────────────────────────────────────────────────

    pub fn history_entries(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        let history = self.history.borrow();
        history
            .newest_first()
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|r| r.to_entry())
            .collect()
    }

    pub fn export_history(&self, format: ExportFormat) -> Result<String, history::HistoryError> {
        let history = self.history.borrow();
        let records = history.filter(&HistoryFilter::default());
        history::export(&records, format)
    }

    /// Records matching the history view's filter, newest first.
    pub fn filtered_history(&self) -> Vec<HistoryRecord> {
        self.history
            .borrow()
            .filter(&self.history_filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn toggle_today_filter(&mut self) {
        self.history_filter.date = match self.history_filter.date {
            Some(_) => None,
            None => Some(Local::now().date_naive()),
        };
    }

    /// Write the filtered records next to the history file.
    pub fn export_to_file(&mut self, format: ExportFormat) {
        let Some(store) = &self.store else {
            return;
        };
        let file = match format {
            ExportFormat::Json => "pomodoro-history.json",
            ExportFormat::Csv => "pomodoro-history.csv",
        };
        let path = store.data_dir().join(file);
        let exported = {
            let history = self.history.borrow();
            let records = history.filter(&self.history_filter);
            history::export(&records, format)
        };
        let result = exported.map_err(anyhow::Error::from).and_then(|content| {
            std::fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))
        });
        self.status_message = Some(match result {
            Ok(()) => format!("Exported to {}", path.display()),
            Err(e) => format!("{:#}", e),
        });
    }

    pub fn clear_history(&mut self) {
        self.status_message = Some(match self.history.clear() {
            Ok(()) => "Session history cleared".to_string(),
            Err(e) => format!("Failed to clear history: {:#}", e),
        });
    }

    // ── Remote control ───────────────────────────────────────────────

    pub fn handle_remote(&mut self, command: Command) -> Response {
        match command {
            Command::Start => {
                self.start();
                Response::Ok
            }
            Command::Pause => {
                self.pause();
                Response::Ok
            }
            Command::Toggle => {
                self.toggle();
                Response::Ok
            }
            Command::Reset => {
                self.reset();
                Response::Ok
            }
            Command::Status => Response::Status(self.machine.status()),
            Command::SetLabel { name } => {
                self.machine.set_label(&name);
                Response::Ok
            }
            Command::Configure {
                work,
                short_break,
                long_break,
                sessions_until_long_break,
            } => {
                let settings =
                    Settings::from_minutes(work, short_break, long_break, sessions_until_long_break);
                match self.configure(settings) {
                    Ok(()) => Response::Ok,
                    Err(e @ CycleError::IllegalStateTransition(_)) => {
                        Response::Error(format!("{}; queued until reset", e))
                    }
                    Err(e) => Response::Error(e.to_string()),
                }
            }
            Command::History { limit } => Response::History(self.history_entries(limit)),
            Command::Export { format } => match self.export_history(format) {
                Ok(content) => Response::Export(content),
                Err(e) => Response::Error(e.to_string()),
            },
        }
    }

    // ── Text input ───────────────────────────────────────────────────

    pub fn begin_input(&mut self, mode: AppMode) {
        self.input_buffer = match mode {
            AppMode::EditingLabel => self.machine.label().to_string(),
            AppMode::FilteringHistory => self.history_filter.name.clone().unwrap_or_default(),
            AppMode::EditingSettings => {
                let s = self.pending_settings.unwrap_or(*self.machine.settings());
                format!(
                    "{} {} {} {}",
                    s.work_duration / 60,
                    s.short_break / 60,
                    s.long_break / 60,
                    s.sessions_until_long_break
                )
            }
            _ => String::new(),
        };
        self.mode = mode;
    }

    pub fn cancel_input(&mut self) {
        self.mode = match self.mode {
            AppMode::FilteringHistory => AppMode::ShowHistory,
            _ => AppMode::Normal,
        };
        self.input_buffer.clear();
    }

    pub fn handle_char(&mut self, c: char) {
        match self.mode {
            AppMode::EditingLabel | AppMode::NamingPreset | AppMode::FilteringHistory => {
                if c == '\n' {
                    self.submit_input();
                } else {
                    self.input_buffer.push(c);
                }
            }
            AppMode::EditingSettings => {
                if c == '\n' {
                    self.submit_input();
                } else if c.is_ascii_digit() || c == ' ' {
                    self.input_buffer.push(c);
                }
            }
            _ => {}
        }
    }

    pub fn handle_backspace(&mut self) {
        if matches!(
            self.mode,
            AppMode::EditingLabel
                | AppMode::EditingSettings
                | AppMode::NamingPreset
                | AppMode::FilteringHistory
        ) {
            self.input_buffer.pop();
        }
    }

    fn submit_input(&mut self) {
        let input = std::mem::take(&mut self.input_buffer);
        let mut next_mode = AppMode::Normal;
        match self.mode {
            AppMode::FilteringHistory => {
                let needle = input.trim();
                self.history_filter.name = (!needle.is_empty()).then(|| needle.to_string());
                next_mode = AppMode::ShowHistory;
            }
            AppMode::EditingLabel => self.machine.set_label(&input),
            AppMode::NamingPreset => self.save_preset(&input),
            AppMode::EditingSettings => {
                self.status_message = Some(match parse_settings(&input) {
                    Ok(settings) => match self.configure(settings) {
                        Ok(()) => "Settings applied".to_string(),
                        Err(CycleError::IllegalStateTransition(_)) => {
                            "Timer is running; settings apply after reset".to_string()
                        }
                        Err(e) => e.to_string(),
                    },
                    Err(e) => e.to_string(),
                });
            }
            _ => {}
        }
        self.mode = next_mode;
    }
}

/// Parse "work short long cycle", durations in minutes.
pub fn parse_settings(input: &str) -> Result<Settings, CycleError> {
    let numbers: Vec<u64> = input
        .split_whitespace()
        .map(|part| part.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|e| CycleError::InvalidConfig(e.to_string()))?;
    let [work, short_break, long_break, cycle] = numbers[..] else {
        return Err(CycleError::InvalidConfig(
            "expected: work short long sessions".to_string(),
        ));
    };
    let cycle = u32::try_from(cycle).map_err(|e| CycleError::InvalidConfig(e.to_string()))?;
    let settings = Settings::from_minutes(work, short_break, long_break, cycle);
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::test_support::{short_settings, ManualClock};
    use crate::event::AppEvent;
    use crate::history::History;
    use crate::ticker::TICK_PERIOD;
    use pomelo_ipc::{Phase, RunState};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn app(settings: Settings) -> (App, UnboundedReceiver<AppEvent>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Persistence::at(dir.path()).unwrap();
        let history = SharedHistory::new(History::default(), Some(store.clone()));
        let machine = CycleMachine::new(settings, Box::new(ManualClock::new()))
            .unwrap()
            .with_history(Box::new(history.clone()));
        let (tx, rx) = mpsc::unbounded_channel();
        let ticker = Ticker::new(TICK_PERIOD, tx);
        let app = App::new(
            Config::default(),
            machine,
            history,
            Presets::default(),
            ticker,
            Some(store),
        );
        (app, rx, dir)
    }

    async fn next_tick(rx: &mut UnboundedReceiver<AppEvent>) -> Tick {
        loop {
            if let Some(AppEvent::Tick(tick)) = rx.recv().await {
                return tick;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_completion_per_expiry_across_restarts() {
        let (mut app, mut rx, _dir) = app(short_settings(4));
        app.start();
        app.pause();
        app.start();
        app.start();

        let mut completions = 0;
        let mut accepted = 0;
        while accepted < 4 {
            let tick = next_tick(&mut rx).await;
            match app.handle_tick(tick) {
                Some(TickOutcome::Completed { .. }) => {
                    completions += 1;
                    accepted += 1;
                }
                Some(_) => accepted += 1,
                None => {}
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(app.history.borrow().len(), 1);
        assert_eq!(app.machine.phase(), Phase::ShortBreak);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_drops_ticks_already_queued() {
        let (mut app, mut rx, _dir) = app(short_settings(4));
        app.start();
        let tick = next_tick(&mut rx).await;
        app.pause();
        assert_eq!(app.handle_tick(tick), None);
        assert_eq!(app.machine.remaining(), 3);
    }

    #[tokio::test]
    async fn configure_while_running_is_queued_until_reset() {
        let (mut app, _rx, _dir) = app(Settings::default());
        app.start();

        let response = app.handle_remote(Command::Configure {
            work: 50,
            short_break: 10,
            long_break: 30,
            sessions_until_long_break: 2,
        });
        assert!(matches!(response, Response::Error(msg) if msg.contains("queued")));
        assert_eq!(app.machine.total(), 1500);

        app.reset();
        assert_eq!(app.machine.total(), 3000);
        assert!(app.pending_settings().is_none());
        assert_eq!(app.machine.run_state(), RunState::Stopped);
    }

    #[tokio::test]
    async fn invalid_remote_configure_is_reported() {
        let (mut app, _rx, _dir) = app(Settings::default());
        let response = app.handle_remote(Command::Configure {
            work: 0,
            short_break: 5,
            long_break: 15,
            sessions_until_long_break: 4,
        });
        assert!(matches!(response, Response::Error(msg) if msg.contains("work duration")));
        assert!(app.pending_settings().is_none());
    }

    #[tokio::test]
    async fn toggle_flips_between_running_and_paused() {
        let (mut app, _rx, _dir) = app(Settings::default());
        app.handle_remote(Command::Toggle);
        assert!(app.machine.is_running());
        app.handle_remote(Command::Toggle);
        assert_eq!(app.machine.run_state(), RunState::Paused);
        match app.handle_remote(Command::Status) {
            Response::Status(status) => assert_eq!(status.state, RunState::Paused),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn presets_save_load_and_delete() {
        let (mut app, _rx, dir) = app(Settings::default());
        app.begin_input(AppMode::EditingSettings);
        assert_eq!(app.input_buffer, "25 5 15 4");
        app.input_buffer = "40 8 20 3".to_string();
        app.handle_char('\n');
        app.save_preset("Reading");

        app.configure(Settings::default()).unwrap();
        app.load_preset("Reading");
        assert_eq!(app.machine.label(), "Reading");
        assert_eq!(app.machine.total(), 40 * 60);
        assert_eq!(app.selected_preset.as_deref(), Some("Reading"));

        let saved = Persistence::at(dir.path()).unwrap().load_presets().unwrap();
        assert_eq!(saved.names(), vec!["Reading"]);

        app.delete_selected_preset();
        assert!(app.presets.is_empty());
        assert!(app.selected_preset.is_none());
    }

    #[tokio::test]
    async fn history_and_export_over_ipc() {
        let (mut app, _rx, _dir) = app(short_settings(4));
        assert!(matches!(
            app.handle_remote(Command::Export {
                format: ExportFormat::Csv
            }),
            Response::Error(_)
        ));

        app.machine.start();
        while !matches!(app.machine.tick(), TickOutcome::Completed { .. }) {}

        match app.handle_remote(Command::History { limit: Some(5) }) {
            Response::History(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].planned, 3);
            }
            other => panic!("unexpected response: {:?}", other),
        }
        match app.handle_remote(Command::Export {
            format: ExportFormat::Csv,
        }) {
            Response::Export(csv) => assert_eq!(csv.lines().count(), 2),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn history_view_filters_by_name() {
        let (mut app, _rx, dir) = app(short_settings(4));
        for label in ["Deep work", "Email"] {
            app.machine.set_label(label);
            app.machine.start();
            while !matches!(app.machine.tick(), TickOutcome::Completed { .. }) {}
            app.machine.reset();
        }
        assert_eq!(app.filtered_history().len(), 2);

        app.mode = AppMode::ShowHistory;
        app.begin_input(AppMode::FilteringHistory);
        for c in "deep\n".chars() {
            app.handle_char(c);
        }
        assert_eq!(app.mode, AppMode::ShowHistory);
        let shown = app.filtered_history();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].name, "Deep work");

        app.export_to_file(ExportFormat::Csv);
        let csv = std::fs::read_to_string(dir.path().join("pomodoro-history.csv")).unwrap();
        assert_eq!(csv.lines().count(), 2);

        app.clear_history();
        assert!(app.filtered_history().is_empty());
    }

    #[test]
    fn settings_input_is_parsed_in_minutes() {
        assert_eq!(
            parse_settings(" 50 10  30 2 ").unwrap(),
            Settings::from_minutes(50, 10, 30, 2)
        );
        assert!(parse_settings("50 10 30").is_err());
        assert!(parse_settings("50 10 30 0").is_err());
        assert!(parse_settings("fifty 10 30 2").is_err());
    }
}
