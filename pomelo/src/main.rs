use anyhow::{Context, Result};
use crossterm::{
    event::{Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use pomelo_ipc::ExportFormat;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::fs::File;
use std::io;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod cycle;
mod event;
mod history;
mod ipc;
mod notify;
mod persistence;
mod presets;
mod ticker;
mod ui;

use app::{App, AppMode};
use config::Config;
use cycle::{CycleMachine, SystemClock};
use crate::event::AppEvent;
use history::SharedHistory;
use notify::{DesktopNotifier, LogObserver, TitleIndicator};
use persistence::Persistence;
use ticker::{Ticker, TICK_PERIOD};

fn main() -> Result<()> {
    let store = Persistence::open_default()?;
    init_logging(&store)?;

    let config = config::load_config().unwrap_or_else(|e| {
        warn!("Falling back to default config: {:#}", e);
        Config::default()
    });

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let _guard = runtime.enter();
    let (tx, rx) = mpsc::unbounded_channel();

    let _socket = match ipc::server::bind(&pomelo_ipc::socket_path()) {
        Ok((listener, guard)) => {
            runtime.spawn(ipc::server::serve(listener, tx.clone()));
            Some(guard)
        }
        Err(e) => {
            warn!("Remote control disabled: {:#}", e);
            None
        }
    };

    let app = build_app(config, store, Ticker::new(TICK_PERIOD, tx))?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app, rx);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    info!("pomelo exiting");

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

fn init_logging(store: &Persistence) -> Result<()> {
    let path = store.data_dir().join("pomelo.log");
    let file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
    let filter = EnvFilter::try_from_env("POMELO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn build_app(config: Config, store: Persistence, ticker: Ticker) -> Result<App> {
    let history = SharedHistory::new(store.load_history()?, Some(store.clone()));
    let presets = store.load_presets()?;

    let mut machine = CycleMachine::new(config.timer.settings(), Box::new(SystemClock))
        .context("Invalid timer settings in config")?
        .with_history(Box::new(history.clone()))
        .with_notifier(Box::new(DesktopNotifier::new(config.notifications.clone())));
    machine.add_observer(Box::new(TitleIndicator::new(config.icons.clone())));
    machine.add_observer(Box::new(LogObserver));
    machine.set_label(&config.timer.label);

    Ok(App::new(config, machine, history, presets, ticker, Some(store)))
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    mut events: UnboundedReceiver<AppEvent>,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, &app))?;

        if crossterm::event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = crossterm::event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(&mut app, key);
                }
            }
        }

        while let Ok(event) = events.try_recv() {
            match event {
                AppEvent::Tick(tick) => {
                    app.handle_tick(tick);
                }
                AppEvent::Remote(request) => {
                    let response = app.handle_remote(request.command);
                    let _ = request.reply.send(response);
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    app.status_message = None;
    match app.mode {
        AppMode::Normal => match key.code {
            KeyCode::Char('q') => app.should_quit = true,
            KeyCode::Char(' ') => app.toggle(),
            KeyCode::Char('s') => app.start(),
            KeyCode::Char('p') => app.pause(),
            KeyCode::Char('r') => app.reset(),
            KeyCode::Char('l') => app.begin_input(AppMode::EditingLabel),
            KeyCode::Char('c') => app.begin_input(AppMode::EditingSettings),
            KeyCode::Char('w') => app.begin_input(AppMode::NamingPreset),
            KeyCode::Char('o') => app.cycle_preset(),
            KeyCode::Char('D') => app.delete_selected_preset(),
            KeyCode::Char('h') => app.mode = AppMode::ShowHistory,
            _ => {}
        },
        AppMode::ShowHistory => match key.code {
            KeyCode::Char('q') => app.should_quit = true,
            KeyCode::Char('h') | KeyCode::Esc => app.mode = AppMode::Normal,
            KeyCode::Char('/') => app.begin_input(AppMode::FilteringHistory),
            KeyCode::Char('t') => app.toggle_today_filter(),
            KeyCode::Char('e') => app.export_to_file(ExportFormat::Csv),
            KeyCode::Char('E') => app.export_to_file(ExportFormat::Json),
            KeyCode::Char('X') => app.clear_history(),
            KeyCode::Char(' ') => app.toggle(),
            _ => {}
        },
        AppMode::EditingLabel
        | AppMode::EditingSettings
        | AppMode::NamingPreset
        | AppMode::FilteringHistory => match key.code {
            KeyCode::Esc => app.cancel_input(),
            KeyCode::Enter => app.handle_char('\n'),
            KeyCode::Backspace => app.handle_backspace(),
            KeyCode::Char(c) => app.handle_char(c),
            _ => {}
        },
    }
}
