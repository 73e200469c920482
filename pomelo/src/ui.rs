use crate::app::{App, AppMode};
use crate::history::HistoryRecord;
use chrono::Local;
use pomelo_ipc::RunState;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Gauge, List, ListItem, Paragraph},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(8),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

    draw_header(f, chunks[0], app);
    draw_phase(f, chunks[1], app);
    if matches!(app.mode, AppMode::ShowHistory | AppMode::FilteringHistory) {
        draw_history(f, chunks[2], app);
    } else {
        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[2]);
        draw_presets(f, bottom[0], app);
        draw_summary(f, bottom[1], app);
    }
    draw_status_bar(f, chunks[3], app);

    match app.mode {
        AppMode::EditingLabel => draw_input_overlay(f, "Session Name", app),
        AppMode::EditingSettings => {
            draw_input_overlay(f, "Settings (work short long sessions, minutes)", app)
        }
        AppMode::NamingPreset => draw_input_overlay(f, "Save Session As", app),
        AppMode::FilteringHistory => draw_input_overlay(f, "Filter by Name", app),
        _ => {}
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let text = Line::from(vec![
        Span::raw(icons.header_left.clone()),
        Span::styled(
            "POMELO",
            Style::default()
                .fg(theme.palette().accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(icons.header_right.clone()),
    ]);
    f.render_widget(
        Paragraph::new(text).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(theme.black)),
        ),
        area,
    );
}

fn draw_phase(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let machine = &app.machine;
    let phase = machine.phase();
    let (main, secondary) = theme.phase_colors(phase);

    let state_icon = match machine.reported_state() {
        RunState::Running => &icons.play,
        RunState::Paused => &icons.pause,
        RunState::Stopped => &icons.stop,
    };
    let block = Block::default()
        .title(Span::styled(
            format!(" {} {} {} ", icons.phase(phase), phase.title(), state_icon),
            Style::default().fg(main).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(secondary));
    let inner_area = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner_area);

    let label = if phase.is_break() {
        "Take a break!".to_string()
    } else {
        machine.label().to_string()
    };
    f.render_widget(
        Paragraph::new(label)
            .style(Style::default().fg(theme.gray))
            .alignment(Alignment::Center),
        rows[0],
    );
    f.render_widget(
        Paragraph::new(format_clock(machine.remaining()))
            .style(
                Style::default()
                    .fg(theme.foreground)
                    .add_modifier(Modifier::BOLD),
            )
            .alignment(Alignment::Center),
        rows[2],
    );
    f.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(main).bg(theme.black))
            .ratio(machine.progress().clamp(0.0, 1.0))
            .label(""),
        rows[3],
    );

    let cycle = machine.settings().sessions_until_long_break;
    let done_in_cycle = machine.completed_work_sessions() % cycle;
    let session_line = Line::from(vec![
        Span::styled(
            format!("Session {} ", machine.work_ordinal()),
            Style::default().fg(theme.gray),
        ),
        Span::styled(
            cycle_bar(
                &icons.progress_filled,
                &icons.progress_empty,
                done_in_cycle,
                cycle,
            ),
            Style::default().fg(secondary),
        ),
    ]);
    f.render_widget(
        Paragraph::new(session_line).alignment(Alignment::Center),
        rows[4],
    );
}

fn draw_presets(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let icons = &app.config.icons;
    let block = Block::default()
        .title(Span::styled(" Saved Sessions ", Style::default().fg(theme.gray)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.palette().secondary));

    if app.presets.is_empty() {
        f.render_widget(
            Paragraph::new("No saved sessions. Press 'w' to save one.")
                .style(Style::default().fg(theme.gray))
                .alignment(Alignment::Center)
                .block(block),
            area,
        );
        return;
    }

    let items: Vec<ListItem> = app
        .presets
        .names()
        .into_iter()
        .filter_map(|name| app.presets.get(name))
        .map(|preset| {
            let selected = app.selected_preset.as_deref() == Some(preset.name.as_str());
            ListItem::new(Line::from(vec![
                if selected {
                    Span::styled(
                        format!("{} ", icons.select),
                        Style::default().fg(theme.yellow),
                    )
                } else {
                    Span::raw("  ")
                },
                Span::styled(preset.name.clone(), Style::default().fg(theme.foreground)),
                Span::styled(
                    format!(
                        " ({}/{}/{} ×{})",
                        preset.work_duration,
                        preset.short_break,
                        preset.long_break,
                        preset.sessions_until_long_break
                    ),
                    Style::default().fg(theme.gray),
                ),
            ]))
        })
        .collect();
    f.render_widget(List::new(items).block(block), area);
}

fn draw_summary(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let stats = app.history.borrow().stats(Local::now().date_naive());
    let settings = app.pending_settings().unwrap_or(app.machine.settings());

    let row = |name: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{:<16}", name), Style::default().fg(theme.gray)),
            Span::styled(value, Style::default().fg(theme.foreground)),
        ])
    };
    let mut lines = vec![
        row("Sessions", stats.total_sessions.to_string()),
        row("Today", stats.today_sessions.to_string()),
        row("Total time", stats.total_time_label()),
        row("Average", format!("{}m", stats.average_minutes)),
        Line::raw(""),
        row(
            "Durations",
            format!(
                "{}/{}/{} min",
                settings.work_duration / 60,
                settings.short_break / 60,
                settings.long_break / 60
            ),
        ),
        row(
            "Long break every",
            settings.sessions_until_long_break.to_string(),
        ),
    ];
    if app.pending_settings().is_some() {
        lines.push(Line::styled(
            "Applies after reset",
            Style::default().fg(theme.yellow),
        ));
    }

    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(Span::styled(" Summary ", Style::default().fg(theme.gray)))
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(theme.palette().secondary)),
        ),
        area,
    );
}

fn draw_history(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let filter = &app.history_filter;
    let mut title = String::from(" History ");
    if let Some(date) = filter.date {
        title.push_str(&format!("[{}] ", date.format("%Y-%m-%d")));
    }
    if let Some(name) = &filter.name {
        title.push_str(&format!("[\"{}\"] ", name));
    }
    let block = Block::default()
        .title(Span::styled(title, Style::default().fg(theme.gray)))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(theme.palette().accent));

    let records = app.filtered_history();
    if records.is_empty() {
        f.render_widget(
            Paragraph::new("No sessions recorded yet.")
                .style(Style::default().fg(theme.gray))
                .alignment(Alignment::Center)
                .block(block),
            area,
        );
        return;
    }

    let items: Vec<ListItem> = records
        .iter()
        .map(|record| history_item(record, app))
        .collect();
    f.render_widget(List::new(items).block(block), area);
}

fn history_item<'a>(record: &HistoryRecord, app: &'a App) -> ListItem<'a> {
    let theme = &app.config.theme;
    ListItem::new(Line::from(vec![
        Span::styled(
            record.start_time.format("%Y-%m-%d %H:%M  ").to_string(),
            Style::default().fg(theme.gray),
        ),
        Span::styled(record.name.clone(), Style::default().fg(theme.foreground)),
        Span::styled(
            format!(
                "  {}m / {}m",
                record.actual_minutes(),
                record.planned_minutes()
            ),
            Style::default().fg(theme.palette().primary),
        ),
    ]))
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let palette = theme.palette();
    let (mode_text, mode_color) = match app.mode {
        AppMode::Normal => ("NORMAL", palette.primary),
        AppMode::EditingLabel | AppMode::NamingPreset => ("INSERT", theme.yellow),
        AppMode::EditingSettings => ("SETTINGS", palette.secondary),
        AppMode::ShowHistory => ("HISTORY", palette.accent),
        AppMode::FilteringHistory => ("FILTER", theme.yellow),
    };
    let help = match app.mode {
        AppMode::Normal => {
            "space:start/pause │ r:reset │ l:label │ c:settings │ w:save │ o:next │ D:del │ h:history │ q:quit"
        }
        AppMode::ShowHistory => "/:filter │ t:today │ e:csv │ E:json │ X:clear │ h:back",
        _ => "enter:confirm │ esc:cancel",
    };
    let mut spans = vec![
        Span::styled(
            format!(" {} ", mode_text),
            Style::default()
                .bg(mode_color)
                .fg(theme.background)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
    ];
    match &app.status_message {
        Some(message) => spans.push(Span::styled(
            message.clone(),
            Style::default().fg(theme.foreground),
        )),
        None => spans.push(Span::raw(help)),
    }
    f.render_widget(
        Paragraph::new(Line::from(spans))
            .block(Block::default().style(Style::default().bg(theme.black).fg(theme.gray))),
        area,
    );
}

fn draw_input_overlay(f: &mut Frame, title: &str, app: &App) {
    let theme = &app.config.theme;
    let area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, area);
    let block = Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.yellow))
        .border_type(BorderType::Double)
        .style(Style::default().bg(theme.background));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(
                format!("{} ", app.config.icons.select),
                Style::default().fg(theme.foreground),
            ),
            Span::styled(
                app.input_buffer.as_str(),
                Style::default().fg(theme.foreground),
            ),
            Span::styled(
                app.config.icons.input_cursor.as_str(),
                Style::default()
                    .fg(theme.foreground)
                    .add_modifier(Modifier::SLOW_BLINK),
            ),
        ])),
        inner_area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// `MM:SS`; minutes are not wrapped into hours.
fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Widest cycle drawn as cells; longer cycles are shown as `done/cycle`.
const MAX_CYCLE_CELLS: u32 = 12;

fn cycle_bar(filled: &str, empty: &str, done: u32, cycle: u32) -> String {
    if cycle > MAX_CYCLE_CELLS {
        return format!("{}/{}", done.min(cycle), cycle);
    }
    let done = done.min(cycle) as usize;
    format!(
        "{}{}",
        filled.repeat(done),
        empty.repeat(cycle as usize - done)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_shows_minutes_and_seconds() {
        assert_eq!(format_clock(1500), "25:00");
        assert_eq!(format_clock(59), "00:59");
        assert_eq!(format_clock(90 * 60 + 5), "90:05");
    }

    #[test]
    fn cycle_bar_marks_completed_sessions() {
        assert_eq!(cycle_bar("█", "░", 1, 4), "█░░░");
        assert_eq!(cycle_bar("█", "░", 0, 2), "░░");
    }

    #[test]
    fn huge_cycles_fall_back_to_a_count() {
        assert_eq!(cycle_bar("█", "░", 3, 13), "3/13");
        let bar = cycle_bar("█", "░", 0, u32::MAX);
        assert_eq!(bar, format!("0/{}", u32::MAX));
        assert!(bar.chars().count() <= 24);
        assert_eq!(cycle_bar("█", "░", 12, 12).chars().count(), 12);
    }
}
