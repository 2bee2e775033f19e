//! Drawing. Reads a state snapshot and the viewports, never mutates.

use chrono::{DateTime, Utc};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::block::{Position, Title};
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table, Tabs, Wrap};
use ratatui::Frame;
use serde_json::Value;

use bullscope_models::{ConnectionState, JobInfo, JobState};
use bullscope_queue::QueueStore;

use crate::app::App;
use crate::state::{DetailTab, Screen, ViewState};
use crate::viewport::Viewport;

const HEADER_HEIGHT: u16 = 3;
const STATUS_HEIGHT: u16 = 1;
const TABS_HEIGHT: u16 = 3;
/// Table borders plus its header row.
const TABLE_CHROME: u16 = 3;

/// List rows available on the queue and job screens for a terminal of
/// `height` rows.
pub fn list_rows(height: u16) -> (usize, usize) {
    let queue_rows = height.saturating_sub(HEADER_HEIGHT + STATUS_HEIGHT + TABLE_CHROME);
    let job_rows = queue_rows.saturating_sub(TABS_HEIGHT);
    (usize::from(queue_rows.max(1)), usize::from(job_rows.max(1)))
}

pub fn draw<S: QueueStore + ?Sized + 'static>(frame: &mut Frame, app: &App<S>) {
    let state = app.engine.state();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(0),
            Constraint::Length(STATUS_HEIGHT),
        ])
        .split(frame.size());

    draw_header(frame, chunks[0], &state);
    let offline = !state.connection.is_connected() && state.queue_names.is_empty();
    if offline || state.connection.is_error() {
        draw_connection(frame, chunks[1], &state.connection);
    } else {
        match state.screen {
            Screen::Queues => draw_queues(frame, chunks[1], &state, &app.queue_view),
            Screen::Jobs => draw_jobs(frame, chunks[1], &state, &app.job_view),
            Screen::JobDetail => draw_detail(frame, chunks[1], &state, app.detail_scroll),
        }
    }
    draw_status(frame, chunks[2], &state);
}

fn draw_header(frame: &mut Frame, area: Rect, state: &ViewState) {
    let sep = Span::styled(" › ", Style::default().fg(Color::DarkGray));
    let mut spans = vec![
        Span::styled("BullMQ", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
        sep.clone(),
        Span::raw("Queues"),
    ];
    if let Some(queue) = &state.selected_queue {
        spans.push(sep.clone());
        spans.push(Span::styled(queue.clone(), Style::default().fg(Color::Cyan)));
    }
    if state.screen == Screen::JobDetail {
        spans.push(sep);
        spans.push(Span::raw("Job Details"));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .title(Title::from(connection_indicator(&state.connection)).alignment(Alignment::Right));
    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn connection_indicator(connection: &ConnectionState) -> Line<'static> {
    let (text, color) = match connection {
        ConnectionState::Connected => ("● Connected".to_string(), Color::Green),
        ConnectionState::Connecting => ("◐ Connecting".to_string(), Color::Yellow),
        ConnectionState::Error(msg) => (format!("✕ {}", truncate(msg, 30)), Color::Red),
        ConnectionState::Disconnected => ("○ Disconnected".to_string(), Color::Gray),
    };
    Line::from(Span::styled(format!(" {} ", text), Style::default().fg(color)))
}

fn draw_connection(frame: &mut Frame, area: Rect, connection: &ConnectionState) {
    let lines = match connection {
        ConnectionState::Error(msg) => vec![
            Line::from(Span::styled("Connection error", Style::default().fg(Color::Red))),
            Line::from(""),
            Line::from(msg.clone()),
            Line::from(""),
            Line::from(Span::styled(
                "Press Enter to retry, q to quit",
                Style::default().fg(Color::DarkGray),
            )),
        ],
        ConnectionState::Connecting => vec![Line::from("Connecting to Redis…")],
        _ => vec![Line::from("Not connected")],
    };
    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(paragraph, area);
}

/// Block with the position label on top and scroll hints at the bottom.
fn list_block(title: String, view: &Viewport) -> Block<'static> {
    let mut block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title(Title::from(format!(" {} ", view.showing())).alignment(Alignment::Right));
    let mut hints = Vec::new();
    if view.can_scroll_up() {
        hints.push(format!("↑ {} more", view.hidden_above()));
    }
    if view.can_scroll_down() {
        hints.push(format!("↓ {} more", view.hidden_below()));
    }
    if !hints.is_empty() {
        block = block.title(
            Title::from(format!(" {} ", hints.join("  ")))
                .position(Position::Bottom)
                .alignment(Alignment::Right),
        );
    }
    block
}

fn row_style(selected: bool) -> Style {
    if selected {
        Style::default().bg(Color::Blue).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn draw_queues(frame: &mut Frame, area: Rect, state: &ViewState, view: &Viewport) {
    let names = state.filtered_queue_names();
    let rows: Vec<Row> = view
        .visible_range()
        .filter_map(|idx| names.get(idx).map(|name| (idx, *name)))
        .map(|(idx, name)| {
            let info = state.queues.get(name);
            let count = |s: JobState| info.map_or("-".to_string(), |i| compact_count(i.counts.get(s)));
            let label = match info {
                Some(i) if i.is_paused => format!("{} ⏸", name),
                _ => name.to_string(),
            };
            Row::new(vec![
                label,
                count(JobState::Active),
                count(JobState::Waiting),
                count(JobState::Failed),
                count(JobState::Completed),
            ])
            .style(row_style(idx == view.cursor()))
        })
        .collect();

    let header = Row::new(vec!["Queue", "Active", "Wait", "Fail", "Done"])
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD));
    let widths = [
        Constraint::Min(20),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Length(8),
        Constraint::Length(8),
    ];
    let title = if state.queue_filter.is_empty() {
        " Queues ".to_string()
    } else {
        format!(" Queues /{} ", state.queue_filter)
    };
    let table = Table::new(rows, widths)
        .header(header)
        .block(list_block(title, view));
    frame.render_widget(table, area);
}

fn draw_jobs(frame: &mut Frame, area: Rect, state: &ViewState, view: &Viewport) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(TABS_HEIGHT), Constraint::Min(0)])
        .split(area);

    let info = state.selected_queue_info();
    let titles: Vec<Line> = JobState::FILTER_TABS
        .iter()
        .map(|s| {
            let count = info.map_or(0, |i| i.counts.get(*s));
            Line::from(format!("{} ({})", s.label(), compact_count(count)))
        })
        .collect();
    let selected = JobState::FILTER_TABS
        .iter()
        .position(|s| *s == state.job_status_filter)
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .block(Block::default().borders(Borders::ALL))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, chunks[0]);

    let now = Utc::now();
    let rows: Vec<Row> = view
        .visible_range()
        .filter_map(|idx| state.jobs.get(idx).map(|job| (idx, job)))
        .map(|(idx, job)| {
            Row::new(vec![
                job.id.clone(),
                job.name.clone(),
                format_progress(&job.progress),
                format_age(now, job.timestamp),
            ])
            .style(row_style(idx == view.cursor()))
        })
        .collect();
    let header = Row::new(vec!["ID", "Name", "Progress", "Age"])
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD));
    let widths = [
        Constraint::Length(12),
        Constraint::Min(20),
        Constraint::Length(10),
        Constraint::Length(6),
    ];
    let title = format!(" {} jobs ", state.job_status_filter.label());
    let table = Table::new(rows, widths)
        .header(header)
        .block(list_block(title, view));
    frame.render_widget(table, chunks[1]);
}

fn draw_detail(frame: &mut Frame, area: Rect, state: &ViewState, scroll: u16) {
    let Some(job) = &state.selected_job else {
        return;
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(TABS_HEIGHT), Constraint::Min(0)])
        .split(area);

    let titles: Vec<Line> = DetailTab::ALL.iter().map(|t| Line::from(t.label())).collect();
    let selected = DetailTab::ALL
        .iter()
        .position(|t| *t == state.detail_tab)
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .block(Block::default().borders(Borders::ALL).title(format!(" Job {} ", job.id)))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    frame.render_widget(tabs, chunks[0]);

    let body = Paragraph::new(detail_lines(state, job))
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(body, chunks[1]);
}

fn detail_lines(state: &ViewState, job: &JobInfo) -> Vec<Line<'static>> {
    let text = match state.detail_tab {
        DetailTab::Info => {
            let field = |label: &str, value: String| format!("{:<11}{}", label, value);
            [
                field("ID", job.id.clone()),
                field("Name", job.name.clone()),
                field("Status", state.job_status_filter.as_str().to_string()),
                field("Attempts", job.attempts_made.to_string()),
                field("Progress", format_progress(&job.progress)),
                field("Created", format_date(job.timestamp)),
                field("Processed", format_date(job.processed_on)),
                field("Finished", format_date(job.finished_on)),
                field("Duration", format_duration(job)),
            ]
            .join("\n")
        }
        DetailTab::Data => pretty_json(&job.data),
        DetailTab::Error => match &job.failed_reason {
            Some(reason) => {
                let mut text = reason.clone();
                if !job.stacktrace.is_empty() {
                    text.push_str("\n\n");
                    text.push_str(&job.stacktrace.join("\n"));
                }
                text
            }
            None => "No error".to_string(),
        },
        DetailTab::Result => job
            .return_value
            .as_ref()
            .map(pretty_json)
            .unwrap_or_else(|| "No result".to_string()),
        DetailTab::Logs => match &state.job_logs {
            Some(logs) if logs.count > 0 => {
                format!("{} log lines\n\n{}", logs.count, logs.logs.join("\n"))
            }
            Some(_) => "No logs".to_string(),
            None => "Loading…".to_string(),
        },
    };
    text.lines().map(|l| Line::from(l.to_string())).collect()
}

fn draw_status(frame: &mut Frame, area: Rect, state: &ViewState) {
    let help: &[(&str, &str)] = if state.filtering {
        &[("Enter", "confirm"), ("Esc", "cancel")]
    } else if state.connection.is_error() {
        &[("Enter", "retry"), ("q", "quit")]
    } else {
        match state.screen {
            Screen::Queues => &[
                ("j/k", "nav"),
                ("l", "select"),
                ("/", "filter"),
                ("r", "refresh"),
                ("q", "quit"),
            ],
            Screen::Jobs => &[
                ("j/k", "nav"),
                ("H/L", "tab"),
                ("l", "view"),
                ("h", "back"),
                ("r", "refresh"),
            ],
            Screen::JobDetail => &[("j/k", "scroll"), ("H/L", "tab"), ("h", "back")],
        }
    };

    let mut spans = Vec::new();
    if state.filtering {
        spans.push(Span::styled(
            format!("/{}_  ", state.queue_filter),
            Style::default().fg(Color::Yellow),
        ));
    }
    for (key, action) in help {
        spans.push(Span::styled(*key, Style::default().fg(Color::Cyan)));
        spans.push(Span::styled(
            format!(" {}  ", action),
            Style::default().fg(Color::DarkGray),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// `999`, `1.2K`, `3.4M`.
pub fn compact_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

pub fn format_age(now: DateTime<Utc>, ts: Option<DateTime<Utc>>) -> String {
    let Some(ts) = ts else {
        return "-".to_string();
    };
    let secs = (now - ts).num_seconds();
    match secs {
        s if s < 1 => "now".to_string(),
        s if s < 60 => format!("{}s", s),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3_600),
        s => format!("{}d", s / 86_400),
    }
}

pub fn format_progress(progress: &Value) -> String {
    match progress {
        Value::Number(n) => format!("{}%", n),
        Value::Object(_) | Value::Array(_) => truncate(&progress.to_string(), 10),
        _ => "-".to_string(),
    }
}

fn format_duration(job: &JobInfo) -> String {
    let Some(duration) = job.duration() else {
        return "-".to_string();
    };
    let ms = duration.num_milliseconds();
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.2}s", ms as f64 / 1_000.0)
    } else {
        format!("{:.2}m", ms as f64 / 60_000.0)
    }
}

fn format_date(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
