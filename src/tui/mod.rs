//! Terminal user interface.
//!
//! The TUI runs on a dedicated OS thread so the tokio runtime stays free for
//! the controller and the engine subprocess. The two sides talk over two
//! unbounded channels: [`JobEvent`]s flow from the controller to the UI and
//! [`UiCommand`]s flow back. The UI never touches artifacts or the engine
//! directly; it renders the latest controller state and forwards keypresses.

mod form;

use std::io;
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Tabs, Wrap};
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::cli::Cli;
use crate::model::{FilterKind, InfoEvent, JobEvent, JobPhase, RunReport};
use crate::orchestrator::{run_controller, UiCommand};
use crate::text_report::build_text_report;
use form::FilterForm;

const TAB_TITLES: [&str; 3] = ["Pipeline", "Engine Log", "Help"];
const TAB_LOG: usize = 1;
const TAB_HELP: usize = 2;

/// Oldest engine output lines are dropped past this point.
const ENGINE_LINES_MAX: usize = 500;

const BUSY_HINT: &str = "a job is running, wait for it to finish";

pub async fn run(args: Cli) -> Result<()> {
    let cfg = crate::cli::build_config(&args)?;

    let initial_source = match &args.input {
        Some(path) => {
            if !path.is_file() {
                anyhow::bail!("input image not found: {}", path.display());
            }
            Some(path.clone())
        }
        None => None,
    };

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    let ui_handle = std::thread::spawn(move || run_threaded(args, event_rx, cmd_tx));

    let controller_res = run_controller(cfg, initial_source, event_tx, cmd_rx).await;

    // The UI thread exits on quit (or on its own error), which drops its
    // command sender and lets the controller finish first.
    match tokio::task::spawn_blocking(move || ui_handle.join()).await {
        Ok(Ok(ui_res)) => ui_res?,
        Ok(Err(_)) | Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
    }

    controller_res
}

fn run_threaded(
    args: Cli,
    mut event_rx: UnboundedReceiver<JobEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    let mut state = UiState::new(&args);

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res: Result<()> = loop {
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
        }

        if last_tick.elapsed() >= tick_rate {
            if let Err(e) = terminal.draw(|f| draw(f, &state)) {
                break Err(e).context("draw terminal");
            }
            last_tick = Instant::now();
        }

        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }

                // The load prompt owns the keyboard while it is open.
                if let Some(buffer) = state.path_prompt.as_mut() {
                    match k.code {
                        KeyCode::Enter => {
                            let text = buffer.trim().to_string();
                            state.path_prompt = None;
                            if text.is_empty() {
                                state.info = "load cancelled".into();
                            } else {
                                let _ = cmd_tx.send(UiCommand::LoadSource(PathBuf::from(text)));
                            }
                        }
                        KeyCode::Esc => {
                            state.path_prompt = None;
                            state.info = "load cancelled".into();
                        }
                        KeyCode::Backspace => {
                            buffer.pop();
                        }
                        KeyCode::Char(c) => buffer.push(c),
                        _ => {}
                    }
                    continue;
                }

                match (k.modifiers, k.code) {
                    (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Char('q')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (_, KeyCode::Tab) => state.tab = (state.tab + 1) % TAB_TITLES.len(),
                    (_, KeyCode::Char('?')) => state.tab = TAB_HELP,
                    (_, KeyCode::Char('o')) => {
                        if state.phase == JobPhase::Idle {
                            state.path_prompt = Some(String::new());
                        } else {
                            state.info = BUSY_HINT.into();
                        }
                    }
                    (_, KeyCode::Char('r')) => {
                        if state.phase != JobPhase::Idle {
                            state.info = BUSY_HINT.into();
                        } else {
                            match state.form.selection() {
                                Ok(selection) => {
                                    let _ = cmd_tx.send(UiCommand::Run(selection));
                                }
                                Err(err) => state.info = err.0,
                            }
                        }
                    }
                    (_, KeyCode::Char('u')) => {
                        if state.phase != JobPhase::Idle {
                            state.info = BUSY_HINT.into();
                        } else {
                            let _ = cmd_tx.send(UiCommand::Undo);
                        }
                    }
                    (_, KeyCode::Char('s')) => {
                        if state.phase != JobPhase::Idle {
                            state.info = BUSY_HINT.into();
                        } else {
                            let _ = cmd_tx.send(UiCommand::Save(state.save_to.clone()));
                        }
                    }
                    (_, KeyCode::Char('l')) => {
                        state.log_requested = true;
                        let _ = cmd_tx.send(UiCommand::RefreshLog);
                    }
                    (_, KeyCode::Char('y')) => {
                        match state.last_saved.clone().or_else(|| state.current.clone()) {
                            Some(path) => {
                                let path = path.display().to_string();
                                copy_to_clipboard(path.clone());
                                state.info = format!("copied {path} to clipboard");
                            }
                            None => state.info = "no output path to copy yet".into(),
                        }
                    }
                    (_, KeyCode::Up | KeyCode::Char('k')) => state.form.move_cursor(false),
                    (_, KeyCode::Down | KeyCode::Char('j')) => state.form.move_cursor(true),
                    (_, KeyCode::Left) => state.form.field_left(),
                    (_, KeyCode::Right) => state.form.field_right(),
                    (_, KeyCode::Char(' ') | KeyCode::Enter) => state.form.toggle(),
                    (_, KeyCode::Backspace) => {
                        state.form.backspace();
                    }
                    (_, KeyCode::Char(c)) if c.is_ascii_digit() || c == '.' => {
                        state.form.input_char(c);
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    res
}

struct UiState {
    tab: usize,
    phase: JobPhase,
    info: String,
    source: Option<PathBuf>,
    current: Option<PathBuf>,
    undo_available: bool,
    form: FilterForm,
    engine_lines: Vec<String>,
    /// Run id shown on the engine output pane, once a run has started.
    active_run: Option<String>,
    last_command: Option<String>,
    log_lines: Vec<String>,
    /// Set by the `l` key; the next log batch then pulls the view over to
    /// the log tab. The controller's own post-run refresh arrives unrequested
    /// and must not steal the view.
    log_requested: bool,
    last_report: Option<RunReport>,
    last_saved: Option<PathBuf>,
    /// Some while the load prompt is open; holds the typed path.
    path_prompt: Option<String>,
    save_to: Option<PathBuf>,
}

impl UiState {
    fn new(args: &Cli) -> Self {
        let mut form = FilterForm::default();
        form.preload(args);
        Self {
            tab: 0,
            phase: JobPhase::Idle,
            info: "o: load an image, space: toggle filters, r: run, ?: help".into(),
            source: None,
            current: None,
            undo_available: false,
            form,
            engine_lines: Vec::new(),
            active_run: None,
            last_command: None,
            log_lines: Vec::new(),
            log_requested: false,
            last_report: None,
            last_saved: None,
            path_prompt: None,
            save_to: args.save_to.clone(),
        }
    }
}

fn apply_event(state: &mut UiState, event: JobEvent) {
    match event {
        JobEvent::PhaseChanged { phase } => {
            state.phase = phase;
            match phase {
                JobPhase::Preparing => state.info = "preparing run...".into(),
                JobPhase::Running => state.info = "engine running...".into(),
                JobPhase::Idle => {}
            }
        }
        JobEvent::JobStarted { run_id, command } => {
            state.engine_lines.clear();
            state.last_command = Some(command.join(" "));
            state.active_run = Some(run_id);
        }
        JobEvent::EngineLine { line, .. } => {
            push_engine_line(&mut state.engine_lines, line);
        }
        JobEvent::JobSucceeded { report } => {
            state.info = format!(
                "run {} finished in {}",
                report.run_id,
                humantime::format_duration(report.duration)
            );
            state.last_report = Some(*report);
        }
        JobEvent::JobFailed { error, .. } => {
            state.info = error;
        }
        JobEvent::ArtifactState {
            source,
            current,
            undo_available,
        } => {
            state.source = source;
            state.current = current;
            state.undo_available = undo_available;
        }
        JobEvent::LogLines(lines) => {
            state.log_lines = lines;
            if state.log_requested {
                state.log_requested = false;
                state.info = format!("engine log refreshed ({} lines)", state.log_lines.len());
                state.tab = TAB_LOG;
            }
        }
        JobEvent::Info(info) => {
            if let InfoEvent::Saved { path } = &info {
                state.last_saved = Some(path.clone());
            }
            state.info = info.to_message();
        }
    }
}

fn push_engine_line(lines: &mut Vec<String>, line: String) {
    lines.push(line);
    if lines.len() > ENGINE_LINES_MAX {
        let excess = lines.len() - ENGINE_LINES_MAX;
        lines.drain(..excess);
    }
}

fn draw(f: &mut Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(f.area());

    let titles: Vec<Line> = TAB_TITLES.iter().map(|t| Line::from(*t)).collect();
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title("filterpipe"))
        .select(state.tab)
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_LOG => draw_log(f, chunks[1], state),
        TAB_HELP => draw_help(f, chunks[1]),
        _ => draw_pipeline(f, chunks[1], state),
    }
}

fn draw_pipeline(f: &mut Frame, area: Rect, state: &UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(11),
            Constraint::Length(8),
            Constraint::Length(3),
        ])
        .split(area);

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(rows[0]);

    draw_form(f, top[0], state);
    draw_job(f, top[1], state);
    draw_engine_output(f, rows[1], state);
    draw_status(f, rows[2], state);
}

fn draw_form(f: &mut Frame, area: Rect, state: &UiState) {
    let mut lines = Vec::new();
    for (idx, kind) in FilterKind::ALL.into_iter().enumerate() {
        let on_cursor = idx == state.form.cursor;
        let enabled = state.form.is_enabled(kind);
        let name_style = match (enabled, on_cursor) {
            (true, true) => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            (true, false) => Style::default().fg(Color::Green),
            (false, true) => Style::default().add_modifier(Modifier::BOLD),
            (false, false) => Style::default(),
        };
        let mut spans = vec![
            Span::raw(if on_cursor { "> " } else { "  " }),
            Span::styled(
                format!("{} {:<13}", if enabled { "[x]" } else { "[ ]" }, kind.label()),
                name_style,
            ),
        ];
        for (label, value, active) in state.form.param_fields(kind) {
            let style = if active {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default().fg(Color::Gray)
            };
            spans.push(Span::styled(format!(" {label}={value}"), style));
        }
        lines.push(Line::from(spans));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "space: toggle  arrows: move/edit  r: run",
        Style::default().fg(Color::DarkGray),
    )));

    let widget =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Filters"));
    f.render_widget(widget, area);
}

fn draw_job(f: &mut Frame, area: Rect, state: &UiState) {
    let path_or_dash = |p: &Option<PathBuf>| {
        p.as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".into())
    };
    let label = |text: &'static str| Span::styled(text, Style::default().fg(Color::Gray));

    let mut lines = vec![
        Line::from(vec![
            label("Phase:  "),
            Span::styled(phase_label(state.phase), phase_style(state.phase)),
        ]),
        Line::from(vec![label("Source: "), Span::raw(path_or_dash(&state.source))]),
        Line::from(vec![label("Output: "), Span::raw(path_or_dash(&state.current))]),
        Line::from(vec![
            label("Undo:   "),
            Span::raw(if state.undo_available { "available" } else { "none" }),
        ]),
    ];
    if let Some(command) = &state.last_command {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            label("Command: "),
            Span::styled(command.clone(), Style::default().fg(Color::DarkGray)),
        ]));
    }
    if let Some(report) = &state.last_report {
        lines.push(Line::from(""));
        for text in build_text_report(report).lines {
            lines.push(Line::from(text));
        }
    }

    let widget = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Job"));
    f.render_widget(widget, area);
}

fn draw_engine_output(f: &mut Frame, area: Rect, state: &UiState) {
    let height = area.height.saturating_sub(2) as usize;
    let start = state.engine_lines.len().saturating_sub(height);
    let lines: Vec<Line> = state.engine_lines[start..]
        .iter()
        .map(|l| Line::from(l.as_str()))
        .collect();
    let title = match &state.active_run {
        Some(id) => format!("Engine Output (run {id})"),
        None => "Engine Output".to_string(),
    };
    let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(widget, area);
}

fn draw_status(f: &mut Frame, area: Rect, state: &UiState) {
    let line = if let Some(buffer) = &state.path_prompt {
        Line::from(vec![
            Span::styled("Load image: ", Style::default().fg(Color::Yellow)),
            Span::raw(buffer.clone()),
            Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
        ])
    } else {
        Line::from(state.info.as_str())
    };
    let widget = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(widget, area);
}

fn draw_log(f: &mut Frame, area: Rect, state: &UiState) {
    let height = area.height.saturating_sub(2) as usize;
    let start = state.log_lines.len().saturating_sub(height);
    let lines: Vec<Line> = if state.log_lines.is_empty() {
        vec![Line::from(Span::styled(
            "no log loaded yet, press l to refresh",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        state.log_lines[start..]
            .iter()
            .map(|l| Line::from(l.as_str()))
            .collect()
    };
    let widget = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Engine Log (l to refresh)"),
    );
    f.render_widget(widget, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Magenta));
    let row = |k: &'static str, text: &'static str| {
        Line::from(vec![Span::raw("  "), key(k), Span::raw(text)])
    };
    let lines = vec![
        Line::from(""),
        row("o           ", "load a source image (type the path, enter to confirm)"),
        row("up/down     ", "move between filters"),
        row("space/enter ", "toggle the filter under the cursor"),
        row("left/right  ", "switch parameter field, or flip the rainbow mode"),
        row("0-9 .       ", "edit the active parameter field"),
        row("r           ", "run the selected pipeline"),
        row("u           ", "undo the last run"),
        row("s           ", "save the current output"),
        row("l           ", "refresh the engine log"),
        row("y           ", "copy the output path to the clipboard"),
        row("tab / ?     ", "switch tab / open this help"),
        row("q / ctrl-c  ", "quit; a running job is waited for, temp files are removed"),
    ];
    let widget = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(widget, area);
}

fn phase_label(phase: JobPhase) -> &'static str {
    match phase {
        JobPhase::Idle => "idle",
        JobPhase::Preparing => "preparing",
        JobPhase::Running => "running",
    }
}

fn phase_style(phase: JobPhase) -> Style {
    match phase {
        JobPhase::Idle => Style::default().fg(Color::Green),
        JobPhase::Preparing => Style::default().fg(Color::Yellow),
        JobPhase::Running => Style::default().fg(Color::Cyan),
    }
}

static CLIPBOARD_TX: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Hand the text to a long-lived clipboard thread. Wayland and X11 clipboards
/// are tied to the connection that set them, so the thread holds each value
/// for a couple of seconds to give clipboard managers time to take it over.
fn copy_to_clipboard(text: String) {
    let tx = CLIPBOARD_TX.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();
        std::thread::spawn(move || {
            while let Ok(text) = rx.recv() {
                if let Ok(mut clipboard) = arboard::Clipboard::new() {
                    if clipboard.set_text(text).is_ok() {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });
        tx
    });
    let _ = tx.send(text);
}
