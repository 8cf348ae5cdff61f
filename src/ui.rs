use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::event::{
    Event,
    EventStream,
    KeyCode,
    KeyEventKind,
    KeyModifiers,
    MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode,
    enable_raw_mode,
};
use futures::StreamExt;
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::{
    io::stdout,
    time::{
        Duration,
        Instant,
    },
};
use tapme::{
    LoadingState,
    SessionView,
};

/// "+1" bubbles disappear this long after the tap that spawned them.
const BUBBLE_TTL: Duration = Duration::from_secs(1);
const MAX_BUBBLES: usize = 32;

pub type InputEventReceiver = EventStream;

pub enum UserEvent {
    Quit,
    Tap { at: Option<(u16, u16)> },
    Retry,
    Redraw,
}

#[derive(Debug, Clone, Copy)]
struct Bubble {
    born: Instant,
    at: Option<(u16, u16)>,
    slot: u16,
}

#[derive(Debug, Default)]
pub struct UiState {
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
    bubbles: Vec<Bubble>,
    spawned: u16,
}

impl UiState {
    pub fn push_bubble(&mut self, at: Option<(u16, u16)>) {
        if self.bubbles.len() >= MAX_BUBBLES {
            self.bubbles.remove(0);
        }
        self.bubbles.push(Bubble {
            born: Instant::now(),
            at,
            slot: self.spawned,
        });
        self.spawned = self.spawned.wrapping_add(1);
    }

    /// Drops expired bubbles, returning whether anything changed on screen.
    pub fn expire_bubbles(&mut self) -> bool {
        let before = self.bubbles.len();
        self.bubbles.retain(|b| b.born.elapsed() < BUBBLE_TTL);
        // live bubbles drift upward, so redraw while any remain
        before != self.bubbles.len() || !self.bubbles.is_empty()
    }
}

pub fn input_event_stream() -> InputEventReceiver {
    EventStream::new()
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    match events.next().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal input stream closed")),
    }
}

pub fn interpret_event(event: Event) -> Option<UserEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(UserEvent::Quit)
            }
            KeyCode::Char('q') | KeyCode::Esc => Some(UserEvent::Quit),
            KeyCode::Char(' ') | KeyCode::Enter => Some(UserEvent::Tap { at: None }),
            KeyCode::Char('r') => Some(UserEvent::Retry),
            _ => None,
        },
        Event::Mouse(mouse) if matches!(mouse.kind, MouseEventKind::Down(_)) => {
            Some(UserEvent::Tap {
                at: Some((mouse.column, mouse.row)),
            })
        }
        Event::Resize(..) => Some(UserEvent::Redraw),
        _ => None,
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

pub fn draw(state: &mut UiState, view: &SessionView) -> Result<()> {
    let bubbles = state.bubbles.clone();
    let terminal = state
        .terminal
        .as_mut()
        .ok_or_else(|| eyre!("terminal not initialised"))?;
    terminal.draw(|f| ui(f, &bubbles, view))?;
    Ok(())
}

fn ui(f: &mut Frame, bubbles: &[Bubble], view: &SessionView) {
    f.render_widget(Clear, f.area());
    match &view.loading {
        LoadingState::Loading => draw_loading(f),
        LoadingState::Error(message) => draw_error(f, message),
        LoadingState::Ready => draw_game(f, bubbles, view),
    }
}

fn draw_loading(f: &mut Frame) {
    let area = centered_rect(30, 20, f.area());
    let loading = Paragraph::new("Loading...")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(loading, area);
}

fn draw_error(f: &mut Frame, message: &str) {
    let area = centered_rect(60, 40, f.area());
    let lines = vec![
        Line::from(Span::styled(
            "Error loading user data. Please try again later.",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(message.to_string()),
        Line::from(""),
        Line::from("r retry | q/Esc quit"),
    ];
    let error = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Red))
        .block(Block::default().borders(Borders::ALL).title("Oops!"));
    f.render_widget(error, area);
}

fn draw_game(f: &mut Frame, bubbles: &[Bubble], view: &SessionView) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // player + coins
            Constraint::Min(7),    // tap button
            Constraint::Length(3), // progress
            Constraint::Length(3), // sync status
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_top(f, chunks[0], view);
    draw_button(f, chunks[1]);
    draw_bubbles(f, chunks[1], bubbles);
    draw_progress(f, chunks[2], view);
    draw_status(f, chunks[3], view);

    let help = Paragraph::new("space/enter/click tap | r retry | q/Esc quit")
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, chunks[4]);
}

fn draw_top(f: &mut Frame, area: Rect, view: &SessionView) {
    let lines = vec![
        Line::from(vec![
            Span::raw("Player: "),
            Span::styled(
                view.display_name.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(" | Level {}", view.level)),
        ]),
        Line::from(Span::styled(
            format!("{} coins", view.displayed_balance),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
    ];
    let top = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("TapMe"));
    f.render_widget(top, area);
}

fn draw_button(f: &mut Frame, area: Rect) {
    let button_area = centered_rect(40, 60, area);
    let button = Paragraph::new(vec![Line::from(""), Line::from("TAP")])
        .alignment(Alignment::Center)
        .style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(button, button_area);
}

fn draw_bubbles(f: &mut Frame, area: Rect, bubbles: &[Bubble]) {
    let frame = f.area();
    for bubble in bubbles {
        let (x, y) = bubble_origin(area, bubble);
        let rise = (bubble.born.elapsed().as_millis() / 250) as u16;
        let y = y.saturating_sub(rise).max(area.y);
        let rect = Rect::new(x, y, 2, 1).intersection(frame);
        if rect.is_empty() {
            continue;
        }
        let plus = Paragraph::new("+1").style(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        );
        f.render_widget(plus, rect);
    }
}

fn bubble_origin(area: Rect, bubble: &Bubble) -> (u16, u16) {
    if let Some((column, row)) = bubble.at {
        return (column, row);
    }
    // keyboard taps fan out around the button centre
    let offset = (bubble.slot % 7) * 3;
    let centre_x = area.x + area.width / 2;
    let x = (centre_x + offset).saturating_sub(9);
    (x, area.y + area.height / 2)
}

fn draw_progress(f: &mut Frame, area: Rect, view: &SessionView) {
    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Level {}", view.level)),
        )
        .gauge_style(Style::default().fg(Color::Cyan))
        .percent(view.progress.min(100) as u16)
        .label(format!("{}/100", view.progress));
    f.render_widget(gauge, area);
}

fn draw_status(f: &mut Frame, area: Rect, view: &SessionView) {
    let mut parts: Vec<String> = Vec::new();
    if view.syncing {
        parts.push("syncing...".to_string());
    } else if view.pending_delta > 0 {
        parts.push(format!("{} taps pending", view.pending_delta));
    } else {
        parts.push("all taps saved".to_string());
    }
    if let Some(at) = view.last_synced_at {
        let local = at.with_timezone(&chrono::Local);
        parts.push(format!("last synced {}", local.format("%H:%M:%S")));
    }
    let color = match &view.last_error {
        Some(err) => {
            parts.push(err.clone());
            Color::Red
        }
        None if view.pending_delta > 0 => Color::Yellow,
        None => Color::Green,
    };
    let status = Paragraph::new(parts.join(" | "))
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title("Sync"));
    f.render_widget(status, area);
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}
