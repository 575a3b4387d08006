//! Terminal surface: raw-mode alternate screen with mouse capture, one
//! `[x]`/`[ ]` label per cell, a scrollbar and a status line.

use std::collections::HashMap;
use std::io::{self, Stdout};
use std::thread;
use std::time::Duration;

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    MouseButton, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    self, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::surface::{FrameView, SlotHandle, SlotState, StatusLine, SurfaceSize, ViewSurface};
use super::viewport::WindowLayout;
use crate::session::UiEvent;

const HELP: &str = "click toggle • ↑/↓ PgUp/PgDn scroll • q quit";
const WHEEL_ROWS: i32 = 3;

/// Grid area left once the status row and scrollbar column are taken.
pub fn body_size(width: u16, height: u16) -> SurfaceSize {
    SurfaceSize::new(
        width.saturating_sub(1) as u32,
        height.saturating_sub(1) as u32,
    )
}

pub struct TuiSurface {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    slots: HashMap<SlotHandle, SlotState>,
    next_handle: u32,
    restored: bool,
}

impl TuiSurface {
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        if let Err(err) = terminal.hide_cursor() {
            debug!(target = "client::tui", error = %err, "hide cursor failed");
        }
        terminal.clear()?;
        Ok(Self {
            terminal,
            slots: HashMap::new(),
            next_handle: 0,
            restored: false,
        })
    }

    pub fn restore(&mut self) -> io::Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        if let Err(err) = self.terminal.show_cursor() {
            debug!(target = "client::tui", error = %err, "show cursor failed");
        }
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            DisableMouseCapture,
            LeaveAlternateScreen
        )?;
        Ok(())
    }
}

impl Drop for TuiSurface {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            warn!(target = "client::tui", error = %err, "terminal restore failed");
        }
    }
}

impl ViewSurface for TuiSurface {
    fn measure(&self) -> SurfaceSize {
        match self.terminal.size() {
            Ok(size) => body_size(size.width, size.height),
            Err(_) => terminal::size()
                .map(|(width, height)| body_size(width, height))
                .unwrap_or_default(),
        }
    }

    fn resize(&mut self, size: SurfaceSize) {
        trace!(
            target = "client::tui",
            width = size.width,
            height = size.height,
            "resize noted; size is measured from the terminal"
        );
    }

    fn create_slot(&mut self) -> SlotHandle {
        let handle = SlotHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.slots.insert(handle, SlotState::default());
        handle
    }

    fn destroy_slot(&mut self, handle: SlotHandle) {
        self.slots.remove(&handle);
    }

    fn set_slot_value(&mut self, handle: SlotHandle, value: bool) {
        if let Some(slot) = self.slots.get_mut(&handle) {
            slot.value = value;
        }
    }

    fn set_slot_visible(&mut self, handle: SlotHandle, visible: bool) {
        if let Some(slot) = self.slots.get_mut(&handle) {
            slot.visible = visible;
        }
    }

    fn present(&mut self, frame: &FrameView<'_>) -> io::Result<()> {
        let lines = grid_lines(frame, &self.slots);
        let status = status_text(&frame.status, &frame.layout);
        let layout = frame.layout;
        self.terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0), Constraint::Length(1)])
                .split(f.area());
            f.render_widget(Paragraph::new(lines), chunks[0]);
            let mut scroll = ScrollbarState::new(layout.track_rows as usize)
                .viewport_content_length(layout.visible_rows as usize)
                .position(layout.first_row as usize);
            f.render_stateful_widget(
                Scrollbar::new(ScrollbarOrientation::VerticalRight),
                chunks[0],
                &mut scroll,
            );
            f.render_widget(
                Paragraph::new(status).style(Style::default().add_modifier(Modifier::REVERSED)),
                chunks[1],
            );
        })?;
        Ok(())
    }
}

fn fit(label: &str, width: usize) -> String {
    format!("{label:<width$}").chars().take(width).collect()
}

/// Lays pool slots out row-major, `columns` per line, in pool order.
fn grid_lines(frame: &FrameView<'_>, slots: &HashMap<SlotHandle, SlotState>) -> Vec<Line<'static>> {
    let columns = frame.layout.columns.max(1) as usize;
    let width = frame.layout.cell_width as usize;
    let filler = frame.layout.cell_height.saturating_sub(1) as usize;
    let checked = Style::default().fg(Color::Green).add_modifier(Modifier::BOLD);
    let mut lines = Vec::new();
    for row in frame.slots.chunks(columns) {
        let spans: Vec<Span<'static>> = row
            .iter()
            .map(|slot| {
                let state = slots.get(&slot.handle).copied().unwrap_or_default();
                match (state.visible, state.value) {
                    (false, _) => Span::raw(" ".repeat(width)),
                    (true, true) => Span::styled(fit("[x]", width), checked),
                    (true, false) => Span::raw(fit("[ ]", width)),
                }
            })
            .collect();
        lines.push(Line::from(spans));
        lines.extend(std::iter::repeat_n(Line::default(), filler));
    }
    lines
}

fn status_text(status: &StatusLine, layout: &WindowLayout) -> String {
    format!(
        "{} • {} checked of {} • row {}/{} • {}",
        status.connection,
        status.checked,
        status.total,
        layout.first_row,
        layout.track_rows,
        status.notice.unwrap_or(HELP)
    )
}

/// Translates one terminal event. `page_rows` sizes PgUp/PgDn jumps.
pub fn map_event(event: Event, page_rows: i32) -> Option<UiEvent> {
    match event {
        Event::Key(key) if key.kind != KeyEventKind::Release => {
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                return Some(UiEvent::Quit);
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => Some(UiEvent::Quit),
                KeyCode::Up | KeyCode::Char('k') => Some(UiEvent::ScrollBy { rows: -1 }),
                KeyCode::Down | KeyCode::Char('j') => Some(UiEvent::ScrollBy { rows: 1 }),
                KeyCode::PageUp => Some(UiEvent::ScrollBy { rows: -page_rows }),
                KeyCode::PageDown => Some(UiEvent::ScrollBy { rows: page_rows }),
                KeyCode::Home | KeyCode::Char('g') => Some(UiEvent::Scroll { offset: 0 }),
                KeyCode::End | KeyCode::Char('G') => Some(UiEvent::Scroll { offset: u32::MAX }),
                _ => None,
            }
        }
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => Some(UiEvent::Click {
                x: mouse.column as u32,
                y: mouse.row as u32,
            }),
            MouseEventKind::ScrollUp => Some(UiEvent::ScrollBy { rows: -WHEEL_ROWS }),
            MouseEventKind::ScrollDown => Some(UiEvent::ScrollBy { rows: WHEEL_ROWS }),
            _ => None,
        },
        Event::Resize(width, height) => {
            let size = body_size(width, height);
            Some(UiEvent::Resize {
                width: size.width,
                height: size.height,
            })
        }
        _ => None,
    }
}

/// Reads terminal input on a dedicated thread and forwards it to the session.
/// Stops after `Quit`, on read errors, or once the session drops its receiver.
pub fn spawn_input_listener(events: mpsc::UnboundedSender<UiEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        debug!(target = "client::input", "input listener started");
        while !events.is_closed() {
            match event::poll(Duration::from_millis(250)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    warn!(target = "client::input", error = %err, "input poll failed");
                    break;
                }
            }
            let raw = match event::read() {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(target = "client::input", error = %err, "input read failed");
                    break;
                }
            };
            let page_rows = terminal::size()
                .map(|(_, rows)| rows.saturating_sub(2).max(1) as i32)
                .unwrap_or(10);
            let Some(ui) = map_event(raw, page_rows) else {
                continue;
            };
            if events.send(ui).is_err() || ui == UiEvent::Quit {
                break;
            }
        }
        debug!(target = "client::input", "input listener stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::viewport::PoolSlot;
    use crossterm::event::{KeyEvent, MouseEvent};

    fn key(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent::new(code, modifiers))
    }

    #[test]
    fn keys_map_to_scroll_and_quit() {
        let none = KeyModifiers::NONE;
        assert_eq!(map_event(key(KeyCode::Char('q'), none), 10), Some(UiEvent::Quit));
        assert_eq!(
            map_event(key(KeyCode::Char('c'), KeyModifiers::CONTROL), 10),
            Some(UiEvent::Quit)
        );
        assert_eq!(
            map_event(key(KeyCode::PageDown, none), 10),
            Some(UiEvent::ScrollBy { rows: 10 })
        );
        assert_eq!(
            map_event(key(KeyCode::End, none), 10),
            Some(UiEvent::Scroll { offset: u32::MAX })
        );
        assert_eq!(map_event(key(KeyCode::Char('x'), none), 10), None);
    }

    #[test]
    fn mouse_and_resize_events() {
        let click = Event::Mouse(MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 9,
            row: 2,
            modifiers: KeyModifiers::NONE,
        });
        assert_eq!(map_event(click, 10), Some(UiEvent::Click { x: 9, y: 2 }));
        assert_eq!(
            map_event(Event::Resize(81, 25), 10),
            Some(UiEvent::Resize {
                width: 80,
                height: 24
            })
        );
    }

    #[test]
    fn grid_lines_follow_pool_order() {
        let mut slots = HashMap::new();
        let pool: Vec<PoolSlot> = (0..6u32)
            .map(|i| {
                let handle = SlotHandle(i);
                slots.insert(
                    handle,
                    SlotState {
                        value: i % 2 == 0,
                        visible: i < 5,
                    },
                );
                PoolSlot {
                    handle,
                    index: i as usize,
                    visible: i < 5,
                }
            })
            .collect();
        let frame = FrameView {
            layout: WindowLayout {
                columns: 3,
                visible_rows: 2,
                cell_width: 4,
                cell_height: 1,
                ..WindowLayout::default()
            },
            slots: &pool,
            status: StatusLine::default(),
        };
        let rendered: Vec<String> = grid_lines(&frame, &slots)
            .iter()
            .map(|line| line.spans.iter().map(|span| span.content.as_ref()).collect())
            .collect();
        assert_eq!(rendered, vec!["[x] [ ] [x] ", "[ ] [x]     "]);
    }

    #[test]
    fn status_shows_notice_over_help() {
        let layout = WindowLayout::default();
        let mut status = StatusLine {
            connection: "aborted",
            checked: 3,
            total: 40,
            notice: Some("connection lost; restart to retry"),
        };
        let text = status_text(&status, &layout);
        assert!(text.starts_with("aborted • 3 checked of 40"));
        assert!(text.ends_with("connection lost; restart to retry"));
        status.notice = None;
        assert!(status_text(&status, &layout).ends_with(HELP));
    }
}
