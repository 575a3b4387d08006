//! The session object: sole owner of the replica, the window, the connection
//! and the surface, driven by one event loop.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::cache::BitStore;
use crate::client::dispatcher::{Dispatched, Dispatcher};
use crate::client::surface::{FrameView, StatusLine, SurfaceSize, ViewSurface};
use crate::client::viewport::ViewportWindow;
use crate::config::{ClientConfig, ConfigError};
use crate::protocol::{ProtocolError, decode_server_message};
use crate::telemetry::{self, PerfGuard};
use crate::transport::{Connector, EventReceiver, TransportEvent};

pub mod connection;

pub use connection::{ConnectionSession, ConnectionState, Inbound, RetryPolicy};

pub const ABORTED_NOTICE: &str = "connection lost; restart to retry";

/// Input from the surface, already translated out of terminal events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    Toggle { index: usize, value: bool },
    Click { x: u32, y: u32 },
    Scroll { offset: u32 },
    ScrollBy { rows: i32 },
    Resize { width: u32, height: u32 },
    Quit,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("surface error: {0}")]
    Surface(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One select outcome, handled outside the `select!` so every branch may
/// borrow the session mutably.
enum Step {
    Transport(TransportEvent),
    Ui(UiEvent),
    UiClosed,
    Frame,
    Retry,
}

pub struct CellSession<S: ViewSurface> {
    store: BitStore,
    viewport: ViewportWindow,
    connection: ConnectionSession,
    dispatcher: Dispatcher,
    surface: S,
    events: EventReceiver,
    frame_interval: Duration,
    notice: Option<&'static str>,
    dropped_frames: u64,
    quit: bool,
}

impl<S: ViewSurface> CellSession<S> {
    pub fn new(
        config: &ClientConfig,
        connector: Arc<dyn Connector>,
        surface: S,
    ) -> Result<Self, SessionError> {
        let url = config.socket_url()?;
        let policy = RetryPolicy::new(config.max_retries, config.retry_delay);
        let (connection, events) = ConnectionSession::new(connector, url, policy);
        Ok(Self {
            store: BitStore::default(),
            viewport: ViewportWindow::new(
                config.cell_width as u32,
                config.cell_height as u32,
                config.overscan_rows as u32,
            ),
            connection,
            dispatcher: Dispatcher::new(),
            surface,
            events,
            frame_interval: config.frame_interval,
            notice: None,
            dropped_frames: 0,
            quit: false,
        })
    }

    pub fn store(&self) -> &BitStore {
        &self.store
    }

    pub fn viewport(&self) -> &ViewportWindow {
        &self.viewport
    }

    pub fn connection(&self) -> &ConnectionSession {
        &self.connection
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn is_quit(&self) -> bool {
        self.quit
    }

    pub fn retry_deadline(&self) -> Option<Instant> {
        self.connection.retry_deadline()
    }

    pub fn status(&self) -> StatusLine {
        StatusLine {
            connection: self.connection.state().label(),
            checked: self.store.count_set(),
            total: self.store.initial_len(),
            notice: self.notice,
        }
    }

    /// Opens the first connection attempt.
    pub fn start(&mut self) {
        self.connection.connect();
        self.viewport.mark_dirty();
    }

    /// Drains transport events already queued, without waiting.
    pub fn pump_transport(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_transport_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match self.connection.handle_event(event) {
            Inbound::Frame(frame) => {
                self.apply_frame(&frame);
            }
            Inbound::Opened => {
                self.notice = None;
                self.viewport.mark_dirty();
            }
            Inbound::Retrying { .. } => self.viewport.mark_dirty(),
            Inbound::Aborted => {
                self.notice = Some(ABORTED_NOTICE);
                self.viewport.mark_dirty();
            }
            Inbound::Ignored => {}
        }
    }

    /// Decodes and dispatches one server frame. Malformed frames are logged
    /// and dropped; the session carries on.
    pub fn apply_frame(&mut self, frame: &[u8]) -> Option<Dispatched> {
        let _guard = PerfGuard::new("session_apply_frame");
        telemetry::record_bytes("session_inbound", frame.len());
        match self.dispatch(frame) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                self.dropped_frames += 1;
                warn!(
                    target = "session::loop",
                    error = %err,
                    bytes = frame.len(),
                    dump = %telemetry::hexdump(&frame[..frame.len().min(64)]),
                    "dropping malformed frame"
                );
                None
            }
        }
    }

    fn dispatch(&mut self, frame: &[u8]) -> Result<Dispatched, ProtocolError> {
        let message = decode_server_message(frame)?;
        self.dispatcher.handle(
            &message,
            &mut self.store,
            &mut self.viewport,
            &mut self.surface,
        )
    }

    pub fn handle_ui_event(&mut self, event: UiEvent) {
        trace!(target = "session::loop", ?event, "ui event");
        match event {
            UiEvent::Toggle { index, value } => self.toggle(index, value),
            UiEvent::Click { x, y } => match self.viewport.index_at(x, y) {
                Some(index) => {
                    let value = !self.store.get(index);
                    self.toggle(index, value);
                }
                None => trace!(target = "session::loop", x, y, "click outside the grid"),
            },
            UiEvent::Scroll { offset } => self.scroll_to(offset as i64),
            UiEvent::ScrollBy { rows } => {
                let delta = rows as i64 * self.viewport.layout().cell_height as i64;
                self.scroll_to(self.viewport.offset() as i64 + delta);
            }
            UiEvent::Resize { width, height } => self.resize(width, height),
            UiEvent::Quit => {
                info!(target = "session::loop", "quit requested");
                self.quit = true;
            }
        }
    }

    fn toggle(&mut self, index: usize, value: bool) {
        // range failures are logged inside on_click and leave state untouched
        let _ = self.viewport.on_click(
            &mut self.surface,
            &mut self.store,
            &mut self.connection,
            index,
            value,
        );
    }

    fn scroll_to(&mut self, offset: i64) {
        let height = self.surface.measure().height;
        let max = self.viewport.max_scroll_offset(height) as i64;
        self.viewport.on_scroll(offset.clamp(0, max) as u32);
    }

    fn resize(&mut self, width: u32, height: u32) {
        debug!(target = "session::loop", width, height, "resize");
        self.surface.resize(SurfaceSize::new(width, height));
        let size = self.surface.measure();
        self.viewport
            .recompute_layout(size.width, size.height, self.store.size());
        self.viewport
            .populate(&mut self.surface, self.store.initial_cells());
    }

    /// Frame tick: runs the pending remap and presents when anything changed.
    pub fn on_frame(&mut self) -> Result<bool, SessionError> {
        self.viewport.on_frame(&mut self.surface, &self.store);
        if !self.viewport.take_dirty() {
            return Ok(false);
        }
        let view = FrameView {
            layout: self.viewport.layout(),
            slots: self.viewport.slots(),
            status: self.status(),
        };
        self.surface.present(&view)?;
        Ok(true)
    }

    pub fn fire_retry(&mut self) {
        self.connection.fire_retry();
        self.viewport.mark_dirty();
    }

    pub fn close(&mut self) {
        self.connection.close();
        self.viewport.mark_dirty();
    }

    /// Runs until `Quit` or until the input channel closes. The connection is
    /// closed and a last frame presented on the way out.
    pub async fn run(
        &mut self,
        mut ui_events: mpsc::UnboundedReceiver<UiEvent>,
    ) -> Result<(), SessionError> {
        self.start();
        let mut ticker = time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.quit {
            let deadline = self.connection.retry_deadline();
            let step = tokio::select! {
                biased;
                Some(event) = self.events.recv() => Step::Transport(event),
                event = ui_events.recv() => match event {
                    Some(event) => Step::Ui(event),
                    None => Step::UiClosed,
                },
                _ = ticker.tick() => Step::Frame,
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Step::Retry,
            };
            match step {
                Step::Transport(event) => self.handle_transport_event(event),
                Step::Ui(event) => self.handle_ui_event(event),
                Step::UiClosed => {
                    debug!(target = "session::loop", "input closed");
                    self.quit = true;
                }
                Step::Frame => {
                    self.on_frame()?;
                }
                Step::Retry => self.fire_retry(),
            }
        }

        self.close();
        self.on_frame()?;
        info!(
            target = "session::loop",
            dropped = self.dropped_frames,
            messages = self.dispatcher.stats().messages,
            "session finished"
        );
        Ok(())
    }
}

impl crate::client::viewport::ToggleSink for ConnectionSession {
    fn send(&mut self, frame: &[u8]) -> bool {
        ConnectionSession::send(self, frame)
    }
}
