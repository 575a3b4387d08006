use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::transport::{
    Connector, EventReceiver, EventSender, Link, LinkId, TransportEvent, TransportEventKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Reconnecting,
    Aborted,
}

impl ConnectionState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Reconnecting => "reconnecting",
            Self::Aborted => "aborted",
        }
    }
}

/// Linear backoff: attempt `n` waits `base_delay × n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(15, Duration::from_millis(300))
    }
}

/// Outcome of feeding one transport event to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Opened,
    Frame(Bytes),
    Retrying { attempt: u32, delay: Duration },
    Aborted,
    Ignored,
}

/// Owns the active link and the reconnection state machine.
///
/// `Connecting → Open → Closed → Reconnecting → Connecting …` until the retry
/// budget is spent, at which point the session is `Aborted` for good. An
/// explicit [`close`](Self::close) zeroes the budget and aborts immediately.
pub struct ConnectionSession {
    connector: Arc<dyn Connector>,
    url: Url,
    policy: RetryPolicy,
    state: ConnectionState,
    retries: u32,
    generation: u64,
    link: Option<Box<dyn Link>>,
    retry_at: Option<Instant>,
    events: EventSender,
}

impl ConnectionSession {
    pub fn new(
        connector: Arc<dyn Connector>,
        url: Url,
        policy: RetryPolicy,
    ) -> (Self, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Self {
            connector,
            url,
            policy,
            state: ConnectionState::Closed,
            retries: 0,
            generation: 0,
            link: None,
            retry_at: None,
            events,
        };
        (session, rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn current_link(&self) -> LinkId {
        LinkId(self.generation)
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// When the pending reconnection attempt is due, if one is scheduled.
    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    pub fn connect(&mut self) {
        if self.state == ConnectionState::Aborted {
            return;
        }
        self.generation += 1;
        let link = self.current_link();
        self.state = ConnectionState::Connecting;
        info!(
            target = "session::connection",
            link = link.0,
            url = %self.url,
            attempt = self.retries,
            "connecting"
        );
        match self.connector.open(&self.url, link, self.events.clone()) {
            Ok(handle) => self.link = Some(handle),
            Err(err) => {
                warn!(target = "session::connection", link = link.0, error = %err, "open failed");
                // reported like a dropped connection so the backoff path applies
                let _ = self.events.send(TransportEvent {
                    link,
                    kind: TransportEventKind::Closed,
                });
            }
        }
    }

    pub fn handle_event(&mut self, event: TransportEvent) -> Inbound {
        if event.link != self.current_link() || self.state == ConnectionState::Aborted {
            trace!(
                target = "session::connection",
                link = event.link.0,
                current = self.generation,
                "ignoring stale transport event"
            );
            return Inbound::Ignored;
        }
        match event.kind {
            TransportEventKind::Opened => {
                self.state = ConnectionState::Open;
                self.retries = 0;
                info!(target = "session::connection", link = event.link.0, "connection open");
                Inbound::Opened
            }
            TransportEventKind::Message(frame) => Inbound::Frame(frame),
            TransportEventKind::Error(reason) => {
                warn!(
                    target = "session::connection",
                    link = event.link.0,
                    reason = %reason,
                    "transport error"
                );
                Inbound::Ignored
            }
            TransportEventKind::Closed => self.handle_closed(),
        }
    }

    fn handle_closed(&mut self) -> Inbound {
        self.state = ConnectionState::Closed;
        self.link = None;
        if self.retries >= self.policy.max_retries {
            self.state = ConnectionState::Aborted;
            self.retry_at = None;
            error!(
                target = "session::connection",
                retries = self.retries,
                "max retries reached; restart the client to reconnect"
            );
            return Inbound::Aborted;
        }
        self.retries += 1;
        let delay = self.policy.delay_for(self.retries);
        self.retry_at = Some(Instant::now() + delay);
        self.state = ConnectionState::Reconnecting;
        info!(
            target = "session::connection",
            attempt = self.retries,
            delay_ms = delay.as_millis() as u64,
            "connection closed; scheduling reconnect"
        );
        Inbound::Retrying {
            attempt: self.retries,
            delay,
        }
    }

    /// Runs the scheduled reconnection attempt.
    pub fn fire_retry(&mut self) {
        if self.retry_at.take().is_some() && self.state == ConnectionState::Reconnecting {
            self.connect();
        }
    }

    /// Best-effort send: transmits only while open, otherwise drops the frame.
    pub fn send(&mut self, frame: &[u8]) -> bool {
        if self.state != ConnectionState::Open {
            debug!(
                target = "session::connection",
                state = self.state.label(),
                bytes = frame.len(),
                "connection not open; frame dropped"
            );
            return false;
        }
        let Some(link) = &self.link else {
            return false;
        };
        match link.send(Bytes::copy_from_slice(frame)) {
            Ok(()) => true,
            Err(err) => {
                debug!(target = "session::connection", error = %err, "send failed; frame dropped");
                false
            }
        }
    }

    /// Stops the session for good: no further reconnection attempts.
    pub fn close(&mut self) {
        self.policy.max_retries = 0;
        self.retry_at = None;
        if let Some(link) = self.link.take() {
            link.close();
        }
        if self.state != ConnectionState::Aborted {
            info!(target = "session::connection", "connection closed by client");
        }
        self.state = ConnectionState::Aborted;
    }
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("url", &self.url.as_str())
            .field("state", &self.state)
            .field("retries", &self.retries)
            .field("generation", &self.generation)
            .field("retry_at", &self.retry_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockConnector;

    fn session(mock: &MockConnector, max_retries: u32) -> (ConnectionSession, EventReceiver) {
        let url = Url::parse("ws://127.0.0.1:8000/ws").unwrap();
        ConnectionSession::new(
            Arc::new(mock.clone()),
            url,
            RetryPolicy::new(max_retries, Duration::from_millis(300)),
        )
    }

    fn pump(session: &mut ConnectionSession, rx: &mut EventReceiver) -> Vec<Inbound> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(session.handle_event(event));
        }
        out
    }

    #[test]
    fn linear_backoff_then_abort() {
        let mock = MockConnector::new();
        let (mut conn, mut rx) = session(&mock, 3);
        conn.connect();

        let mut delays = Vec::new();
        for _ in 0..4 {
            assert!(mock.hang_up());
            match pump(&mut conn, &mut rx).as_slice() {
                [Inbound::Retrying { delay, .. }] => {
                    delays.push(*delay);
                    assert_eq!(conn.state(), ConnectionState::Reconnecting);
                    assert!(conn.retry_deadline().is_some());
                    conn.fire_retry();
                    assert_eq!(conn.state(), ConnectionState::Connecting);
                }
                [Inbound::Aborted] => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(300),
                Duration::from_millis(600),
                Duration::from_millis(900)
            ]
        );
        assert_eq!(conn.state(), ConnectionState::Aborted);
        assert!(conn.retry_deadline().is_none());
        assert_eq!(mock.open_count(), 4);
        conn.fire_retry();
        conn.connect();
        assert_eq!(mock.open_count(), 4);
    }

    #[test]
    fn open_resets_retry_counter() {
        let mock = MockConnector::new();
        let (mut conn, mut rx) = session(&mock, 3);
        conn.connect();
        mock.hang_up();
        pump(&mut conn, &mut rx);
        conn.fire_retry();
        mock.hang_up();
        pump(&mut conn, &mut rx);
        assert_eq!(conn.retries(), 2);
        conn.fire_retry();

        mock.accept();
        assert_eq!(pump(&mut conn, &mut rx), vec![Inbound::Opened]);
        assert_eq!(conn.retries(), 0);
        assert!(conn.is_open());

        mock.hang_up();
        assert_eq!(
            pump(&mut conn, &mut rx),
            vec![Inbound::Retrying {
                attempt: 1,
                delay: Duration::from_millis(300)
            }]
        );
    }

    #[test]
    fn send_only_while_open() {
        let mock = MockConnector::new();
        let (mut conn, mut rx) = session(&mock, 3);
        conn.connect();
        assert!(!conn.send(&[0x21, 0, 0, 0]));
        mock.accept();
        pump(&mut conn, &mut rx);
        assert!(conn.send(&[0x21, 1, 0, 0]));
        mock.hang_up();
        pump(&mut conn, &mut rx);
        assert!(!conn.send(&[0x21, 2, 0, 0]));
        assert_eq!(mock.sent(), vec![Bytes::from_static(&[0x21, 1, 0, 0])]);
    }

    #[test]
    fn stale_link_events_are_ignored() {
        let mock = MockConnector::new();
        let (mut conn, mut rx) = session(&mock, 3);
        conn.connect();
        let first = conn.current_link();
        mock.hang_up();
        pump(&mut conn, &mut rx);
        conn.fire_retry();

        let stale = TransportEvent {
            link: first,
            kind: TransportEventKind::Opened,
        };
        assert_eq!(conn.handle_event(stale), Inbound::Ignored);
        assert_eq!(conn.state(), ConnectionState::Connecting);
    }

    #[test]
    fn close_cancels_retry_and_blocks_reconnects() {
        let mock = MockConnector::new();
        let (mut conn, mut rx) = session(&mock, 5);
        conn.connect();
        mock.hang_up();
        pump(&mut conn, &mut rx);
        assert!(conn.retry_deadline().is_some());

        conn.close();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Aborted);
        assert_eq!(conn.policy().max_retries, 0);
        assert!(conn.retry_deadline().is_none());
        conn.fire_retry();
        assert_eq!(mock.open_count(), 1);
    }

    #[test]
    fn close_tears_down_open_link() {
        let mock = MockConnector::new().auto_open();
        let (mut conn, mut rx) = session(&mock, 5);
        conn.connect();
        pump(&mut conn, &mut rx);
        let link = conn.current_link();
        conn.close();
        assert!(mock.is_closed(link));
        // the link's own close notification arrives after the abort
        assert_eq!(pump(&mut conn, &mut rx), vec![Inbound::Ignored]);
        assert_eq!(conn.state(), ConnectionState::Aborted);
    }

    #[test]
    fn refused_open_follows_backoff() {
        let mock = MockConnector::new();
        mock.refuse_next_opens(1);
        let (mut conn, mut rx) = session(&mock, 2);
        conn.connect();
        assert_eq!(
            pump(&mut conn, &mut rx),
            vec![Inbound::Retrying {
                attempt: 1,
                delay: Duration::from_millis(300)
            }]
        );
        conn.fire_retry();
        assert_eq!(mock.open_count(), 1);
    }
}
