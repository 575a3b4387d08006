//! In-memory connector for tests and headless runs.
//!
//! Every `open` is recorded; the test side then plays the authority by
//! emitting events on the most recent link and inspecting what the client
//! sent.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use url::Url;

use super::{Connector, EventEmitter, EventSender, Link, LinkId, TransportError};

#[derive(Debug, Default)]
struct MockState {
    links: Vec<MockLinkState>,
    refuse_opens: usize,
}

#[derive(Debug)]
struct MockLinkState {
    url: Url,
    emitter: EventEmitter,
    sent: Vec<Bytes>,
    closed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
    auto_open: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links report `Opened` as soon as they are created.
    pub fn auto_open(mut self) -> Self {
        self.auto_open = true;
        self
    }

    /// Makes the next `count` opens fail synchronously.
    pub fn refuse_next_opens(&self, count: usize) {
        self.state.lock().refuse_opens = count;
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().links.len()
    }

    pub fn latest(&self) -> Option<LinkId> {
        self.state.lock().links.last().map(|link| link.emitter.link())
    }

    pub fn urls(&self) -> Vec<Url> {
        self.state
            .lock()
            .links
            .iter()
            .map(|link| link.url.clone())
            .collect()
    }

    /// Frames the client sent across every link, in order.
    pub fn sent(&self) -> Vec<Bytes> {
        self.state
            .lock()
            .links
            .iter()
            .flat_map(|link| link.sent.iter().cloned())
            .collect()
    }

    pub fn is_closed(&self, link: LinkId) -> bool {
        self.state
            .lock()
            .links
            .iter()
            .find(|state| state.emitter.link() == link)
            .map(|state| state.closed)
            .unwrap_or(false)
    }

    fn with_latest(&self, f: impl FnOnce(&EventEmitter) -> bool) -> bool {
        let state = self.state.lock();
        state.links.last().map(|link| f(&link.emitter)).unwrap_or(false)
    }

    pub fn accept(&self) -> bool {
        self.with_latest(|emitter| emitter.opened())
    }

    pub fn deliver(&self, frame: impl Into<Bytes>) -> bool {
        let frame = frame.into();
        self.with_latest(|emitter| emitter.message(frame))
    }

    pub fn fail(&self, reason: &str) -> bool {
        self.with_latest(|emitter| emitter.error(reason))
    }

    /// Simulates the authority dropping the latest connection.
    pub fn hang_up(&self) -> bool {
        let mut state = self.state.lock();
        match state.links.last_mut() {
            Some(link) => {
                link.closed = true;
                link.emitter.closed()
            }
            None => false,
        }
    }
}

impl Connector for MockConnector {
    fn open(
        &self,
        url: &Url,
        link: LinkId,
        events: EventSender,
    ) -> Result<Box<dyn Link>, TransportError> {
        let mut state = self.state.lock();
        if state.refuse_opens > 0 {
            state.refuse_opens -= 1;
            return Err(TransportError::Setup(format!("mock refused {url}")));
        }
        let emitter = EventEmitter::new(link, events);
        if self.auto_open {
            emitter.opened();
        }
        state.links.push(MockLinkState {
            url: url.clone(),
            emitter,
            sent: Vec::new(),
            closed: false,
        });
        Ok(Box::new(MockLink {
            link,
            state: self.state.clone(),
        }))
    }
}

struct MockLink {
    link: LinkId,
    state: Arc<Mutex<MockState>>,
}

impl Link for MockLink {
    fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let entry = state
            .links
            .iter_mut()
            .find(|entry| entry.emitter.link() == self.link)
            .ok_or(TransportError::ChannelClosed)?;
        if entry.closed {
            return Err(TransportError::ChannelClosed);
        }
        entry.sent.push(frame);
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if let Some(entry) = state
            .links
            .iter_mut()
            .find(|entry| entry.emitter.link() == self.link)
        {
            if !entry.closed {
                entry.closed = true;
                entry.emitter.closed();
            }
        }
    }
}
