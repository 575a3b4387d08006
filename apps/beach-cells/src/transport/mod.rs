//! Duplex frame transport consumed by the connection session.
//!
//! A [`Connector`] opens one [`Link`] per connection attempt. Links never call
//! back into the session; everything they observe (open, inbound frames,
//! errors, close) is delivered as a [`TransportEvent`] on the session's
//! channel so all state changes happen on the session task.

use bytes::Bytes;
use tokio::sync::mpsc;
use url::Url;

pub mod mock;
pub mod websocket;

/// Generation id of a connection attempt. Events from older links are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    Message(Bytes),
    Error(String),
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub link: LinkId,
    pub kind: TransportEventKind,
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport setup failed: {0}")]
    Setup(String),
    #[error("transport channel closed")]
    ChannelClosed,
}

pub trait Connector: Send + Sync {
    /// Starts a connection attempt and returns immediately. The outcome is
    /// reported through `events`, tagged with `link`.
    fn open(
        &self,
        url: &Url,
        link: LinkId,
        events: EventSender,
    ) -> Result<Box<dyn Link>, TransportError>;
}

pub trait Link: Send {
    fn send(&self, frame: Bytes) -> Result<(), TransportError>;
    fn close(&self);
}

/// Tags events with their link id before handing them to the session.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    link: LinkId,
    events: EventSender,
}

impl EventEmitter {
    pub fn new(link: LinkId, events: EventSender) -> Self {
        Self { link, events }
    }

    pub fn link(&self) -> LinkId {
        self.link
    }

    fn emit(&self, kind: TransportEventKind) -> bool {
        self.events
            .send(TransportEvent {
                link: self.link,
                kind,
            })
            .is_ok()
    }

    pub fn opened(&self) -> bool {
        self.emit(TransportEventKind::Opened)
    }

    pub fn message(&self, frame: Bytes) -> bool {
        self.emit(TransportEventKind::Message(frame))
    }

    pub fn error(&self, reason: impl Into<String>) -> bool {
        self.emit(TransportEventKind::Error(reason.into()))
    }

    pub fn closed(&self) -> bool {
        self.emit(TransportEventKind::Closed)
    }
}
