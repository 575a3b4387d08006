use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace, warn};
use url::Url;

use super::{Connector, EventEmitter, EventSender, Link, LinkId, TransportError};

/// Opens binary WebSocket links, one wire message per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug)]
enum Outgoing {
    Frame(Bytes),
    Close,
}

struct WebSocketLink {
    link: LinkId,
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Connector for WebSocketConnector {
    fn open(
        &self,
        url: &Url,
        link: LinkId,
        events: EventSender,
    ) -> Result<Box<dyn Link>, TransportError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| TransportError::Setup(err.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = EventEmitter::new(link, events);
        runtime.spawn(run_link(url.clone(), emitter, rx));
        Ok(Box::new(WebSocketLink { link, tx }))
    }
}

impl Link for WebSocketLink {
    fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        self.tx
            .send(Outgoing::Frame(frame))
            .map_err(|_| TransportError::ChannelClosed)
    }

    fn close(&self) {
        if self.tx.send(Outgoing::Close).is_err() {
            trace!(
                target = "transport::websocket",
                link = self.link.0,
                "close requested on finished link"
            );
        }
    }
}

async fn run_link(url: Url, emitter: EventEmitter, mut outgoing: mpsc::UnboundedReceiver<Outgoing>) {
    let link = emitter.link().0;
    debug!(target = "transport::websocket", link, url = %url, "connecting");
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            warn!(target = "transport::websocket", link, error = %err, "connect failed");
            emitter.error(err.to_string());
            emitter.closed();
            return;
        }
    };
    debug!(target = "transport::websocket", link, "connected");
    emitter.opened();

    let (mut sink, mut stream) = stream.split();
    loop {
        tokio::select! {
            command = outgoing.recv() => match command {
                Some(Outgoing::Frame(frame)) => {
                    if let Err(err) = sink.send(Message::Binary(frame.to_vec())).await {
                        warn!(target = "transport::websocket", link, error = %err, "send failed");
                        emitter.error(err.to_string());
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    debug!(target = "transport::websocket", link, "closed locally");
                    break;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Binary(data))) => {
                    trace!(target = "transport::websocket", link, bytes = data.len(), "frame received");
                    if !emitter.message(Bytes::from(data)) {
                        break;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    debug!(target = "transport::websocket", link, len = text.len(), "ignoring text frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(target = "transport::websocket", link, ?frame, "closed by peer");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(target = "transport::websocket", link, error = %err, "stream error");
                    emitter.error(err.to_string());
                    break;
                }
                None => break,
            },
        }
    }
    emitter.closed();
}
