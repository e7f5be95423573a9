//! Connection port and its WebSocket adapter.
//!
//! The channel client only sees [`SocketEvent`]s and sends [`Outbound`]
//! frames, so tests can drive it without a server.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

/// Close code reported when the connection drops without a close frame.
pub(crate) const ABNORMAL_CLOSURE: u16 = 1006;
/// Close code reported for a close frame without a status.
const NO_STATUS: u16 = 1005;

/// Something that happened on the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    Text(String),
    /// Always the last event of a socket.
    Closed { code: u16, reason: String },
    Error(String),
}

/// Frame to write to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// One connection attempt. Dropping `outgoing` closes the socket.
pub struct SocketHandle {
    pub outgoing: mpsc::UnboundedSender<Outbound>,
    pub events: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Opens connections to the realtime endpoint.
pub trait Connector: Send + Sync {
    fn open(&self, url: &Url) -> SocketHandle;
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn open(&self, url: &Url) -> SocketHandle {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(url.to_string(), outgoing_rx, events_tx));
        SocketHandle { outgoing, events }
    }
}

async fn run_socket(
    url: String,
    mut outgoing: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let closed = |code: u16, reason: String| SocketEvent::Closed { code, reason };

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            warn!(error = %e, "WebSocket connect failed");
            let _ = events.send(SocketEvent::Error(e.to_string()));
            let _ = events.send(closed(ABNORMAL_CLOSURE, String::new()));
            return;
        }
    };
    let _ = events.send(SocketEvent::Opened);
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            frame = outgoing.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        let _ = events.send(SocketEvent::Error(e.to_string()));
                        let _ = events.send(closed(ABNORMAL_CLOSURE, String::new()));
                        return;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "Close frame not delivered");
                    }
                    let _ = events.send(closed(code, reason));
                    return;
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(SocketEvent::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((NO_STATUS, String::new()));
                    let _ = events.send(closed(code, reason));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(SocketEvent::Error(e.to_string()));
                    let _ = events.send(closed(ABNORMAL_CLOSURE, String::new()));
                    return;
                }
                None => {
                    let _ = events.send(closed(ABNORMAL_CLOSURE, String::new()));
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_abnormal_close() {
        let url = Url::parse("ws://127.0.0.1:1/ws").unwrap();
        let mut handle = TungsteniteConnector.open(&url);

        assert!(matches!(handle.events.recv().await, Some(SocketEvent::Error(_))));
        assert_eq!(
            handle.events.recv().await,
            Some(SocketEvent::Closed {
                code: ABNORMAL_CLOSURE,
                reason: String::new()
            })
        );
    }
}
