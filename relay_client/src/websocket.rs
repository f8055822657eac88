//! [`SocketTransport`] implementation over `tokio-tungstenite`.

use {
    self::connection::{connection_event_loop, SocketControl},
    crate::{CloseCode, ConnectionOptions, NetworkError, SocketTransport, TransportEvent},
    std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
pub use {stream::*, tokio_tungstenite::tungstenite::protocol::CloseFrame};

mod connection;
mod stream;

pub type TransportError = tokio_tungstenite::tungstenite::Error;

#[derive(Debug, thiserror::Error)]
pub enum WebsocketClientError {
    #[error("Failed to build connection request: {0}")]
    Request(#[from] crate::RequestBuildError),

    #[error("Failed to connect: {0}")]
    ConnectionFailed(TransportError),

    #[error("Connection closed: {0}")]
    ConnectionClosed(CloseReason),

    #[error("Failed to close connection: {0}")]
    ClosingFailed(TransportError),

    #[error("Websocket transport error: {0}")]
    Transport(TransportError),

    #[error("Non UTF-8 binary frame")]
    InvalidFrame,

    #[error("Not connected")]
    NotConnected,
}

/// Wrapper around the websocket [`CloseFrame`] providing info about the
/// connection closing reason.
#[derive(Debug, Clone)]
pub struct CloseReason(pub Option<CloseFrame<'static>>);

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(frame) = &self.0 {
            frame.fmt(f)
        } else {
            f.write_str("<close frame unavailable>")
        }
    }
}

/// Websocket connection to the Relay.
///
/// The socket itself is owned by a background task. Its lifecycle is reported
/// through the [`TransportEvent`] receiver returned by
/// [`WebsocketTransport::new()`].
#[derive(Debug, Clone)]
pub struct WebsocketTransport {
    control_tx: UnboundedSender<SocketControl>,
    connected: Arc<AtomicBool>,
}

impl WebsocketTransport {
    pub fn new(opts: ConnectionOptions) -> (Self, UnboundedReceiver<TransportEvent>) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        tokio::spawn(connection_event_loop(
            control_rx,
            opts,
            events_tx,
            connected.clone(),
        ));

        let transport = Self {
            control_tx,
            connected,
        };

        (transport, events_rx)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl SocketTransport for WebsocketTransport {
    fn connect(&self) {
        self.control_tx.send(SocketControl::Connect).ok();
    }

    fn disconnect(&self, code: CloseCode) {
        self.control_tx.send(SocketControl::Disconnect(code)).ok();
    }

    fn send(&self, text: String) -> Result<(), NetworkError> {
        if !self.is_connected() {
            return Err(NetworkError::NotConnected);
        }

        self.control_tx
            .send(SocketControl::Send(text))
            .map_err(|_| NetworkError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::DisconnectReason,
        futures_util::{SinkExt, StreamExt},
        tokio::net::TcpListener,
        tokio_tungstenite::tungstenite::Message,
    };

    async fn echo_server() -> anyhow::Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = format!("ws://{}", listener.local_addr()?);

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };

            let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };

            while let Some(Ok(message)) = socket.next().await {
                match message {
                    Message::Text(text) if text == "bye" => {
                        socket.close(None).await.ok();
                        break;
                    }

                    Message::Text(text) => {
                        socket.send(Message::Text(text)).await.ok();
                    }

                    _ => {}
                }
            }
        });

        Ok(address)
    }

    #[tokio::test]
    async fn echo_round_trip() -> anyhow::Result<()> {
        let address = echo_server().await?;
        let opts = ConnectionOptions::new("1979a8326eb123238e633655924f0a78").with_address(address);
        let (transport, mut events) = WebsocketTransport::new(opts);

        assert_eq!(
            transport.send("early".to_owned()),
            Err(NetworkError::NotConnected)
        );

        transport.connect();
        assert_eq!(events.recv().await, Some(TransportEvent::Connected));
        assert!(transport.is_connected());

        transport.send("hello".to_owned())?;
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Text("hello".into()))
        );

        transport.send("bye".to_owned())?;
        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Disconnected(Some(DisconnectReason::Closed { .. })))
        ));
        assert!(!transport.is_connected());

        Ok(())
    }

    #[tokio::test]
    async fn refused_connection_reports_disconnect() -> anyhow::Result<()> {
        // Bind and drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = format!("ws://{}", listener.local_addr()?);
        drop(listener);

        let opts = ConnectionOptions::new("1979a8326eb123238e633655924f0a78").with_address(address);
        let (transport, mut events) = WebsocketTransport::new(opts);

        transport.connect();

        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::Disconnected(Some(DisconnectReason::Error(_))))
        ));
        assert!(!transport.is_connected());

        Ok(())
    }
}
