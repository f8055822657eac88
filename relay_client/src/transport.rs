use {crate::NetworkError, std::sync::Arc};
pub use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Why the socket stopped being connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The socket was closed with a close frame.
    Closed { code: CloseCode, reason: String },

    /// Connecting, reading or writing the socket failed.
    Error(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed { code, reason } => write!(f, "closed ({code}): {reason}"),
            Self::Error(err) => write!(f, "error: {err}"),
        }
    }
}

/// Callbacks produced by a [`SocketTransport`], delivered in order through the
/// channel returned alongside the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket is open.
    Connected,

    /// The socket is closed, or a connection attempt failed.
    Disconnected(Option<DisconnectReason>),

    /// A text frame arrived.
    Text(Arc<str>),
}

/// Raw socket contract. Operations are triggers: their outcome is reported
/// asynchronously as [`TransportEvent`]s.
pub trait SocketTransport: Send + Sync + 'static {
    /// Starts opening the socket.
    fn connect(&self);

    /// Closes the socket with the given code.
    fn disconnect(&self, code: CloseCode);

    /// Queues a text frame. Fails if the socket is not open.
    fn send(&self, text: String) -> Result<(), NetworkError>;
}
