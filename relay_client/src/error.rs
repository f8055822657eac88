use relay_rpc::rpc::ValidationError;

/// Errors generated while parsing
/// [`ConnectionOptions`][crate::ConnectionOptions] and creating an HTTP request
/// for the websocket connection.
#[derive(Debug, thiserror::Error)]
pub enum RequestBuildError {
    #[error("Failed to serialize connection query: {0}")]
    Query(#[from] serde_qs::Error),

    #[error("Failed to add request headers")]
    Headers,

    #[error("Failed to parse connection URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Failed to create websocket request: {0}")]
    Other(tokio_tungstenite::tungstenite::Error),
}

/// Connection-level failures surfaced by the connection handlers and the
/// [`Dispatcher`][crate::Dispatcher].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("Connection failed")]
    ConnectionFailed,

    #[error("Internal connection rejected: no tracked topics")]
    InternalConnectionRejected,

    #[error("Subscription connection rejected: no tracked topics")]
    SubscriptionConnectionRejected,

    #[error("Socket is not connected")]
    NotConnected,

    #[error("Internal error: Channel closed")]
    ChannelClosed,
}

/// Possible Relay client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Internal error: Channel closed")]
    ChannelClosed,

    #[error("Internal error: Duplicate request ID")]
    DuplicateRequestId,

    #[error("Request timed out")]
    Timeout,

    #[error("Serialization failed: {0}")]
    Serialization(serde_json::Error),

    #[error("Deserialization failed: {0}")]
    Deserialization(serde_json::Error),

    #[error("RPC error ({code}): {message}")]
    Rpc { code: i32, message: String },
}
