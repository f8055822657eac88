use {
    crate::{
        CloseCode,
        ConnectMode,
        ConnectionHandler,
        ConnectionStatus,
        HandlerSnapshot,
        NetworkError,
        SocketStatusProvider,
        SocketTransport,
        TransportEvent,
    },
    parking_lot::Mutex,
    std::{sync::Arc, time::Duration},
    tokio::sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        watch,
    },
    tracing::debug,
};

type MessageSubscribers = Arc<Mutex<Vec<UnboundedSender<Arc<str>>>>>;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long [`Dispatcher::protected_send()`] waits for a connection.
    pub connection_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(15),
        }
    }
}

impl DispatcherConfig {
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

/// Send/receive mediator on top of a [`SocketTransport`].
///
/// Outbound frames are only ever written to a socket reporting
/// [`ConnectionStatus::Connected`]. Inbound frames are fanned out to every
/// [`Dispatcher::on_message()`] receiver in arrival order.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn SocketTransport>,
    handler: Arc<dyn ConnectionHandler>,
    status: SocketStatusProvider,
    subscribers: MessageSubscribers,
    config: DispatcherConfig,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("status", &self.status.status())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher consuming the transport's event channel. The
    /// `status` provider must be the one the `handler` was created with.
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        events: UnboundedReceiver<TransportEvent>,
        status: SocketStatusProvider,
        handler: Arc<dyn ConnectionHandler>,
        config: DispatcherConfig,
    ) -> Self {
        let subscribers = MessageSubscribers::default();

        tokio::spawn(event_pump(events, status.clone(), subscribers.clone()));

        Self {
            transport,
            handler,
            status,
            subscribers,
            config,
        }
    }

    /// Asks the connection handler to connect. The connection is established
    /// asynchronously.
    pub fn connect(&self) -> Result<(), NetworkError> {
        self.handler.handle_connect()
    }

    pub fn disconnect(&self, code: CloseCode) -> Result<(), NetworkError> {
        self.handler.handle_disconnect(code)
    }

    /// Sends the frame, connecting first if needed.
    ///
    /// The connection wait is bounded by the configured connection timeout.
    /// The frame is written at most once, and only to a connected socket.
    pub async fn protected_send(
        &self,
        message: impl Into<String>,
        mode: ConnectMode,
    ) -> Result<(), NetworkError> {
        let message = message.into();

        if !self.status.is_connected() {
            debug!(?mode, "socket not connected, requesting connection");

            let mut status = self.status.subscribe();

            // The handler may report success before the status stream has
            // seen the connected event.
            let connected = async {
                self.handler.handle_internal_connect(mode).await?;

                status
                    .wait_for(|status| *status == ConnectionStatus::Connected)
                    .await
                    .map_err(|_| NetworkError::NotConnected)?;

                Ok::<_, NetworkError>(())
            };

            tokio::time::timeout(self.config.connection_timeout, connected)
                .await
                .map_err(|_| NetworkError::ConnectionFailed)??;
        }

        self.send(message)
    }

    /// Sends the frame if the socket is connected.
    pub fn send(&self, message: impl Into<String>) -> Result<(), NetworkError> {
        if !self.status.is_connected() {
            return Err(NetworkError::NotConnected);
        }

        self.transport.send(message.into())
    }

    /// Returns a receiver for every inbound text frame.
    pub fn on_message(&self) -> UnboundedReceiver<Arc<str>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn socket_connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.status()
    }

    pub async fn handler_snapshot(&self) -> Result<HandlerSnapshot, NetworkError> {
        self.handler.snapshot().await
    }
}

async fn event_pump(
    mut events: UnboundedReceiver<TransportEvent>,
    status: SocketStatusProvider,
    subscribers: MessageSubscribers,
) {
    while let Some(event) = events.recv().await {
        match &event {
            TransportEvent::Text(text) => {
                subscribers
                    .lock()
                    .retain(|tx| tx.send(text.clone()).is_ok());
            }

            TransportEvent::Disconnected(Some(reason)) => {
                debug!(%reason, "socket disconnected");
                status.process(&event);
            }

            TransportEvent::Connected | TransportEvent::Disconnected(None) => {
                status.process(&event);
            }
        }
    }
}
