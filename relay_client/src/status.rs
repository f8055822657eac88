use {
    crate::TransportEvent,
    std::sync::Arc,
    tokio::sync::watch,
};

/// Process-wide socket connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Normalizes transport connect/disconnect callbacks into a single status
/// stream. New subscribers observe the last known status.
#[derive(Debug, Clone)]
pub struct SocketStatusProvider {
    tx: Arc<watch::Sender<ConnectionStatus>>,
}

impl Default for SocketStatusProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketStatusProvider {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionStatus::Disconnected);

        Self { tx: Arc::new(tx) }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    /// Records a transport event. Every connect/disconnect callback notifies
    /// subscribers, including repeated disconnects from failed attempts.
    /// Returns `false` for events that carry no status.
    pub fn process(&self, event: &TransportEvent) -> bool {
        let status = match event {
            TransportEvent::Connected => ConnectionStatus::Connected,
            TransportEvent::Disconnected(_) => ConnectionStatus::Disconnected,
            TransportEvent::Text(_) => return false,
        };

        self.tx.send_replace(status);

        true
    }
}
