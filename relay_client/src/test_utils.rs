use {
    crate::{CloseCode, DisconnectReason, NetworkError, SocketTransport, TransportEvent},
    parking_lot::Mutex,
    std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectBehavior {
    /// Every attempt succeeds.
    Accept,

    /// Every attempt fails with a disconnect event.
    Refuse,

    /// Attempts never produce any event.
    Ignore,
}

type Responder = Box<dyn Fn(&str) -> Vec<String> + Send + Sync>;

pub(crate) struct MockTransport {
    events: UnboundedSender<TransportEvent>,
    behavior: Mutex<ConnectBehavior>,
    connected: AtomicBool,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    unconnected_sends: AtomicUsize,
    sent: Mutex<Vec<String>>,
    responder: Mutex<Option<Responder>>,
}

impl MockTransport {
    pub(crate) fn new(
        behavior: ConnectBehavior,
    ) -> (Arc<Self>, UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();

        let transport = Self {
            events,
            behavior: Mutex::new(behavior),
            connected: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            unconnected_sends: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            responder: Mutex::new(None),
        };

        (Arc::new(transport), rx)
    }

    pub(crate) fn set_behavior(&self, behavior: ConnectBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Generates inbound frames for every sent frame.
    pub(crate) fn set_responder(&self, responder: impl Fn(&str) -> Vec<String> + Send + Sync + 'static) {
        *self.responder.lock() = Some(Box::new(responder));
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn unconnected_sends(&self) -> usize {
        self.unconnected_sends.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub(crate) fn emit_text(&self, text: &str) {
        self.events.send(TransportEvent::Text(text.into())).ok();
    }

    /// Simulates the server closing the socket.
    pub(crate) fn drop_connection(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.events
                .send(TransportEvent::Disconnected(Some(DisconnectReason::Closed {
                    code: CloseCode::Away,
                    reason: "server going away".to_owned(),
                })))
                .ok();
        }
    }
}

impl SocketTransport for MockTransport {
    fn connect(&self) {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        match *self.behavior.lock() {
            ConnectBehavior::Accept => {
                self.connected.store(true, Ordering::SeqCst);
                self.events.send(TransportEvent::Connected).ok();
            }

            ConnectBehavior::Refuse => {
                self.events
                    .send(TransportEvent::Disconnected(Some(DisconnectReason::Error(
                        "connection refused".to_owned(),
                    ))))
                    .ok();
            }

            ConnectBehavior::Ignore => {}
        }
    }

    fn disconnect(&self, code: CloseCode) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);

        if self.connected.swap(false, Ordering::SeqCst) {
            self.events
                .send(TransportEvent::Disconnected(Some(DisconnectReason::Closed {
                    code,
                    reason: String::new(),
                })))
                .ok();
        }
    }

    fn send(&self, text: String) -> Result<(), NetworkError> {
        if !self.connected.load(Ordering::SeqCst) {
            self.unconnected_sends.fetch_add(1, Ordering::SeqCst);
            return Err(NetworkError::NotConnected);
        }

        let replies = self
            .responder
            .lock()
            .as_ref()
            .map(|responder| responder(&text))
            .unwrap_or_default();

        self.sent.lock().push(text);

        for reply in replies {
            self.emit_text(&reply);
        }

        Ok(())
    }
}
