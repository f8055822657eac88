use {
    crate::link_mode::{LinkEnvelopeTransport, LinkModeError},
    async_trait::async_trait,
    parking_lot::Mutex,
    relay_client::{ClientBuilder, CloseCode, DisconnectReason, NetworkError, SocketTransport, TransportEvent},
    relay_rpc::{
        domain::{MessageIdGenerator, SubscriptionId, Topic},
        rpc::{ErrorData, ErrorResponse, Params, Payload, Publish, Response, SuccessfulResponse},
    },
    serde_json::json,
    std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
            Weak,
        },
    },
    tokio::sync::mpsc::{self, UnboundedSender},
    url::Url,
};

fn subscription_id(topic: &Topic) -> SubscriptionId {
    SubscriptionId::from(Arc::<str>::from(format!("sub-{topic}")))
}

/// In-memory relay shared by several clients.
///
/// Messages are delivered to every other socket subscribed to the topic.
/// Messages nobody received wait in the mailbox for the next subscriber.
#[derive(Default)]
pub(crate) struct RelayHub {
    state: Mutex<HubState>,
    ids: MessageIdGenerator,
    next_socket: AtomicUsize,
    reject_subscriptions: AtomicBool,
}

#[derive(Default)]
struct HubState {
    sockets: Vec<Weak<HubSocket>>,
    mailbox: Vec<Publish>,
    published: Vec<Publish>,
}

impl RelayHub {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn client(self: &Arc<Self>) -> relay_client::Client {
        let (events, rx) = mpsc::unbounded_channel();

        let socket = Arc::new(HubSocket {
            id: self.next_socket.fetch_add(1, Ordering::SeqCst),
            hub: Arc::downgrade(self),
            events,
            connected: AtomicBool::new(false),
            topics: Mutex::new(HashSet::new()),
        });

        self.state.lock().sockets.push(Arc::downgrade(&socket));

        ClientBuilder::new().build_with_transport(socket, rx)
    }

    /// Answers subscribe requests with an error while set.
    pub(crate) fn reject_subscriptions(&self, reject: bool) {
        self.reject_subscriptions.store(reject, Ordering::SeqCst);
    }

    fn rejects_subscriptions(&self) -> bool {
        self.reject_subscriptions.load(Ordering::SeqCst)
    }

    /// Every message published so far, in order.
    pub(crate) fn published(&self) -> Vec<Publish> {
        self.state.lock().published.clone()
    }

    fn publish(&self, from: usize, publish: Publish) {
        let mut state = self.state.lock();
        state.published.push(publish.clone());

        let mut delivered = false;
        for socket in state.sockets.iter().filter_map(Weak::upgrade) {
            if socket.id != from && socket.is_subscribed(&publish.topic) {
                socket.deliver(self, &publish);
                delivered = true;
            }
        }

        if !delivered {
            state.mailbox.push(publish);
        }
    }

    fn replay(&self, socket: &HubSocket, topics: &[Topic]) {
        let mut state = self.state.lock();

        let (ready, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.mailbox)
            .into_iter()
            .partition(|publish| topics.contains(&publish.topic));

        state.mailbox = kept;

        for publish in &ready {
            socket.deliver(self, publish);
        }
    }
}

struct HubSocket {
    id: usize,
    hub: Weak<RelayHub>,
    events: UnboundedSender<TransportEvent>,
    connected: AtomicBool,
    topics: Mutex<HashSet<Topic>>,
}

impl HubSocket {
    fn is_subscribed(&self, topic: &Topic) -> bool {
        self.connected.load(Ordering::SeqCst) && self.topics.lock().contains(topic)
    }

    fn deliver(&self, hub: &RelayHub, publish: &Publish) {
        let request = publish.as_subscription(
            hub.ids.next(),
            subscription_id(&publish.topic),
            chrono::Utc::now().timestamp_millis(),
        );

        self.emit(&Payload::Request(request));
    }

    fn emit(&self, payload: &Payload) {
        if let Ok(text) = serde_json::to_string(payload) {
            self.events.send(TransportEvent::Text(text.into())).ok();
        }
    }
}

impl SocketTransport for HubSocket {
    fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.events.send(TransportEvent::Connected).ok();
    }

    fn disconnect(&self, code: CloseCode) {
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
            return Err(NetworkError::NotConnected);
        }

        // Acks of delivered messages need no answer.
        let Ok(Payload::Request(request)) = serde_json::from_str::<Payload>(&text) else {
            return Ok(());
        };

        let Some(hub) = self.hub.upgrade() else {
            return Ok(());
        };

        let subscribing = matches!(request.params, Params::Subscribe(_) | Params::BatchSubscribe(_));

        if subscribing && hub.rejects_subscriptions() {
            self.emit(&Payload::Response(Response::Error(ErrorResponse::new(
                request.id,
                ErrorData {
                    code: -32000,
                    message: "subscription rejected".to_owned(),
                    data: None,
                },
            ))));

            return Ok(());
        }

        let result = match &request.params {
            Params::Subscribe(params) => {
                self.topics.lock().insert(params.topic.clone());
                json!(subscription_id(&params.topic))
            }

            Params::BatchSubscribe(params) => {
                self.topics.lock().extend(params.topics.iter().cloned());
                json!(params.topics.iter().map(subscription_id).collect::<Vec<_>>())
            }

            Params::Unsubscribe(params) => {
                self.topics.lock().remove(&params.topic);
                json!(true)
            }

            Params::BatchUnsubscribe(params) => {
                let mut topics = self.topics.lock();
                for subscription in &params.subscriptions {
                    topics.remove(&subscription.topic);
                }
                json!(true)
            }

            Params::Publish(_) => json!(true),

            Params::Subscription(_) => return Ok(()),
        };

        self.emit(&Payload::Response(Response::Success(SuccessfulResponse::new(
            request.id, result,
        ))));

        match request.params {
            Params::Subscribe(params) => hub.replay(self, &[params.topic]),
            Params::BatchSubscribe(params) => hub.replay(self, &params.topics),
            Params::Publish(publish) => hub.publish(self.id, publish),
            _ => {}
        }

        Ok(())
    }
}

/// Records envelope links instead of opening them.
#[derive(Debug, Default)]
pub(crate) struct RecordingLinks {
    urls: Mutex<Vec<Url>>,
}

impl RecordingLinks {
    pub(crate) fn take(&self) -> Vec<Url> {
        std::mem::take(&mut *self.urls.lock())
    }
}

#[async_trait]
impl LinkEnvelopeTransport for RecordingLinks {
    async fn dispatch(&self, url: Url) -> Result<(), LinkModeError> {
        self.urls.lock().push(url);
        Ok(())
    }
}
