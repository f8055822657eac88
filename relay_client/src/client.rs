use {
    crate::{
        websocket::WebsocketTransport,
        AppState,
        AutomaticConnectionHandler,
        BackgroundTaskRegistrar,
        ClientError,
        CloseCode,
        ConnectMode,
        ConnectionHandler,
        ConnectionOptions,
        ConnectionStatus,
        Dispatcher,
        DispatcherConfig,
        ManualConnectionHandler,
        NoopBackgroundTaskRegistrar,
        ReconnectConfig,
        SocketStatusProvider,
        SocketTransport,
        SubscriptionsTracker,
        TransportEvent,
    },
    dashmap::{mapref::entry::Entry, DashMap},
    parking_lot::Mutex,
    relay_rpc::{
        domain::{MessageId, MessageIdGenerator, SubscriptionId, Topic},
        rpc::{
            BatchSubscribe,
            BatchUnsubscribe,
            Params,
            Payload,
            Publish,
            Request,
            RequestPayload,
            Response,
            Subscribe,
            Subscription,
            SuccessfulResponse,
            Unsubscribe,
            MAX_SUBSCRIPTION_BATCH_SIZE,
        },
    },
    std::{
        sync::{Arc, Weak},
        time::Duration,
    },
    tokio::sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        oneshot,
        watch,
    },
    tracing::{debug, info, warn},
};


type ResponseSender = oneshot::Sender<Result<serde_json::Value, ClientError>>;

/// The message received from a subscription.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub message_id: MessageId,
    pub subscription_id: SubscriptionId,
    pub topic: Topic,
    pub message: Arc<str>,
    pub tag: u32,
    pub published_at: chrono::DateTime<chrono::Utc>,
    pub received_at: chrono::DateTime<chrono::Utc>,
}

impl PublishedMessage {
    fn from_request(id: MessageId, subscription: Subscription) -> Self {
        let Subscription { id: subscription_id, data } = subscription;
        let now = chrono::Utc::now();

        Self {
            message_id: id,
            subscription_id,
            topic: data.topic,
            message: data.message,
            tag: data.tag,
            published_at: chrono::DateTime::from_timestamp_millis(data.published_at)
                .unwrap_or(now),
            received_at: now,
        }
    }
}

/// Which connection handler drives the socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionPolicy {
    #[default]
    Automatic,
    Manual,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub policy: ConnectionPolicy,

    /// How long to wait for the relay to answer a request.
    pub request_timeout: Duration,

    pub reconnect: ReconnectConfig,
    pub dispatcher: DispatcherConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            policy: ConnectionPolicy::default(),
            request_timeout: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: DispatcherConfig) -> Self {
        self.dispatcher = dispatcher;
        self
    }
}

pub struct ClientBuilder {
    config: ClientConfig,
    registrar: Arc<dyn BackgroundTaskRegistrar>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            registrar: Arc::new(NoopBackgroundTaskRegistrar),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Platform hook used by the automatic handler to keep the socket alive
    /// while the app is in background.
    pub fn with_background_registrar(
        mut self,
        registrar: Arc<dyn BackgroundTaskRegistrar>,
    ) -> Self {
        self.registrar = registrar;
        self
    }

    /// Builds a client on top of the websocket transport.
    pub fn build(self, opts: ConnectionOptions) -> Client {
        let (transport, events) = WebsocketTransport::new(opts);
        self.build_with_transport(Arc::new(transport), events)
    }

    /// Builds a client on top of a custom transport.
    pub fn build_with_transport(
        self,
        transport: Arc<dyn SocketTransport>,
        events: UnboundedReceiver<TransportEvent>,
    ) -> Client {
        let Self { config, registrar } = self;
        let status = SocketStatusProvider::new();
        let subscriptions = SubscriptionsTracker::new();

        let handler = match config.policy {
            ConnectionPolicy::Automatic => {
                Handler::Automatic(Arc::new(AutomaticConnectionHandler::with_registrar(
                    transport.clone(),
                    &status,
                    subscriptions.clone(),
                    config.reconnect.clone(),
                    registrar,
                )))
            }

            ConnectionPolicy::Manual => Handler::Manual(Arc::new(ManualConnectionHandler::new(
                transport.clone(),
                &status,
                subscriptions.clone(),
                config.reconnect.clone(),
            ))),
        };

        let dispatcher = Dispatcher::new(
            transport,
            events,
            status,
            handler.as_dyn(),
            config.dispatcher.clone(),
        );

        let inbound_rx = dispatcher.on_message();
        let status_rx = dispatcher.socket_connection_status();

        let inner = Arc::new(Inner {
            dispatcher,
            handler,
            subscriptions,
            requests: DashMap::new(),
            id_generator: MessageIdGenerator::new(),
            message_subscribers: Mutex::new(Vec::new()),
            config,
        });

        tokio::spawn(inbound_loop(Arc::downgrade(&inner), inbound_rx));
        tokio::spawn(resubscribe_loop(Arc::downgrade(&inner), status_rx));

        Client { inner }
    }
}

#[derive(Debug, Clone)]
enum Handler {
    Automatic(Arc<AutomaticConnectionHandler>),
    Manual(Arc<ManualConnectionHandler>),
}

impl Handler {
    fn as_dyn(&self) -> Arc<dyn ConnectionHandler> {
        match self {
            Self::Automatic(handler) => handler.clone(),
            Self::Manual(handler) => handler.clone(),
        }
    }
}

struct Inner {
    dispatcher: Dispatcher,
    handler: Handler,
    subscriptions: SubscriptionsTracker,
    requests: DashMap<MessageId, ResponseSender>,
    id_generator: MessageIdGenerator,
    message_subscribers: Mutex<Vec<UnboundedSender<PublishedMessage>>>,
    config: ClientConfig,
}

/// The Relay RPC client.
///
/// Requests are correlated with their responses by message ID. Every tracked
/// topic is re-subscribed when the socket reconnects.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("dispatcher", &self.inner.dispatcher)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Opens the connection to the Relay. The connection is established
    /// asynchronously, see [`Client::connection_status()`].
    pub fn connect(&self) -> Result<(), ClientError> {
        Ok(self.inner.dispatcher.connect()?)
    }

    /// Closes the Relay connection. The automatic handler does not reconnect
    /// until [`Client::connect()`] is called again.
    pub fn disconnect(&self, code: CloseCode) -> Result<(), ClientError> {
        Ok(self.inner.dispatcher.disconnect(code)?)
    }

    /// Reports an app lifecycle transition. Ignored by the manual policy.
    pub fn handle_app_state(&self, state: AppState) -> Result<(), ClientError> {
        match &self.inner.handler {
            Handler::Automatic(handler) => Ok(handler.handle_app_state(state)?),
            Handler::Manual(_) => Ok(()),
        }
    }

    /// Reports a network reachability change. Ignored by the manual policy.
    pub fn handle_network_reachability(&self, reachable: bool) -> Result<(), ClientError> {
        match &self.inner.handler {
            Handler::Automatic(handler) => Ok(handler.handle_network_reachability(reachable)?),
            Handler::Manual(_) => Ok(()),
        }
    }

    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.dispatcher.socket_connection_status()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn subscriptions(&self) -> &SubscriptionsTracker {
        &self.inner.subscriptions
    }

    /// Returns a receiver for every message delivered on a subscribed topic.
    pub fn messages(&self) -> UnboundedReceiver<PublishedMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.message_subscribers.lock().push(tx);
        rx
    }

    /// Publishes a message over the network on given topic.
    pub async fn publish(
        &self,
        topic: Topic,
        message: impl Into<Arc<str>>,
        tag: u32,
        ttl: Duration,
        prompt: bool,
    ) -> Result<(), ClientError> {
        let ttl_secs = u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX);

        self.request(
            Publish {
                topic,
                message: message.into(),
                ttl_secs,
                tag,
                prompt,
            },
            ConnectMode::Unconditional,
        )
        .await?;

        Ok(())
    }

    /// Subscribes on topic to receive messages, and tracks it for
    /// re-subscription.
    pub async fn subscribe(&self, topic: Topic) -> Result<SubscriptionId, ClientError> {
        let id = self
            .request(
                Subscribe {
                    topic: topic.clone(),
                },
                ConnectMode::Unconditional,
            )
            .await?;

        debug!(%topic, "subscribed");
        self.inner.subscriptions.set(topic, id.clone());

        Ok(id)
    }

    /// Subscribes on multiple topics to receive messages.
    pub async fn batch_subscribe(
        &self,
        topics: impl Into<Vec<Topic>>,
    ) -> Result<Vec<SubscriptionId>, ClientError> {
        let topics = topics.into();
        let ids = self
            .request(
                BatchSubscribe {
                    topics: topics.clone(),
                },
                ConnectMode::Unconditional,
            )
            .await?;

        for (topic, id) in topics.into_iter().zip(ids.iter()) {
            self.inner.subscriptions.set(topic, id.clone());
        }

        Ok(ids)
    }

    /// Unsubscribes from a topic. Connects only if other topics are tracked.
    pub async fn unsubscribe(&self, topic: Topic) -> Result<(), ClientError> {
        self.request(
            Unsubscribe {
                topic: topic.clone(),
            },
            ConnectMode::Internal,
        )
        .await?;

        debug!(%topic, "unsubscribed");
        self.inner.subscriptions.remove(&topic);

        Ok(())
    }

    /// Unsubscribes from multiple topics.
    pub async fn batch_unsubscribe(
        &self,
        topics: impl Into<Vec<Topic>>,
    ) -> Result<(), ClientError> {
        let topics = topics.into();
        let subscriptions = topics
            .iter()
            .map(|topic| Unsubscribe {
                topic: topic.clone(),
            })
            .collect();

        self.request(BatchUnsubscribe { subscriptions }, ConnectMode::Internal)
            .await?;

        for topic in &topics {
            self.inner.subscriptions.remove(topic);
        }

        Ok(())
    }

    /// Sends a request and waits for the matching response.
    pub async fn request<T>(&self, payload: T, mode: ConnectMode) -> Result<T::Response, ClientError>
    where
        T: RequestPayload,
    {
        payload.validate()?;

        let id = self.inner.id_generator.next();
        let request = Payload::Request(Request::new(id, payload.into_params()));
        let data = serde_json::to_string(&request).map_err(ClientError::Serialization)?;

        let (tx, rx) = oneshot::channel();

        match self.inner.requests.entry(id) {
            Entry::Occupied(_) => return Err(ClientError::DuplicateRequestId),
            Entry::Vacant(entry) => {
                entry.insert(tx);
            }
        }

        let _guard = PendingRequest {
            id,
            requests: &self.inner.requests,
        };

        self.inner.dispatcher.protected_send(data, mode).await?;

        let value = tokio::time::timeout(self.inner.config.request_timeout, rx)
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(|_| ClientError::ChannelClosed)??;

        serde_json::from_value(value).map_err(ClientError::Deserialization)
    }
}

/// Removes the response slot when the request completes or is cancelled.
struct PendingRequest<'a> {
    id: MessageId,
    requests: &'a DashMap<MessageId, ResponseSender>,
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        self.requests.remove(&self.id);
    }
}

async fn inbound_loop(inner: Weak<Inner>, mut inbound_rx: UnboundedReceiver<Arc<str>>) {
    while let Some(text) = inbound_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };

        let payload = match serde_json::from_str::<Payload>(&text) {
            Ok(payload) => payload,

            Err(err) => {
                warn!(%err, "dropping malformed inbound frame");
                continue;
            }
        };

        match payload {
            Payload::Response(response) => inner.on_response(response),
            Payload::Request(request) => inner.on_request(request),
        }
    }
}

async fn resubscribe_loop(inner: Weak<Inner>, mut status_rx: watch::Receiver<ConnectionStatus>) {
    while status_rx.changed().await.is_ok() {
        if *status_rx.borrow_and_update() != ConnectionStatus::Connected {
            continue;
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };

        let client = Client { inner };
        let topics = client.inner.subscriptions.topics();

        if topics.is_empty() {
            continue;
        }

        info!(count = topics.len(), "re-subscribing tracked topics");

        // Requests must not block the status loop.
        tokio::spawn(async move {
            for chunk in topics.chunks(MAX_SUBSCRIPTION_BATCH_SIZE) {
                if let Err(err) = client.batch_subscribe(chunk.to_vec()).await {
                    warn!(%err, "failed to re-subscribe");
                }
            }
        });
    }
}

impl Inner {
    fn on_response(&self, response: Response) {
        let id = response.id();

        let Some((_, tx)) = self.requests.remove(&id) else {
            debug!(%id, "dropping response with unknown id");
            return;
        };

        let result = match response {
            Response::Success(response) => Ok(response.result),

            Response::Error(response) => Err(ClientError::Rpc {
                code: response.error.code,
                message: response.error.message,
            }),
        };

        tx.send(result).ok();
    }

    fn on_request(&self, request: Request) {
        if let Err(err) = request.validate() {
            warn!(%err, "dropping invalid inbound request");
            return;
        }

        let id = request.id;

        let Params::Subscription(subscription) = request.params else {
            warn!(%id, "dropping unexpected inbound request");
            return;
        };

        let ack = Payload::Response(Response::Success(SuccessfulResponse::new(
            id,
            serde_json::Value::Bool(true),
        )));

        match serde_json::to_string(&ack) {
            Ok(ack) => {
                if let Err(err) = self.dispatcher.send(ack) {
                    debug!(%id, %err, "failed to acknowledge subscription message");
                }
            }

            Err(err) => warn!(%err, "failed to serialize acknowledgement"),
        }

        let message = PublishedMessage::from_request(id, subscription);

        self.message_subscribers
            .lock()
            .retain(|tx| tx.send(message.clone()).is_ok());
    }
}
