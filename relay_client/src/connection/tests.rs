use {
    super::*,
    crate::{
        test_utils::{ConnectBehavior, MockTransport},
        ConnectionStatus,
        Dispatcher,
        DispatcherConfig,
        SocketStatusProvider,
    },
    parking_lot::Mutex,
    relay_rpc::domain::Topic,
    std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

#[derive(Default)]
struct TestRegistrar {
    expiration: Mutex<Option<ExpirationHandler>>,
    registrations: AtomicUsize,
    invalidations: AtomicUsize,
}

impl TestRegistrar {
    fn expire(&self) {
        if let Some(on_expiration) = self.expiration.lock().take() {
            on_expiration();
        }
    }
}

impl BackgroundTaskRegistrar for TestRegistrar {
    fn register(&self, _name: &str, on_expiration: ExpirationHandler) {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        *self.expiration.lock() = Some(on_expiration);
    }

    fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.expiration.lock().take();
    }
}

struct Harness {
    dispatcher: Dispatcher,
    transport: Arc<MockTransport>,
    subscriptions: SubscriptionsTracker,
}

fn config() -> ReconnectConfig {
    ReconnectConfig::default()
        .with_max_immediate_attempts(3)
        .with_request_timeout(Duration::from_secs(1))
        .with_periodic_reconnection_interval(Duration::from_secs(5))
}

fn automatic(
    behavior: ConnectBehavior,
    registrar: Arc<TestRegistrar>,
) -> (Harness, Arc<AutomaticConnectionHandler>) {
    let (transport, events) = MockTransport::new(behavior);
    let status = SocketStatusProvider::new();
    let subscriptions = SubscriptionsTracker::new();
    let handler = Arc::new(AutomaticConnectionHandler::with_registrar(
        transport.clone(),
        &status,
        subscriptions.clone(),
        config(),
        registrar,
    ));

    let dispatcher = Dispatcher::new(
        transport.clone(),
        events,
        status,
        handler.clone(),
        DispatcherConfig::default(),
    );

    let harness = Harness {
        dispatcher,
        transport,
        subscriptions,
    };

    (harness, handler)
}

fn manual(behavior: ConnectBehavior) -> Harness {
    let (transport, events) = MockTransport::new(behavior);
    let status = SocketStatusProvider::new();
    let subscriptions = SubscriptionsTracker::new();
    let handler = ManualConnectionHandler::new(
        transport.clone(),
        &status,
        subscriptions.clone(),
        config(),
    );

    let dispatcher = Dispatcher::new(
        transport.clone(),
        events,
        status,
        Arc::new(handler),
        DispatcherConfig::default(),
    );

    Harness {
        dispatcher,
        transport,
        subscriptions,
    }
}

fn track_topic(subscriptions: &SubscriptionsTracker) -> Topic {
    let topic = Topic::generate();
    subscriptions.set(topic.clone(), "subscription".into());
    topic
}

/// Lets the handler, the event pump and the mock transport run to idle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn no_subscriptions_no_reconnect() {
    let (h, handler) = automatic(ConnectBehavior::Accept, Default::default());

    handler.handle_app_state(AppState::Background).unwrap();
    handler.handle_app_state(AppState::Foreground).unwrap();
    handler.handle_network_reachability(false).unwrap();
    handler.handle_network_reachability(true).unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.transport.connect_calls(), 0);

    // A dropped connection without tracked topics stays down as well.
    h.dispatcher.connect().unwrap();
    settle().await;
    assert_eq!(h.dispatcher.status(), ConnectionStatus::Connected);

    h.transport.drop_connection();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.transport.connect_calls(), 1);
    assert_eq!(h.dispatcher.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_drop_with_subscriptions() {
    let (h, handler) = automatic(ConnectBehavior::Accept, Default::default());
    track_topic(&h.subscriptions);

    h.dispatcher.connect().unwrap();
    settle().await;

    h.transport.drop_connection();
    settle().await;

    assert_eq!(h.transport.connect_calls(), 2);
    assert_eq!(h.dispatcher.status(), ConnectionStatus::Connected);

    let snapshot = handler.snapshot().await.unwrap();
    assert_eq!(snapshot.state, HandlerState::Connected);
    assert_eq!(snapshot.attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn bounded_retries_then_periodic() {
    let (h, handler) = automatic(ConnectBehavior::Accept, Default::default());
    track_topic(&h.subscriptions);

    h.dispatcher.connect().unwrap();
    settle().await;
    assert_eq!(h.transport.connect_calls(), 1);

    h.transport.set_behavior(ConnectBehavior::Refuse);
    h.transport.drop_connection();
    settle().await;

    // Exactly `max_immediate_attempts` immediate attempts.
    assert_eq!(h.transport.connect_calls(), 1 + 3);

    let snapshot = handler.snapshot().await.unwrap();
    assert_eq!(snapshot.state, HandlerState::Idle);
    assert_eq!(snapshot.attempts, 3);
    assert!(snapshot.periodic_reconnection);

    // One attempt per periodic tick.
    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(h.transport.connect_calls(), 5);

    h.transport.set_behavior(ConnectBehavior::Accept);
    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(h.transport.connect_calls(), 6);

    let snapshot = handler.snapshot().await.unwrap();
    assert_eq!(snapshot.state, HandlerState::Connected);
    assert_eq!(snapshot.attempts, 0);
    assert!(!snapshot.periodic_reconnection);
}

#[tokio::test(start_paused = true)]
async fn periodic_reconnection_stops_without_subscriptions() {
    let (h, handler) = automatic(ConnectBehavior::Refuse, Default::default());
    let topic = track_topic(&h.subscriptions);

    let result = handler
        .handle_internal_connect(ConnectMode::Unconditional)
        .await;
    assert_eq!(result, Err(NetworkError::ConnectionFailed));
    assert_eq!(h.transport.connect_calls(), 3);
    assert!(handler.snapshot().await.unwrap().periodic_reconnection);

    h.subscriptions.remove(&topic);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(h.transport.connect_calls(), 3);
    assert!(!handler.snapshot().await.unwrap().periodic_reconnection);
}

#[tokio::test(start_paused = true)]
async fn bare_timeout_is_not_counted() {
    let (h, handler) = automatic(ConnectBehavior::Ignore, Default::default());
    track_topic(&h.subscriptions);

    let result = handler
        .handle_internal_connect(ConnectMode::Unconditional)
        .await;

    assert_eq!(result, Err(NetworkError::ConnectionFailed));
    assert_eq!(h.transport.connect_calls(), 1);

    let snapshot = handler.snapshot().await.unwrap();
    assert_eq!(snapshot.attempts, 0);
    assert_eq!(snapshot.state, HandlerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn internal_connect_when_connected_is_immediate() {
    let (h, handler) = automatic(ConnectBehavior::Accept, Default::default());

    handler
        .handle_internal_connect(ConnectMode::Unconditional)
        .await
        .unwrap();
    handler
        .handle_internal_connect(ConnectMode::Unconditional)
        .await
        .unwrap();

    assert_eq!(h.transport.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn conditional_connect_admission() {
    let (h, handler) = automatic(ConnectBehavior::Accept, Default::default());

    assert_eq!(
        handler.handle_internal_connect(ConnectMode::Internal).await,
        Err(NetworkError::InternalConnectionRejected)
    );
    assert_eq!(
        handler
            .handle_internal_connect(ConnectMode::Subscription)
            .await,
        Err(NetworkError::SubscriptionConnectionRejected)
    );
    assert_eq!(h.transport.connect_calls(), 0);

    track_topic(&h.subscriptions);
    handler
        .handle_internal_connect(ConnectMode::Internal)
        .await
        .unwrap();
    assert_eq!(h.transport.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn background_expiry_forces_disconnect() {
    let registrar = Arc::new(TestRegistrar::default());
    let (h, handler) = automatic(ConnectBehavior::Accept, registrar.clone());
    track_topic(&h.subscriptions);

    h.dispatcher.connect().unwrap();
    settle().await;

    handler.handle_app_state(AppState::Background).unwrap();
    settle().await;
    assert_eq!(registrar.registrations.load(Ordering::SeqCst), 1);

    registrar.expire();
    settle().await;

    assert_eq!(h.transport.disconnect_calls(), 1);
    assert_eq!(h.dispatcher.status(), ConnectionStatus::Disconnected);

    // Still in background: no reconnection.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.transport.connect_calls(), 1);

    handler.handle_app_state(AppState::Foreground).unwrap();
    settle().await;

    assert_eq!(registrar.invalidations.load(Ordering::SeqCst), 1);
    assert_eq!(h.transport.connect_calls(), 2);
    assert_eq!(h.dispatcher.status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn explicit_disconnect_suppresses_reconnection() {
    let (h, _handler) = automatic(ConnectBehavior::Accept, Default::default());
    track_topic(&h.subscriptions);

    h.dispatcher.connect().unwrap();
    settle().await;

    h.dispatcher.disconnect(CloseCode::Normal).unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(h.transport.connect_calls(), 1);
    assert_eq!(h.dispatcher.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn manual_handler_never_reconnects_on_its_own() {
    let h = manual(ConnectBehavior::Accept);
    track_topic(&h.subscriptions);

    h.dispatcher.connect().unwrap();
    settle().await;
    assert_eq!(h.dispatcher.status(), ConnectionStatus::Connected);

    h.transport.drop_connection();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.transport.connect_calls(), 1);
    assert_eq!(h.dispatcher.status(), ConnectionStatus::Disconnected);

    // Tracked topics admit a conditional request.
    h.dispatcher
        .protected_send("frame", ConnectMode::Subscription)
        .await
        .unwrap();

    assert_eq!(h.transport.connect_calls(), 2);
    assert_eq!(h.transport.sent(), vec!["frame".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn manual_handler_exhausts_without_periodic_timer() {
    let h = manual(ConnectBehavior::Refuse);
    track_topic(&h.subscriptions);

    let result = h
        .dispatcher
        .protected_send("frame", ConnectMode::Unconditional)
        .await;
    assert_eq!(result, Err(NetworkError::ConnectionFailed));

    let snapshot = h.dispatcher.handler_snapshot().await.unwrap();
    assert_eq!(snapshot.attempts, 3);
    assert!(!snapshot.periodic_reconnection);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport.connect_calls(), 3);
}
