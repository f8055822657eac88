use {
    super::{
        machine::{Control, MachineHandle, Policy},
        AppState,
        BackgroundTaskRegistrar,
        ConnectMode,
        ConnectionHandler,
        HandlerSnapshot,
        NoopBackgroundTaskRegistrar,
        ReconnectConfig,
    },
    crate::{CloseCode, NetworkError, SocketStatusProvider, SocketTransport, SubscriptionsTracker},
    std::sync::Arc,
};

/// Reconnects on app foreground, network reachability and a periodic timer,
/// as long as at least one topic is tracked.
#[derive(Debug, Clone)]
pub struct AutomaticConnectionHandler {
    machine: MachineHandle,
}

impl AutomaticConnectionHandler {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        status: &SocketStatusProvider,
        subscriptions: SubscriptionsTracker,
        config: ReconnectConfig,
    ) -> Self {
        Self::with_registrar(
            transport,
            status,
            subscriptions,
            config,
            Arc::new(NoopBackgroundTaskRegistrar),
        )
    }

    pub fn with_registrar(
        transport: Arc<dyn SocketTransport>,
        status: &SocketStatusProvider,
        subscriptions: SubscriptionsTracker,
        config: ReconnectConfig,
        registrar: Arc<dyn BackgroundTaskRegistrar>,
    ) -> Self {
        let machine = MachineHandle::spawn(
            Policy::Automatic,
            config,
            transport,
            status,
            subscriptions,
            registrar,
        );

        Self { machine }
    }

    /// Reports an app lifecycle transition.
    pub fn handle_app_state(&self, state: AppState) -> Result<(), NetworkError> {
        self.machine.send(Control::AppState(state))
    }

    /// Reports a network reachability change.
    pub fn handle_network_reachability(&self, reachable: bool) -> Result<(), NetworkError> {
        self.machine.send(Control::Reachability(reachable))
    }
}

#[async_trait::async_trait]
impl ConnectionHandler for AutomaticConnectionHandler {
    fn handle_connect(&self) -> Result<(), NetworkError> {
        self.machine.send(Control::Connect)
    }

    fn handle_disconnect(&self, code: CloseCode) -> Result<(), NetworkError> {
        self.machine.send(Control::Disconnect(code))
    }

    async fn handle_internal_connect(&self, mode: ConnectMode) -> Result<(), NetworkError> {
        self.machine.internal_connect(mode).await
    }

    async fn snapshot(&self) -> Result<HandlerSnapshot, NetworkError> {
        self.machine.snapshot().await
    }
}
