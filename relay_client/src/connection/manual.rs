use {
    super::{
        machine::{Control, MachineHandle, Policy},
        ConnectMode,
        ConnectionHandler,
        HandlerSnapshot,
        NoopBackgroundTaskRegistrar,
        ReconnectConfig,
    },
    crate::{CloseCode, NetworkError, SocketStatusProvider, SocketTransport, SubscriptionsTracker},
    std::sync::Arc,
};

/// Connects only when asked to, either by the application or by an internal
/// request that passes admission.
#[derive(Debug, Clone)]
pub struct ManualConnectionHandler {
    machine: MachineHandle,
}

impl ManualConnectionHandler {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        status: &SocketStatusProvider,
        subscriptions: SubscriptionsTracker,
        config: ReconnectConfig,
    ) -> Self {
        let machine = MachineHandle::spawn(
            Policy::Manual,
            config,
            transport,
            status,
            subscriptions,
            Arc::new(NoopBackgroundTaskRegistrar),
        );

        Self { machine }
    }
}

#[async_trait::async_trait]
impl ConnectionHandler for ManualConnectionHandler {
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
