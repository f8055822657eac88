use {
    super::{
        AppState,
        BackgroundTaskRegistrar,
        ConnectMode,
        HandlerSnapshot,
        HandlerState,
        ReconnectConfig,
    },
    crate::{
        CloseCode,
        ConnectionStatus,
        NetworkError,
        SocketStatusProvider,
        SocketTransport,
        SubscriptionsTracker,
    },
    std::sync::Arc,
    tokio::{
        sync::{
            mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender},
            oneshot,
            watch,
        },
        time::{Instant, Interval, MissedTickBehavior},
    },
    tracing::{debug, info, warn},
};

const BACKGROUND_TASK_NAME: &str = "relay.socket.background";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Policy {
    Automatic,
    Manual,
}

pub(super) enum Control {
    Connect,
    Disconnect(CloseCode),
    InternalConnect(oneshot::Sender<Result<(), NetworkError>>),
    AppState(AppState),
    Reachability(bool),
    BackgroundExpired,
    Snapshot(oneshot::Sender<HandlerSnapshot>),
}

enum Event {
    Control(Control),
    Status(ConnectionStatus),
    AttemptTimeout,
    PeriodicTick,
}

/// Handle to the state machine task. Dropping every handle stops the task.
#[derive(Debug, Clone)]
pub(super) struct MachineHandle {
    control_tx: UnboundedSender<Control>,
    subscriptions: SubscriptionsTracker,
}

impl MachineHandle {
    pub(super) fn spawn(
        policy: Policy,
        config: ReconnectConfig,
        transport: Arc<dyn SocketTransport>,
        status: &SocketStatusProvider,
        subscriptions: SubscriptionsTracker,
        registrar: Arc<dyn BackgroundTaskRegistrar>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let state = if status.is_connected() {
            HandlerState::Connected
        } else {
            HandlerState::Idle
        };

        let machine = Machine {
            policy,
            config,
            transport,
            subscriptions: subscriptions.clone(),
            registrar,
            control_tx: control_tx.downgrade(),
            state,
            attempts: 0,
            attempt_deadline: None,
            periodic: None,
            periodic_attempt: false,
            waiters: Vec::new(),
            app_state: AppState::Foreground,
            reachable: true,
            manually_disconnected: false,
        };

        tokio::spawn(machine.run(control_rx, status.subscribe()));

        Self {
            control_tx,
            subscriptions,
        }
    }

    pub(super) fn send(&self, control: Control) -> Result<(), NetworkError> {
        self.control_tx
            .send(control)
            .map_err(|_| NetworkError::ChannelClosed)
    }

    pub(super) async fn internal_connect(&self, mode: ConnectMode) -> Result<(), NetworkError> {
        mode.admit(&self.subscriptions)?;

        let (tx, rx) = oneshot::channel();
        self.send(Control::InternalConnect(tx))?;

        rx.await.map_err(|_| NetworkError::ChannelClosed)?
    }

    pub(super) async fn snapshot(&self) -> Result<HandlerSnapshot, NetworkError> {
        let (tx, rx) = oneshot::channel();
        self.send(Control::Snapshot(tx))?;

        rx.await.map_err(|_| NetworkError::ChannelClosed)
    }
}

struct Machine {
    policy: Policy,
    config: ReconnectConfig,
    transport: Arc<dyn SocketTransport>,
    subscriptions: SubscriptionsTracker,
    registrar: Arc<dyn BackgroundTaskRegistrar>,
    control_tx: WeakUnboundedSender<Control>,
    state: HandlerState,
    attempts: u32,
    attempt_deadline: Option<Instant>,
    periodic: Option<Interval>,
    periodic_attempt: bool,
    waiters: Vec<oneshot::Sender<Result<(), NetworkError>>>,
    app_state: AppState,
    reachable: bool,
    manually_disconnected: bool,
}

impl Machine {
    async fn run(
        mut self,
        mut control_rx: UnboundedReceiver<Control>,
        mut status_rx: watch::Receiver<ConnectionStatus>,
    ) {
        loop {
            let event = tokio::select! {
                control = control_rx.recv() => match control {
                    Some(control) => Event::Control(control),

                    // All handles have been dropped, shutting down.
                    None => break,
                },

                changed = status_rx.changed() => match changed {
                    Ok(()) => Event::Status(*status_rx.borrow_and_update()),
                    Err(_) => break,
                },

                () = attempt_deadline(self.attempt_deadline) => Event::AttemptTimeout,

                () = periodic_tick(&mut self.periodic) => Event::PeriodicTick,
            };

            self.handle(event);
        }

        self.fail_waiters(NetworkError::ChannelClosed);
        self.registrar.invalidate();
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Control(Control::Connect) => {
                self.manually_disconnected = false;
                self.start_attempts();
            }

            Event::Control(Control::Disconnect(code)) => {
                self.manually_disconnected = true;
                self.stop_reconnection();
                self.fail_waiters(NetworkError::ConnectionFailed);
                self.state = HandlerState::Idle;
                self.transport.disconnect(code);
            }

            Event::Control(Control::InternalConnect(tx)) => {
                if self.state == HandlerState::Connected {
                    tx.send(Ok(())).ok();
                } else {
                    self.waiters.push(tx);
                    self.manually_disconnected = false;
                    self.start_attempts();
                }
            }

            Event::Control(Control::AppState(state)) => self.on_app_state(state),

            Event::Control(Control::Reachability(reachable)) => {
                self.reachable = reachable;

                if reachable && self.should_reconnect() {
                    debug!("network reachable, reconnecting");
                    self.start_attempts();
                }
            }

            Event::Control(Control::BackgroundExpired) => {
                if self.app_state == AppState::Background {
                    info!("background execution expired, closing socket");
                    self.stop_reconnection();
                    self.fail_waiters(NetworkError::ConnectionFailed);
                    self.state = HandlerState::Idle;
                    self.transport.disconnect(CloseCode::Normal);
                }
            }

            Event::Control(Control::Snapshot(tx)) => {
                tx.send(self.snapshot()).ok();
            }

            Event::Status(ConnectionStatus::Connected) => self.on_connected(),

            Event::Status(ConnectionStatus::Disconnected) => self.on_disconnected(),

            Event::AttemptTimeout => self.on_attempt_timeout(),

            Event::PeriodicTick => self.on_periodic_tick(),
        }
    }

    fn snapshot(&self) -> HandlerSnapshot {
        HandlerSnapshot {
            state: self.state,
            attempts: self.attempts,
            periodic_reconnection: self.periodic.is_some(),
        }
    }

    /// Whether the handler may reconnect on its own.
    fn should_reconnect(&self) -> bool {
        self.policy == Policy::Automatic
            && self.app_state == AppState::Foreground
            && self.reachable
            && !self.manually_disconnected
            && !self.subscriptions.is_empty()
    }

    /// Starts a series of immediate attempts. Ignored while connecting or
    /// connected.
    fn start_attempts(&mut self) {
        match self.state {
            HandlerState::Idle => {
                self.attempts = 0;
                self.attempt();
            }

            HandlerState::Connecting if self.periodic_attempt => {
                // The in-flight periodic attempt becomes the first immediate one.
                self.periodic_attempt = false;
                self.attempts = 0;
            }

            HandlerState::Connecting | HandlerState::Connected => {}
        }
    }

    fn attempt(&mut self) {
        debug!(attempt = self.attempts + 1, "connecting socket");

        self.state = HandlerState::Connecting;
        self.attempt_deadline = Some(Instant::now() + self.config.request_timeout);
        self.transport.connect();
    }

    fn on_connected(&mut self) {
        info!("socket connected");

        self.state = HandlerState::Connected;
        self.attempts = 0;
        self.attempt_deadline = None;
        self.periodic = None;
        self.periodic_attempt = false;

        for tx in self.waiters.drain(..) {
            tx.send(Ok(())).ok();
        }
    }

    fn on_disconnected(&mut self) {
        let previous = std::mem::replace(&mut self.state, HandlerState::Idle);

        match previous {
            HandlerState::Connecting if self.periodic_attempt => {
                debug!("periodic reconnection attempt failed");
                self.periodic_attempt = false;
                self.attempt_deadline = None;
            }

            HandlerState::Connecting => {
                self.attempts += 1;

                if self.attempts >= self.config.max_immediate_attempts {
                    warn!(attempts = self.attempts, "connection attempts exhausted");
                    self.attempt_deadline = None;
                    self.fail_waiters(NetworkError::ConnectionFailed);
                    self.enter_periodic();
                } else {
                    self.attempt();
                }
            }

            HandlerState::Connected => {
                info!("socket disconnected");

                if self.should_reconnect() {
                    self.start_attempts();
                }
            }

            HandlerState::Idle => {}
        }
    }

    fn on_attempt_timeout(&mut self) {
        self.attempt_deadline = None;

        if self.state != HandlerState::Connecting {
            return;
        }

        warn!(attempts = self.attempts, "connection attempt timed out");

        // A socket that never answered is not counted as a failed attempt.
        self.state = HandlerState::Idle;
        self.periodic_attempt = false;
        self.fail_waiters(NetworkError::ConnectionFailed);
        self.enter_periodic();
    }

    fn on_periodic_tick(&mut self) {
        if self.subscriptions.is_empty() || self.state == HandlerState::Connected {
            debug!("stopping periodic reconnection");
            self.periodic = None;
            return;
        }

        if self.state == HandlerState::Idle && self.should_reconnect() {
            self.periodic_attempt = true;
            self.attempt();
        }
    }

    fn on_app_state(&mut self, state: AppState) {
        if self.app_state == state {
            return;
        }

        self.app_state = state;

        match state {
            AppState::Background => {
                if self.policy == Policy::Automatic {
                    let control_tx = self.control_tx.clone();

                    self.registrar.register(
                        BACKGROUND_TASK_NAME,
                        Box::new(move || {
                            if let Some(tx) = control_tx.upgrade() {
                                tx.send(Control::BackgroundExpired).ok();
                            }
                        }),
                    );
                }
            }

            AppState::Foreground => {
                self.registrar.invalidate();

                if self.should_reconnect() {
                    debug!("app in foreground, reconnecting");
                    self.start_attempts();
                }
            }
        }
    }

    fn enter_periodic(&mut self) {
        if self.policy == Policy::Automatic
            && !self.manually_disconnected
            && !self.subscriptions.is_empty()
            && self.periodic.is_none()
        {
            let period = self.config.periodic_reconnection_interval;
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            self.periodic = Some(interval);
        }
    }

    fn stop_reconnection(&mut self) {
        self.attempt_deadline = None;
        self.periodic = None;
        self.periodic_attempt = false;
    }

    fn fail_waiters(&mut self, err: NetworkError) {
        for tx in self.waiters.drain(..) {
            tx.send(Err(err.clone())).ok();
        }
    }
}

async fn attempt_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn periodic_tick(periodic: &mut Option<Interval>) {
    match periodic {
        Some(interval) => {
            interval.tick().await;
        }

        None => std::future::pending().await,
    }
}
