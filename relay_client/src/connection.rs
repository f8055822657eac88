//! Policy layer deciding when the socket is (re)connected.
//!
//! Both handlers share one state machine (`idle -> connecting -> connected`)
//! running as a serial actor task. They differ in when they are allowed to
//! start a connection:
//!
//! - [`AutomaticConnectionHandler`] reconnects on its own when the app is in
//!   the foreground, the network is reachable, and at least one topic is
//!   tracked.
//! - [`ManualConnectionHandler`] only connects when asked to.

pub use {automatic::AutomaticConnectionHandler, lifecycle::*, manual::ManualConnectionHandler};
use {
    crate::{CloseCode, NetworkError, SubscriptionsTracker},
    std::time::Duration,
};

mod automatic;
mod lifecycle;
mod machine;
mod manual;

#[cfg(test)]
mod tests;

/// Admission level of an internal connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Always attempts to connect. Used for outbound publishes.
    Unconditional,

    /// Connects only if topics are already tracked, otherwise fails with
    /// [`NetworkError::InternalConnectionRejected`].
    Internal,

    /// Connects only if topics are already tracked, otherwise fails with
    /// [`NetworkError::SubscriptionConnectionRejected`].
    Subscription,
}

impl ConnectMode {
    pub(crate) fn admit(self, subscriptions: &SubscriptionsTracker) -> Result<(), NetworkError> {
        match self {
            Self::Unconditional => Ok(()),
            _ if !subscriptions.is_empty() => Ok(()),
            Self::Internal => Err(NetworkError::InternalConnectionRejected),
            Self::Subscription => Err(NetworkError::SubscriptionConnectionRejected),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Idle,
    Connecting,
    Connected,
}

/// Point-in-time view of a handler's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerSnapshot {
    pub state: HandlerState,
    pub attempts: u32,
    pub periodic_reconnection: bool,
}

/// Reconnection parameters.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Number of consecutive failed attempts before switching to periodic
    /// reconnection.
    pub max_immediate_attempts: u32,

    /// How long a single connection attempt may take.
    pub request_timeout: Duration,

    /// Interval of the periodic reconnection timer.
    pub periodic_reconnection_interval: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_immediate_attempts: 3,
            request_timeout: Duration::from_secs(15),
            periodic_reconnection_interval: Duration::from_secs(5),
        }
    }
}

impl ReconnectConfig {
    pub fn with_max_immediate_attempts(mut self, attempts: u32) -> Self {
        self.max_immediate_attempts = attempts.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_periodic_reconnection_interval(mut self, interval: Duration) -> Self {
        self.periodic_reconnection_interval = interval;
        self
    }
}

/// Connection policy consulted by the [`Dispatcher`][crate::Dispatcher].
#[async_trait::async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Explicit connection request from the application. Returns as soon as
    /// the request is queued.
    fn handle_connect(&self) -> Result<(), NetworkError>;

    /// Explicit disconnection request from the application.
    fn handle_disconnect(&self, code: CloseCode) -> Result<(), NetworkError>;

    /// Ensures the socket is connected, resolving once it is or once the
    /// attempts are exhausted.
    async fn handle_internal_connect(&self, mode: ConnectMode) -> Result<(), NetworkError>;

    /// Current state of the handler.
    async fn snapshot(&self) -> Result<HandlerSnapshot, NetworkError>;
}
