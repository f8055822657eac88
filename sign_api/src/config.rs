use {crate::rpc::Metadata, std::time::Duration};

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct SignConfig {
    /// Metadata of this client sent to peers.
    pub metadata: Metadata,

    /// Lifetime of a session proposal.
    pub proposal_ttl: Duration,

    /// Lifetime of a settled session, and the upper bound for extensions.
    pub session_ttl: Duration,

    /// Lifetime of a pairing nobody has used yet.
    pub pairing_inactive_ttl: Duration,

    /// Lifetime of a pairing after the first peer contact.
    pub pairing_active_ttl: Duration,

    /// How long [`ping`](crate::SignClient::ping) waits for the pong.
    pub ping_timeout: Duration,

    /// How long an authenticate request may go unanswered before the stored
    /// session proposal is sent instead.
    pub authenticate_fallback_window: Duration,

    /// How often expired sessions, pairings and proposals are swept.
    pub expiry_check_interval: Duration,

    /// Whether link-mode envelopes may be used with proven peers.
    pub link_mode: bool,

    /// Whether one-step authenticate requests are handled.
    pub authenticate: bool,
}

impl Default for SignConfig {
    fn default() -> Self {
        Self {
            metadata: Metadata::default(),
            proposal_ttl: 5 * MINUTE,
            session_ttl: 7 * DAY,
            pairing_inactive_ttl: 5 * MINUTE,
            pairing_active_ttl: 30 * DAY,
            ping_timeout: Duration::from_secs(30),
            authenticate_fallback_window: 5 * MINUTE,
            expiry_check_interval: Duration::from_secs(30),
            link_mode: false,
            authenticate: true,
        }
    }
}

impl SignConfig {
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_proposal_ttl(mut self, ttl: Duration) -> Self {
        self.proposal_ttl = ttl;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_pairing_ttls(mut self, inactive: Duration, active: Duration) -> Self {
        self.pairing_inactive_ttl = inactive;
        self.pairing_active_ttl = active;
        self
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn with_authenticate_fallback_window(mut self, window: Duration) -> Self {
        self.authenticate_fallback_window = window;
        self
    }

    pub fn with_expiry_check_interval(mut self, interval: Duration) -> Self {
        self.expiry_check_interval = interval;
        self
    }

    pub fn with_link_mode(mut self, enabled: bool) -> Self {
        self.link_mode = enabled;
        self
    }

    pub fn with_authenticate(mut self, enabled: bool) -> Self {
        self.authenticate = enabled;
        self
    }
}
