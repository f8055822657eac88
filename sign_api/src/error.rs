use {
    crate::{
        auth::CacaoError,
        crypto::KmsError,
        history::HistoryError,
        link_mode::LinkModeError,
        namespaces::{AutoNamespacesError, NamespaceError},
        pairing_uri::ParseError,
        router::RouterError,
        rpc::{ErrorParams, ParamsError, ValidationError},
        storage::StorageError,
    },
    relay_client::ClientError,
    relay_rpc::domain::{MessageId, Topic},
};

/// Protocol rejection reasons sent to the peer as `{code, message}`.
///
/// https://specs.walletconnect.com/2.0/specs/clients/sign/error-codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    UserRejected,
    UserRejectedChains,
    UserRejectedMethods,
    UserRejectedEvents,
    UnsupportedChains,
    UnsupportedMethods,
    UnsupportedEvents,
    UnsupportedAccounts,
    UnsupportedNamespaceKey,
    UnauthorizedUpdateRequest,
    UnauthorizedExtendRequest,
    UserDisconnected,
    SessionSettlementFailed,
    SessionRequestExpired,
    MethodUnsupported,
}

impl Reason {
    const ALL: [Self; 15] = [
        Self::UserRejected,
        Self::UserRejectedChains,
        Self::UserRejectedMethods,
        Self::UserRejectedEvents,
        Self::UnsupportedChains,
        Self::UnsupportedMethods,
        Self::UnsupportedEvents,
        Self::UnsupportedAccounts,
        Self::UnsupportedNamespaceKey,
        Self::UnauthorizedUpdateRequest,
        Self::UnauthorizedExtendRequest,
        Self::UserDisconnected,
        Self::SessionSettlementFailed,
        Self::SessionRequestExpired,
        Self::MethodUnsupported,
    ];

    pub fn code(&self) -> i64 {
        match self {
            Self::UserRejected => 5000,
            Self::UserRejectedChains => 5001,
            Self::UserRejectedMethods => 5002,
            Self::UserRejectedEvents => 5003,
            Self::UnsupportedChains => 5100,
            Self::UnsupportedMethods => 5101,
            Self::UnsupportedEvents => 5102,
            Self::UnsupportedAccounts => 5103,
            Self::UnsupportedNamespaceKey => 5104,
            Self::UnauthorizedUpdateRequest => 3003,
            Self::UnauthorizedExtendRequest => 3004,
            Self::UserDisconnected => 6000,
            Self::SessionSettlementFailed => 7000,
            Self::SessionRequestExpired => 8000,
            Self::MethodUnsupported => 10001,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::UserRejected => "User rejected.",
            Self::UserRejectedChains => "User rejected chains.",
            Self::UserRejectedMethods => "User rejected methods.",
            Self::UserRejectedEvents => "User rejected events.",
            Self::UnsupportedChains => "Unsupported chains.",
            Self::UnsupportedMethods => "Unsupported methods.",
            Self::UnsupportedEvents => "Unsupported events.",
            Self::UnsupportedAccounts => "Unsupported accounts.",
            Self::UnsupportedNamespaceKey => "Unsupported namespace key.",
            Self::UnauthorizedUpdateRequest => "Unauthorized update request.",
            Self::UnauthorizedExtendRequest => "Unauthorized extend request.",
            Self::UserDisconnected => "User disconnected.",
            Self::SessionSettlementFailed => "Session settlement failed.",
            Self::SessionRequestExpired => "Session request expired.",
            Self::MethodUnsupported => "Method unsupported.",
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|reason| reason.code() == code)
    }
}

impl From<Reason> for ErrorParams {
    fn from(reason: Reason) -> Self {
        Self {
            code: Some(reason.code()),
            message: Some(reason.message().to_owned()),
        }
    }
}

impl From<&NamespaceError> for Reason {
    fn from(err: &NamespaceError) -> Self {
        Reason::from_code(err.error_code()).unwrap_or(Reason::UnsupportedChains)
    }
}

impl From<&AutoNamespacesError> for Reason {
    fn from(err: &AutoNamespacesError) -> Self {
        Reason::from_code(err.error_code()).unwrap_or(Reason::UnsupportedChains)
    }
}

/// Errors generated by the Sign client.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("Relay client error: {0}")]
    Client(#[from] ClientError),

    #[error("Key management error: {0}")]
    Kms(#[from] KmsError),

    #[error("Invalid parameters: {0}")]
    Params(#[from] ParamsError),

    #[error("Invalid payload: {0}")]
    Validation(#[from] ValidationError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Namespace validation failed: {0}")]
    Namespace(#[from] NamespaceError),

    #[error("Unable to build namespaces: {0}")]
    AutoNamespaces(#[from] AutoNamespacesError),

    #[error("Invalid pairing URI: {0}")]
    Uri(#[from] ParseError),

    #[error("RPC history error: {0}")]
    History(#[from] HistoryError),

    #[error("Wallet service error: {0}")]
    Router(#[from] RouterError),

    #[error("CACAO error: {0}")]
    Cacao(#[from] CacaoError),

    #[error("Link mode error: {0}")]
    LinkMode(#[from] LinkModeError),

    #[error("No pairing or session matches topic: {0}")]
    NoMatchingTopic(Topic),

    #[error("Proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("Proposal has expired")]
    ProposalExpired,

    #[error("Pairing has expired")]
    PairingExpired,

    #[error("Session is not acknowledged: {0}")]
    SessionNotAcknowledged(Topic),

    #[error("Only the session controller can do this")]
    Unauthorized,

    #[error("Chain is not authorized by the session: {0}")]
    UnauthorizedChain(String),

    #[error("Method is not authorized by the session: {0}")]
    UnauthorizedMethod(String),

    #[error("Event is not authorized by the session: {0}")]
    UnauthorizedEvent(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid expiry: {0}")]
    InvalidExpiry(u64),

    #[error("Request has expired: {0}")]
    RequestExpired(MessageId),

    #[error("No pending request: {0}")]
    RequestNotFound(MessageId),

    #[error("Timed out waiting for the peer")]
    Timeout,

    #[error("Peer responded with an error ({code}): {message}")]
    Peer { code: i64, message: String },

    #[error("Internal error: Channel closed")]
    ChannelClosed,
}

impl From<ErrorParams> for SignError {
    fn from(params: ErrorParams) -> Self {
        Self::Peer {
            code: params.code.unwrap_or_default(),
            message: params.message.unwrap_or_default(),
        }
    }
}
