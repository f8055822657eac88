//! Records kept by the Sign client.

use {
    crate::{
        auth::AuthPayload,
        rpc::{
            ChainRequest,
            Metadata,
            Participant,
            ProposeNamespaces,
            ScopedProperties,
            SessionProperties,
            SessionProposeRequest,
            SettleNamespaces,
        },
        verify::VerifyContext,
    },
    relay_rpc::domain::{MessageId, Topic},
    serde::{Deserialize, Serialize},
};

/// Seconds since the Unix epoch.
pub fn now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

/// Symmetric-key channel used to negotiate sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingInfo {
    pub topic: Topic,
    pub expiry: u64,
    /// Set once the peer has been heard from.
    pub active: bool,
    /// Methods advertised in the pairing URI.
    pub methods: Option<Vec<String>>,
    pub peer_metadata: Option<Metadata>,
}

/// A session proposal waiting for the wallet's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: MessageId,
    pub pairing_topic: Topic,
    pub request: SessionProposeRequest,
    pub expiry: u64,
}

impl Proposal {
    /// Proposals are keyed by the proposer public key.
    pub fn proposer_public_key(&self) -> &str {
        &self.request.proposer.public_key
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry <= now
    }
}

/// How a session's envelopes travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportType {
    #[default]
    Relay,
    LinkMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub topic: Topic,
    pub pairing_topic: Topic,
    pub self_participant: Participant,
    pub peer_participant: Participant,
    /// Public key of the participant allowed to update and extend.
    pub controller_key: String,
    pub namespaces: SettleNamespaces,
    pub required_namespaces: ProposeNamespaces,
    pub session_properties: Option<SessionProperties>,
    pub scoped_properties: Option<ScopedProperties>,
    pub acknowledged: bool,
    pub expiry: u64,
    pub transport_type: TransportType,
}

impl Session {
    pub fn is_controller(&self) -> bool {
        self.self_participant.public_key == self.controller_key
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry <= now
    }
}

/// A `wc_sessionRequest` received by the wallet and not yet answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    pub id: MessageId,
    pub topic: Topic,
    pub chain_id: String,
    pub request: ChainRequest,
}

impl PendingRequest {
    pub fn is_expired(&self, now: u64) -> bool {
        self.request
            .expiry_timestamp
            .is_some_and(|expiry| expiry <= now)
    }
}

/// A `wc_sessionAuthenticate` received by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub id: MessageId,
    pub pairing_topic: Topic,
    pub requester: Participant,
    pub payload: AuthPayload,
    pub expiry: u64,
    pub verify_context: VerifyContext,
    /// How the request arrived, and so how the answer travels.
    pub transport_type: TransportType,
}

impl AuthRequest {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry <= now
    }
}
