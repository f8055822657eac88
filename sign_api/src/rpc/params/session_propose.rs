//! https://specs.walletconnect.com/2.0/specs/clients/sign/rpc-methods
//! #wc_sessionpropose

use {
    super::{IrnMetadata, Participant, ProposeNamespaces, Relay, ScopedProperties, SessionProperties},
    serde::{Deserialize, Serialize},
};

pub(super) const IRN_REQUEST_METADATA: IrnMetadata = IrnMetadata {
    tag: 1100,
    ttl: 300,
    prompt: true,
};

pub(super) const IRN_RESPONSE_METADATA: IrnMetadata = IrnMetadata {
    tag: 1101,
    ttl: 300,
    prompt: false,
};

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionProposeRequest {
    pub relays: Vec<Relay>,
    pub proposer: Participant,
    pub required_namespaces: ProposeNamespaces,
    #[serde(default, skip_serializing_if = "ProposeNamespaces::is_empty")]
    pub optional_namespaces: ProposeNamespaces,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_properties: Option<SessionProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoped_properties: Option<ScopedProperties>,
    /// Unix timestamp after which the proposal is no longer valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_timestamp: Option<u64>,
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionProposeResponse {
    pub relay: Relay,
    pub responder_public_key: String,
}
