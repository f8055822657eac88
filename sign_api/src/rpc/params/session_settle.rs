//! https://specs.walletconnect.com/2.0/specs/clients/sign/rpc-methods
//! #wc_sessionsettle

use {
    super::{IrnMetadata, Participant, Relay, ScopedProperties, SessionProperties, SettleNamespaces},
    serde::{Deserialize, Serialize},
};

pub(super) const IRN_REQUEST_METADATA: IrnMetadata = IrnMetadata {
    tag: 1102,
    ttl: 300,
    prompt: false,
};

pub(super) const IRN_RESPONSE_METADATA: IrnMetadata = IrnMetadata {
    tag: 1103,
    ttl: 300,
    prompt: false,
};

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettleRequest {
    pub relay: Relay,
    pub controller: Participant,
    pub namespaces: SettleNamespaces,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_properties: Option<SessionProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoped_properties: Option<ScopedProperties>,
    /// Unix timestamp.
    ///
    /// Expiry should be between .now() + TTL.
    pub expiry: u64,
}
