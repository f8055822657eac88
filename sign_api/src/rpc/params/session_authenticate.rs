//! https://specs.walletconnect.com/2.0/specs/clients/sign/rpc-methods
//! #wc_sessionauthenticate

use {
    super::{IrnMetadata, Participant},
    crate::auth::{AuthPayload, Cacao},
    serde::{Deserialize, Serialize},
};

pub(super) const IRN_REQUEST_METADATA: IrnMetadata = IrnMetadata {
    tag: 1116,
    ttl: 3600,
    prompt: true,
};

pub(super) const IRN_RESPONSE_METADATA: IrnMetadata = IrnMetadata {
    tag: 1117,
    ttl: 3600,
    prompt: false,
};

/// Metadata of a response rejecting the request on user action.
pub(crate) const IRN_REJECT_METADATA: IrnMetadata = IrnMetadata {
    tag: 1118,
    ttl: 3600,
    prompt: false,
};

/// Metadata of a response rejecting the request because the wallet does not
/// support one-step authentication.
pub(crate) const IRN_AUTO_REJECT_METADATA: IrnMetadata = IrnMetadata {
    tag: 1119,
    ttl: 300,
    prompt: false,
};

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionAuthenticateRequest {
    pub requester: Participant,
    pub auth_payload: AuthPayload,
    /// Unix timestamp.
    pub expiry_timestamp: u64,
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionAuthenticateResponse {
    pub cacaos: Vec<Cacao>,
    pub responder: Participant,
}
