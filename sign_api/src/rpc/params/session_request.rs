//! https://specs.walletconnect.com/2.0/specs/clients/sign/rpc-methods
//! #wc_sessionrequest

use {
    super::IrnMetadata,
    serde::{Deserialize, Serialize},
};

pub(super) const IRN_REQUEST_METADATA: IrnMetadata = IrnMetadata {
    tag: 1108,
    ttl: 300,
    prompt: true,
};

pub(super) const IRN_RESPONSE_METADATA: IrnMetadata = IrnMetadata {
    tag: 1109,
    ttl: 300,
    prompt: false,
};

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChainRequest {
    pub method: String,
    /// Opaque blockchain RPC parameters.
    ///
    /// Parsing is deferred to a higher level, blockchain RPC aware code.
    pub params: serde_json::Value,
    /// Unix timestamp after which the wallet must not answer the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_timestamp: Option<u64>,
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequestRequest {
    pub request: ChainRequest,
    pub chain_id: String,
}
