//! Sign and pairing JSON-RPC messages exchanged between peers. These travel
//! end-to-end encrypted inside relay `irn_publish` payloads or link-mode
//! envelopes.

mod params;

use {
    relay_rpc::domain::MessageId,
    serde::{Deserialize, Serialize},
    std::{fmt::Debug, sync::Arc},
};

pub use params::*;

/// Version of the WalletConnect protocol that we're implementing.
pub const JSON_RPC_VERSION_STR: &str = "2.0";

pub static JSON_RPC_VERSION: once_cell::sync::Lazy<Arc<str>> =
    once_cell::sync::Lazy::new(|| Arc::from(JSON_RPC_VERSION_STR));

/// Errors covering payload validation problems.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid request ID")]
    RequestId,

    #[error("Invalid JSON RPC version")]
    JsonRpcVersion,
}

/// Enum representing a JSON RPC payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Request(Request),
    Response(Response),
}

impl From<Request> for Payload {
    fn from(value: Request) -> Self {
        Payload::Request(value)
    }
}

impl From<Response> for Payload {
    fn from(value: Response) -> Self {
        Payload::Response(value)
    }
}

impl Payload {
    pub fn id(&self) -> MessageId {
        match self {
            Self::Request(request) => request.id,
            Self::Response(response) => response.id,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Request(request) => request.validate(),
            Self::Response(response) => response.validate(),
        }
    }

    /// Whether a relay message tag belongs to the pairing or Sign methods.
    pub fn irn_tag_in_range(tag: u32) -> bool {
        (1000..=1005).contains(&tag) || (1100..=1119).contains(&tag)
    }
}

/// Data structure representing a JSON RPC request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// ID this message corresponds to.
    pub id: MessageId,

    /// The JSON RPC version.
    pub jsonrpc: Arc<str>,

    /// The parameters required to fulfill this request.
    #[serde(flatten)]
    pub params: RequestParams,
}

impl Request {
    pub fn new(id: MessageId, params: RequestParams) -> Self {
        Self {
            id,
            jsonrpc: JSON_RPC_VERSION.clone(),
            params,
        }
    }

    /// Validates the request payload.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_zero() {
            return Err(ValidationError::RequestId);
        }

        if self.jsonrpc.as_ref() != JSON_RPC_VERSION_STR {
            return Err(ValidationError::JsonRpcVersion);
        }

        Ok(())
    }
}

/// Data structure representing JSON RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// ID this message corresponds to.
    pub id: MessageId,

    /// RPC version.
    pub jsonrpc: Arc<str>,

    /// The parameters required to fulfill this response.
    #[serde(flatten)]
    pub params: ResponseParams,
}

impl Response {
    pub fn new(id: MessageId, params: ResponseParams) -> Self {
        Self {
            id,
            jsonrpc: JSON_RPC_VERSION.clone(),
            params,
        }
    }

    /// Validates the parameters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.jsonrpc.as_ref() != JSON_RPC_VERSION_STR {
            return Err(ValidationError::JsonRpcVersion);
        }

        Ok(())
    }
}
