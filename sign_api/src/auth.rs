//! One-step authentication: CAIP-122 (SIWE) requests, CACAO responses and
//! ReCap capability resources.

pub use {
    cacao::{
        namespaces_from_cacaos,
        BasicCacaoVerifier,
        Cacao,
        CacaoError,
        CacaoPayload,
        CacaoVerifier,
        Header,
        Signature,
    },
    recap::{Recap, RECAP_PREFIX},
};
use serde::{Deserialize, Serialize};

mod cacao;
mod recap;


/// The CAIP-122 message type used for SIWE.
pub const CAIP122_TYPE: &str = "caip122";

/// Authentication request sent by the dapp. The wallet turns it into one
/// [`CacaoPayload`] per account it signs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub chains: Vec<String>,
    pub domain: String,
    pub aud: String,
    pub nonce: String,
    pub version: String,
    pub iat: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
}

impl AuthPayload {
    /// Methods requested through a ReCap resource, if any.
    pub fn requested_methods(&self) -> Result<Vec<String>, CacaoError> {
        recap_methods(self.resources.as_deref())
    }

    /// Builds the payload the wallet signs for `account` (CAIP-10).
    pub fn cacao_payload(&self, account: &str) -> CacaoPayload {
        CacaoPayload {
            domain: self.domain.clone(),
            iss: format!("did:pkh:{account}"),
            statement: self.statement.clone(),
            aud: self.aud.clone(),
            version: self.version.clone(),
            nonce: self.nonce.clone(),
            iat: self.iat.clone(),
            exp: self.exp.clone(),
            nbf: self.nbf.clone(),
            request_id: self.request_id.clone(),
            resources: self.resources.clone(),
        }
    }
}

/// Collects the methods of every ReCap resource in `resources`.
pub(crate) fn recap_methods(resources: Option<&[String]>) -> Result<Vec<String>, CacaoError> {
    let mut methods = Vec::new();

    for resource in resources.unwrap_or_default() {
        if !resource.starts_with(RECAP_PREFIX) {
            continue;
        }

        for method in Recap::decode(resource)?.methods() {
            if !methods.contains(&method) {
                methods.push(method);
            }
        }
    }

    Ok(methods)
}
