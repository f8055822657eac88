//! Origin verification of incoming proposals and requests.

use {
    crate::rpc::Metadata,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Validation {
    Valid,
    Invalid,
    #[default]
    Unknown,
    Scam,
}

/// What is known about the peer's origin when a proposal arrives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyContext {
    pub origin: Option<String>,
    pub validation: Validation,
    pub verify_url: Option<String>,
}

/// Attests the origin of a peer message.
#[async_trait]
pub trait Verifier: Send + Sync + 'static {
    async fn verify(&self, metadata: &Metadata, attestation: Option<&str>) -> VerifyContext;
}

/// Reports every origin as [`Validation::Unknown`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopVerifier;

#[async_trait]
impl Verifier for NoopVerifier {
    async fn verify(&self, metadata: &Metadata, _attestation: Option<&str>) -> VerifyContext {
        VerifyContext {
            origin: Some(metadata.url.clone()),
            validation: Validation::Unknown,
            verify_url: metadata.verify_url.clone(),
        }
    }
}
