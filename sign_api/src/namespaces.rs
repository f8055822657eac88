//! CAIP-25 namespace negotiation: validation, matching a session against the
//! required namespaces, auto-building a session from wallet capabilities and
//! merging namespace sets.
//!
//! https://specs.walletconnect.com/2.0/specs/clients/sign/namespaces

pub use {
    auto::{AutoNamespaces, AutoNamespacesError},
    merger::merge_required_into_optional,
    validation::{validate_proposal_namespaces, validate_required, validate_session_namespaces},
};

mod auto;
mod caip;
mod merger;
mod validation;

/// Errors covering namespace validation errors.
///
/// https://specs.walletconnect.com/2.0/specs/clients/sign/namespaces
/// and some additional variants.
#[derive(Debug, thiserror::Error, Clone, Eq, PartialEq)]
pub enum NamespaceError {
    #[error("Required chains are not supported: {0}")]
    UnsupportedChains(String),
    #[error("Chains must not be empty: {0}")]
    UnsupportedChainsEmpty(String),
    #[error("Chains must be CAIP-2 compliant: {0}")]
    UnsupportedChainsCaip2(String),
    #[error("Chains must be defined in matching namespace: expected={0}, actual={1}")]
    UnsupportedChainsNamespace(String, String),
    #[error("Accounts must be CAIP-10 compliant and within the namespace chains: {0}")]
    UnsupportedAccounts(String),
    #[error("Required events are not supported: {0}")]
    UnsupportedEvents(String),
    #[error("Required methods are not supported: {0}")]
    UnsupportedMethods(String),
    #[error("Required namespace is not supported: {0}")]
    UnsupportedNamespace(String),
    #[error("Namespace formatting must match CAIP-2: {0}")]
    UnsupportedNamespaceKey(String),
}

impl NamespaceError {
    /// Protocol reason code sent to the peer.
    pub fn error_code(&self) -> i64 {
        match self {
            Self::UnsupportedChains(..)
            | Self::UnsupportedChainsEmpty(..)
            | Self::UnsupportedChainsCaip2(..)
            | Self::UnsupportedChainsNamespace(..) => 5100,
            Self::UnsupportedMethods(..) => 5101,
            Self::UnsupportedEvents(..) => 5102,
            Self::UnsupportedAccounts(..) => 5103,
            Self::UnsupportedNamespace(..) | Self::UnsupportedNamespaceKey(..) => 5104,
        }
    }
}
