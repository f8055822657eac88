//! https://specs.walletconnect.com/2.0/specs/clients/sign/data-structures

mod propose_namespaces;
mod settle_namespaces;

pub use {
    propose_namespaces::{ProposeNamespace, ProposeNamespaces},
    settle_namespaces::{SettleNamespace, SettleNamespaces},
};
use {
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// Free-form session properties agreed on during the proposal.
pub type SessionProperties = BTreeMap<String, String>;

/// Properties scoped to a namespace (`eip155`) or chain (`eip155:1`) key.
///
/// Values are JSON documents, or strings holding a JSON document.
pub type ScopedProperties = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub description: String,
    pub url: String,
    pub icons: Vec<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
}

impl Metadata {
    /// The universal link of a peer that declared link-mode support.
    pub fn link_mode_universal(&self) -> Option<&str> {
        self.redirect
            .as_ref()
            .filter(|redirect| redirect.link_mode)
            .and_then(|redirect| redirect.universal.as_deref())
    }
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universal: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub link_mode: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone, Default)]
pub struct Relay {
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub data: Option<String>,
}

impl Relay {
    pub fn irn() -> Self {
        Self {
            protocol: "irn".to_owned(),
            data: None,
        }
    }
}

/// One side of a proposal or session: proposer, controller, requester or
/// responder.
#[derive(Debug, Serialize, Eq, PartialEq, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub public_key: String,
    pub metadata: Metadata,
}
