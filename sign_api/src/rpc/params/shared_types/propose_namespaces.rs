use {
    indexmap::IndexSet,
    serde::{Deserialize, Serialize},
    std::{
        collections::BTreeMap,
        ops::{Deref, DerefMut},
    },
};

/// Proposal namespaces keyed by CAIP-2 namespace (`eip155`) or by a full
/// chain id (`eip155:1`).
///
/// https://specs.walletconnect.com/2.0/specs/clients/sign/namespaces
#[derive(Debug, Serialize, Eq, PartialEq, Deserialize, Clone, Default)]
pub struct ProposeNamespaces(pub BTreeMap<String, ProposeNamespace>);

impl Deref for ProposeNamespaces {
    type Target = BTreeMap<String, ProposeNamespace>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ProposeNamespaces {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<(String, ProposeNamespace)> for ProposeNamespaces {
    fn from_iter<T: IntoIterator<Item = (String, ProposeNamespace)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl ProposeNamespaces {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// https://specs.walletconnect.com/2.0/specs/clients/sign/namespaces#
/// proposal-namespace
#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProposeNamespace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chains: Option<Vec<String>>,
    #[serde(default)]
    pub methods: IndexSet<String>,
    #[serde(default)]
    pub events: IndexSet<String>,
}

impl ProposeNamespace {
    /// Chains requested by this entry. A chain key (`eip155:1`) implies
    /// itself when `chains` is omitted.
    pub fn implied_chains(&self, key: &str) -> Vec<String> {
        match &self.chains {
            Some(chains) if !chains.is_empty() => chains.clone(),
            _ if key.contains(':') => vec![key.to_owned()],
            _ => Vec::new(),
        }
    }
}
