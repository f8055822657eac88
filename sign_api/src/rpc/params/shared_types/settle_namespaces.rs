use {
    indexmap::IndexSet,
    serde::{Deserialize, Serialize},
    std::{
        collections::BTreeMap,
        ops::{Deref, DerefMut},
    },
};

/// Session namespaces approved by the wallet.
///
/// https://specs.walletconnect.com/2.0/specs/clients/sign/namespaces#
/// session-namespace
#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone, Default)]
pub struct SettleNamespaces(pub BTreeMap<String, SettleNamespace>);

impl Deref for SettleNamespaces {
    type Target = BTreeMap<String, SettleNamespace>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SettleNamespaces {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromIterator<(String, SettleNamespace)> for SettleNamespaces {
    fn from_iter<T: IntoIterator<Item = (String, SettleNamespace)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl SettleNamespaces {
    /// Namespaces that cover `chain_id`, either through a chain key or
    /// through an account on that chain.
    pub fn for_chain<'a>(&'a self, chain_id: &'a str) -> impl Iterator<Item = &'a SettleNamespace> {
        self.0
            .iter()
            .filter(move |(key, namespace)| key.as_str() == chain_id || namespace.has_chain(chain_id))
            .map(|(_, namespace)| namespace)
    }
}

#[derive(Debug, Serialize, PartialEq, Eq, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SettleNamespace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chains: Option<Vec<String>>,
    pub accounts: Vec<String>,
    pub methods: IndexSet<String>,
    pub events: IndexSet<String>,
}

impl SettleNamespace {
    /// Whether an account or an explicit chain entry refers to `chain_id`.
    pub fn has_chain(&self, chain_id: &str) -> bool {
        let in_accounts = self
            .accounts
            .iter()
            .any(|account| account_chain(account) == Some(chain_id));

        let in_chains = self
            .chains
            .as_ref()
            .is_some_and(|chains| chains.iter().any(|chain| chain == chain_id));

        in_accounts || in_chains
    }
}

/// The `namespace:reference` prefix of a CAIP-10 account.
fn account_chain(account: &str) -> Option<&str> {
    let (chain, _address) = account.rsplit_once(':')?;
    chain.contains(':').then_some(chain)
}
