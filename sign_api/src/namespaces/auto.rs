use {
    super::{
        caip::{namespace_of, parse_account},
        validate_proposal_namespaces,
        NamespaceError,
    },
    crate::rpc::{ProposeNamespaces, SessionProposeRequest, SettleNamespace, SettleNamespaces},
    indexmap::IndexSet,
    std::collections::BTreeMap,
};

#[derive(Debug, thiserror::Error, Clone, Eq, PartialEq)]
pub enum AutoNamespacesError {
    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    #[error("Required chains are not supported: {0:?}")]
    RequiredChainsNotSatisfied(Vec<String>),

    #[error("Required chains have no accounts: {0:?}")]
    RequiredAccountsNotSatisfied(Vec<String>),

    #[error("Required methods are not supported: {0:?}")]
    RequiredMethodsNotSatisfied(Vec<String>),

    #[error("Required events are not supported: {0:?}")]
    RequiredEventsNotSatisfied(Vec<String>),

    #[error("None of the requested namespaces are supported")]
    EmptySessionNamespaces,
}

impl AutoNamespacesError {
    /// Protocol reason code to reject the proposal with.
    pub fn error_code(&self) -> i64 {
        match self {
            Self::Namespace(err) => err.error_code(),
            Self::RequiredChainsNotSatisfied(_) | Self::EmptySessionNamespaces => 5100,
            Self::RequiredMethodsNotSatisfied(_) => 5101,
            Self::RequiredEventsNotSatisfied(_) => 5102,
            Self::RequiredAccountsNotSatisfied(_) => 5103,
        }
    }
}

/// Builds session namespaces from a proposal and the wallet's capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoNamespaces;

#[derive(Default)]
struct Grouped {
    chains: IndexSet<String>,
    methods: IndexSet<String>,
    events: IndexSet<String>,
}

impl AutoNamespaces {
    /// Groups the required and optional entries by CAIP-2 namespace and keeps
    /// what the wallet supports: chains that are both supported and backed by
    /// an account, methods and events in the supported sets.
    ///
    /// Fails when a required chain, method or event cannot be satisfied.
    /// Optional entries are dropped silently.
    pub fn build(
        proposal: &SessionProposeRequest,
        chains: &[String],
        methods: &[String],
        events: &[String],
        accounts: &[String],
    ) -> Result<SettleNamespaces, AutoNamespacesError> {
        validate_proposal_namespaces(&proposal.required_namespaces)?;
        validate_proposal_namespaces(&proposal.optional_namespaces)?;

        let backed = |chain: &str| {
            accounts
                .iter()
                .any(|account| parse_account(account).is_some_and(|(c, _)| c == chain))
        };

        Self::check_required(&proposal.required_namespaces, chains, methods, events, &backed)?;

        let mut grouped: BTreeMap<&str, Grouped> = BTreeMap::new();

        let requested = proposal
            .required_namespaces
            .iter()
            .chain(proposal.optional_namespaces.iter());

        for (key, namespace) in requested {
            let group = grouped.entry(namespace_of(key)).or_default();

            group.chains.extend(
                namespace
                    .implied_chains(key)
                    .into_iter()
                    .filter(|chain| chains.contains(chain) && backed(chain.as_str())),
            );
            group.methods.extend(
                namespace
                    .methods
                    .iter()
                    .filter(|method| methods.contains(method))
                    .cloned(),
            );
            group.events.extend(
                namespace
                    .events
                    .iter()
                    .filter(|event| events.contains(event))
                    .cloned(),
            );
        }

        let namespaces: SettleNamespaces = grouped
            .into_iter()
            .filter(|(_, group)| !group.chains.is_empty())
            .map(|(prefix, group)| {
                let accounts = accounts
                    .iter()
                    .filter(|account| {
                        parse_account(account).is_some_and(|(chain, _)| group.chains.contains(chain))
                    })
                    .cloned()
                    .collect();

                let namespace = SettleNamespace {
                    chains: Some(group.chains.into_iter().collect()),
                    accounts,
                    methods: group.methods,
                    events: group.events,
                };

                (prefix.to_owned(), namespace)
            })
            .collect();

        if namespaces.is_empty() {
            return Err(AutoNamespacesError::EmptySessionNamespaces);
        }

        Ok(namespaces)
    }

    fn check_required(
        required: &ProposeNamespaces,
        chains: &[String],
        methods: &[String],
        events: &[String],
        backed: &impl Fn(&str) -> bool,
    ) -> Result<(), AutoNamespacesError> {
        let mut unsupported_chains = IndexSet::new();
        let mut unbacked_chains = IndexSet::new();
        let mut unsupported_methods = IndexSet::new();
        let mut unsupported_events = IndexSet::new();

        for (key, namespace) in required.iter() {
            for chain in namespace.implied_chains(key) {
                if !chains.contains(&chain) {
                    unsupported_chains.insert(chain);
                } else if !backed(chain.as_str()) {
                    unbacked_chains.insert(chain);
                }
            }

            unsupported_methods.extend(
                namespace
                    .methods
                    .iter()
                    .filter(|method| !methods.contains(method))
                    .cloned(),
            );
            unsupported_events.extend(
                namespace
                    .events
                    .iter()
                    .filter(|event| !events.contains(event))
                    .cloned(),
            );
        }

        if !unsupported_chains.is_empty() {
            return Err(AutoNamespacesError::RequiredChainsNotSatisfied(
                unsupported_chains.into_iter().collect(),
            ));
        }

        if !unbacked_chains.is_empty() {
            return Err(AutoNamespacesError::RequiredAccountsNotSatisfied(
                unbacked_chains.into_iter().collect(),
            ));
        }

        if !unsupported_methods.is_empty() {
            return Err(AutoNamespacesError::RequiredMethodsNotSatisfied(
                unsupported_methods.into_iter().collect(),
            ));
        }

        if !unsupported_events.is_empty() {
            return Err(AutoNamespacesError::RequiredEventsNotSatisfied(
                unsupported_events.into_iter().collect(),
            ));
        }

        Ok(())
    }
}
