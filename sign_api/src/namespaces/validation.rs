use {
    super::{
        caip::{namespace_of, parse_account, parse_chain, parse_key},
        NamespaceError,
    },
    crate::rpc::{ProposeNamespace, ProposeNamespaces, SettleNamespace, SettleNamespaces},
    indexmap::IndexSet,
};

fn join_error_elements<'a>(elements: impl IntoIterator<Item = &'a str>) -> String {
    elements.into_iter().collect::<Vec<_>>().join(",")
}

/// Validates the keys and chains of proposal namespaces.
///
/// A generic key (`eip155`) must list its chains, and every chain must belong
/// to the key's namespace. A chain key (`eip155:1`) may omit `chains`.
pub fn validate_proposal_namespaces(namespaces: &ProposeNamespaces) -> Result<(), NamespaceError> {
    namespaces
        .iter()
        .try_for_each(|(key, namespace)| validate_proposal_namespace(key, namespace))
}

fn validate_proposal_namespace(key: &str, namespace: &ProposeNamespace) -> Result<(), NamespaceError> {
    let parsed = parse_key(key).ok_or_else(|| NamespaceError::UnsupportedNamespaceKey(key.to_owned()))?;

    let chains = match (&namespace.chains, parsed.reference) {
        (Some(chains), _) => chains,
        (None, Some(_)) => return Ok(()),
        (None, None) => return Err(NamespaceError::UnsupportedChainsEmpty(key.to_owned())),
    };

    if chains.is_empty() && parsed.reference.is_none() {
        return Err(NamespaceError::UnsupportedChainsEmpty(key.to_owned()));
    }

    for chain in chains {
        let (namespace, _) =
            parse_chain(chain).ok_or_else(|| NamespaceError::UnsupportedChainsCaip2(chain.clone()))?;

        if namespace != parsed.namespace {
            return Err(NamespaceError::UnsupportedChainsNamespace(
                parsed.namespace.to_owned(),
                chain.clone(),
            ));
        }

        if parsed.reference.is_some() && chain != key {
            return Err(NamespaceError::UnsupportedChainsNamespace(key.to_owned(), chain.clone()));
        }
    }

    Ok(())
}

/// Validates session namespaces sent by a wallet.
///
/// Accounts must be CAIP-10, belong to the key's namespace (or chain, for
/// chain keys) and lie within `chains` when present.
pub fn validate_session_namespaces(namespaces: &SettleNamespaces) -> Result<(), NamespaceError> {
    namespaces
        .iter()
        .try_for_each(|(key, namespace)| validate_session_namespace(key, namespace))
}

fn validate_session_namespace(key: &str, namespace: &SettleNamespace) -> Result<(), NamespaceError> {
    let parsed = parse_key(key).ok_or_else(|| NamespaceError::UnsupportedNamespaceKey(key.to_owned()))?;

    if let Some(chains) = &namespace.chains {
        for chain in chains {
            let (chain_namespace, _) =
                parse_chain(chain).ok_or_else(|| NamespaceError::UnsupportedChainsCaip2(chain.clone()))?;

            if chain_namespace != parsed.namespace {
                return Err(NamespaceError::UnsupportedChainsNamespace(
                    parsed.namespace.to_owned(),
                    chain.clone(),
                ));
            }
        }
    }

    for account in &namespace.accounts {
        let (chain, _) =
            parse_account(account).ok_or_else(|| NamespaceError::UnsupportedAccounts(account.clone()))?;

        let in_key = match parsed.reference {
            Some(_) => chain == key,
            None => namespace_of(chain) == parsed.namespace,
        };

        let in_chains = namespace
            .chains
            .as_ref()
            .map_or(true, |chains| chains.iter().any(|c| c == chain));

        if !in_key || !in_chains {
            return Err(NamespaceError::UnsupportedAccounts(account.clone()));
        }
    }

    Ok(())
}

/// Checks that session namespaces satisfy every required namespace.
///
/// Each required entry is matched against all session namespaces sharing its
/// CAIP-2 prefix. Every implied chain needs an account, and the union of the
/// matching methods and events must cover the required ones.
pub fn validate_required(
    required: &ProposeNamespaces,
    session: &SettleNamespaces,
) -> Result<(), NamespaceError> {
    for (key, namespace) in required.iter() {
        let prefix = namespace_of(key);
        let candidates: Vec<_> = session
            .iter()
            .filter(|(session_key, _)| namespace_of(session_key) == prefix)
            .map(|(_, namespace)| namespace)
            .collect();

        if candidates.is_empty() {
            return Err(NamespaceError::UnsupportedNamespace(key.clone()));
        }

        let chains = namespace.implied_chains(key);

        let missing: Vec<_> = chains
            .iter()
            .filter(|chain| !candidates.iter().any(|c| c.has_chain(chain)))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Err(NamespaceError::UnsupportedChains(join_error_elements(missing)));
        }

        let unbacked: Vec<_> = chains
            .iter()
            .filter(|chain| {
                !candidates.iter().any(|c| {
                    c.accounts
                        .iter()
                        .any(|account| parse_account(account).is_some_and(|(ac, _)| ac == chain.as_str()))
                })
            })
            .map(String::as_str)
            .collect();

        if !unbacked.is_empty() {
            return Err(NamespaceError::UnsupportedAccounts(join_error_elements(unbacked)));
        }

        let methods: IndexSet<&String> = candidates.iter().flat_map(|c| &c.methods).collect();
        let missing: Vec<_> = namespace
            .methods
            .iter()
            .filter(|method| !methods.contains(method))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Err(NamespaceError::UnsupportedMethods(join_error_elements(missing)));
        }

        let events: IndexSet<&String> = candidates.iter().flat_map(|c| &c.events).collect();
        let missing: Vec<_> = namespace
            .events
            .iter()
            .filter(|event| !events.contains(event))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Err(NamespaceError::UnsupportedEvents(join_error_elements(missing)));
        }
    }

    Ok(())
}
