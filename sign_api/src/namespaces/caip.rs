use {once_cell::sync::Lazy, regex::Regex};

/// https://chainagnostic.org/CAIPs/caip-2
///
/// chain_id:    namespace + ":" + reference
/// namespace:   [-a-z0-9]{3,8}
/// reference:   [-_a-zA-Z0-9]{1,32}
static CAIP2_REGEX: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(?P<namespace>[-[:alnum:]]{3,8})((?::)(?P<reference>[-_[:alnum:]]{1,32}))?$").ok()
});

/// https://chainagnostic.org/CAIPs/caip-10
///
/// account_id:        chain_id + ":" + account_address
/// account_address:   [-.%a-zA-Z0-9]{1,128}
static CAIP10_REGEX: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^(?P<namespace>[-[:alnum:]]{3,8}):(?P<reference>[-_[:alnum:]]{1,32}):(?P<address>[-.%[:alnum:]]{1,128})$",
    )
    .ok()
});

/// A namespace key: either `namespace` or a full `namespace:reference` chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct NamespaceKey<'a> {
    pub namespace: &'a str,
    pub reference: Option<&'a str>,
}

pub(super) fn parse_key(key: &str) -> Option<NamespaceKey<'_>> {
    let captures = CAIP2_REGEX.as_ref()?.captures(key)?;

    Some(NamespaceKey {
        namespace: captures.name("namespace")?.as_str(),
        reference: captures.name("reference").map(|m| m.as_str()),
    })
}

/// Parses a CAIP-2 chain id. The reference is mandatory.
pub(super) fn parse_chain(chain: &str) -> Option<(&str, &str)> {
    let key = parse_key(chain)?;
    Some((key.namespace, key.reference?))
}

/// Parses a CAIP-10 account into its chain id and address.
pub(super) fn parse_account(account: &str) -> Option<(&str, &str)> {
    let captures = CAIP10_REGEX.as_ref()?.captures(account)?;
    let address = captures.name("address")?;
    let chain = account.get(..address.start().checked_sub(1)?)?;

    Some((chain, address.as_str()))
}

/// The CAIP-2 namespace of a key, chain or account.
pub(super) fn namespace_of(value: &str) -> &str {
    value.split(':').next().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caip2_test_cases() {
        let chains = [
            // Ethereum mainnet
            "eip155:1",
            // Bitcoin mainnet (see https://github.com/bitcoin/bips/blob/master/bip-0122.mediawiki#definition-of-chain-id)
            "bip122:000000000019d6689c085ae165831e93",
            // Litecoin
            "bip122:12a765e31ffd4059bada1e25190f6e98",
            // Cosmos Hub (Tendermint + Cosmos SDK)
            "cosmos:cosmoshub-2",
            // Binance chain (Tendermint + Cosmos SDK; see https://dataseed5.defibit.io/genesis)
            "cosmos:Binance-Chain-Tigris",
            // StarkNet Testnet
            "starknet:SN_GOERLI",
            // Lisk Mainnet (LIP-0009; see https://github.com/LiskHQ/lips/blob/master/proposals/lip-0009.md)
            "lip9:9ee11e9df416b18b",
            // Dummy max length (8+1+32 = 41 chars/bytes)
            "chainstd:8c3444cf8970a9e41a706fab93e7a6c4",
        ];

        for chain in chains {
            assert!(parse_chain(chain).is_some(), "{chain}");
        }

        assert_eq!(parse_chain("eip155"), None);
        assert_eq!(parse_chain("**:1"), None);
        assert_eq!(parse_chain(""), None);
    }

    #[test]
    fn caip10_accounts() {
        assert_eq!(
            parse_account("eip155:1:0xab16a96D359eC26a11e2C2b3d8f8B8942d5Bfcdb"),
            Some(("eip155:1", "0xab16a96D359eC26a11e2C2b3d8f8B8942d5Bfcdb"))
        );
        assert_eq!(
            parse_account("cosmos:cosmoshub-3:cosmos1t2uflqwqe0fsj0shcfkrvpukewcw40yjj6hdc0"),
            Some(("cosmos:cosmoshub-3", "cosmos1t2uflqwqe0fsj0shcfkrvpukewcw40yjj6hdc0"))
        );
        assert_eq!(parse_account("eip155:0xab16"), None);
        assert_eq!(parse_account("0xab16"), None);
    }

    #[test]
    fn keys() {
        assert_eq!(
            parse_key("eip155"),
            Some(NamespaceKey {
                namespace: "eip155",
                reference: None
            })
        );
        assert_eq!(
            parse_key("eip155:1"),
            Some(NamespaceKey {
                namespace: "eip155",
                reference: Some("1")
            })
        );
        assert_eq!(namespace_of("eip155:1:0xab"), "eip155");
    }
}
