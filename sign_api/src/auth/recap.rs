use {
    super::CacaoError,
    base64::{
        engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD},
        Engine,
    },
    serde::{Deserialize, Serialize},
    std::collections::BTreeMap,
};

/// Resource prefix of an encoded ReCap.
pub const RECAP_PREFIX: &str = "urn:recap:";

const REQUEST_ABILITY: &str = "request/";

/// ReCap (EIP-5573) capability object.
///
/// `att` maps a resource (`eip155`) to abilities (`request/personal_sign`),
/// each with a list of caveats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recap {
    pub att: BTreeMap<String, BTreeMap<String, Vec<serde_json::Value>>>,
}

impl Recap {
    /// A capability to send `methods` as requests on `namespace`.
    pub fn for_methods<I, S>(namespace: &str, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let abilities = methods
            .into_iter()
            .map(|method| {
                (
                    format!("{REQUEST_ABILITY}{}", method.as_ref()),
                    vec![serde_json::json!({})],
                )
            })
            .collect();

        Self {
            att: BTreeMap::from([(namespace.to_owned(), abilities)]),
        }
    }

    pub fn encode(&self) -> Result<String, CacaoError> {
        let json = serde_json::to_vec(self).map_err(|err| CacaoError::Recap(err.to_string()))?;
        Ok(format!("{RECAP_PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
    }

    pub fn decode(resource: &str) -> Result<Self, CacaoError> {
        let encoded = resource
            .strip_prefix(RECAP_PREFIX)
            .ok_or_else(|| CacaoError::Recap("missing urn:recap: prefix".to_owned()))?;

        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .or_else(|_| URL_SAFE.decode(encoded))
            .map_err(|err| CacaoError::Recap(err.to_string()))?;

        serde_json::from_slice(&json).map_err(|err| CacaoError::Recap(err.to_string()))
    }

    /// Request methods granted across all resources, in resource order.
    pub fn methods(&self) -> Vec<String> {
        self.att
            .values()
            .flat_map(|abilities| abilities.keys())
            .filter_map(|ability| ability.strip_prefix(REQUEST_ABILITY))
            .map(ToOwned::to_owned)
            .collect()
    }
}
