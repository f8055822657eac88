//! https://specs.walletconnect.com/2.0/specs/clients/core/pairing/pairing-uri

use {
    crate::crypto::SymKey,
    once_cell::sync::Lazy,
    regex::Regex,
    relay_rpc::domain::Topic,
    std::{
        fmt::{Debug, Display, Formatter},
        str::FromStr,
    },
    url::Url,
};

static TOPIC_VERSION_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^(?P<topic>[[:word:]-]+)@(?P<version>\d+)$").ok());

/// Pairing protocol version advertised in URIs.
pub const PAIRING_VERSION: &str = "2";

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("Expecting protocol \"wc\" but \"{protocol}\" is found.")]
    UnexpectedProtocol { protocol: String },
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error("Failed to parse topic and version")]
    InvalidTopicAndVersion,
    #[error("Topic not found")]
    TopicNotFound,
    #[error("Version not found")]
    VersionNotFound,
    #[error("Relay protocol not found")]
    RelayProtocolNotFound,
    #[error("Key not found")]
    KeyNotFound,
    #[error("Failed to parse key: {0:?}")]
    InvalidKey(#[from] hex::FromHexError),
    #[error("Invalid key length: {0}")]
    InvalidKeyLength(usize),
    #[error("Invalid expiry timestamp: {0}")]
    InvalidExpiry(String),
    #[error("Unexpected parameter, key: {0:?}, value: {1:?}")]
    UnexpectedParameter(String, String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Params {
    pub relay_protocol: String,
    pub sym_key: SymKey,
    pub relay_data: Option<String>,
    /// Unix seconds after which the pairing is void.
    pub expiry_timestamp: Option<u64>,
    /// Methods the creator supports beyond the session proposal. `None` means
    /// one-step authenticate is not supported.
    pub methods: Option<Vec<String>>,
}

/// https://github.com/ethereum/EIPs/blob/master/EIPS/eip-1328.md
#[derive(Clone, Eq, PartialEq)]
pub struct Pairing {
    pub topic: Topic,
    pub version: String,
    pub params: Params,
}

impl Pairing {
    pub fn new(topic: Topic, params: Params) -> Self {
        Self {
            topic,
            version: PAIRING_VERSION.to_owned(),
            params,
        }
    }

    /// Whether the URI advertises `method`.
    pub fn supports(&self, method: &str) -> bool {
        self.params
            .methods
            .as_ref()
            .is_some_and(|methods| methods.iter().any(|m| m == method))
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.params.expiry_timestamp.is_some_and(|expiry| expiry <= now)
    }

    fn parse_topic_and_version(path: &str) -> Result<(Topic, String), ParseError> {
        let caps = TOPIC_VERSION_REGEX
            .as_ref()
            .and_then(|regex| regex.captures(path))
            .ok_or(ParseError::InvalidTopicAndVersion)?;
        let topic = caps
            .name("topic")
            .ok_or(ParseError::TopicNotFound)?
            .as_str();
        let version = caps
            .name("version")
            .ok_or(ParseError::VersionNotFound)?
            .as_str()
            .to_owned();
        Ok((Topic::from(topic), version))
    }

    fn parse_params(url: &Url) -> Result<Params, ParseError> {
        let queries = url.query_pairs();

        let mut relay_protocol: Option<String> = None;
        let mut sym_key: Option<String> = None;
        let mut relay_data: Option<String> = None;
        let mut expiry_timestamp: Option<u64> = None;
        let mut methods: Option<Vec<String>> = None;
        for (k, v) in queries {
            match k.as_ref() {
                "relay-protocol" => relay_protocol = Some((*v).to_owned()),
                "symKey" => sym_key = Some((*v).to_owned()),
                "relay-data" => relay_data = Some((*v).to_owned()),
                "expiryTimestamp" => {
                    expiry_timestamp = Some(
                        v.parse()
                            .map_err(|_| ParseError::InvalidExpiry((*v).to_owned()))?,
                    )
                }
                "methods" => {
                    methods = Some(
                        v.split(',')
                            .map(str::trim)
                            .filter(|method| !method.is_empty())
                            .map(str::to_owned)
                            .collect(),
                    )
                }
                _ => {
                    return Result::Err(ParseError::UnexpectedParameter(
                        (*k).to_owned(),
                        (*v).to_owned(),
                    ))
                }
            }
        }

        let sym_key = hex::decode(sym_key.ok_or(ParseError::KeyNotFound)?)?;

        Ok(Params {
            relay_protocol: relay_protocol.ok_or(ParseError::RelayProtocolNotFound)?,
            sym_key: sym_key
                .as_slice()
                .try_into()
                .map_err(|_| ParseError::InvalidKeyLength(sym_key.len()))?,
            relay_data,
            expiry_timestamp,
            methods,
        })
    }
}

impl Debug for Pairing {
    /// Debug with key masked.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConnectUrl")
            .field("topic", &self.topic)
            .field("version", &self.version)
            .field("relay-protocol", &self.params.relay_protocol)
            .field("key", &"***")
            .field(
                "relay-data",
                &self.params.relay_data.as_deref().unwrap_or(""),
            )
            .field("expiryTimestamp", &self.params.expiry_timestamp)
            .field("methods", &self.params.methods)
            .finish()
    }
}

impl Display for Pairing {
    /// Formats the URI, query values percent-encoded.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("relay-protocol", &self.params.relay_protocol);
        query.append_pair("symKey", &hex::encode(self.params.sym_key));

        if let Some(expiry) = self.params.expiry_timestamp {
            query.append_pair("expiryTimestamp", &expiry.to_string());
        }

        if let Some(relay_data) = &self.params.relay_data {
            query.append_pair("relay-data", relay_data);
        }

        if let Some(methods) = &self.params.methods {
            query.append_pair("methods", &methods.join(","));
        }

        write!(f, "wc:{}@{}?{}", self.topic, self.version, query.finish())
    }
}

impl FromStr for Pairing {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::from_str(s)?;

        if url.scheme() != "wc" {
            return Result::Err(ParseError::UnexpectedProtocol {
                protocol: url.scheme().to_owned(),
            });
        }

        let (topic, version) = Self::parse_topic_and_version(url.path())?;
        Ok(Self {
            topic,
            version,
            params: Self::parse_params(&url)?,
        })
    }
}
