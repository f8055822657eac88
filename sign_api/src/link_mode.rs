//! Relay-less delivery of envelopes through universal links.
//!
//! An envelope is the same base64 payload that would be published on the
//! relay, carried as `<universal link>?wc_ev=<envelope>&topic=<topic>`.

use {
    async_trait::async_trait,
    dashmap::DashSet,
    relay_rpc::domain::Topic,
    url::Url,
};

const ENVELOPE_PARAM: &str = "wc_ev";
const TOPIC_PARAM: &str = "topic";

#[derive(Debug, thiserror::Error)]
pub enum LinkModeError {
    #[error("Wallet link support has not been proven over the relay: {0}")]
    WalletLinkSupportNotProven(String),

    #[error("Link mode is disabled")]
    Disabled,

    #[error("Peer did not advertise a link mode universal link")]
    NoUniversalLink,

    #[error("Link mode authenticate needs an existing pairing")]
    PairingRequired,

    #[error("No link envelope transport configured")]
    NoTransport,

    #[error("Invalid link URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Link URL is missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Failed to deliver envelope: {0}")]
    Delivery(String),
}

/// Delivers envelope URLs to the peer app, e.g. by opening the link.
#[async_trait]
pub trait LinkEnvelopeTransport: Send + Sync + 'static {
    async fn dispatch(&self, url: Url) -> Result<(), LinkModeError>;
}

pub fn build_envelope_url(universal_link: &str, topic: &Topic, envelope: &str) -> Result<Url, LinkModeError> {
    let mut url = Url::parse(universal_link)?;
    url.query_pairs_mut()
        .append_pair(ENVELOPE_PARAM, envelope)
        .append_pair(TOPIC_PARAM, &topic.to_string());
    Ok(url)
}

/// Extracts the topic and envelope from a received link.
pub fn parse_envelope_url(url: &str) -> Result<(Topic, String), LinkModeError> {
    let url = Url::parse(url)?;

    let mut envelope = None;
    let mut topic = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            ENVELOPE_PARAM => envelope = Some(value.into_owned()),
            TOPIC_PARAM => topic = Some(Topic::from(value.into_owned())),
            _ => {}
        }
    }

    Ok((
        topic.ok_or(LinkModeError::MissingParameter(TOPIC_PARAM))?,
        envelope.ok_or(LinkModeError::MissingParameter(ENVELOPE_PARAM))?,
    ))
}

/// Universal links whose link mode support was proven over the relay.
#[derive(Debug, Default)]
pub struct ProvenLinks {
    links: DashSet<String>,
}

impl ProvenLinks {
    pub fn prove(&self, universal_link: &str) {
        self.links.insert(universal_link.to_owned());
    }

    pub fn is_proven(&self, universal_link: &str) -> bool {
        self.links.contains(universal_link)
    }

    pub fn ensure_proven(&self, universal_link: &str) -> Result<(), LinkModeError> {
        if self.is_proven(universal_link) {
            Ok(())
        } else {
            Err(LinkModeError::WalletLinkSupportNotProven(universal_link.to_owned()))
        }
    }
}
