//! JSON-RPC payloads exchanged with the relay: publish/subscribe requests,
//! subscription deliveries and their responses.
//!
//! https://specs.walletconnect.com/2.0/specs/servers/relay/relay-server-rpc

use {
    crate::domain::{DecodingError, MessageId, SubscriptionId, Topic},
    serde::{de::DeserializeOwned, Deserialize, Serialize},
    std::sync::Arc,
};


pub const JSON_RPC_VERSION_STR: &str = "2.0";

pub static JSON_RPC_VERSION: once_cell::sync::Lazy<Arc<str>> =
    once_cell::sync::Lazy::new(|| Arc::from(JSON_RPC_VERSION_STR));

/// Upper bound on topics in one batch subscribe or unsubscribe.
pub const MAX_SUBSCRIPTION_BATCH_SIZE: usize = 500;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Topic decoding failed: {0}")]
    TopicDecoding(DecodingError),

    #[error("Invalid request ID")]
    RequestId,

    #[error("Invalid JSON RPC version")]
    JsonRpcVersion,

    #[error("The batch contains too many items ({actual}). Maximum number of items is {limit}")]
    BatchLimitExceeded { limit: usize, actual: usize },

    #[error("The batch contains no items")]
    BatchEmpty,
}

fn validate_version(jsonrpc: &str) -> Result<(), ValidationError> {
    if jsonrpc == JSON_RPC_VERSION_STR {
        Ok(())
    } else {
        Err(ValidationError::JsonRpcVersion)
    }
}

fn validate_topics<'a>(topics: impl IntoIterator<Item = &'a Topic>) -> Result<(), ValidationError> {
    topics.into_iter().try_for_each(|topic| {
        topic
            .decode()
            .map(|_| ())
            .map_err(ValidationError::TopicDecoding)
    })
}

fn validate_batch_size(actual: usize) -> Result<(), ValidationError> {
    match actual {
        0 => Err(ValidationError::BatchEmpty),

        actual if actual > MAX_SUBSCRIPTION_BATCH_SIZE => Err(ValidationError::BatchLimitExceeded {
            limit: MAX_SUBSCRIPTION_BATCH_SIZE,
            actual,
        }),

        _ => Ok(()),
    }
}

/// A relay request with a typed successful result.
pub trait RequestPayload {
    type Response: Serialize + DeserializeOwned;

    fn validate(&self) -> Result<(), ValidationError>;

    fn into_params(self) -> Params;
}

macro_rules! impl_request_payload {
    ($($Params:ident => $Response:ty, |$this:ident| $validate:expr;)+) => {
        $(
            impl RequestPayload for $Params {
                type Response = $Response;

                fn validate(&self) -> Result<(), ValidationError> {
                    let $this = self;
                    $validate
                }

                fn into_params(self) -> Params {
                    Params::$Params(self)
                }
            }
        )+
    };
}

impl_request_payload! {
    Subscribe => SubscriptionId, |this| validate_topics([&this.topic]);
    Unsubscribe => bool, |this| validate_topics([&this.topic]);
    BatchSubscribe => Vec<SubscriptionId>, |this| {
        validate_batch_size(this.topics.len())?;
        validate_topics(&this.topics)
    };
    BatchUnsubscribe => bool, |this| {
        validate_batch_size(this.subscriptions.len())?;
        validate_topics(this.subscriptions.iter().map(|sub| &sub.topic))
    };
    Publish => bool, |this| validate_topics([&this.topic]);
    Subscription => bool, |this| validate_topics([&this.data.topic]);
}

/// Anything that travels over the relay socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Request(Request),
    Response(Response),
}

impl Payload {
    pub fn id(&self) -> MessageId {
        match self {
            Self::Request(request) => request.id,
            Self::Response(response) => response.id(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Request(request) => request.validate(),
            Self::Response(response) => response.validate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Success(SuccessfulResponse),
    Error(ErrorResponse),
}

impl Response {
    pub fn id(&self) -> MessageId {
        match self {
            Self::Success(response) => response.id,
            Self::Error(response) => response.id,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Success(response) => validate_version(&response.jsonrpc),
            Self::Error(response) => validate_version(&response.jsonrpc),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessfulResponse {
    pub id: MessageId,
    pub jsonrpc: Arc<str>,
    pub result: serde_json::Value,
}

impl SuccessfulResponse {
    pub fn new(id: MessageId, result: serde_json::Value) -> Self {
        Self {
            id,
            jsonrpc: JSON_RPC_VERSION.clone(),
            result,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub id: MessageId,
    pub jsonrpc: Arc<str>,
    pub error: ErrorData,
}

impl ErrorResponse {
    pub fn new(id: MessageId, error: ErrorData) -> Self {
        Self {
            id,
            jsonrpc: JSON_RPC_VERSION.clone(),
            error,
        }
    }
}

/// Error object of a failed relay request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscribe {
    pub topic: Topic,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unsubscribe {
    pub topic: Topic,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchSubscribe {
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchUnsubscribe {
    pub subscriptions: Vec<Unsubscribe>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Publish {
    pub topic: Topic,
    pub message: Arc<str>,

    /// How long the relay keeps an undelivered message in the mailbox.
    #[serde(rename = "ttl")]
    pub ttl_secs: u32,

    /// Identifies the RPC method carried by the encrypted message.
    pub tag: u32,

    /// Asks the relay to wake the recipient through the push server.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub prompt: bool,
}

impl Publish {
    /// The `irn_subscription` request the relay delivers to subscribers of
    /// this topic.
    pub fn as_subscription(
        &self,
        message_id: MessageId,
        subscription_id: SubscriptionId,
        published_at: i64,
    ) -> Request {
        Request::new(
            message_id,
            Params::Subscription(Subscription {
                id: subscription_id,
                data: SubscriptionData {
                    topic: self.topic.clone(),
                    message: self.message.clone(),
                    published_at,
                    tag: self.tag,
                },
            }),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub data: SubscriptionData,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionData {
    pub topic: Topic,
    pub message: Arc<str>,

    /// Milliseconds since the Unix epoch.
    pub published_at: i64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub tag: u32,
}

fn is_zero(tag: &u32) -> bool {
    *tag == 0
}

/// Relay methods. Older relays use the `iridium_` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Params {
    #[serde(rename = "irn_subscribe", alias = "iridium_subscribe")]
    Subscribe(Subscribe),

    #[serde(rename = "irn_unsubscribe", alias = "iridium_unsubscribe")]
    Unsubscribe(Unsubscribe),

    #[serde(rename = "irn_batchSubscribe", alias = "iridium_batchSubscribe")]
    BatchSubscribe(BatchSubscribe),

    #[serde(rename = "irn_batchUnsubscribe", alias = "iridium_batchUnsubscribe")]
    BatchUnsubscribe(BatchUnsubscribe),

    #[serde(rename = "irn_publish", alias = "iridium_publish")]
    Publish(Publish),

    /// Relay to client: a message published on a subscribed topic.
    #[serde(rename = "irn_subscription", alias = "iridium_subscription")]
    Subscription(Subscription),
}

impl Params {
    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Subscribe(params) => params.validate(),
            Self::Unsubscribe(params) => params.validate(),
            Self::BatchSubscribe(params) => params.validate(),
            Self::BatchUnsubscribe(params) => params.validate(),
            Self::Publish(params) => params.validate(),
            Self::Subscription(params) => params.validate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    pub id: MessageId,
    pub jsonrpc: Arc<str>,
    #[serde(flatten)]
    pub params: Params,
}

impl Request {
    pub fn new(id: MessageId, params: Params) -> Self {
        Self {
            id,
            jsonrpc: JSON_RPC_VERSION.clone(),
            params,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.id.validate() {
            return Err(ValidationError::RequestId);
        }

        validate_version(&self.jsonrpc)?;
        self.params.validate()
    }
}
