//! Per-request routing between the relay and HTTP wallet services.
//!
//! Wallet services are advertised in the session scoped properties, keyed by
//! chain (`eip155:1`) or namespace (`eip155`):
//!
//! ```json
//! {"walletService": [{"url": "https://wallet.example.com/rpc", "methods": ["wallet_getAssets"]}]}
//! ```
//!
//! The value may also be a string holding that document.

use {
    crate::rpc::{ChainRequest, ScopedProperties, JSON_RPC_VERSION_STR},
    relay_rpc::domain::MessageId,
    serde::Deserialize,
    serde_json::Value,
    tracing::{debug, warn},
    url::Url,
};

const WALLET_SERVICE_KEY: &str = "walletService";

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Wallet service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Wallet service error ({code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid wallet service response: {0}")]
    InvalidResponse(String),
}

/// Where an outgoing session request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Straight to the wallet service over HTTP.
    Http(Url),
    /// Encrypted over the session topic.
    Relay,
}

#[derive(Debug, Deserialize)]
struct WalletService {
    url: String,
    methods: Vec<String>,
}

/// Picks the route for `method` on `chain_id`.
///
/// The exact chain key is searched first and the namespace key only when the
/// chain key yields no match. Within a document the first service listing the
/// method wins. Malformed entries are skipped.
pub fn route(scoped_properties: Option<&ScopedProperties>, chain_id: &str, method: &str) -> Route {
    let Some(properties) = scoped_properties else {
        return Route::Relay;
    };

    let namespace = chain_id.split(':').next().unwrap_or(chain_id);

    [chain_id, namespace]
        .into_iter()
        .filter_map(|key| properties.get(key).map(|value| (key, value)))
        .find_map(|(key, value)| find_service(key, value, method))
        .map_or(Route::Relay, Route::Http)
}

fn find_service(key: &str, value: &Value, method: &str) -> Option<Url> {
    let document = match value {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(document) => document,
            Err(err) => {
                warn!(key, ?err, "skipping unparseable scoped properties");
                return None;
            }
        },
        Value::Object(_) => value.clone(),
        _ => return None,
    };

    let entries = document.get(WALLET_SERVICE_KEY)?.as_array()?;

    for entry in entries {
        let service = match WalletService::deserialize(entry) {
            Ok(service) => service,
            Err(err) => {
                warn!(key, ?err, "skipping malformed wallet service entry");
                continue;
            }
        };

        if !service.methods.iter().any(|m| m == method) {
            continue;
        }

        match Url::parse(&service.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => return Some(url),
            Ok(_) | Err(_) => {
                warn!(key, url = %service.url, "skipping wallet service with invalid url");
            }
        }
    }

    None
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// HTTP client for wallet services.
#[derive(Debug, Clone, Default)]
pub struct WalletServiceClient {
    http: reqwest::Client,
}

impl WalletServiceClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Posts the request as plain JSON-RPC and returns its result.
    pub async fn send(&self, url: Url, id: MessageId, request: &ChainRequest) -> Result<Value, RouterError> {
        let body = serde_json::json!({
            "id": id,
            "jsonrpc": JSON_RPC_VERSION_STR,
            "method": request.method,
            "params": request.params,
        });

        debug!(%url, %id, method = %request.method, "sending request to wallet service");

        let response = self.http.post(url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RouterError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response: RpcResponse = response.json().await?;

        match response {
            RpcResponse {
                error: Some(error), ..
            } => Err(RouterError::Rpc {
                code: error.code,
                message: error.message,
            }),

            RpcResponse {
                result: Some(result),
                ..
            } => Ok(result),

            _ => Err(RouterError::InvalidResponse(
                "neither result nor error".to_owned(),
            )),
        }
    }
}
