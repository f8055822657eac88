pub use {
    client::*,
    connection::*,
    dispatcher::*,
    error::*,
    status::*,
    subscriptions::*,
    transport::*,
};
use {
    relay_rpc::domain::ProjectId,
    serde::Serialize,
    tokio_tungstenite::tungstenite::{client::IntoClientRequest, http},
};

mod client;
mod connection;
mod dispatcher;
mod error;
mod status;
mod subscriptions;
mod transport;
pub mod websocket;

#[cfg(test)]
mod test_utils;

/// The default Relay websocket address.
pub const RELAY_WEBSOCKET_ADDRESS: &str = "wss://relay.walletconnect.org";

pub type HttpRequest<T> = http::Request<T>;

/// Relay authorization method. The token itself is opaque to the client and is
/// issued by the caller.
#[derive(Debug, Clone)]
pub enum Authorization {
    /// Uses query string to pass the auth token, e.g. `?auth=<token>`.
    Query(String),

    /// Uses the `Authorization: Bearer <token>` HTTP header.
    Header(String),
}

/// Relay connection options.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// The Relay websocket address. The default address is
    /// `wss://relay.walletconnect.org`.
    pub address: String,

    /// The project ID issued for the application.
    pub project_id: ProjectId,

    /// The authorization method and auth token to use, if any.
    pub auth: Option<Authorization>,

    /// Optional origin of the request. Subject to allow-list validation.
    pub origin: Option<String>,
}

impl ConnectionOptions {
    pub fn new(project_id: impl Into<ProjectId>) -> Self {
        Self {
            address: RELAY_WEBSOCKET_ADDRESS.into(),
            project_id: project_id.into(),
            auth: None,
            origin: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_auth(mut self, auth: impl Into<Option<Authorization>>) -> Self {
        self.auth = auth.into();
        self
    }

    pub fn with_origin(mut self, origin: impl Into<Option<String>>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Builds the URL the websocket connects to.
    pub fn as_url(&self) -> Result<url::Url, RequestBuildError> {
        let auth = if let Some(Authorization::Query(auth)) = &self.auth {
            Some(auth.as_str())
        } else {
            None
        };

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct QueryParams<'a> {
            project_id: &'a ProjectId,
            #[serde(skip_serializing_if = "Option::is_none")]
            auth: Option<&'a str>,
        }

        let query = serde_qs::to_string(&QueryParams {
            project_id: &self.project_id,
            auth,
        })?;

        let mut url = url::Url::parse(&self.address)?;
        url.set_query(Some(&query));

        Ok(url)
    }

    pub(crate) fn as_request(&self) -> Result<HttpRequest<()>, RequestBuildError> {
        let mut request = self
            .as_url()?
            .as_str()
            .into_client_request()
            .map_err(RequestBuildError::Other)?;

        let headers = request.headers_mut();

        if let Some(Authorization::Header(token)) = &self.auth {
            let value = format!("Bearer {token}")
                .parse()
                .map_err(|_| RequestBuildError::Headers)?;

            headers.append("Authorization", value);
        }

        if let Some(origin) = &self.origin {
            let value = origin.parse().map_err(|_| RequestBuildError::Headers)?;

            headers.append("Origin", value);
        }

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_url() -> anyhow::Result<()> {
        let opts = ConnectionOptions::new("1979a8326eb123238e633655924f0a78")
            .with_address("wss://relay.example.com")
            .with_auth(Authorization::Query("token".to_owned()));

        assert_eq!(
            opts.as_url()?.as_str(),
            "wss://relay.example.com/?projectId=1979a8326eb123238e633655924f0a78&auth=token"
        );

        Ok(())
    }

    #[test]
    fn header_authorization() -> anyhow::Result<()> {
        let opts = ConnectionOptions::new("1979a8326eb123238e633655924f0a78")
            .with_auth(Authorization::Header("token".to_owned()))
            .with_origin("https://app.example.com".to_owned());

        let request = opts.as_request()?;
        let headers = request.headers();

        assert_eq!(
            headers.get("Authorization").and_then(|value| value.to_str().ok()),
            Some("Bearer token")
        );
        assert_eq!(
            headers.get("Origin").and_then(|value| value.to_str().ok()),
            Some("https://app.example.com")
        );
        assert!(!request.uri().to_string().contains("auth="));

        Ok(())
    }
}
