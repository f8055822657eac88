use {
    crate::{
        auth::{AuthPayload, BasicCacaoVerifier, Cacao, CacaoVerifier},
        config::SignConfig,
        crypto::{Kms, LocalKms},
        error::{Reason, SignError},
        events::{EventBus, SignEvent},
        history::RpcHistory,
        link_mode::{LinkEnvelopeTransport, ProvenLinks},
        pairing_uri::Pairing,
        router::WalletServiceClient,
        rpc::{
            ChainRequest,
            ErrorParams,
            Event,
            ProposeNamespaces,
            ScopedProperties,
            SessionProperties,
            SettleNamespaces,
        },
        storage::{KeyValueStorage, MemoryStorage, Store},
        types::{AuthRequest, PairingInfo, PendingRequest, Proposal, Session},
        verify::{NoopVerifier, VerifyContext, Verifier},
    },
    dashmap::DashMap,
    relay_rpc::domain::{MessageId, MessageIdGenerator, Topic},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    std::sync::Arc,
    tokio::sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
};

mod authenticate;
mod expiry;
mod inbound;
mod link;
mod networking;
mod pairing;
mod proposal;
mod session;

#[cfg(test)]
mod tests;

use {
    authenticate::PendingAuthenticate,
    inbound::Inbound,
    proposal::PendingSettle,
};

type PingSender = oneshot::Sender<Result<(), SignError>>;

/// What the dapp asks for in a session proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub required_namespaces: ProposeNamespaces,
    pub optional_namespaces: ProposeNamespaces,
    pub session_properties: Option<SessionProperties>,
    pub scoped_properties: Option<ScopedProperties>,
    /// Reuse an existing pairing instead of creating a new URI.
    pub pairing_topic: Option<Topic>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Pairing URI to hand to the wallet. `None` when an existing pairing was
    /// used.
    pub uri: Option<Pairing>,
    /// Id of the proposal or authenticate request.
    pub id: MessageId,
    pub pairing_topic: Topic,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApproveParams {
    pub proposer_public_key: String,
    pub namespaces: SettleNamespaces,
    pub session_properties: Option<SessionProperties>,
    pub scoped_properties: Option<ScopedProperties>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateParams {
    pub payload: AuthPayload,
    pub pairing_topic: Option<Topic>,
    /// Universal link of a wallet with proven link mode support. Requires
    /// `pairing_topic`.
    pub wallet_link: Option<String>,
}

pub struct SignClientBuilder {
    config: SignConfig,
    storage: Arc<dyn KeyValueStorage>,
    kms: Arc<dyn Kms>,
    verifier: Arc<dyn Verifier>,
    cacao_verifier: Arc<dyn CacaoVerifier>,
    link_transport: Option<Arc<dyn LinkEnvelopeTransport>>,
    http: reqwest::Client,
}

impl Default for SignClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SignClientBuilder {
    pub fn new() -> Self {
        Self {
            config: SignConfig::default(),
            storage: Arc::new(MemoryStorage::new()),
            kms: Arc::new(LocalKms::new()),
            verifier: Arc::new(NoopVerifier),
            cacao_verifier: Arc::new(BasicCacaoVerifier),
            link_transport: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_config(mut self, config: SignConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_kms(mut self, kms: Arc<dyn Kms>) -> Self {
        self.kms = kms;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_cacao_verifier(mut self, verifier: Arc<dyn CacaoVerifier>) -> Self {
        self.cacao_verifier = verifier;
        self
    }

    pub fn with_link_transport(mut self, transport: Arc<dyn LinkEnvelopeTransport>) -> Self {
        self.link_transport = Some(transport);
        self
    }

    /// HTTP client used for wallet service requests.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Builds the client on top of a relay client. Must be called within a
    /// tokio runtime.
    pub fn build(self, relay: relay_client::Client) -> SignClient {
        let Self {
            config,
            storage,
            kms,
            verifier,
            cacao_verifier,
            link_transport,
            http,
        } = self;

        let relay_rx = relay.messages();
        let (inbound_tx, link_rx) = mpsc::unbounded_channel();
        let expiry_check_interval = config.expiry_check_interval;

        let inner = Arc::new(Inner {
            relay,
            config,
            kms,
            verifier,
            cacao_verifier,
            link_transport,
            wallet_services: WalletServiceClient::new(http),
            history: RpcHistory::new(storage.clone()),
            pairings: Store::new(storage.clone(), "wc@2:core:pairing"),
            proposals: Store::new(storage.clone(), "wc@2:client:proposal"),
            pending_settle: Store::new(storage.clone(), "wc@2:client:pendingSettle"),
            sessions: Store::new(storage.clone(), "wc@2:client:session"),
            requests: Store::new(storage.clone(), "wc@2:client:request"),
            auth_requests: Store::new(storage.clone(), "wc@2:auth:request"),
            auth_pending: Store::new(storage.clone(), "wc@2:auth:pending"),
            verify_contexts: Store::new(storage, "wc@2:core:verifyContext"),
            events: EventBus::default(),
            id_generator: MessageIdGenerator::new(),
            pings: DashMap::new(),
            proven_links: ProvenLinks::default(),
            inbound_tx,
        });

        tokio::spawn(inbound::inbound_loop(
            Arc::downgrade(&inner),
            relay_rx,
            link_rx,
        ));
        tokio::spawn(expiry::expiry_loop(
            Arc::downgrade(&inner),
            expiry_check_interval,
        ));

        SignClient { inner }
    }
}

struct Inner {
    relay: relay_client::Client,
    config: SignConfig,
    kms: Arc<dyn Kms>,
    verifier: Arc<dyn Verifier>,
    cacao_verifier: Arc<dyn CacaoVerifier>,
    link_transport: Option<Arc<dyn LinkEnvelopeTransport>>,
    wallet_services: WalletServiceClient,
    history: RpcHistory,
    pairings: Store<PairingInfo>,
    /// Keyed by proposer public key.
    proposals: Store<Proposal>,
    /// Proposals answered by the wallet, keyed by the derived session topic.
    pending_settle: Store<PendingSettle>,
    sessions: Store<Session>,
    /// Unanswered session requests received by the wallet, keyed by id.
    requests: Store<PendingRequest>,
    /// Authenticate requests received by the wallet, keyed by id.
    auth_requests: Store<AuthRequest>,
    /// Authenticate requests sent by the dapp, keyed by id.
    auth_pending: Store<PendingAuthenticate>,
    /// Keyed by proposal id.
    verify_contexts: Store<VerifyContext>,
    events: EventBus,
    id_generator: MessageIdGenerator,
    pings: DashMap<MessageId, PingSender>,
    proven_links: ProvenLinks,
    inbound_tx: UnboundedSender<Inbound>,
}

/// The Sign protocol client, usable as a dapp, a wallet or both.
///
/// Inbound messages from the relay and from link-mode envelopes are handled
/// one at a time in arrival order. Outcomes are reported as [`SignEvent`]s.
#[derive(Clone)]
pub struct SignClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SignClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignClient")
            .field("relay", &self.inner.relay)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl SignClient {
    pub fn builder() -> SignClientBuilder {
        SignClientBuilder::new()
    }

    pub fn relay(&self) -> &relay_client::Client {
        &self.inner.relay
    }

    pub fn config(&self) -> &SignConfig {
        &self.inner.config
    }

    /// Returns a receiver for every event produced from now on.
    pub fn events(&self) -> UnboundedReceiver<SignEvent> {
        self.inner.events.subscribe()
    }

    /// Proposes a session, creating a pairing unless
    /// [`ConnectParams::pairing_topic`] is set.
    pub async fn connect(&self, params: ConnectParams) -> Result<ConnectResponse, SignError> {
        self.inner.connect(params).await
    }

    /// Pairs with a URI received from a dapp.
    pub async fn pair(&self, uri: &str) -> Result<PairingInfo, SignError> {
        self.inner.pair(uri).await
    }

    /// Approves a received proposal and settles the session.
    pub async fn approve(&self, params: ApproveParams) -> Result<Session, SignError> {
        self.inner.approve(params).await
    }

    pub async fn reject(&self, proposer_public_key: &str, reason: Reason) -> Result<(), SignError> {
        self.inner.reject(proposer_public_key, reason).await
    }

    /// Replaces the session namespaces. Controller only.
    pub async fn update(&self, topic: &Topic, namespaces: SettleNamespaces) -> Result<(), SignError> {
        self.inner.update(topic, namespaces).await
    }

    /// Extends the session by the session TTL. Controller only. Returns the
    /// new expiry.
    pub async fn extend(&self, topic: &Topic) -> Result<u64, SignError> {
        self.inner.extend(topic).await
    }

    pub async fn emit(&self, topic: &Topic, chain_id: &str, event: Event) -> Result<(), SignError> {
        self.inner.emit(topic, chain_id, event).await
    }

    /// Sends a session request, over HTTP when a wallet service handles the
    /// method and over the session topic otherwise. The result arrives as
    /// [`SignEvent::SessionResponse`].
    pub async fn request(
        &self,
        topic: &Topic,
        chain_id: &str,
        request: ChainRequest,
    ) -> Result<MessageId, SignError> {
        self.inner.request(topic, chain_id, request).await
    }

    /// Answers a received session request.
    pub async fn respond(
        &self,
        topic: &Topic,
        id: MessageId,
        result: Result<Value, ErrorParams>,
    ) -> Result<(), SignError> {
        self.inner.respond_request(topic, id, result).await
    }

    /// Pings a session or pairing and waits for the answer.
    pub async fn ping(&self, topic: &Topic) -> Result<(), SignError> {
        self.inner.ping(topic).await
    }

    /// Deletes a session or pairing, notifying the peer.
    pub async fn disconnect(&self, topic: &Topic) -> Result<(), SignError> {
        self.inner.disconnect(topic).await
    }

    /// Requests one-step authentication. Falls back to a session proposal
    /// when the wallet does not support it.
    pub async fn authenticate(&self, params: AuthenticateParams) -> Result<ConnectResponse, SignError> {
        self.inner.authenticate(params).await
    }

    pub async fn approve_session_authenticate(
        &self,
        id: MessageId,
        cacaos: Vec<Cacao>,
    ) -> Result<Session, SignError> {
        self.inner.approve_session_authenticate(id, cacaos).await
    }

    pub async fn reject_session_authenticate(&self, id: MessageId, reason: Reason) -> Result<(), SignError> {
        self.inner.reject_session_authenticate(id, reason).await
    }

    /// Switches a relay session to link-mode on the same topic.
    pub fn upgrade_to_link_mode(&self, topic: &Topic) -> Result<Session, SignError> {
        self.inner.upgrade_to_link_mode(topic)
    }

    /// Feeds an envelope link opened by the peer into the inbound pipeline.
    pub fn dispatch_envelope(&self, url: &str) -> Result<(), SignError> {
        self.inner.dispatch_envelope(url)
    }

    pub fn get_sessions(&self) -> Result<Vec<Session>, SignError> {
        Ok(self.inner.sessions.all()?)
    }

    pub fn get_session(&self, topic: &Topic) -> Result<Option<Session>, SignError> {
        Ok(self.inner.sessions.get(&topic.to_string())?)
    }

    pub fn get_pending_proposals(&self) -> Result<Vec<Proposal>, SignError> {
        Ok(self.inner.proposals.all()?)
    }

    pub fn get_pending_requests(&self) -> Result<Vec<PendingRequest>, SignError> {
        Ok(self.inner.requests.all()?)
    }

    pub fn get_pending_authenticate_requests(&self) -> Result<Vec<AuthRequest>, SignError> {
        Ok(self.inner.auth_requests.all()?)
    }

    pub fn get_pairings(&self) -> Result<Vec<PairingInfo>, SignError> {
        Ok(self.inner.pairings.all()?)
    }

    /// The verification result stored for a pending proposal.
    pub fn get_verify_context(&self, proposal_id: MessageId) -> Result<Option<VerifyContext>, SignError> {
        Ok(self.inner.verify_contexts.get(&proposal_id.to_string())?)
    }
}
