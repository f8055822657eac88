use {
    super::*,
    crate::{
        auth::{Header, Recap, Signature, CAIP122_TYPE},
        link_mode::LinkModeError,
        rpc::{Metadata, ProposeNamespace, Redirect, SettleNamespace, METHOD_SESSION_AUTHENTICATE},
        test_utils::{RecordingLinks, RelayHub},
        types::{now, TransportType},
        verify::Validation,
    },
    serde_json::json,
    std::{collections::HashSet, time::Duration},
    wiremock::{
        matchers::{body_partial_json, method, path},
        Mock,
        MockServer,
        ResponseTemplate,
    },
};

const ACCOUNT: &str = "eip155:1:0x1456225dE90927193F7A171E64a600416f96f2C8";
const DAPP_LINK: &str = "https://dapp.example.com/wc";
const WALLET_LINK: &str = "https://wallet.example.com/wc";

fn metadata(name: &str, link: Option<&str>) -> Metadata {
    Metadata {
        name: name.to_owned(),
        url: format!("https://{name}.example.com"),
        redirect: link.map(|link| Redirect {
            universal: Some(link.to_owned()),
            link_mode: true,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn required() -> ProposeNamespaces {
    ProposeNamespaces::from_iter([("eip155".to_owned(), ProposeNamespace {
        chains: Some(vec!["eip155:1".to_owned()]),
        methods: ["personal_sign", "eth_sendTransaction"]
            .map(str::to_owned)
            .into_iter()
            .collect(),
        events: ["chainChanged".to_owned()].into_iter().collect(),
    })])
}

fn granted(extra_methods: &[&str]) -> SettleNamespaces {
    let methods = ["personal_sign", "eth_sendTransaction"]
        .iter()
        .chain(extra_methods)
        .map(|method| (*method).to_owned())
        .collect();

    SettleNamespaces::from_iter([("eip155".to_owned(), SettleNamespace {
        chains: Some(vec!["eip155:1".to_owned()]),
        accounts: vec![ACCOUNT.to_owned()],
        methods,
        events: ["chainChanged".to_owned()].into_iter().collect(),
    })])
}

fn personal_sign() -> ChainRequest {
    ChainRequest {
        method: "personal_sign".to_owned(),
        params: json!(["0xdeadbeef", "0x1456225dE90927193F7A171E64a600416f96f2C8"]),
        expiry_timestamp: None,
    }
}

fn auth_payload() -> anyhow::Result<AuthPayload> {
    Ok(AuthPayload {
        kind: CAIP122_TYPE.to_owned(),
        chains: vec!["eip155:1".to_owned()],
        domain: "dapp.example.com".to_owned(),
        aud: "https://dapp.example.com/login".to_owned(),
        nonce: "32891756".to_owned(),
        version: "1".to_owned(),
        iat: "2024-05-01T10:00:00Z".to_owned(),
        exp: None,
        nbf: None,
        statement: Some("Sign in to the dapp".to_owned()),
        request_id: None,
        resources: Some(vec![Recap::for_methods("eip155", ["personal_sign"]).encode()?]),
    })
}

fn signed(payload: &AuthPayload) -> Cacao {
    Cacao {
        h: Header::caip122(),
        p: payload.cacao_payload(ACCOUNT),
        s: Signature {
            t: "eip191".to_owned(),
            s: "0xdeadbeef".to_owned(),
            m: None,
        },
    }
}

struct Peer {
    client: SignClient,
    events: UnboundedReceiver<SignEvent>,
}

impl Peer {
    fn new(hub: &Arc<RelayHub>, name: &str) -> Self {
        Self::with_builder(
            hub,
            SignClient::builder().with_config(SignConfig::default().with_metadata(metadata(name, None))),
        )
    }

    fn with_builder(hub: &Arc<RelayHub>, builder: SignClientBuilder) -> Self {
        let client = builder.build(hub.client());
        let events = client.events();
        Self { client, events }
    }

    /// Skips events until `pick` accepts one.
    async fn wait_for<T>(&mut self, mut pick: impl FnMut(SignEvent) -> Option<T>) -> anyhow::Result<T> {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), self.events.recv())
                .await?
                .ok_or_else(|| anyhow::anyhow!("event stream closed"))?;

            if let Some(found) = pick(event) {
                return Ok(found);
            }
        }
    }
}

fn settled(event: SignEvent) -> Option<Session> {
    match event {
        SignEvent::SessionSettled(session) => Some(session),
        _ => None,
    }
}

fn proposal_received(event: SignEvent) -> Option<Proposal> {
    match event {
        SignEvent::ProposalReceived { proposal, .. } => Some(proposal),
        _ => None,
    }
}

fn session_response(event: SignEvent) -> Option<(MessageId, Result<Value, ErrorParams>)> {
    match event {
        SignEvent::SessionResponse { id, result, .. } => Some((id, result)),
        _ => None,
    }
}

/// Runs a proposal through to an acknowledged session. Returns the wallet's
/// copy.
async fn settle(
    dapp: &mut Peer,
    wallet: &mut Peer,
    namespaces: SettleNamespaces,
    scoped_properties: Option<ScopedProperties>,
) -> anyhow::Result<Session> {
    let connect = dapp
        .client
        .connect(ConnectParams {
            required_namespaces: required(),
            ..Default::default()
        })
        .await?;

    let uri = connect.uri.ok_or_else(|| anyhow::anyhow!("missing uri"))?;
    wallet.client.pair(&uri.to_string()).await?;

    let proposal = wallet.wait_for(proposal_received).await?;
    assert_eq!(proposal.id, connect.id);
    assert_eq!(proposal.pairing_topic, connect.pairing_topic);

    let context = wallet
        .client
        .get_verify_context(proposal.id)?
        .ok_or_else(|| anyhow::anyhow!("missing verify context"))?;
    assert_eq!(context.validation, Validation::Unknown);

    let approved = wallet
        .client
        .approve(ApproveParams {
            proposer_public_key: proposal.proposer_public_key().to_owned(),
            namespaces,
            scoped_properties,
            ..Default::default()
        })
        .await?;

    assert!(!approved.acknowledged);
    assert!(wallet.client.get_verify_context(proposal.id)?.is_none());

    let dapp_session = dapp.wait_for(settled).await?;
    let wallet_session = wallet.wait_for(settled).await?;

    assert_eq!(dapp_session.topic, approved.topic);
    assert!(dapp_session.acknowledged);
    assert!(wallet_session.acknowledged);
    assert!(wallet_session.is_controller());
    assert!(!dapp_session.is_controller());

    Ok(wallet_session)
}

#[tokio::test(start_paused = true)]
async fn proposal_settles_on_both_sides() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let mut dapp = Peer::new(&hub, "dapp");
    let mut wallet = Peer::new(&hub, "wallet");

    let session = settle(&mut dapp, &mut wallet, granted(&[]), None).await?;

    let dapp_session = dapp
        .client
        .get_session(&session.topic)?
        .ok_or_else(|| anyhow::anyhow!("dapp lost the session"))?;

    assert_eq!(dapp_session.namespaces, session.namespaces);
    assert_eq!(dapp_session.peer_participant.metadata.name, "wallet");
    assert_eq!(session.peer_participant.metadata.name, "dapp");

    assert!(dapp.client.get_pending_proposals()?.is_empty());
    assert!(wallet.client.get_pending_proposals()?.is_empty());

    let pairings = wallet.client.get_pairings()?;
    assert_eq!(pairings.len(), 1);
    assert!(pairings.iter().all(|pairing| pairing.active));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rejected_proposal_reaches_dapp() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let mut dapp = Peer::new(&hub, "dapp");
    let mut wallet = Peer::new(&hub, "wallet");

    let connect = dapp
        .client
        .connect(ConnectParams {
            required_namespaces: required(),
            ..Default::default()
        })
        .await?;

    let uri = connect.uri.ok_or_else(|| anyhow::anyhow!("missing uri"))?;
    wallet.client.pair(&uri.to_string()).await?;

    let proposal = wallet.wait_for(proposal_received).await?;
    assert!(wallet.client.get_verify_context(proposal.id)?.is_some());

    wallet
        .client
        .reject(proposal.proposer_public_key(), Reason::UnsupportedChains)
        .await?;

    assert!(wallet.client.get_verify_context(proposal.id)?.is_none());

    let (proposal_id, reason) = dapp
        .wait_for(|event| match event {
            SignEvent::SessionRejected {
                proposal_id,
                reason,
            } => Some((proposal_id, reason)),
            _ => None,
        })
        .await?;

    assert_eq!(proposal_id, connect.id);
    assert_eq!(reason.code, Some(5100));
    assert!(dapp.client.get_sessions()?.is_empty());
    assert!(dapp.client.get_pending_proposals()?.is_empty());

    let again = wallet
        .client
        .reject(proposal.proposer_public_key(), Reason::UserRejected)
        .await;
    assert!(matches!(again, Err(SignError::ProposalNotFound(_))));
    assert!(wallet.client.get_verify_context(proposal.id)?.is_none());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn approval_must_satisfy_required_namespaces() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let mut dapp = Peer::new(&hub, "dapp");
    let mut wallet = Peer::new(&hub, "wallet");

    let connect = dapp
        .client
        .connect(ConnectParams {
            required_namespaces: required(),
            ..Default::default()
        })
        .await?;

    let uri = connect.uri.ok_or_else(|| anyhow::anyhow!("missing uri"))?;
    wallet.client.pair(&uri.to_string()).await?;
    let proposal = wallet.wait_for(proposal_received).await?;

    let mut namespaces = granted(&[]);
    if let Some(namespace) = namespaces.get_mut("eip155") {
        namespace.methods.shift_remove("eth_sendTransaction");
    }

    let result = wallet
        .client
        .approve(ApproveParams {
            proposer_public_key: proposal.proposer_public_key().to_owned(),
            namespaces,
            ..Default::default()
        })
        .await;

    assert!(matches!(result, Err(SignError::Namespace(_))));

    // A failed validation leaves the proposal answerable.
    assert_eq!(wallet.client.get_pending_proposals()?.len(), 1);

    Ok(())
}

/// Subscriptions, symmetric keys and key pair count held by a client.
type Footprint = (HashSet<Topic>, HashSet<Topic>, usize);

fn footprint(peer: &Peer, kms: &LocalKms) -> Footprint {
    (
        peer.client.relay().subscriptions().topics().into_iter().collect(),
        kms.sym_key_topics().into_iter().collect(),
        kms.key_pair_count(),
    )
}

fn with_kms(hub: &Arc<RelayHub>, name: &str) -> (Peer, Arc<LocalKms>) {
    let kms = Arc::new(LocalKms::new());
    let peer = Peer::with_builder(
        hub,
        SignClient::builder()
            .with_config(SignConfig::default().with_metadata(metadata(name, None)))
            .with_kms(kms.clone()),
    );

    (peer, kms)
}

#[tokio::test(start_paused = true)]
async fn failed_approval_leaves_no_session_behind() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let dapp = Peer::new(&hub, "dapp");
    let (mut wallet, kms) = with_kms(&hub, "wallet");

    let connect = dapp
        .client
        .connect(ConnectParams {
            required_namespaces: required(),
            ..Default::default()
        })
        .await?;

    let uri = connect.uri.ok_or_else(|| anyhow::anyhow!("missing uri"))?;
    wallet.client.pair(&uri.to_string()).await?;
    let proposal = wallet.wait_for(proposal_received).await?;

    // Without the pairing key the answer to the proposal cannot be sealed.
    wallet.client.disconnect(&proposal.pairing_topic).await?;
    let before = footprint(&wallet, &kms);

    let result = wallet
        .client
        .approve(ApproveParams {
            proposer_public_key: proposal.proposer_public_key().to_owned(),
            namespaces: granted(&[]),
            ..Default::default()
        })
        .await;

    assert!(matches!(result, Err(SignError::Kms(_))));
    assert_eq!(footprint(&wallet, &kms), before);
    assert!(wallet.client.get_sessions()?.is_empty());

    // The proposal can still be answered.
    assert_eq!(wallet.client.get_pending_proposals()?.len(), 1);
    assert!(wallet.client.get_verify_context(proposal.id)?.is_some());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_pairing_is_rolled_back() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let dapp = Peer::new(&hub, "dapp");
    let (mut wallet, kms) = with_kms(&hub, "wallet");

    let connect = dapp
        .client
        .connect(ConnectParams {
            required_namespaces: required(),
            ..Default::default()
        })
        .await?;

    let uri = connect.uri.ok_or_else(|| anyhow::anyhow!("missing uri"))?;

    hub.reject_subscriptions(true);
    let result = wallet.client.pair(&uri.to_string()).await;

    assert!(matches!(result, Err(SignError::Client(_))));
    assert!(wallet.client.get_pairings()?.is_empty());
    assert_eq!(footprint(&wallet, &kms), Footprint::default());

    hub.reject_subscriptions(false);
    wallet.client.pair(&uri.to_string()).await?;

    let proposal = wallet.wait_for(proposal_received).await?;
    assert_eq!(proposal.id, connect.id);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_authenticate_approval_is_rolled_back() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let mut dapp = Peer::new(&hub, "dapp");
    let (mut wallet, kms) = with_kms(&hub, "wallet");

    let response = dapp
        .client
        .authenticate(AuthenticateParams {
            payload: auth_payload()?,
            pairing_topic: None,
            wallet_link: None,
        })
        .await?;

    let uri = response.uri.ok_or_else(|| anyhow::anyhow!("missing uri"))?;
    wallet.client.pair(&uri.to_string()).await?;

    let request = wallet
        .wait_for(|event| match event {
            SignEvent::SessionAuthenticateRequest { request } => Some(request),
            _ => None,
        })
        .await?;

    hub.reject_subscriptions(true);
    let before = footprint(&wallet, &kms);

    let result = wallet
        .client
        .approve_session_authenticate(request.id, vec![signed(&request.payload)])
        .await;

    assert!(matches!(result, Err(SignError::Client(_))));
    assert_eq!(footprint(&wallet, &kms), before);
    assert!(wallet.client.get_sessions()?.is_empty());
    assert_eq!(wallet.client.get_pending_authenticate_requests()?.len(), 1);

    hub.reject_subscriptions(false);

    let session = wallet
        .client
        .approve_session_authenticate(request.id, vec![signed(&request.payload)])
        .await?;

    let dapp_session = dapp
        .wait_for(|event| match event {
            SignEvent::SessionAuthenticated { session, .. } => Some(session),
            _ => None,
        })
        .await?;

    assert_eq!(dapp_session.topic, session.topic);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rejected_settle_deletes_controller_session() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let dapp = Peer::new(&hub, "dapp");
    let (mut wallet, kms) = with_kms(&hub, "wallet");

    let connect = dapp
        .client
        .connect(ConnectParams {
            required_namespaces: required(),
            ..Default::default()
        })
        .await?;

    let uri = connect.uri.ok_or_else(|| anyhow::anyhow!("missing uri"))?;
    wallet.client.pair(&uri.to_string()).await?;
    let proposal = wallet.wait_for(proposal_received).await?;

    // The wallet's copy asks for nothing, so it approves namespaces the dapp
    // refuses when the settle arrives.
    wallet
        .client
        .inner
        .proposals
        .update(proposal.proposer_public_key(), |proposal| {
            proposal.request.required_namespaces = ProposeNamespaces::default();
        })?;

    let mut namespaces = granted(&[]);
    if let Some(namespace) = namespaces.get_mut("eip155") {
        namespace.methods.shift_remove("eth_sendTransaction");
    }

    let before = footprint(&wallet, &kms);

    let approved = wallet
        .client
        .approve(ApproveParams {
            proposer_public_key: proposal.proposer_public_key().to_owned(),
            namespaces,
            ..Default::default()
        })
        .await?;

    let (topic, reason) = wallet
        .wait_for(|event| match event {
            SignEvent::SessionDeleted { topic, reason } => Some((topic, reason)),
            _ => None,
        })
        .await?;

    assert_eq!(topic, approved.topic);
    assert_eq!(reason.code, Some(Reason::SessionSettlementFailed.code()));

    assert!(wallet.client.get_sessions()?.is_empty());
    assert!(kms.sym_key(&topic).is_none());
    assert!(!wallet.client.relay().subscriptions().is_subscribed(&topic));
    assert_eq!(footprint(&wallet, &kms), before);

    assert!(dapp.client.get_sessions()?.is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn update_emit_and_delete() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let mut dapp = Peer::new(&hub, "dapp");
    let mut wallet = Peer::new(&hub, "wallet");

    let topic = settle(&mut dapp, &mut wallet, granted(&[]), None)
        .await?
        .topic;

    wallet
        .client
        .update(&topic, granted(&["eth_signTypedData_v4"]))
        .await?;

    let namespaces = dapp
        .wait_for(|event| match event {
            SignEvent::SessionUpdated { namespaces, .. } => Some(namespaces),
            _ => None,
        })
        .await?;

    assert!(namespaces
        .get("eip155")
        .is_some_and(|namespace| namespace.methods.contains("eth_signTypedData_v4")));

    let result = dapp.client.update(&topic, granted(&[])).await;
    assert!(matches!(result, Err(SignError::Unauthorized)));

    let result = dapp.client.extend(&topic).await;
    assert!(matches!(result, Err(SignError::Unauthorized)));

    let expiry = wallet.client.extend(&topic).await?;
    let extended = dapp
        .wait_for(|event| match event {
            SignEvent::SessionExtended { expiry, .. } => Some(expiry),
            _ => None,
        })
        .await?;
    assert_eq!(extended, expiry);

    wallet
        .client
        .emit(&topic, "eip155:1", Event {
            name: "chainChanged".to_owned(),
            data: json!("0x1"),
        })
        .await?;

    let (chain_id, event) = dapp
        .wait_for(|event| match event {
            SignEvent::SessionEvent {
                chain_id, event, ..
            } => Some((chain_id, event)),
            _ => None,
        })
        .await?;

    assert_eq!(chain_id, "eip155:1");
    assert_eq!(event.name, "chainChanged");

    let result = wallet
        .client
        .emit(&topic, "eip155:1", Event {
            name: "accountsChanged".to_owned(),
            data: json!([]),
        })
        .await;
    assert!(matches!(result, Err(SignError::UnauthorizedEvent(_))));

    let result = wallet
        .client
        .emit(&topic, "eip155:5", Event {
            name: "chainChanged".to_owned(),
            data: json!("0x5"),
        })
        .await;
    assert!(matches!(result, Err(SignError::UnauthorizedChain(_))));

    dapp.client.disconnect(&topic).await?;

    let reason = wallet
        .wait_for(|event| match event {
            SignEvent::SessionDeleted { reason, .. } => Some(reason),
            _ => None,
        })
        .await?;

    assert_eq!(reason.code, Some(6000));
    assert!(dapp.client.get_sessions()?.is_empty());
    assert!(wallet.client.get_sessions()?.is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn request_and_respond() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let mut dapp = Peer::new(&hub, "dapp");
    let mut wallet = Peer::new(&hub, "wallet");

    let topic = settle(&mut dapp, &mut wallet, granted(&[]), None)
        .await?
        .topic;

    let id = dapp
        .client
        .request(&topic, "eip155:1", personal_sign())
        .await?;

    let request = wallet
        .wait_for(|event| match event {
            SignEvent::SessionRequest { request, .. } => Some(request),
            _ => None,
        })
        .await?;

    assert_eq!(request.id, id);
    assert_eq!(request.chain_id, "eip155:1");
    assert_eq!(request.request.method, "personal_sign");
    assert_eq!(wallet.client.get_pending_requests()?.len(), 1);

    wallet
        .client
        .respond(&topic, id, Ok(json!("0xsignature")))
        .await?;

    let (response_id, result) = dapp.wait_for(session_response).await?;
    assert_eq!(response_id, id);
    assert_eq!(result, Ok(json!("0xsignature")));

    assert!(wallet.client.get_pending_requests()?.is_empty());
    let again = wallet.client.respond(&topic, id, Ok(json!(null))).await;
    assert!(matches!(again, Err(SignError::RequestNotFound(_))));

    let mut unknown = personal_sign();
    unknown.method = "eth_sign".to_owned();
    let result = dapp.client.request(&topic, "eip155:1", unknown).await;
    assert!(matches!(result, Err(SignError::UnauthorizedMethod(_))));

    let mut expired = personal_sign();
    expired.expiry_timestamp = Some(now().saturating_sub(1));
    let result = dapp.client.request(&topic, "eip155:1", expired).await;
    assert!(matches!(result, Err(SignError::InvalidExpiry(_))));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rejected_request_carries_the_error() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let mut dapp = Peer::new(&hub, "dapp");
    let mut wallet = Peer::new(&hub, "wallet");

    let topic = settle(&mut dapp, &mut wallet, granted(&[]), None)
        .await?
        .topic;

    let id = dapp
        .client
        .request(&topic, "eip155:1", personal_sign())
        .await?;

    wallet
        .wait_for(|event| match event {
            SignEvent::SessionRequest { .. } => Some(()),
            _ => None,
        })
        .await?;

    wallet
        .client
        .respond(&topic, id, Err(Reason::UserRejected.into()))
        .await?;

    let (_, result) = dapp.wait_for(session_response).await?;
    assert_eq!(result.map_err(|err| err.code), Err(Some(5000)));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn ping_sessions_and_pairings() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let mut dapp = Peer::new(&hub, "dapp");
    let mut wallet = Peer::new(&hub, "wallet");

    let session = settle(&mut dapp, &mut wallet, granted(&[]), None).await?;

    dapp.client.ping(&session.topic).await?;
    wallet.client.ping(&session.topic).await?;
    dapp.client.ping(&session.pairing_topic).await?;

    let result = dapp.client.ping(&Topic::generate()).await;
    assert!(matches!(result, Err(SignError::NoMatchingTopic(_))));

    let tags = hub
        .published()
        .iter()
        .map(|publish| publish.tag)
        .collect::<Vec<_>>();

    assert!(tags.contains(&1114));
    assert!(tags.contains(&1115));
    assert!(tags.contains(&1002));
    assert!(tags.contains(&1003));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn ping_times_out_without_peer() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let dapp = Peer::with_builder(
        &hub,
        SignClient::builder().with_config(SignConfig::default().with_ping_timeout(Duration::from_secs(2))),
    );

    let connect = dapp.client.connect(ConnectParams::default()).await?;
    let result = dapp.client.ping(&connect.pairing_topic).await;

    assert!(matches!(result, Err(SignError::Timeout)));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn expired_records_are_swept() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let config = SignConfig::default()
        .with_pairing_ttls(Duration::ZERO, Duration::ZERO)
        .with_proposal_ttl(Duration::ZERO)
        .with_expiry_check_interval(Duration::from_secs(1));

    let mut dapp = Peer::with_builder(&hub, SignClient::builder().with_config(config));

    let connect = dapp.client.connect(ConnectParams::default()).await?;

    // Nothing is swept before the first period elapses.
    assert_eq!(dapp.client.get_pairings()?.len(), 1);
    assert_eq!(dapp.client.get_pending_proposals()?.len(), 1);

    let topic = dapp
        .wait_for(|event| match event {
            SignEvent::PairingExpired { topic } => Some(topic),
            _ => None,
        })
        .await?;
    assert_eq!(topic, connect.pairing_topic);
    assert!(!dapp.client.relay().subscriptions().is_subscribed(&topic));
    assert!(dapp.client.inner.kms.sym_key(&topic).is_none());

    let proposal = dapp
        .wait_for(|event| match event {
            SignEvent::ProposalExpired { proposal } => Some(proposal),
            _ => None,
        })
        .await?;
    assert_eq!(proposal.id, connect.id);

    assert!(dapp.client.get_pairings()?.is_empty());
    assert!(dapp.client.get_pending_proposals()?.is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn authenticate_creates_session() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let mut dapp = Peer::new(&hub, "dapp");
    let mut wallet = Peer::new(&hub, "wallet");

    let response = dapp
        .client
        .authenticate(AuthenticateParams {
            payload: auth_payload()?,
            pairing_topic: None,
            wallet_link: None,
        })
        .await?;

    let uri = response.uri.ok_or_else(|| anyhow::anyhow!("missing uri"))?;
    assert!(uri.supports(METHOD_SESSION_AUTHENTICATE));

    wallet.client.pair(&uri.to_string()).await?;

    let request = wallet
        .wait_for(|event| match event {
            SignEvent::SessionAuthenticateRequest { request } => Some(request),
            _ => None,
        })
        .await?;

    assert_eq!(request.id, response.id);
    assert_eq!(request.requester.metadata.name, "dapp");

    let session = wallet
        .client
        .approve_session_authenticate(request.id, vec![signed(&request.payload)])
        .await?;

    let (dapp_session, cacaos) = dapp
        .wait_for(|event| match event {
            SignEvent::SessionAuthenticated { session, cacaos } => Some((session, cacaos)),
            _ => None,
        })
        .await?;

    assert_eq!(dapp_session.topic, session.topic);
    assert_eq!(cacaos.len(), 1);
    assert!(dapp_session.acknowledged);

    let namespace = dapp_session
        .namespaces
        .get("eip155")
        .ok_or_else(|| anyhow::anyhow!("missing eip155"))?;

    assert_eq!(namespace.accounts, vec![ACCOUNT.to_owned()]);
    assert!(namespace.methods.contains("personal_sign"));
    assert!(namespace.events.contains("accountsChanged"));

    assert!(wallet.client.get_pending_authenticate_requests()?.is_empty());

    dapp.client.ping(&session.topic).await?;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn authenticate_rejection_reaches_dapp() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let mut dapp = Peer::new(&hub, "dapp");
    let mut wallet = Peer::new(&hub, "wallet");

    let response = dapp
        .client
        .authenticate(AuthenticateParams {
            payload: auth_payload()?,
            pairing_topic: None,
            wallet_link: None,
        })
        .await?;

    let uri = response.uri.ok_or_else(|| anyhow::anyhow!("missing uri"))?;
    wallet.client.pair(&uri.to_string()).await?;

    let request = wallet
        .wait_for(|event| match event {
            SignEvent::SessionAuthenticateRequest { request } => Some(request),
            _ => None,
        })
        .await?;

    wallet
        .client
        .reject_session_authenticate(request.id, Reason::UserRejected)
        .await?;

    let (id, reason) = dapp
        .wait_for(|event| match event {
            SignEvent::AuthenticateRejected { id, reason } => Some((id, reason)),
            _ => None,
        })
        .await?;

    assert_eq!(id, response.id);
    assert_eq!(reason.code, Some(5000));
    assert!(hub.published().iter().any(|publish| publish.tag == 1118));
    assert!(dapp.client.get_sessions()?.is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn authenticate_falls_back_when_unsupported() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let mut dapp = Peer::new(&hub, "dapp");
    let mut wallet = Peer::with_builder(
        &hub,
        SignClient::builder().with_config(
            SignConfig::default()
                .with_metadata(metadata("wallet", None))
                .with_authenticate(false),
        ),
    );

    let response = dapp
        .client
        .authenticate(AuthenticateParams {
            payload: auth_payload()?,
            pairing_topic: None,
            wallet_link: None,
        })
        .await?;

    let uri = response.uri.ok_or_else(|| anyhow::anyhow!("missing uri"))?;
    wallet.client.pair(&uri.to_string()).await?;

    let proposal = wallet.wait_for(proposal_received).await?;

    assert_eq!(proposal.pairing_topic, response.pairing_topic);
    assert!(proposal.request.required_namespaces.is_empty());

    let namespace = proposal
        .request
        .optional_namespaces
        .get("eip155")
        .ok_or_else(|| anyhow::anyhow!("missing eip155"))?;

    assert_eq!(namespace.chains, Some(vec!["eip155:1".to_owned()]));
    assert!(namespace.methods.contains("personal_sign"));

    assert!(hub.published().iter().any(|publish| publish.tag == 1119));

    // The fallback proposal settles like any other.
    wallet
        .client
        .approve(ApproveParams {
            proposer_public_key: proposal.proposer_public_key().to_owned(),
            namespaces: granted(&[]),
            ..Default::default()
        })
        .await?;

    dapp.wait_for(settled).await?;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn authenticate_falls_back_after_window() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let dapp = Peer::new(&hub, "dapp");

    dapp.client
        .authenticate(AuthenticateParams {
            payload: auth_payload()?,
            pairing_topic: None,
            wallet_link: None,
        })
        .await?;

    assert!(dapp.client.get_pending_proposals()?.is_empty());

    tokio::time::sleep(dapp.client.config().authenticate_fallback_window + Duration::from_secs(1)).await;

    let proposals = dapp.client.get_pending_proposals()?;
    assert_eq!(proposals.len(), 1);
    assert!(proposals
        .iter()
        .all(|proposal| proposal.request.optional_namespaces.contains_key("eip155")));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn link_mode_round_trip() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let dapp_links = Arc::new(RecordingLinks::default());
    let wallet_links = Arc::new(RecordingLinks::default());

    let mut dapp = Peer::with_builder(
        &hub,
        SignClient::builder()
            .with_config(
                SignConfig::default()
                    .with_metadata(metadata("dapp", Some(DAPP_LINK)))
                    .with_link_mode(true),
            )
            .with_link_transport(dapp_links.clone()),
    );

    let mut wallet = Peer::with_builder(
        &hub,
        SignClient::builder()
            .with_config(
                SignConfig::default()
                    .with_metadata(metadata("wallet", Some(WALLET_LINK)))
                    .with_link_mode(true),
            )
            .with_link_transport(wallet_links.clone()),
    );

    let topic = settle(&mut dapp, &mut wallet, granted(&[]), None)
        .await?
        .topic;

    let upgraded = dapp.client.upgrade_to_link_mode(&topic)?;
    assert_eq!(upgraded.transport_type, TransportType::LinkMode);

    let published = hub.published().len();

    let id = dapp
        .client
        .request(&topic, "eip155:1", personal_sign())
        .await?;

    let urls = dapp_links.take();
    let url = urls.first().ok_or_else(|| anyhow::anyhow!("no envelope link"))?;
    assert!(url.as_str().starts_with(WALLET_LINK));

    wallet.client.dispatch_envelope(url.as_str())?;

    let request = wallet
        .wait_for(|event| match event {
            SignEvent::SessionRequest { request, .. } => Some(request),
            _ => None,
        })
        .await?;

    assert_eq!(request.id, id);
    assert_eq!(
        wallet.client.get_session(&topic)?.map(|session| session.transport_type),
        Some(TransportType::LinkMode)
    );

    wallet
        .client
        .respond(&topic, id, Ok(json!("0xsignature")))
        .await?;

    let urls = wallet_links.take();
    let url = urls.first().ok_or_else(|| anyhow::anyhow!("no envelope link"))?;
    assert!(url.as_str().starts_with(DAPP_LINK));

    dapp.client.dispatch_envelope(url.as_str())?;

    let (response_id, result) = dapp.wait_for(session_response).await?;
    assert_eq!(response_id, id);
    assert_eq!(result, Ok(json!("0xsignature")));

    assert_eq!(hub.published().len(), published);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn envelope_from_peer_without_link_is_answered_over_relay() -> anyhow::Result<()> {
    let hub = RelayHub::new();
    let dapp_links = Arc::new(RecordingLinks::default());
    let wallet_links = Arc::new(RecordingLinks::default());

    // The dapp sends envelopes but advertises no universal link of its own.
    let mut dapp = Peer::with_builder(
        &hub,
        SignClient::builder()
            .with_config(
                SignConfig::default()
                    .with_metadata(metadata("dapp", None))
                    .with_link_mode(true),
            )
            .with_link_transport(dapp_links.clone()),
    );

    let mut wallet = Peer::with_builder(
        &hub,
        SignClient::builder()
            .with_config(
                SignConfig::default()
                    .with_metadata(metadata("wallet", Some(WALLET_LINK)))
                    .with_link_mode(true),
            )
            .with_link_transport(wallet_links.clone()),
    );

    let topic = settle(&mut dapp, &mut wallet, granted(&[]), None)
        .await?
        .topic;

    dapp.client.upgrade_to_link_mode(&topic)?;

    let id = dapp
        .client
        .request(&topic, "eip155:1", personal_sign())
        .await?;

    let urls = dapp_links.take();
    let url = urls.first().ok_or_else(|| anyhow::anyhow!("no envelope link"))?;
    wallet.client.dispatch_envelope(url.as_str())?;

    let request = wallet
        .wait_for(|event| match event {
            SignEvent::SessionRequest { request, .. } => Some(request),
            _ => None,
        })
        .await?;

    assert_eq!(request.id, id);
    assert_eq!(
        wallet.client.get_session(&topic)?.map(|session| session.transport_type),
        Some(TransportType::Relay)
    );

    let published = hub.published().len();

    wallet
        .client
        .respond(&topic, id, Ok(json!("0xsignature")))
        .await?;

    assert!(wallet_links.take().is_empty());
    assert_eq!(hub.published().len(), published + 1);

    let (response_id, result) = dapp.wait_for(session_response).await?;
    assert_eq!(response_id, id);
    assert_eq!(result, Ok(json!("0xsignature")));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn link_mode_preconditions() -> anyhow::Result<()> {
    let hub = RelayHub::new();

    let mut dapp = Peer::with_builder(
        &hub,
        SignClient::builder()
            .with_config(
                SignConfig::default()
                    .with_metadata(metadata("dapp", Some(DAPP_LINK)))
                    .with_link_mode(true),
            )
            .with_link_transport(Arc::new(RecordingLinks::default())),
    );
    let mut wallet = Peer::new(&hub, "wallet");

    let topic = settle(&mut dapp, &mut wallet, granted(&[]), None)
        .await?
        .topic;

    let result = dapp.client.upgrade_to_link_mode(&topic);
    assert!(matches!(
        result,
        Err(SignError::LinkMode(LinkModeError::NoUniversalLink))
    ));

    let result = wallet.client.upgrade_to_link_mode(&topic);
    assert!(matches!(result, Err(SignError::LinkMode(LinkModeError::Disabled))));

    let result = dapp
        .client
        .authenticate(AuthenticateParams {
            payload: auth_payload()?,
            pairing_topic: None,
            wallet_link: Some("https://unknown.example.com/wc".to_owned()),
        })
        .await;
    assert!(matches!(
        result,
        Err(SignError::LinkMode(LinkModeError::WalletLinkSupportNotProven(_)))
    ));

    let result = wallet.client.dispatch_envelope("https://wallet.example.com/wc?topic=abc");
    assert!(matches!(result, Err(SignError::LinkMode(LinkModeError::Disabled))));

    Ok(())
}

#[tokio::test]
async fn wallet_service_requests_skip_the_relay() -> anyhow::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({ "method": "wallet_getAssets" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "jsonrpc": "2.0",
            "result": { "0x1": [] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let scoped_properties = ScopedProperties::from([(
        "eip155".to_owned(),
        json!({
            "walletService": [{
                "url": format!("{}/rpc", server.uri()),
                "methods": ["wallet_getAssets"]
            }]
        }),
    )]);

    let hub = RelayHub::new();
    let mut dapp = Peer::new(&hub, "dapp");
    let mut wallet = Peer::new(&hub, "wallet");

    let topic = settle(
        &mut dapp,
        &mut wallet,
        granted(&["wallet_getAssets"]),
        Some(scoped_properties),
    )
    .await?
    .topic;

    let published = hub.published().len();

    let id = dapp
        .client
        .request(&topic, "eip155:1", ChainRequest {
            method: "wallet_getAssets".to_owned(),
            params: json!([{ "account": "0x1456225dE90927193F7A171E64a600416f96f2C8" }]),
            expiry_timestamp: None,
        })
        .await?;

    let (response_id, result) = dapp.wait_for(session_response).await?;
    assert_eq!(response_id, id);
    assert_eq!(result, Ok(json!({ "0x1": [] })));
    assert_eq!(hub.published().len(), published);

    Ok(())
}
