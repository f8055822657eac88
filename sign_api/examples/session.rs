//! Minimal wallet built on the Sign client.
//!
//! Pairs with a dapp URI, approves every proposal it can satisfy with the
//! accounts below, answers authenticate requests with an unsigned CACAO and
//! rejects session requests. Useful to watch the protocol against a real
//! relay:
//!
//! ```sh
//! RUST_LOG=sign_api=debug cargo run --example session -- 'wc:...'
//! ```

use {
    anyhow::Result,
    clap::Parser,
    relay_client::{Authorization, ClientBuilder, ConnectionOptions},
    sign_api::{
        auth::{Cacao, Header, Signature},
        config::SignConfig,
        namespaces::AutoNamespaces,
        rpc::Metadata,
        ApproveParams,
        Reason,
        SignClient,
        SignEvent,
    },
    tracing::{info, warn},
    tracing_subscriber::EnvFilter,
};

const SUPPORTED_METHODS: &[&str] = &[
    "eth_sendTransaction",
    "eth_signTransaction",
    "eth_sign",
    "personal_sign",
    "eth_signTypedData",
];
const SUPPORTED_CHAINS: &[&str] = &["eip155:1", "eip155:11155111"];
const SUPPORTED_EVENTS: &[&str] = &["chainChanged", "accountsChanged"];
const SUPPORTED_ACCOUNTS: &[&str] = &[
    "eip155:1:0xBA5BA3955463ADcc7aa3E33bbdfb8A68e0933dD8",
    "eip155:11155111:0xBA5BA3955463ADcc7aa3E33bbdfb8A68e0933dD8",
];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Arg {
    /// Pairing URI shown by the dapp.
    pairing_uri: String,

    /// Specify WebSocket address.
    #[arg(short, long, default_value = relay_client::RELAY_WEBSOCKET_ADDRESS)]
    address: String,

    /// Specify WalletConnect project ID.
    #[arg(short, long, default_value = "3cbaa32f8fbf3cdcc87d27ca1fa68069")]
    project_id: String,

    /// Relay auth token, sent as a query parameter.
    #[arg(long)]
    auth: Option<String>,
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

async fn handle(client: &SignClient, event: SignEvent) -> Result<()> {
    match event {
        SignEvent::ProposalReceived { proposal, context } => {
            info!(id = %proposal.id, origin = ?context.origin, "proposal received");

            let built = AutoNamespaces::build(
                &proposal.request,
                &owned(SUPPORTED_CHAINS),
                &owned(SUPPORTED_METHODS),
                &owned(SUPPORTED_EVENTS),
                &owned(SUPPORTED_ACCOUNTS),
            );

            match built {
                Ok(namespaces) => {
                    let session = client
                        .approve(ApproveParams {
                            proposer_public_key: proposal.proposer_public_key().to_owned(),
                            namespaces,
                            ..Default::default()
                        })
                        .await?;

                    info!(topic = %session.topic, "proposal approved");
                }

                Err(err) => {
                    warn!(%err, "cannot satisfy proposal");
                    client
                        .reject(proposal.proposer_public_key(), Reason::from(&err))
                        .await?;
                }
            }
        }

        SignEvent::SessionAuthenticateRequest { request } => {
            let cacaos = request
                .payload
                .chains
                .iter()
                .filter_map(|chain| {
                    SUPPORTED_ACCOUNTS
                        .iter()
                        .find(|account| account.starts_with(&format!("{chain}:")))
                })
                .map(|account| Cacao {
                    h: Header::caip122(),
                    p: request.payload.cacao_payload(account),
                    s: Signature {
                        t: "eip191".to_owned(),
                        s: "0x00".to_owned(),
                        m: None,
                    },
                })
                .collect::<Vec<_>>();

            if cacaos.is_empty() {
                client
                    .reject_session_authenticate(request.id, Reason::UnsupportedChains)
                    .await?;
            } else {
                let session = client
                    .approve_session_authenticate(request.id, cacaos)
                    .await?;

                info!(topic = %session.topic, "authenticated");
            }
        }

        SignEvent::SessionRequest { request, .. } => {
            info!(
                topic = %request.topic,
                method = %request.request.method,
                "rejecting session request"
            );

            client
                .respond(&request.topic, request.id, Err(Reason::UserRejected.into()))
                .await?;
        }

        SignEvent::SessionSettled(session) => {
            info!(topic = %session.topic, peer = %session.peer_participant.metadata.name, "session settled");
        }

        SignEvent::SessionDeleted { topic, reason } => {
            info!(%topic, code = ?reason.code, "session deleted by peer");
        }

        event => info!(?event, "sign event"),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(writer)
        .init();

    let args = Arg::parse();

    let opts = ConnectionOptions::new(args.project_id)
        .with_address(args.address)
        .with_auth(args.auth.map(Authorization::Query));

    let relay = ClientBuilder::new().build(opts);
    relay.connect()?;

    let config = SignConfig::default().with_metadata(Metadata {
        description: "Sign client demo wallet".to_owned(),
        url: "https://wallet.example.com".to_owned(),
        icons: vec![],
        name: "Demo Wallet".to_owned(),
        ..Default::default()
    });

    let client = SignClient::builder().with_config(config).build(relay);
    let mut events = client.events();

    let pairing = client.pair(&args.pairing_uri).await?;
    info!(topic = %pairing.topic, "paired");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };

                if let Err(err) = handle(&client, event).await {
                    warn!(%err, "failed to handle event");
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    for session in client.get_sessions()? {
        client.disconnect(&session.topic).await.ok();
    }

    Ok(())
}
