//! WalletConnect Sign protocol client: pairing, session negotiation and
//! session messaging on top of [`relay_client`].

pub use {
    client::{
        ApproveParams,
        AuthenticateParams,
        ConnectParams,
        ConnectResponse,
        SignClient,
        SignClientBuilder,
    },
    config::SignConfig,
    error::{Reason, SignError},
    events::SignEvent,
};

pub mod auth;
mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod history;
pub mod link_mode;
pub mod namespaces;
pub mod pairing_uri;
pub mod router;
pub mod rpc;
pub mod storage;
pub mod types;
pub mod verify;

#[cfg(test)]
mod test_utils;
