//! End-to-end encryption of peer messages.
//!
//! https://specs.walletconnect.com/2.0/specs/clients/core/crypto/

pub mod kms;
pub mod payload;
pub mod session;

pub use {
    kms::{Kms, KmsError, LocalKms, Opened},
    payload::{EnvelopeType, PayloadError, PubKey, SymKey},
    session::{topic_from_key, SessionKey},
};
