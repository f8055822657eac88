//! https://specs.walletconnect.com/2.0/specs/clients/sign/session-proposal

use {
    super::payload::{PubKey, SymKey},
    hkdf::Hkdf,
    rand::{rngs::OsRng, CryptoRng, RngCore},
    relay_rpc::domain::{DecodedTopic, Topic},
    sha2::{Digest, Sha256},
    std::fmt::{Debug, Formatter},
    x25519_dalek::{PublicKey, StaticSecret},
};

/// Session key and topic derivation errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to generate symmetric session key: {0}")]
    SymKeyGeneration(String),
}

/// Symmetric key agreed with a peer, together with "our" public key.
#[derive(Clone)]
pub struct SessionKey {
    sym_key: SymKey,
    public_key: PublicKey,
}

impl Debug for SessionKey {
    /// Custom debug to hide the symmetrical key.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("sym_key", &"********")
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl SessionKey {
    /// Creates new session key with a one-off key pair from `osrng`.
    pub fn from_osrng(peer_public_key: &PubKey) -> Result<Self, SessionError> {
        SessionKey::diffie_hellman(OsRng, peer_public_key)
    }

    /// Performs Diffie-Hellman symmetric key derivation with a fresh key pair.
    pub fn diffie_hellman<T>(csprng: T, peer_public_key: &PubKey) -> Result<Self, SessionError>
    where
        T: RngCore + CryptoRng,
    {
        SessionKey::derive(&StaticSecret::random_from_rng(csprng), peer_public_key)
    }

    /// Performs Diffie-Hellman symmetric key derivation with a stored secret.
    pub fn derive(secret: &StaticSecret, peer_public_key: &PubKey) -> Result<Self, SessionError> {
        let public_key = PublicKey::from(secret);
        let ikm = secret.diffie_hellman(&PublicKey::from(*peer_public_key));

        let mut session_sym_key = Self {
            sym_key: [0u8; 32],
            public_key,
        };
        let hk = Hkdf::<Sha256>::new(None, ikm.as_bytes());
        hk.expand(&[], &mut session_sym_key.sym_key)
            .map_err(|e| SessionError::SymKeyGeneration(e.to_string()))?;

        Ok(session_sym_key)
    }

    /// Gets symmetic key reference.
    pub fn symmetric_key(&self) -> &SymKey {
        &self.sym_key
    }

    /// Gets "our" public key used in symmetric key derivation.
    pub fn diffie_public_key(&self) -> &PubKey {
        self.public_key.as_bytes()
    }

    /// Session topic derived from the symmetric key.
    pub fn generate_topic(&self) -> Topic {
        topic_from_key(&self.sym_key)
    }
}

/// `sha256(key)` as a topic. Used for sym key topics and for the type 1
/// response topic derived from the requester public key.
pub fn topic_from_key(key: &[u8; 32]) -> Topic {
    let mut hasher = Sha256::new();
    hasher.update(key);
    Topic::from(DecodedTopic(hasher.finalize().into()))
}
