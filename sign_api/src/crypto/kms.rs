use {
    super::{
        payload::{encrypt_and_encode, Envelope, EnvelopeType, PayloadError, PubKey, SymKey},
        session::{topic_from_key, SessionError, SessionKey},
    },
    dashmap::DashMap,
    rand::{rngs::OsRng, RngCore},
    relay_rpc::domain::Topic,
    x25519_dalek::{PublicKey, StaticSecret},
};

#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    #[error("No symmetric key for topic: {0}")]
    SymKeyNotFound(Topic),

    #[error("No private key for public key: {0}")]
    KeyPairNotFound(String),

    #[error("Type 1 envelope on a topic without agreement key: {0}")]
    AgreementNotFound(Topic),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Result of opening an envelope.
#[derive(Debug, Clone)]
pub struct Opened {
    pub message: String,

    /// Set for type 1 envelopes.
    pub sender_public_key: Option<PubKey>,
}

/// Key management: X25519 key pairs, per-topic symmetric keys and the
/// envelope codec on top of them.
pub trait Kms: Send + Sync + 'static {
    /// Generates a key pair and returns its public half.
    fn create_key_pair(&self) -> PubKey;

    fn private_key(&self, public_key: &PubKey) -> Option<StaticSecret>;

    fn delete_key_pair(&self, public_key: &PubKey);

    fn set_sym_key(&self, topic: Topic, key: SymKey);

    fn sym_key(&self, topic: &Topic) -> Option<SymKey>;

    fn delete_sym_key(&self, topic: &Topic);

    /// Remembers which of our public keys type 1 envelopes on `topic` are
    /// addressed to.
    fn set_agreement_key(&self, topic: Topic, public_key: PubKey);

    fn agreement_key(&self, topic: &Topic) -> Option<PubKey>;

    fn delete_agreement_key(&self, topic: &Topic);

    /// Generates a random symmetric key and stores it under `sha256(key)`.
    fn create_sym_key(&self) -> (Topic, SymKey) {
        let mut key = SymKey::default();
        OsRng.fill_bytes(&mut key);

        let topic = topic_from_key(&key);
        self.set_sym_key(topic.clone(), key);
        (topic, key)
    }

    /// Derives the symmetric key shared with `peer_public_key` and stores it
    /// under the derived topic.
    fn derive_session(&self, self_public_key: &PubKey, peer_public_key: &PubKey) -> Result<Topic, KmsError> {
        let secret = self
            .private_key(self_public_key)
            .ok_or_else(|| KmsError::KeyPairNotFound(hex::encode(self_public_key)))?;

        let session = SessionKey::derive(&secret, peer_public_key)?;
        let topic = session.generate_topic();
        self.set_sym_key(topic.clone(), *session.symmetric_key());

        Ok(topic)
    }

    /// Encrypts `message` with the key stored for `key_topic`.
    fn seal(&self, key_topic: &Topic, message: &str, envelope_type: EnvelopeType<'_>) -> Result<String, KmsError> {
        let key = self
            .sym_key(key_topic)
            .ok_or_else(|| KmsError::SymKeyNotFound(key_topic.clone()))?;

        Ok(encrypt_and_encode(envelope_type, message, &key)?)
    }

    /// Decrypts an envelope received on `topic`.
    ///
    /// Type 1 envelopes derive the key from the sender public key and the
    /// agreement key registered for `topic`. The derived key is stored under
    /// the session topic it implies.
    fn open(&self, topic: &Topic, message: &str) -> Result<Opened, KmsError> {
        let envelope = Envelope::decode(message)?;

        let key = match envelope.sender_public_key() {
            None => self
                .sym_key(topic)
                .ok_or_else(|| KmsError::SymKeyNotFound(topic.clone()))?,

            Some(sender_public_key) => {
                let self_public_key = self
                    .agreement_key(topic)
                    .ok_or_else(|| KmsError::AgreementNotFound(topic.clone()))?;

                let session_topic = self.derive_session(&self_public_key, sender_public_key)?;
                self.sym_key(&session_topic)
                    .ok_or(KmsError::SymKeyNotFound(session_topic))?
            }
        };

        Ok(Opened {
            message: envelope.decrypt(&key)?,
            sender_public_key: envelope.sender_public_key().copied(),
        })
    }
}

/// In-memory [`Kms`].
#[derive(Default)]
pub struct LocalKms {
    key_pairs: DashMap<PubKey, StaticSecret>,
    sym_keys: DashMap<Topic, SymKey>,
    agreements: DashMap<Topic, PubKey>,
}

impl LocalKms {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn sym_key_topics(&self) -> Vec<Topic> {
        self.sym_keys.iter().map(|entry| entry.key().clone()).collect()
    }

    #[cfg(test)]
    pub(crate) fn key_pair_count(&self) -> usize {
        self.key_pairs.len()
    }
}

impl Kms for LocalKms {
    fn create_key_pair(&self) -> PubKey {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public_key = *PublicKey::from(&secret).as_bytes();
        self.key_pairs.insert(public_key, secret);
        public_key
    }

    fn private_key(&self, public_key: &PubKey) -> Option<StaticSecret> {
        self.key_pairs.get(public_key).map(|secret| secret.clone())
    }

    fn delete_key_pair(&self, public_key: &PubKey) {
        self.key_pairs.remove(public_key);
    }

    fn set_sym_key(&self, topic: Topic, key: SymKey) {
        self.sym_keys.insert(topic, key);
    }

    fn sym_key(&self, topic: &Topic) -> Option<SymKey> {
        self.sym_keys.get(topic).map(|key| *key)
    }

    fn delete_sym_key(&self, topic: &Topic) {
        self.sym_keys.remove(topic);
    }

    fn set_agreement_key(&self, topic: Topic, public_key: PubKey) {
        self.agreements.insert(topic, public_key);
    }

    fn agreement_key(&self, topic: &Topic) -> Option<PubKey> {
        self.agreements.get(topic).map(|key| *key)
    }

    fn delete_agreement_key(&self, topic: &Topic) {
        self.agreements.remove(topic);
    }
}
