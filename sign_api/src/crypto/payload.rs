use {
    base64::{prelude::BASE64_STANDARD, DecodeError, Engine},
    chacha20poly1305::{
        aead::{Aead, KeyInit, OsRng, Payload},
        AeadCore, ChaCha20Poly1305, Nonce,
    },
    std::string::FromUtf8Error,
};

// https://specs.walletconnect.com/2.0/specs/clients/core/crypto/
// crypto-envelopes
const TYPE_0: u8 = 0;
const TYPE_1: u8 = 1;
const TYPE_LENGTH: usize = 1;
const INIT_VEC_LEN: usize = 12;
const PUB_KEY_LENGTH: usize = 32;
const SYM_KEY_LENGTH: usize = 32;

pub type InitVec = [u8; INIT_VEC_LEN];
pub type SymKey = [u8; SYM_KEY_LENGTH];
pub type PubKey = [u8; PUB_KEY_LENGTH];

/// Payload encoding, decoding, encryption and decryption errors.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Payload is not base64 encoded")]
    Base64Decode(#[from] DecodeError),
    #[error("Payload decryption failure: {0}")]
    Decryption(String),
    #[error("Payload encryption failure: {0}")]
    Encryption(String),
    #[error("Invalid Initialization Vector length={0}")]
    InitVecLen(usize),
    #[error("Invalid symmetrical key length={0}")]
    SymKeyLen(usize),
    #[error("Payload does not fit initialization vector (index: {0}..{1})")]
    ParseInitVecLen(usize, usize),
    #[error("Payload does not fit sender public key (index: {0}..{1})")]
    ParseSenderPublicKeyLen(usize, usize),
    #[error("Payload is not a valid JSON encoding")]
    PayloadJson(#[from] FromUtf8Error),
    #[error("Unsupported envelope type={0}")]
    UnsupportedEnvelopeType(u8),
    #[error("Unexpected envelope type={0}, expected={1}")]
    UnexpectedEnvelopeType(u8, u8),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvelopeType<'a> {
    Type0,
    Type1 { sender_public_key: &'a PubKey },
}

/// Decoded envelope, not yet decrypted.
///
/// The type 1 sender public key is needed to derive the symmetric key before
/// the payload can be opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Encrypted payload.
    sealed: Vec<u8>,
    /// Initialization Vector.
    init_vec: InitVec,
    sender_public_key: Option<PubKey>,
}

impl Envelope {
    /// Decodes a base64 envelope of either type.
    pub fn decode<T>(msg: T) -> Result<Self, PayloadError>
    where
        T: AsRef<[u8]>,
    {
        let data = BASE64_STANDARD.decode(msg)?;
        Self::parse_decoded(&data)
    }

    fn parse_decoded(data: &[u8]) -> Result<Self, PayloadError> {
        let (&envelope_type, rest) = data
            .split_first()
            .ok_or(PayloadError::ParseInitVecLen(TYPE_LENGTH, TYPE_LENGTH + INIT_VEC_LEN))?;

        let (sender_public_key, rest) = match envelope_type {
            TYPE_0 => (None, rest),
            TYPE_1 => {
                let key_end_index = TYPE_LENGTH + PUB_KEY_LENGTH;
                if rest.len() < PUB_KEY_LENGTH {
                    return Err(PayloadError::ParseSenderPublicKeyLen(TYPE_LENGTH, key_end_index));
                }

                let (key, rest) = rest.split_at(PUB_KEY_LENGTH);
                let key: PubKey = key
                    .try_into()
                    .map_err(|_| PayloadError::ParseSenderPublicKeyLen(TYPE_LENGTH, key_end_index))?;

                (Some(key), rest)
            }
            _ => return Err(PayloadError::UnsupportedEnvelopeType(envelope_type)),
        };

        let init_vec_start_index = data.len() - rest.len();
        let init_vec_end_index = init_vec_start_index + INIT_VEC_LEN;
        if rest.len() < INIT_VEC_LEN {
            return Err(PayloadError::ParseInitVecLen(init_vec_start_index, init_vec_end_index));
        }

        let (init_vec, sealed) = rest.split_at(INIT_VEC_LEN);

        Ok(Self {
            init_vec: init_vec
                .try_into()
                .map_err(|_| PayloadError::ParseInitVecLen(init_vec_start_index, init_vec_end_index))?,
            sealed: sealed.to_vec(),
            sender_public_key,
        })
    }

    pub fn envelope_type(&self) -> EnvelopeType<'_> {
        match &self.sender_public_key {
            None => EnvelopeType::Type0,
            Some(sender_public_key) => EnvelopeType::Type1 { sender_public_key },
        }
    }

    /// Sender public key of a type 1 envelope.
    pub fn sender_public_key(&self) -> Option<&PubKey> {
        self.sender_public_key.as_ref()
    }

    /// Decrypts the payload with `key`.
    pub fn decrypt(&self, key: &SymKey) -> Result<String, PayloadError> {
        let payload = Payload {
            msg: &self.sealed,
            aad: &[],
        };
        let decrypted = decrypt(Nonce::from_slice(&self.init_vec), payload, key)?;

        Ok(String::from_utf8(decrypted)?)
    }
}

/// Encrypts and encodes the plain-text payload.
pub fn encrypt_and_encode<T>(
    envelope_type: EnvelopeType,
    msg: T,
    key: &SymKey,
) -> Result<String, PayloadError>
where
    T: AsRef<[u8]>,
{
    let payload = Payload {
        msg: msg.as_ref(),
        aad: &[],
    };
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

    let sealed = encrypt(&nonce, payload, key)?;
    Ok(encode(
        envelope_type,
        sealed.as_slice(),
        nonce
            .as_slice()
            .try_into()
            .map_err(|_| PayloadError::InitVecLen(nonce.len()))?,
    ))
}

/// Decodes and decrypts the Type0 envelope payload.
pub fn decode_and_decrypt_type0<T>(msg: T, key: &SymKey) -> Result<String, PayloadError>
where
    T: AsRef<[u8]>,
{
    let envelope = Envelope::decode(msg)?;
    if envelope.sender_public_key.is_some() {
        return Err(PayloadError::UnexpectedEnvelopeType(TYPE_1, TYPE_0));
    }

    envelope.decrypt(key)
}

fn encrypt(nonce: &Nonce, payload: Payload<'_, '_>, key: &SymKey) -> Result<Vec<u8>, PayloadError> {
    let cipher = ChaCha20Poly1305::new(
        key.try_into()
            .map_err(|_| PayloadError::SymKeyLen(key.len()))?,
    );
    let sealed = cipher
        .encrypt(nonce, payload)
        .map_err(|e| PayloadError::Encryption(e.to_string()))?;

    Ok(sealed)
}

fn encode(envelope_type: EnvelopeType, sealed: &[u8], init_vec: &InitVec) -> String {
    match envelope_type {
        EnvelopeType::Type0 => {
            BASE64_STANDARD.encode([&[TYPE_0], init_vec.as_slice(), sealed].concat())
        }
        EnvelopeType::Type1 { sender_public_key } => BASE64_STANDARD
            .encode([&[TYPE_1], sender_public_key.as_slice(), init_vec, sealed].concat()),
    }
}

fn decrypt(nonce: &Nonce, payload: Payload<'_, '_>, key: &SymKey) -> Result<Vec<u8>, PayloadError> {
    let cipher = ChaCha20Poly1305::new(
        key.try_into()
            .map_err(|_| PayloadError::SymKeyLen(key.len()))?,
    );
    let unsealed = cipher
        .decrypt(nonce, payload)
        .map_err(|e| PayloadError::Decryption(e.to_string()))?;

    Ok(unsealed)
}
