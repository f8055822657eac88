use {
    super::recap_methods,
    crate::rpc::{SettleNamespace, SettleNamespaces},
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    std::fmt::Write as _,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacaoError {
    #[error("Invalid header")]
    Header,

    #[error("Invalid issuer: {0}")]
    Issuer(String),

    #[error("Invalid ReCap resource: {0}")]
    Recap(String),

    #[error("Missing signature")]
    Signature,

    #[error("CACAO has expired")]
    Expired,

    #[error("Unable to verify: {0}")]
    Verification(String),
}

/// Chain Agnostic CApability Object.
///
/// https://chainagnostic.org/CAIPs/caip-74
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Cacao {
    pub h: Header,
    pub p: CacaoPayload,
    pub s: Signature,
}

impl Cacao {
    const ETHEREUM: &'static str = "Ethereum";

    pub fn siwe_message(&self) -> Result<String, CacaoError> {
        self.caip122_message(Self::ETHEREUM)
    }

    pub fn caip122_message(&self, chain_name: &str) -> Result<String, CacaoError> {
        self.p.caip122_message(chain_name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Header {
    pub t: String,
}

impl Header {
    pub fn caip122() -> Self {
        Self {
            t: super::CAIP122_TYPE.to_owned(),
        }
    }

    pub fn validate(&self) -> Result<(), CacaoError> {
        match self.t.as_str() {
            "eip4361" | super::CAIP122_TYPE => Ok(()),
            _ => Err(CacaoError::Header),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacaoPayload {
    pub domain: String,
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
    pub aud: String,
    pub version: String,
    pub nonce: String,
    pub iat: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
}

impl CacaoPayload {
    const ISS_PREFIX: &'static str = "did:pkh:";

    /// The CAIP-10 account of the issuer, `namespace:reference:address`.
    pub fn account(&self) -> Result<&str, CacaoError> {
        let account = self
            .iss
            .strip_prefix(Self::ISS_PREFIX)
            .ok_or_else(|| CacaoError::Issuer(self.iss.clone()))?;

        match account.split(':').count() {
            3 => Ok(account),
            _ => Err(CacaoError::Issuer(self.iss.clone())),
        }
    }

    pub fn address(&self) -> Result<&str, CacaoError> {
        self.account()?
            .rsplit(':')
            .next()
            .ok_or_else(|| CacaoError::Issuer(self.iss.clone()))
    }

    /// CAIP-2 chain id of the issuer, e.g. `eip155:1`.
    pub fn chain_id_reference(&self) -> Result<&str, CacaoError> {
        self.account()?
            .rsplit_once(':')
            .map(|(chain, _)| chain)
            .ok_or_else(|| CacaoError::Issuer(self.iss.clone()))
    }

    pub fn namespace(&self) -> Result<&str, CacaoError> {
        self.chain_id_reference()?
            .split(':')
            .next()
            .ok_or_else(|| CacaoError::Issuer(self.iss.clone()))
    }

    /// Chain reference without the namespace, e.g. `1`.
    pub fn chain_id(&self) -> Result<&str, CacaoError> {
        self.chain_id_reference()?
            .split_once(':')
            .map(|(_, reference)| reference)
            .ok_or_else(|| CacaoError::Issuer(self.iss.clone()))
    }

    pub fn caip122_message(&self, chain_name: &str) -> Result<String, CacaoError> {
        let mut message = format!(
            "{} wants you to sign in with your {} account:\n{}\n",
            self.domain,
            chain_name,
            self.address()?
        );

        if let Some(statement) = &self.statement {
            let _ = write!(message, "\n{}\n", statement);
        }

        let _ = write!(
            message,
            "\nURI: {}\nVersion: {}\nChain ID: {}\nNonce: {}\nIssued At: {}",
            self.aud,
            self.version,
            self.chain_id()?,
            self.nonce,
            self.iat
        );

        if let Some(exp) = &self.exp {
            let _ = write!(message, "\nExpiration Time: {}", exp);
        }

        if let Some(nbf) = &self.nbf {
            let _ = write!(message, "\nNot Before: {}", nbf);
        }

        if let Some(request_id) = &self.request_id {
            let _ = write!(message, "\nRequest ID: {}", request_id);
        }

        if let Some(resources) = &self.resources {
            if !resources.is_empty() {
                let _ = write!(message, "\nResources:");
                resources.iter().for_each(|resource| {
                    let _ = write!(message, "\n- {}", resource);
                });
            }
        }

        Ok(message)
    }

    /// Whether `exp` lies in the past. Unparseable timestamps count as
    /// expired.
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        match &self.exp {
            Some(exp) => chrono::DateTime::parse_from_rfc3339(exp)
                .map(|exp| exp <= now)
                .unwrap_or(true),

            None => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Signature {
    pub t: String,
    pub s: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<String>,
}

/// Verifies CACAO signatures. Chain-specific schemes (EIP-191, EIP-1271) are
/// provided by the application.
#[async_trait]
pub trait CacaoVerifier: Send + Sync + 'static {
    async fn verify(&self, cacao: &Cacao) -> Result<(), CacaoError>;
}

/// Structural checks only: header type, issuer format, a non-empty signature
/// and expiry. Does not check the signature cryptographically.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicCacaoVerifier;

#[async_trait]
impl CacaoVerifier for BasicCacaoVerifier {
    async fn verify(&self, cacao: &Cacao) -> Result<(), CacaoError> {
        cacao.h.validate()?;
        cacao.p.account()?;

        if cacao.s.s.is_empty() {
            return Err(CacaoError::Signature);
        }

        if cacao.p.is_expired(chrono::Utc::now()) {
            return Err(CacaoError::Expired);
        }

        Ok(())
    }
}

/// Session namespaces granted by a set of signed CACAOs.
///
/// Accounts and chains come from the issuers, methods from the ReCap
/// resources. `events` are granted to every namespace.
pub fn namespaces_from_cacaos(
    cacaos: &[Cacao],
    events: &[String],
) -> Result<SettleNamespaces, CacaoError> {
    let mut namespaces = SettleNamespaces::default();

    for cacao in cacaos {
        let key = cacao.p.namespace()?.to_owned();
        let chain = cacao.p.chain_id_reference()?.to_owned();
        let account = cacao.p.account()?.to_owned();
        let methods = recap_methods(cacao.p.resources.as_deref())?;

        let namespace = namespaces.entry(key).or_insert_with(|| SettleNamespace {
            chains: Some(Vec::new()),
            events: events.iter().cloned().collect(),
            ..Default::default()
        });

        if let Some(chains) = namespace.chains.as_mut() {
            if !chains.contains(&chain) {
                chains.push(chain);
            }
        }

        if !namespace.accounts.contains(&account) {
            namespace.accounts.push(account);
        }

        namespace.methods.extend(methods);
    }

    Ok(namespaces)
}
