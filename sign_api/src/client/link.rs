use {
    super::{inbound::Inbound, Inner},
    crate::{
        error::SignError,
        link_mode::{parse_envelope_url, LinkModeError},
        types::{Session, TransportType},
    },
    relay_rpc::domain::Topic,
    std::sync::Arc,
    tracing::{debug, info},
};

impl Inner {
    /// Switches a session to link-mode after the peer reached us through a
    /// link envelope. Sessions whose peer advertises no link-mode universal
    /// link keep answering over the relay.
    pub(super) fn mark_link_mode(&self, topic: &Topic) -> Result<(), SignError> {
        if !self.config.link_mode || self.link_transport.is_none() {
            return Ok(());
        }

        let key = topic.to_string();

        let Some(session) = self.sessions.get(&key)? else {
            return Ok(());
        };

        if session.transport_type == TransportType::LinkMode {
            return Ok(());
        }

        if session.peer_participant.metadata.link_mode_universal().is_none() {
            debug!(%topic, "peer has no link mode universal link, replying over the relay");
            return Ok(());
        }

        self.sessions
            .update(&key, |session| session.transport_type = TransportType::LinkMode)?;

        debug!(%topic, "session reached over link mode");
        Ok(())
    }

    pub(super) fn upgrade_to_link_mode(&self, topic: &Topic) -> Result<Session, SignError> {
        if !self.config.link_mode {
            return Err(LinkModeError::Disabled.into());
        }

        if self.link_transport.is_none() {
            return Err(LinkModeError::NoTransport.into());
        }

        let session = self
            .sessions
            .get(&topic.to_string())?
            .ok_or_else(|| SignError::NoMatchingTopic(topic.clone()))?;

        let link = session
            .peer_participant
            .metadata
            .link_mode_universal()
            .ok_or(LinkModeError::NoUniversalLink)?;

        self.proven_links.ensure_proven(link)?;

        let session = self
            .sessions
            .update(&topic.to_string(), |session| {
                session.transport_type = TransportType::LinkMode;
            })?
            .ok_or_else(|| SignError::NoMatchingTopic(topic.clone()))?;

        info!(%topic, "session upgraded to link mode");
        Ok(session)
    }

    pub(super) fn dispatch_envelope(&self, url: &str) -> Result<(), SignError> {
        if !self.config.link_mode {
            return Err(LinkModeError::Disabled.into());
        }

        let (topic, envelope) = parse_envelope_url(url)?;
        debug!(%topic, "link envelope received");

        self.inbound_tx
            .send(Inbound {
                topic,
                message: Arc::from(envelope),
                transport: TransportType::LinkMode,
            })
            .map_err(|_| SignError::ChannelClosed)
    }
}
