use {
    super::Inner,
    crate::{
        crypto::{EnvelopeType, PubKey},
        error::SignError,
        link_mode::{build_envelope_url, LinkModeError},
        rpc::{
            IrnMetadata,
            Payload,
            RelayProtocolMetadata,
            Request,
            RequestParams,
            Response,
            ResponseParamsError,
            ResponseParamsSuccess,
        },
        types::{Session, TransportType},
    },
    relay_rpc::domain::{MessageId, Topic},
    std::time::Duration,
    tracing::{debug, warn},
};

/// Where and how an outgoing envelope travels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Delivery {
    /// Topic the envelope is published on.
    pub topic: Topic,
    /// Topic whose symmetric key seals the envelope.
    pub key_topic: Topic,
    /// Set for type 1 envelopes.
    pub sender_public_key: Option<PubKey>,
    /// Universal link of the peer when delivering through link-mode.
    pub link: Option<String>,
}

impl Delivery {
    pub fn relay(topic: Topic) -> Self {
        Self {
            key_topic: topic.clone(),
            topic,
            sender_public_key: None,
            link: None,
        }
    }

    pub fn via_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

pub(super) fn decode_public_key(key: &str) -> Result<PubKey, SignError> {
    let bytes = hex::decode(key).map_err(|_| SignError::InvalidPublicKey(key.to_owned()))?;
    PubKey::try_from(bytes.as_slice()).map_err(|_| SignError::InvalidPublicKey(key.to_owned()))
}

impl Inner {
    /// Sends a request on `delivery.topic` and records it for correlation.
    pub(super) async fn send_request(
        &self,
        delivery: &Delivery,
        params: RequestParams,
    ) -> Result<MessageId, SignError> {
        let id = self.id_generator.next();
        self.send_request_with_id(delivery, &delivery.topic, id, params)
            .await?;
        Ok(id)
    }

    /// Sends a request whose response is expected on `response_topic`.
    pub(super) async fn send_request_with_id(
        &self,
        delivery: &Delivery,
        response_topic: &Topic,
        id: MessageId,
        params: RequestParams,
    ) -> Result<(), SignError> {
        let metadata = params.irn_metadata();
        let request = Request::new(id, params);

        self.history.set(response_topic, &request)?;

        let payload = serde_json::to_string(&Payload::Request(request))?;

        if let Err(err) = self.deliver(delivery, &payload, metadata).await {
            self.history.delete(response_topic, id).ok();
            return Err(err);
        }

        debug!(%id, topic = %delivery.topic, tag = metadata.tag, "request sent");
        Ok(())
    }

    pub(super) async fn respond(
        &self,
        delivery: &Delivery,
        id: MessageId,
        params: ResponseParamsSuccess,
    ) -> Result<(), SignError> {
        let metadata = params.irn_metadata();
        let response = Response::new(id, params.try_into()?);
        self.send_response(delivery, response, metadata).await
    }

    pub(super) async fn respond_error(
        &self,
        delivery: &Delivery,
        id: MessageId,
        params: ResponseParamsError,
    ) -> Result<(), SignError> {
        let metadata = params.irn_metadata();
        self.respond_error_with(delivery, id, params, metadata).await
    }

    /// Sends an error response with explicit relay metadata, for rejections
    /// that use their own tags.
    pub(super) async fn respond_error_with(
        &self,
        delivery: &Delivery,
        id: MessageId,
        params: ResponseParamsError,
        metadata: IrnMetadata,
    ) -> Result<(), SignError> {
        let response = Response::new(id, params.try_into()?);
        self.send_response(delivery, response, metadata).await
    }

    async fn send_response(
        &self,
        delivery: &Delivery,
        response: Response,
        metadata: IrnMetadata,
    ) -> Result<(), SignError> {
        let id = response.id;
        let payload = serde_json::to_string(&Payload::Response(response))?;
        self.deliver(delivery, &payload, metadata).await?;

        debug!(%id, topic = %delivery.topic, tag = metadata.tag, "response sent");
        Ok(())
    }

    async fn deliver(&self, delivery: &Delivery, payload: &str, metadata: IrnMetadata) -> Result<(), SignError> {
        let envelope_type = match &delivery.sender_public_key {
            Some(sender_public_key) => EnvelopeType::Type1 { sender_public_key },
            None => EnvelopeType::Type0,
        };

        let envelope = self.kms.seal(&delivery.key_topic, payload, envelope_type)?;

        match &delivery.link {
            Some(link) => {
                let transport = self
                    .link_transport
                    .as_ref()
                    .ok_or(LinkModeError::NoTransport)?;

                let url = build_envelope_url(link, &delivery.topic, &envelope)?;
                transport.dispatch(url).await?;
            }

            None => {
                self.relay
                    .publish(
                        delivery.topic.clone(),
                        envelope,
                        metadata.tag,
                        Duration::from_secs(metadata.ttl),
                        metadata.prompt,
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// The delivery for messages on an existing session.
    pub(super) fn session_delivery(&self, session: &Session) -> Result<Delivery, SignError> {
        let delivery = Delivery::relay(session.topic.clone());

        match session.transport_type {
            TransportType::Relay => Ok(delivery),

            TransportType::LinkMode => {
                let link = session
                    .peer_participant
                    .metadata
                    .link_mode_universal()
                    .ok_or(LinkModeError::NoUniversalLink)?;

                Ok(delivery.via_link(link))
            }
        }
    }

    pub(super) fn delivery_for(&self, topic: &Topic) -> Result<Delivery, SignError> {
        match self.sessions.get(&topic.to_string())? {
            Some(session) => self.session_delivery(&session),
            None => Ok(Delivery::relay(topic.clone())),
        }
    }

    /// Drops the subscription, key and history of a topic.
    pub(super) async fn forget_topic(&self, topic: &Topic) {
        if let Err(err) = self.relay.unsubscribe(topic.clone()).await {
            debug!(%topic, %err, "unsubscribe failed, dropping tracked subscription");
            self.relay.subscriptions().remove(topic);
        }

        self.kms.delete_sym_key(topic);

        if let Err(err) = self.history.delete_topic(topic) {
            warn!(%topic, %err, "failed to clear history");
        }
    }

    pub(super) fn delete_key_pair(&self, public_key: &str) {
        match decode_public_key(public_key) {
            Ok(key) => self.kms.delete_key_pair(&key),
            Err(err) => debug!(%err, "not deleting key pair"),
        }
    }
}
