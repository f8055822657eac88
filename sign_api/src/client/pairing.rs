use {
    super::{inbound::Received, networking::Delivery, Inner},
    crate::{
        error::{Reason, SignError},
        events::SignEvent,
        pairing_uri::{Pairing, Params},
        rpc::{
            ErrorParams,
            Metadata,
            PairingDeleteRequest,
            PairingExtendRequest,
            PairingPingRequest,
            RequestParams,
            ResponseParamsSuccess,
            SessionPingRequest,
        },
        types::{now, PairingInfo},
    },
    relay_rpc::domain::{MessageId, Topic},
    serde_json::Value,
    tokio::sync::oneshot,
    tracing::{debug, info, warn},
};

/// Removes the ping slot when the ping completes or is cancelled.
struct PendingPing<'a> {
    id: MessageId,
    inner: &'a Inner,
}

impl Drop for PendingPing<'_> {
    fn drop(&mut self) {
        self.inner.pings.remove(&self.id);
    }
}

impl Inner {
    /// Creates a pairing and subscribes to its topic.
    pub(super) async fn create_pairing(&self, methods: Option<Vec<String>>) -> Result<Pairing, SignError> {
        let (topic, sym_key) = self.kms.create_sym_key();
        let expiry = now() + self.config.pairing_inactive_ttl.as_secs();

        self.pairings.set(topic.to_string(), PairingInfo {
            topic: topic.clone(),
            expiry,
            active: false,
            methods: methods.clone(),
            peer_metadata: None,
        })?;

        if let Err(err) = self.relay.subscribe(topic.clone()).await {
            self.pairings.take(&topic.to_string())?;
            self.kms.delete_sym_key(&topic);
            return Err(err.into());
        }

        info!(%topic, "pairing created");

        Ok(Pairing::new(topic, Params {
            relay_protocol: "irn".to_owned(),
            sym_key,
            relay_data: None,
            expiry_timestamp: Some(expiry),
            methods,
        }))
    }

    pub(super) async fn pair(&self, uri: &str) -> Result<PairingInfo, SignError> {
        let pairing: Pairing = uri.parse()?;
        let now = now();

        if pairing.is_expired(now) {
            return Err(SignError::PairingExpired);
        }

        let topic = pairing.topic.clone();
        let info = PairingInfo {
            topic: topic.clone(),
            expiry: pairing
                .params
                .expiry_timestamp
                .unwrap_or(now + self.config.pairing_inactive_ttl.as_secs()),
            active: false,
            methods: pairing.params.methods,
            peer_metadata: None,
        };

        self.kms.set_sym_key(topic.clone(), pairing.params.sym_key);

        let subscribed = match self.pairings.set(topic.to_string(), info.clone()) {
            Ok(()) => self.relay.subscribe(topic.clone()).await.map_err(SignError::from),
            Err(err) => Err(err.into()),
        };

        if let Err(err) = subscribed {
            warn!(%topic, %err, "failed to pair, rolling back");

            self.pairings.take(&topic.to_string())?;
            self.kms.delete_sym_key(&topic);
            return Err(err);
        }

        info!(%topic, "paired");
        Ok(info)
    }

    /// Marks a pairing active on first peer contact and extends it to the
    /// active TTL. Does nothing for other topics.
    pub(super) fn activate_pairing(&self, topic: &Topic, peer_metadata: Option<&Metadata>) -> Result<(), SignError> {
        let key = topic.to_string();

        if !self.pairings.contains(&key)? {
            return Ok(());
        }

        let expiry = now() + self.config.pairing_active_ttl.as_secs();
        self.pairings.update(&key, |pairing| {
            if !pairing.active {
                pairing.active = true;
                pairing.expiry = expiry;
            }

            if let Some(metadata) = peer_metadata {
                pairing.peer_metadata = Some(metadata.clone());
            }
        })?;

        Ok(())
    }

    /// Deletes a pairing and everything bound to its topic.
    pub(super) async fn delete_pairing(&self, topic: &Topic) -> Result<Option<PairingInfo>, SignError> {
        let pairing = self.pairings.take(&topic.to_string())?;

        if pairing.is_some() {
            self.forget_topic(topic).await;
        }

        Ok(pairing)
    }

    pub(super) async fn disconnect_pairing(&self, topic: &Topic) -> Result<(), SignError> {
        let reason = Reason::UserDisconnected;
        let request = RequestParams::PairingDelete(PairingDeleteRequest {
            code: reason.code(),
            message: reason.message().to_owned(),
        });

        if let Err(err) = self.send_request(&Delivery::relay(topic.clone()), request).await {
            debug!(%topic, %err, "failed to notify peer of pairing deletion");
        }

        self.delete_pairing(topic).await?;
        Ok(())
    }

    pub(super) async fn ping(&self, topic: &Topic) -> Result<(), SignError> {
        let key = topic.to_string();

        let (delivery, params) = if let Some(session) = self.sessions.get(&key)? {
            (
                self.session_delivery(&session)?,
                RequestParams::SessionPing(SessionPingRequest {}),
            )
        } else if self.pairings.contains(&key)? {
            (
                Delivery::relay(topic.clone()),
                RequestParams::PairingPing(PairingPingRequest {}),
            )
        } else {
            return Err(SignError::NoMatchingTopic(topic.clone()));
        };

        let id = self.id_generator.next();
        let (tx, rx) = oneshot::channel();
        self.pings.insert(id, tx);

        let _guard = PendingPing { id, inner: self };

        self.send_request_with_id(&delivery, topic, id, params)
            .await?;

        tokio::time::timeout(self.config.ping_timeout, rx)
            .await
            .map_err(|_| SignError::Timeout)?
            .map_err(|_| SignError::ChannelClosed)?
    }

    pub(super) fn on_ping_response(&self, id: MessageId, result: Result<Value, ErrorParams>) {
        match self.pings.remove(&id) {
            Some((_, tx)) => {
                tx.send(result.map(|_| ()).map_err(SignError::from)).ok();
            }

            None => debug!(%id, "pong arrived after the ping gave up"),
        }
    }

    pub(super) async fn on_pairing_ping(&self, received: &Received, id: MessageId) -> Result<(), SignError> {
        self.respond(
            &self.reply_to(received)?,
            id,
            ResponseParamsSuccess::PairingPing(true),
        )
        .await
    }

    pub(super) async fn on_pairing_delete(&self, received: &Received, id: MessageId) -> Result<(), SignError> {
        self.respond(
            &self.reply_to(received)?,
            id,
            ResponseParamsSuccess::PairingDelete(true),
        )
        .await?;

        if self.delete_pairing(&received.topic).await?.is_some() {
            info!(topic = %received.topic, "pairing deleted by peer");
            self.events.emit(SignEvent::PairingDeleted {
                topic: received.topic.clone(),
            });
        }

        Ok(())
    }

    pub(super) async fn on_pairing_extend(
        &self,
        received: &Received,
        id: MessageId,
        request: PairingExtendRequest,
    ) -> Result<(), SignError> {
        let expiry = request
            .expiry
            .min(now() + self.config.pairing_active_ttl.as_secs());

        self.pairings.update(&received.topic.to_string(), |pairing| {
            pairing.expiry = pairing.expiry.max(expiry);
        })?;

        self.respond(
            &self.reply_to(received)?,
            id,
            ResponseParamsSuccess::PairingExtend(true),
        )
        .await
    }
}
