use {
    super::{
        inbound::Received,
        networking::{decode_public_key, Delivery},
        ApproveParams,
        ConnectParams,
        ConnectResponse,
        Inner,
    },
    crate::{
        error::{Reason, SignError},
        events::SignEvent,
        namespaces::{validate_proposal_namespaces, validate_required, validate_session_namespaces},
        rpc::{
            ErrorParams,
            Participant,
            Relay,
            RequestParams,
            ResponseParamsError,
            ResponseParamsSuccess,
            SessionProposeRequest,
            SessionProposeResponse,
            SessionSettleRequest,
        },
        types::{now, Proposal, Session, TransportType},
        verify::VerifyContext,
    },
    relay_rpc::domain::{MessageId, Topic},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tracing::{debug, info, warn},
};

/// A proposal the wallet answered, waiting for its `wc_sessionSettle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PendingSettle {
    pub proposal: Proposal,
}

impl Inner {
    pub(super) async fn connect(&self, params: ConnectParams) -> Result<ConnectResponse, SignError> {
        validate_proposal_namespaces(&params.required_namespaces)?;
        validate_proposal_namespaces(&params.optional_namespaces)?;

        let (pairing_topic, uri) = match &params.pairing_topic {
            Some(topic) => {
                let pairing = self
                    .pairings
                    .get(&topic.to_string())?
                    .ok_or_else(|| SignError::NoMatchingTopic(topic.clone()))?;

                if pairing.expiry <= now() {
                    return Err(SignError::PairingExpired);
                }

                (topic.clone(), None)
            }

            None => {
                let uri = self.create_pairing(None).await?;
                (uri.topic.clone(), Some(uri))
            }
        };

        let proposal = self.send_proposal(&pairing_topic, params).await?;

        Ok(ConnectResponse {
            uri,
            id: proposal.id,
            pairing_topic,
        })
    }

    /// Publishes a proposal on an existing pairing.
    pub(super) async fn send_proposal(
        &self,
        pairing_topic: &Topic,
        params: ConnectParams,
    ) -> Result<Proposal, SignError> {
        let public_key = hex::encode(self.kms.create_key_pair());
        let expiry = now() + self.config.proposal_ttl.as_secs();

        let request = SessionProposeRequest {
            relays: vec![Relay::irn()],
            proposer: Participant {
                public_key: public_key.clone(),
                metadata: self.config.metadata.clone(),
            },
            required_namespaces: params.required_namespaces,
            optional_namespaces: params.optional_namespaces,
            session_properties: params.session_properties,
            scoped_properties: params.scoped_properties,
            expiry_timestamp: Some(expiry),
        };

        let proposal = Proposal {
            id: self.id_generator.next(),
            pairing_topic: pairing_topic.clone(),
            request: request.clone(),
            expiry,
        };

        // Stored first, the answer may arrive before `send` returns.
        self.proposals.set(public_key.clone(), proposal.clone())?;

        let sent = self
            .send_request_with_id(
                &Delivery::relay(pairing_topic.clone()),
                pairing_topic,
                proposal.id,
                RequestParams::SessionPropose(request),
            )
            .await;

        if let Err(err) = sent {
            self.proposals.take(&public_key)?;
            self.delete_key_pair(&public_key);
            return Err(err);
        }

        info!(id = %proposal.id, topic = %pairing_topic, "session proposed");
        Ok(proposal)
    }

    pub(super) async fn on_session_propose(
        &self,
        received: &Received,
        id: MessageId,
        request: SessionProposeRequest,
    ) -> Result<(), SignError> {
        let validation = validate_proposal_namespaces(&request.required_namespaces)
            .and_then(|()| validate_proposal_namespaces(&request.optional_namespaces));

        if let Err(err) = validation {
            warn!(topic = %received.topic, %id, %err, "rejecting invalid proposal");

            return self
                .respond_error(
                    &self.reply_to(received)?,
                    id,
                    ResponseParamsError::SessionPropose(Reason::from(&err).into()),
                )
                .await;
        }

        let proposal = Proposal {
            id,
            pairing_topic: received.topic.clone(),
            expiry: request
                .expiry_timestamp
                .unwrap_or(now() + self.config.proposal_ttl.as_secs()),
            request,
        };

        if proposal.is_expired(now()) {
            debug!(topic = %received.topic, %id, "dropping expired proposal");
            return Ok(());
        }

        let metadata = &proposal.request.proposer.metadata;
        self.activate_pairing(&received.topic, Some(metadata))?;

        let context = self.verifier.verify(metadata, None).await;
        self.verify_contexts.set(id.to_string(), context.clone())?;
        self.proposals
            .set(proposal.proposer_public_key().to_owned(), proposal.clone())?;

        self.events
            .emit(SignEvent::ProposalReceived { proposal, context });

        Ok(())
    }

    pub(super) async fn approve(&self, params: ApproveParams) -> Result<Session, SignError> {
        let ApproveParams {
            proposer_public_key,
            namespaces,
            session_properties,
            scoped_properties,
        } = params;

        let proposal = self
            .proposals
            .get(&proposer_public_key)?
            .ok_or_else(|| SignError::ProposalNotFound(proposer_public_key.clone()))?;

        if proposal.is_expired(now()) {
            self.proposals.take(&proposer_public_key)?;
            self.verify_contexts.take(&proposal.id.to_string())?;
            return Err(SignError::ProposalExpired);
        }

        validate_session_namespaces(&namespaces)?;
        validate_required(&proposal.request.required_namespaces, &namespaces)?;

        let peer_key = decode_public_key(&proposer_public_key)?;

        // Only one approve or reject may win the proposal.
        let proposal = self
            .proposals
            .take(&proposer_public_key)?
            .ok_or_else(|| SignError::ProposalNotFound(proposer_public_key.clone()))?;

        let context = self.verify_contexts.take(&proposal.id.to_string())?;

        let self_key = self.kms.create_key_pair();
        let topic = match self.kms.derive_session(&self_key, &peer_key) {
            Ok(topic) => topic,

            Err(err) => {
                self.kms.delete_key_pair(&self_key);
                self.restore_proposal(proposal, context)?;
                return Err(err.into());
            }
        };

        let self_public_key = hex::encode(self_key);

        // Until the answer is out the proposal stays answerable.
        if let Err(err) = self.answer_proposal(&proposal, &topic, &self_public_key).await {
            warn!(%topic, %err, "failed to answer proposal, rolling back");

            self.discard_session(&topic, &self_key).await;
            self.restore_proposal(proposal, context)?;
            return Err(err);
        }

        let self_participant = Participant {
            public_key: self_public_key.clone(),
            metadata: self.config.metadata.clone(),
        };

        let session = Session {
            topic: topic.clone(),
            pairing_topic: proposal.pairing_topic.clone(),
            self_participant: self_participant.clone(),
            peer_participant: proposal.request.proposer.clone(),
            controller_key: self_public_key,
            namespaces: namespaces.clone(),
            required_namespaces: proposal.request.required_namespaces.clone(),
            session_properties: session_properties.clone(),
            scoped_properties: scoped_properties.clone(),
            acknowledged: false,
            expiry: now() + self.config.session_ttl.as_secs(),
            transport_type: TransportType::Relay,
        };

        let settle = SessionSettleRequest {
            relay: Relay::irn(),
            controller: self_participant,
            namespaces,
            session_properties,
            scoped_properties,
            expiry: session.expiry,
        };

        let settled = match self.sessions.set(topic.to_string(), session.clone()) {
            Ok(()) => {
                self.send_request(&Delivery::relay(topic.clone()), RequestParams::SessionSettle(settle))
                    .await
            }

            Err(err) => Err(err.into()),
        };

        if let Err(err) = settled {
            warn!(%topic, %err, "failed to settle, rolling back session");
            self.discard_session(&topic, &self_key).await;
            return Err(err);
        }

        info!(%topic, proposal_id = %proposal.id, "session approved");
        Ok(session)
    }

    /// Subscribes to the session topic and sends the responder key to the
    /// proposer.
    async fn answer_proposal(
        &self,
        proposal: &Proposal,
        topic: &Topic,
        self_public_key: &str,
    ) -> Result<(), SignError> {
        self.relay.subscribe(topic.clone()).await?;

        self.respond(
            &Delivery::relay(proposal.pairing_topic.clone()),
            proposal.id,
            ResponseParamsSuccess::SessionPropose(SessionProposeResponse {
                relay: Relay::irn(),
                responder_public_key: self_public_key.to_owned(),
            }),
        )
        .await
    }

    fn restore_proposal(&self, proposal: Proposal, context: Option<VerifyContext>) -> Result<(), SignError> {
        if let Some(context) = context {
            self.verify_contexts.set(proposal.id.to_string(), context)?;
        }

        self.proposals
            .set(proposal.proposer_public_key().to_owned(), proposal)?;

        Ok(())
    }

    pub(super) async fn reject(&self, proposer_public_key: &str, reason: Reason) -> Result<(), SignError> {
        let proposal = self
            .proposals
            .take(proposer_public_key)?
            .ok_or_else(|| SignError::ProposalNotFound(proposer_public_key.to_owned()))?;

        self.verify_contexts.take(&proposal.id.to_string())?;

        info!(proposal_id = %proposal.id, code = reason.code(), "rejecting proposal");

        self.respond_error(
            &Delivery::relay(proposal.pairing_topic),
            proposal.id,
            ResponseParamsError::SessionPropose(reason.into()),
        )
        .await
    }

    pub(super) async fn on_session_propose_response(
        &self,
        id: MessageId,
        request: SessionProposeRequest,
        result: Result<Value, ErrorParams>,
    ) -> Result<(), SignError> {
        let public_key = &request.proposer.public_key;

        let response = match result {
            Ok(value) => serde_json::from_value::<SessionProposeResponse>(value)?,

            Err(reason) => {
                info!(proposal_id = %id, code = ?reason.code, "proposal rejected by peer");

                self.proposals.take(public_key)?;
                self.delete_key_pair(public_key);
                self.events.emit(SignEvent::SessionRejected {
                    proposal_id: id,
                    reason,
                });

                return Ok(());
            }
        };

        let Some(proposal) = self.proposals.take(public_key)? else {
            debug!(proposal_id = %id, "answer to an unknown proposal");
            return Ok(());
        };

        let self_key = decode_public_key(public_key)?;
        let peer_key = decode_public_key(&response.responder_public_key)?;
        let topic = self.kms.derive_session(&self_key, &peer_key)?;

        self.pending_settle
            .set(topic.to_string(), PendingSettle { proposal })?;
        self.relay.subscribe(topic.clone()).await?;

        debug!(%topic, proposal_id = %id, "waiting for settle");
        Ok(())
    }

    pub(super) async fn on_session_settle(
        &self,
        received: &Received,
        id: MessageId,
        request: SessionSettleRequest,
    ) -> Result<(), SignError> {
        let topic = &received.topic;
        let reply = self.reply_to(received)?;

        let Some(PendingSettle { proposal }) = self.pending_settle.take(&topic.to_string())? else {
            warn!(%topic, "settle for an unknown proposal");

            return self
                .respond_error(
                    &reply,
                    id,
                    ResponseParamsError::SessionSettle(Reason::SessionSettlementFailed.into()),
                )
                .await;
        };

        let validation = validate_session_namespaces(&request.namespaces)
            .and_then(|()| validate_required(&proposal.request.required_namespaces, &request.namespaces));

        if let Err(err) = validation {
            warn!(%topic, %err, "settle does not satisfy the proposal, rolling back");

            let sent = self
                .respond_error(
                    &reply,
                    id,
                    ResponseParamsError::SessionSettle(Reason::SessionSettlementFailed.into()),
                )
                .await;

            self.forget_topic(topic).await;
            self.delete_key_pair(proposal.proposer_public_key());
            return sent;
        }

        let controller = request.controller;
        let key = topic.to_string();

        self.sessions.set(key.clone(), Session {
            topic: topic.clone(),
            pairing_topic: proposal.pairing_topic.clone(),
            self_participant: proposal.request.proposer.clone(),
            peer_participant: controller.clone(),
            controller_key: controller.public_key.clone(),
            namespaces: request.namespaces,
            required_namespaces: proposal.request.required_namespaces,
            session_properties: request.session_properties,
            scoped_properties: request.scoped_properties,
            acknowledged: false,
            expiry: request.expiry,
            transport_type: TransportType::Relay,
        })?;

        self.respond(&reply, id, ResponseParamsSuccess::SessionSettle(true))
            .await?;

        let Some(session) = self.sessions.update(&key, |session| session.acknowledged = true)? else {
            return Ok(());
        };

        if received.via_relay() {
            if let Some(link) = controller.metadata.link_mode_universal() {
                debug!(%topic, link, "peer link mode support proven");
                self.proven_links.prove(link);
            }
        }

        self.activate_pairing(&session.pairing_topic, Some(&controller.metadata))?;

        info!(%topic, "session settled");
        self.events.emit(SignEvent::SessionSettled(session));

        Ok(())
    }

    pub(super) async fn on_session_settle_response(
        &self,
        received: &Received,
        result: Result<Value, ErrorParams>,
    ) -> Result<(), SignError> {
        let topic = &received.topic;

        match result {
            Ok(_) => {
                let Some(session) = self
                    .sessions
                    .update(&topic.to_string(), |session| session.acknowledged = true)?
                else {
                    debug!(%topic, "settle acknowledged for an unknown session");
                    return Ok(());
                };

                info!(%topic, "session acknowledged");
                self.events.emit(SignEvent::SessionSettled(session));
            }

            Err(reason) => {
                warn!(%topic, code = ?reason.code, "peer rejected settle, rolling back session");

                if self.delete_session(topic).await?.is_some() {
                    self.events.emit(SignEvent::SessionDeleted {
                        topic: topic.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(())
    }
}
