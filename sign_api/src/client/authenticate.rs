use {
    super::{
        inbound::Received,
        networking::{decode_public_key, Delivery},
        AuthenticateParams,
        ConnectParams,
        ConnectResponse,
        Inner,
    },
    crate::{
        auth::{namespaces_from_cacaos, AuthPayload, Cacao},
        crypto::{topic_from_key, PubKey},
        error::{Reason, SignError},
        events::SignEvent,
        link_mode::LinkModeError,
        rpc::{
            ErrorParams,
            IrnMetadata,
            Participant,
            ProposeNamespace,
            ProposeNamespaces,
            RequestParams,
            ResponseParamsError,
            ResponseParamsSuccess,
            SessionAuthenticateRequest,
            SessionAuthenticateResponse,
            SettleNamespaces,
            IRN_AUTO_REJECT_METADATA,
            IRN_REJECT_METADATA,
            METHOD_SESSION_AUTHENTICATE,
        },
        types::{now, AuthRequest, Session, TransportType},
    },
    relay_rpc::domain::{MessageId, Topic},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    std::sync::Arc,
    tracing::{debug, info, warn},
};

/// Events granted to sessions created by one-step authentication.
const SESSION_EVENTS: [&str; 2] = ["chainChanged", "accountsChanged"];

/// An authenticate request sent by the dapp and not yet answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PendingAuthenticate {
    pub id: MessageId,
    pub pairing_topic: Topic,
    /// `sha256(requester public key)`, where the type 1 answer arrives.
    pub response_topic: Topic,
    pub requester_public_key: String,
    /// Proposal sent instead when the wallet cannot authenticate.
    pub fallback: ConnectParams,
}

fn session_events() -> Vec<String> {
    SESSION_EVENTS.iter().map(|event| (*event).to_owned()).collect()
}

/// Optional namespaces of the fallback proposal: the requested chains grouped
/// by namespace, with the ReCap methods.
fn fallback_namespaces(payload: &AuthPayload) -> Result<ProposeNamespaces, SignError> {
    let methods = payload.requested_methods()?;
    let mut namespaces = ProposeNamespaces::default();

    for chain in &payload.chains {
        let key = chain.split(':').next().unwrap_or(chain);

        let namespace = namespaces
            .entry(key.to_owned())
            .or_insert_with(|| ProposeNamespace {
                chains: Some(Vec::new()),
                methods: methods.iter().cloned().collect(),
                events: session_events().into_iter().collect(),
            });

        if let Some(chains) = namespace.chains.as_mut() {
            if !chains.contains(chain) {
                chains.push(chain.clone());
            }
        }
    }

    Ok(namespaces)
}

impl Inner {
    pub(super) async fn authenticate(
        self: &Arc<Self>,
        params: AuthenticateParams,
    ) -> Result<ConnectResponse, SignError> {
        let AuthenticateParams {
            payload,
            pairing_topic,
            wallet_link,
        } = params;

        let optional_namespaces = fallback_namespaces(&payload)?;

        if let Some(link) = &wallet_link {
            if !self.config.link_mode {
                return Err(LinkModeError::Disabled.into());
            }

            self.proven_links.ensure_proven(link)?;

            if pairing_topic.is_none() {
                return Err(LinkModeError::PairingRequired.into());
            }
        }

        let (pairing_topic, uri) = match pairing_topic {
            Some(topic) => {
                let pairing = self
                    .pairings
                    .get(&topic.to_string())?
                    .ok_or_else(|| SignError::NoMatchingTopic(topic.clone()))?;

                if pairing.expiry <= now() {
                    return Err(SignError::PairingExpired);
                }

                let supported = pairing
                    .methods
                    .as_ref()
                    .is_some_and(|methods| methods.iter().any(|method| method == METHOD_SESSION_AUTHENTICATE));

                if !supported && wallet_link.is_none() {
                    info!(%topic, "pairing does not support authenticate, proposing a session");

                    let proposal = self
                        .send_proposal(&topic, ConnectParams {
                            optional_namespaces,
                            pairing_topic: Some(topic.clone()),
                            ..Default::default()
                        })
                        .await?;

                    return Ok(ConnectResponse {
                        uri: None,
                        id: proposal.id,
                        pairing_topic: topic,
                    });
                }

                (topic, None)
            }

            None => {
                let uri = self
                    .create_pairing(Some(vec![METHOD_SESSION_AUTHENTICATE.to_owned()]))
                    .await?;
                (uri.topic.clone(), Some(uri))
            }
        };

        let requester_key = self.kms.create_key_pair();
        let requester_public_key = hex::encode(requester_key);
        let response_topic = topic_from_key(&requester_key);

        self.kms
            .set_agreement_key(response_topic.clone(), requester_key);

        if let Err(err) = self.relay.subscribe(response_topic.clone()).await {
            self.kms.delete_agreement_key(&response_topic);
            self.kms.delete_key_pair(&requester_key);
            return Err(err.into());
        }

        let id = self.id_generator.next();
        let pending = PendingAuthenticate {
            id,
            pairing_topic: pairing_topic.clone(),
            response_topic: response_topic.clone(),
            requester_public_key: requester_public_key.clone(),
            fallback: ConnectParams {
                optional_namespaces,
                pairing_topic: Some(pairing_topic.clone()),
                ..Default::default()
            },
        };

        self.auth_pending.set(id.to_string(), pending.clone())?;

        let mut delivery = Delivery::relay(pairing_topic.clone());
        if let Some(link) = wallet_link {
            delivery = delivery.via_link(link);
        }

        let request = RequestParams::SessionAuthenticate(SessionAuthenticateRequest {
            requester: Participant {
                public_key: requester_public_key,
                metadata: self.config.metadata.clone(),
            },
            auth_payload: payload,
            expiry_timestamp: now() + self.config.proposal_ttl.as_secs(),
        });

        if let Err(err) = self
            .send_request_with_id(&delivery, &response_topic, id, request)
            .await
        {
            self.auth_pending.take(&id.to_string())?;
            self.release_response_topic(&pending).await;
            self.kms.delete_key_pair(&requester_key);
            return Err(err);
        }

        let inner = Arc::downgrade(self);
        let window = self.config.authenticate_fallback_window;

        tokio::spawn(async move {
            tokio::time::sleep(window).await;

            let Some(inner) = inner.upgrade() else {
                return;
            };

            if let Err(err) = inner.authenticate_fallback(id, "no answer").await {
                warn!(%id, %err, "authenticate fallback failed");
            }
        });

        info!(%id, topic = %pairing_topic, "authenticate requested");

        Ok(ConnectResponse {
            uri,
            id,
            pairing_topic,
        })
    }

    /// Replaces an unanswered authenticate request with a session proposal on
    /// the same pairing. Does nothing once the request was settled either way.
    async fn authenticate_fallback(&self, id: MessageId, cause: &str) -> Result<(), SignError> {
        let Some(pending) = self.auth_pending.take(&id.to_string())? else {
            return Ok(());
        };

        info!(%id, cause, "falling back to a session proposal");

        self.release_response_topic(&pending).await;
        self.delete_key_pair(&pending.requester_public_key);

        let proposal = self
            .send_proposal(&pending.pairing_topic, pending.fallback)
            .await?;

        debug!(%id, proposal_id = %proposal.id, "fallback proposal sent");
        Ok(())
    }

    async fn release_response_topic(&self, pending: &PendingAuthenticate) {
        self.forget_topic(&pending.response_topic).await;
        self.kms.delete_agreement_key(&pending.response_topic);
    }

    /// Type 1 delivery of an answer to `requester`, sealed with a fresh key
    /// pair. Returns the delivery and our public key.
    fn authenticate_delivery(
        &self,
        requester: &Participant,
        transport: TransportType,
    ) -> Result<(Delivery, PubKey), SignError> {
        let peer_key = decode_public_key(&requester.public_key)?;

        let link = match transport {
            TransportType::Relay => None,
            TransportType::LinkMode => Some(
                requester
                    .metadata
                    .link_mode_universal()
                    .ok_or(LinkModeError::NoUniversalLink)?
                    .to_owned(),
            ),
        };

        let self_key = self.kms.create_key_pair();
        let session_topic = match self.kms.derive_session(&self_key, &peer_key) {
            Ok(topic) => topic,

            Err(err) => {
                self.kms.delete_key_pair(&self_key);
                return Err(err.into());
            }
        };

        let delivery = Delivery {
            topic: topic_from_key(&peer_key),
            key_topic: session_topic,
            sender_public_key: Some(self_key),
            link,
        };

        Ok((delivery, self_key))
    }

    /// Answers an authenticate request with an error that leaves no session
    /// behind.
    async fn reject_authenticate(
        &self,
        requester: &Participant,
        transport: TransportType,
        id: MessageId,
        reason: Reason,
        metadata: IrnMetadata,
    ) -> Result<(), SignError> {
        let (delivery, self_key) = self.authenticate_delivery(requester, transport)?;

        let sent = self
            .respond_error_with(
                &delivery,
                id,
                ResponseParamsError::SessionAuthenticate(reason.into()),
                metadata,
            )
            .await;

        self.kms.delete_sym_key(&delivery.key_topic);
        self.kms.delete_key_pair(&self_key);
        sent
    }

    pub(super) async fn on_session_authenticate(
        &self,
        received: &Received,
        id: MessageId,
        request: SessionAuthenticateRequest,
    ) -> Result<(), SignError> {
        let pairing = self.pairings.get(&received.topic.to_string())?;

        let supported = self.config.authenticate
            && pairing
                .as_ref()
                .and_then(|pairing| pairing.methods.as_ref())
                .is_some_and(|methods| methods.iter().any(|method| method == METHOD_SESSION_AUTHENTICATE));

        if !supported {
            info!(topic = %received.topic, %id, "authenticate unsupported, rejecting");

            return self
                .reject_authenticate(
                    &request.requester,
                    received.transport,
                    id,
                    Reason::MethodUnsupported,
                    IRN_AUTO_REJECT_METADATA,
                )
                .await;
        }

        if request.expiry_timestamp <= now() {
            debug!(topic = %received.topic, %id, "dropping expired authenticate request");
            return Ok(());
        }

        self.activate_pairing(&received.topic, Some(&request.requester.metadata))?;

        let verify_context = self
            .verifier
            .verify(&request.requester.metadata, None)
            .await;

        let auth_request = AuthRequest {
            id,
            pairing_topic: received.topic.clone(),
            requester: request.requester,
            payload: request.auth_payload,
            expiry: request.expiry_timestamp,
            verify_context,
            transport_type: received.transport,
        };

        self.auth_requests
            .set(id.to_string(), auth_request.clone())?;

        self.events.emit(SignEvent::SessionAuthenticateRequest {
            request: auth_request,
        });

        Ok(())
    }

    pub(super) async fn approve_session_authenticate(
        &self,
        id: MessageId,
        cacaos: Vec<Cacao>,
    ) -> Result<Session, SignError> {
        let key = id.to_string();

        let request = self
            .auth_requests
            .get(&key)?
            .ok_or(SignError::RequestNotFound(id))?;

        if request.is_expired(now()) {
            self.auth_requests.take(&key)?;
            return Err(SignError::RequestExpired(id));
        }

        for cacao in &cacaos {
            self.cacao_verifier.verify(cacao).await?;
        }

        let namespaces = namespaces_from_cacaos(&cacaos, &session_events())?;

        let request = self
            .auth_requests
            .take(&key)?
            .ok_or(SignError::RequestNotFound(id))?;

        let (delivery, self_key) = match self.authenticate_delivery(&request.requester, request.transport_type) {
            Ok(delivery) => delivery,

            Err(err) => {
                self.auth_requests.set(key, request)?;
                return Err(err);
            }
        };

        let topic = delivery.key_topic.clone();
        let self_participant = Participant {
            public_key: hex::encode(self_key),
            metadata: self.config.metadata.clone(),
        };

        let answered = match self.relay.subscribe(topic.clone()).await {
            Ok(_) => {
                self.respond(
                    &delivery,
                    id,
                    ResponseParamsSuccess::SessionAuthenticate(SessionAuthenticateResponse {
                        cacaos,
                        responder: self_participant.clone(),
                    }),
                )
                .await
            }

            Err(err) => Err(err.into()),
        };

        // Until the answer is out the request stays answerable.
        if let Err(err) = answered {
            warn!(%topic, %id, %err, "failed to answer authenticate request, rolling back");

            self.discard_session(&topic, &self_key).await;
            self.auth_requests.set(key, request)?;
            return Err(err);
        }

        let session = Session {
            topic: topic.clone(),
            pairing_topic: request.pairing_topic.clone(),
            controller_key: self_participant.public_key.clone(),
            self_participant,
            peer_participant: request.requester.clone(),
            namespaces,
            required_namespaces: ProposeNamespaces::default(),
            session_properties: None,
            scoped_properties: None,
            acknowledged: true,
            expiry: now() + self.config.session_ttl.as_secs(),
            transport_type: request.transport_type,
        };

        let stored = self
            .sessions
            .set(topic.to_string(), session.clone())
            .map_err(SignError::from)
            .and_then(|()| self.activate_pairing(&request.pairing_topic, Some(&request.requester.metadata)));

        if let Err(err) = stored {
            warn!(%topic, %id, %err, "failed to store authenticated session, rolling back");
            self.discard_session(&topic, &self_key).await;
            return Err(err);
        }

        info!(%topic, %id, "authenticate approved");
        Ok(session)
    }

    pub(super) async fn reject_session_authenticate(&self, id: MessageId, reason: Reason) -> Result<(), SignError> {
        let request = self
            .auth_requests
            .take(&id.to_string())?
            .ok_or(SignError::RequestNotFound(id))?;

        info!(%id, code = reason.code(), "rejecting authenticate request");

        self.reject_authenticate(
            &request.requester,
            request.transport_type,
            id,
            reason,
            IRN_REJECT_METADATA,
        )
        .await
    }

    pub(super) async fn on_session_authenticate_response(
        &self,
        received: &Received,
        id: MessageId,
        request: SessionAuthenticateRequest,
        result: Result<Value, ErrorParams>,
    ) -> Result<(), SignError> {
        let response = match result {
            Err(reason) if reason.code == Some(Reason::MethodUnsupported.code()) => {
                return self
                    .authenticate_fallback(id, "wallet does not support authenticate")
                    .await;
            }

            Err(reason) => {
                info!(%id, code = ?reason.code, "authenticate rejected by peer");

                if let Some(pending) = self.auth_pending.take(&id.to_string())? {
                    self.fail_authenticate(pending, reason).await;
                }

                return Ok(());
            }

            Ok(value) => serde_json::from_value::<SessionAuthenticateResponse>(value)?,
        };

        let Some(pending) = self.auth_pending.take(&id.to_string())? else {
            debug!(%id, "authenticate answered after falling back");
            return Ok(());
        };

        let namespaces = match self.verify_cacaos(&response.cacaos).await {
            Ok(namespaces) => namespaces,

            Err(err) => {
                warn!(%id, %err, "authenticate answer carries invalid CACAOs");

                self.fail_authenticate(pending, ErrorParams {
                    code: None,
                    message: Some(err.to_string()),
                })
                .await;

                return Ok(());
            }
        };

        let self_key = decode_public_key(&pending.requester_public_key)?;
        let peer_key = match received.sender_public_key {
            Some(key) => key,
            None => decode_public_key(&response.responder.public_key)?,
        };

        let topic = self.kms.derive_session(&self_key, &peer_key)?;
        self.relay.subscribe(topic.clone()).await?;

        let responder = response.responder;
        let session = Session {
            topic: topic.clone(),
            pairing_topic: pending.pairing_topic.clone(),
            self_participant: request.requester,
            peer_participant: responder.clone(),
            controller_key: responder.public_key.clone(),
            namespaces,
            required_namespaces: ProposeNamespaces::default(),
            session_properties: None,
            scoped_properties: None,
            acknowledged: true,
            expiry: now() + self.config.session_ttl.as_secs(),
            transport_type: received.transport,
        };

        self.sessions.set(topic.to_string(), session.clone())?;

        if received.via_relay() {
            if let Some(link) = responder.metadata.link_mode_universal() {
                debug!(%topic, link, "peer link mode support proven");
                self.proven_links.prove(link);
            }
        }

        self.release_response_topic(&pending).await;
        self.activate_pairing(&pending.pairing_topic, Some(&responder.metadata))?;

        info!(%topic, %id, "authenticated");
        self.events.emit(SignEvent::SessionAuthenticated {
            session,
            cacaos: response.cacaos,
        });

        Ok(())
    }

    async fn verify_cacaos(&self, cacaos: &[Cacao]) -> Result<SettleNamespaces, SignError> {
        for cacao in cacaos {
            self.cacao_verifier.verify(cacao).await?;
        }

        Ok(namespaces_from_cacaos(cacaos, &session_events())?)
    }

    async fn fail_authenticate(&self, pending: PendingAuthenticate, reason: ErrorParams) {
        self.release_response_topic(&pending).await;
        self.delete_key_pair(&pending.requester_public_key);

        self.events.emit(SignEvent::AuthenticateRejected {
            id: pending.id,
            reason,
        });
    }
}
