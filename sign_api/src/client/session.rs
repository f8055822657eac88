use {
    super::{inbound::Received, Inner},
    crate::{
        crypto::PubKey,
        error::{Reason, SignError},
        events::SignEvent,
        namespaces::{validate_required, validate_session_namespaces},
        router::{self, Route, RouterError},
        rpc::{
            ChainRequest,
            ErrorParams,
            Event,
            RequestParams,
            ResponseParamsError,
            ResponseParamsSuccess,
            SessionDeleteRequest,
            SessionEventRequest,
            SessionExtendRequest,
            SessionRequestRequest,
            SessionUpdateRequest,
            SettleNamespaces,
        },
        types::{now, PendingRequest, Session},
    },
    relay_rpc::domain::{MessageId, Topic},
    serde_json::Value,
    tracing::{debug, info, warn},
};

impl Inner {
    fn acknowledged_session(&self, topic: &Topic) -> Result<Session, SignError> {
        let session = self
            .sessions
            .get(&topic.to_string())?
            .ok_or_else(|| SignError::NoMatchingTopic(topic.clone()))?;

        if !session.acknowledged {
            return Err(SignError::SessionNotAcknowledged(topic.clone()));
        }

        Ok(session)
    }

    /// Session a received message belongs to. Messages on unknown topics are
    /// logged and ignored.
    fn received_session(&self, received: &Received) -> Result<Option<Session>, SignError> {
        let session = self.sessions.get(&received.topic.to_string())?;

        if session.is_none() {
            debug!(topic = %received.topic, "message for an unknown session");
        }

        Ok(session)
    }

    /// Removes a session with its subscription, keys, history and pending
    /// requests.
    pub(super) async fn delete_session(&self, topic: &Topic) -> Result<Option<Session>, SignError> {
        let Some(session) = self.sessions.take(&topic.to_string())? else {
            return Ok(None);
        };

        self.release_session(&session).await?;
        Ok(Some(session))
    }

    /// Undoes a session that was never settled: its record, subscription,
    /// keys and history. Runs every step even when one of them fails.
    pub(super) async fn discard_session(&self, topic: &Topic, self_key: &PubKey) {
        if let Err(err) = self.sessions.take(&topic.to_string()) {
            warn!(%topic, %err, "failed to remove session record");
        }

        self.forget_topic(topic).await;
        self.kms.delete_key_pair(self_key);
    }

    pub(super) async fn release_session(&self, session: &Session) -> Result<(), SignError> {
        self.forget_topic(&session.topic).await;
        self.delete_key_pair(&session.self_participant.public_key);

        let dropped = self
            .requests
            .take_where(|request| request.topic == session.topic)?;

        if !dropped.is_empty() {
            debug!(topic = %session.topic, count = dropped.len(), "dropped pending requests");
        }

        Ok(())
    }

    pub(super) async fn update(&self, topic: &Topic, namespaces: SettleNamespaces) -> Result<(), SignError> {
        let session = self.acknowledged_session(topic)?;

        if !session.is_controller() {
            return Err(SignError::Unauthorized);
        }

        validate_session_namespaces(&namespaces)?;
        validate_required(&session.required_namespaces, &namespaces)?;

        self.send_request(
            &self.session_delivery(&session)?,
            RequestParams::SessionUpdate(SessionUpdateRequest {
                namespaces: namespaces.clone(),
            }),
        )
        .await?;

        self.sessions
            .update(&topic.to_string(), |session| session.namespaces = namespaces)?;

        Ok(())
    }

    pub(super) async fn extend(&self, topic: &Topic) -> Result<u64, SignError> {
        let session = self.acknowledged_session(topic)?;

        if !session.is_controller() {
            return Err(SignError::Unauthorized);
        }

        let expiry = now() + self.config.session_ttl.as_secs();

        self.send_request(
            &self.session_delivery(&session)?,
            RequestParams::SessionExtend(SessionExtendRequest { expiry }),
        )
        .await?;

        self.sessions
            .update(&topic.to_string(), |session| session.expiry = expiry)?;

        Ok(expiry)
    }

    pub(super) async fn emit(&self, topic: &Topic, chain_id: &str, event: Event) -> Result<(), SignError> {
        let session = self.acknowledged_session(topic)?;

        let mut namespaces = session.namespaces.for_chain(chain_id).peekable();

        if namespaces.peek().is_none() {
            return Err(SignError::UnauthorizedChain(chain_id.to_owned()));
        }

        if !namespaces.any(|namespace| namespace.events.contains(&event.name)) {
            return Err(SignError::UnauthorizedEvent(event.name));
        }

        self.send_request(
            &self.session_delivery(&session)?,
            RequestParams::SessionEvent(SessionEventRequest {
                event,
                chain_id: chain_id.to_owned(),
            }),
        )
        .await?;

        Ok(())
    }

    pub(super) async fn request(
        &self,
        topic: &Topic,
        chain_id: &str,
        request: ChainRequest,
    ) -> Result<MessageId, SignError> {
        let session = self.acknowledged_session(topic)?;

        let mut namespaces = session.namespaces.for_chain(chain_id).peekable();

        if namespaces.peek().is_none() {
            return Err(SignError::UnauthorizedChain(chain_id.to_owned()));
        }

        if !namespaces.any(|namespace| namespace.methods.contains(&request.method)) {
            return Err(SignError::UnauthorizedMethod(request.method));
        }

        if let Some(expiry) = request.expiry_timestamp {
            if expiry <= now() {
                return Err(SignError::InvalidExpiry(expiry));
            }
        }

        match router::route(session.scoped_properties.as_ref(), chain_id, &request.method) {
            Route::Http(url) => {
                let id = self.id_generator.next();
                debug!(%topic, %id, %url, method = %request.method, "routing request to wallet service");

                let result = match self.wallet_services.send(url, id, &request).await {
                    Ok(result) => Ok(result),
                    Err(RouterError::Rpc { code, message }) => Err(ErrorParams {
                        code: Some(code),
                        message: Some(message),
                    }),
                    Err(err) => return Err(err.into()),
                };

                self.events.emit(SignEvent::SessionResponse {
                    topic: topic.clone(),
                    id,
                    result,
                });

                Ok(id)
            }

            Route::Relay => {
                self.send_request(
                    &self.session_delivery(&session)?,
                    RequestParams::SessionRequest(SessionRequestRequest {
                        request,
                        chain_id: chain_id.to_owned(),
                    }),
                )
                .await
            }
        }
    }

    pub(super) async fn respond_request(
        &self,
        topic: &Topic,
        id: MessageId,
        result: Result<Value, ErrorParams>,
    ) -> Result<(), SignError> {
        let key = id.to_string();

        match self.requests.get(&key)? {
            Some(pending) if pending.topic == *topic => {}
            _ => return Err(SignError::RequestNotFound(id)),
        }

        let session = self.acknowledged_session(topic)?;
        let delivery = self.session_delivery(&session)?;

        let pending = self
            .requests
            .take(&key)?
            .ok_or(SignError::RequestNotFound(id))?;

        if pending.is_expired(now()) {
            info!(%topic, %id, "answering expired request with an error");

            self.respond_error(
                &delivery,
                id,
                ResponseParamsError::SessionRequest(Reason::SessionRequestExpired.into()),
            )
            .await?;

            return Err(SignError::RequestExpired(id));
        }

        match result {
            Ok(value) => {
                self.respond(&delivery, id, ResponseParamsSuccess::SessionRequest(value))
                    .await
            }

            Err(error) => {
                self.respond_error(&delivery, id, ResponseParamsError::SessionRequest(error))
                    .await
            }
        }
    }

    pub(super) async fn disconnect(&self, topic: &Topic) -> Result<(), SignError> {
        let Some(session) = self.sessions.get(&topic.to_string())? else {
            if self.pairings.contains(&topic.to_string())? {
                return self.disconnect_pairing(topic).await;
            }

            return Err(SignError::NoMatchingTopic(topic.clone()));
        };

        let reason = Reason::UserDisconnected;
        let request = RequestParams::SessionDelete(SessionDeleteRequest {
            code: reason.code(),
            message: reason.message().to_owned(),
        });

        match self.session_delivery(&session) {
            Ok(delivery) => {
                if let Err(err) = self.send_request(&delivery, request).await {
                    warn!(%topic, %err, "failed to notify peer of session deletion");
                }
            }

            Err(err) => warn!(%topic, %err, "cannot reach peer to notify deletion"),
        }

        self.delete_session(topic).await?;

        info!(%topic, "session disconnected");
        Ok(())
    }

    pub(super) async fn on_session_update(
        &self,
        received: &Received,
        id: MessageId,
        request: SessionUpdateRequest,
    ) -> Result<(), SignError> {
        let Some(session) = self.received_session(received)? else {
            return Ok(());
        };

        let reply = self.reply_to(received)?;

        if session.is_controller() {
            return self
                .respond_error(
                    &reply,
                    id,
                    ResponseParamsError::SessionUpdate(Reason::UnauthorizedUpdateRequest.into()),
                )
                .await;
        }

        let validation = validate_session_namespaces(&request.namespaces)
            .and_then(|()| validate_required(&session.required_namespaces, &request.namespaces));

        if let Err(err) = validation {
            warn!(topic = %received.topic, %err, "rejecting session update");

            return self
                .respond_error(
                    &reply,
                    id,
                    ResponseParamsError::SessionUpdate(Reason::from(&err).into()),
                )
                .await;
        }

        self.sessions.update(&received.topic.to_string(), |session| {
            session.namespaces = request.namespaces.clone();
        })?;

        self.respond(&reply, id, ResponseParamsSuccess::SessionUpdate(true))
            .await?;

        self.events.emit(SignEvent::SessionUpdated {
            topic: received.topic.clone(),
            namespaces: request.namespaces,
        });

        Ok(())
    }

    pub(super) async fn on_session_extend(
        &self,
        received: &Received,
        id: MessageId,
        request: SessionExtendRequest,
    ) -> Result<(), SignError> {
        let Some(session) = self.received_session(received)? else {
            return Ok(());
        };

        let reply = self.reply_to(received)?;

        if session.is_controller() {
            return self
                .respond_error(
                    &reply,
                    id,
                    ResponseParamsError::SessionExtend(Reason::UnauthorizedExtendRequest.into()),
                )
                .await;
        }

        let expiry = request
            .expiry
            .min(now() + self.config.session_ttl.as_secs())
            .max(session.expiry);

        self.sessions
            .update(&received.topic.to_string(), |session| session.expiry = expiry)?;

        self.respond(&reply, id, ResponseParamsSuccess::SessionExtend(true))
            .await?;

        self.events.emit(SignEvent::SessionExtended {
            topic: received.topic.clone(),
            expiry,
        });

        Ok(())
    }

    pub(super) async fn on_session_event(
        &self,
        received: &Received,
        id: MessageId,
        request: SessionEventRequest,
    ) -> Result<(), SignError> {
        let Some(session) = self.received_session(received)? else {
            return Ok(());
        };

        let reply = self.reply_to(received)?;

        let authorized = session
            .namespaces
            .for_chain(&request.chain_id)
            .any(|namespace| namespace.events.contains(&request.event.name));

        if !authorized {
            warn!(topic = %received.topic, event = %request.event.name, "rejecting unauthorized event");

            return self
                .respond_error(
                    &reply,
                    id,
                    ResponseParamsError::SessionEvent(Reason::UnsupportedEvents.into()),
                )
                .await;
        }

        self.respond(&reply, id, ResponseParamsSuccess::SessionEvent(true))
            .await?;

        self.events.emit(SignEvent::SessionEvent {
            topic: received.topic.clone(),
            chain_id: request.chain_id,
            event: request.event,
        });

        Ok(())
    }

    pub(super) async fn on_session_request(
        &self,
        received: &Received,
        id: MessageId,
        request: SessionRequestRequest,
    ) -> Result<(), SignError> {
        let Some(session) = self.received_session(received)? else {
            return Ok(());
        };

        let reply = self.reply_to(received)?;

        let pending = PendingRequest {
            id,
            topic: received.topic.clone(),
            chain_id: request.chain_id,
            request: request.request,
        };

        if pending.is_expired(now()) {
            info!(topic = %received.topic, %id, "request expired before it arrived");

            return self
                .respond_error(
                    &reply,
                    id,
                    ResponseParamsError::SessionRequest(Reason::SessionRequestExpired.into()),
                )
                .await;
        }

        let rejection = {
            let mut namespaces = session.namespaces.for_chain(&pending.chain_id).peekable();

            if namespaces.peek().is_none() {
                Some(Reason::UnsupportedChains)
            } else if !namespaces.any(|namespace| namespace.methods.contains(&pending.request.method)) {
                Some(Reason::UnsupportedMethods)
            } else {
                None
            }
        };

        if let Some(reason) = rejection {
            warn!(topic = %received.topic, %id, method = %pending.request.method, "rejecting unauthorized request");

            return self
                .respond_error(&reply, id, ResponseParamsError::SessionRequest(reason.into()))
                .await;
        }

        self.requests.set(id.to_string(), pending.clone())?;

        let context = self
            .verifier
            .verify(&session.peer_participant.metadata, None)
            .await;

        self.events.emit(SignEvent::SessionRequest {
            request: pending,
            context,
        });

        Ok(())
    }

    pub(super) fn on_session_request_response(
        &self,
        received: &Received,
        id: MessageId,
        result: Result<Value, ErrorParams>,
    ) {
        self.events.emit(SignEvent::SessionResponse {
            topic: received.topic.clone(),
            id,
            result,
        });
    }

    pub(super) async fn on_session_delete(
        &self,
        received: &Received,
        id: MessageId,
        request: SessionDeleteRequest,
    ) -> Result<(), SignError> {
        if self.received_session(received)?.is_none() {
            return Ok(());
        }

        self.respond(
            &self.reply_to(received)?,
            id,
            ResponseParamsSuccess::SessionDelete(true),
        )
        .await?;

        self.delete_session(&received.topic).await?;

        info!(topic = %received.topic, code = request.code, "session deleted by peer");

        self.events.emit(SignEvent::SessionDeleted {
            topic: received.topic.clone(),
            reason: ErrorParams {
                code: Some(request.code),
                message: Some(request.message),
            },
        });

        Ok(())
    }

    pub(super) async fn on_session_ping(&self, received: &Received, id: MessageId) -> Result<(), SignError> {
        if self.received_session(received)?.is_none() {
            return Ok(());
        }

        self.respond(
            &self.reply_to(received)?,
            id,
            ResponseParamsSuccess::SessionPing(true),
        )
        .await
    }
}
