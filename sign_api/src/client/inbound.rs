use {
    super::{networking::Delivery, Inner},
    crate::{
        crypto::PubKey,
        error::SignError,
        history::HistoryError,
        rpc::{ErrorParams, Payload, Request, RequestParams, Response, ResponseParams},
        types::TransportType,
    },
    relay_client::PublishedMessage,
    relay_rpc::domain::Topic,
    std::sync::{Arc, Weak},
    tokio::sync::mpsc::UnboundedReceiver,
    tracing::{debug, warn},
};

/// An encrypted envelope waiting to be handled.
#[derive(Debug, Clone)]
pub(super) struct Inbound {
    pub topic: Topic,
    pub message: Arc<str>,
    pub transport: TransportType,
}

/// Context of a decrypted inbound message.
#[derive(Debug, Clone)]
pub(super) struct Received {
    pub topic: Topic,
    pub transport: TransportType,
    pub sender_public_key: Option<PubKey>,
}

impl Received {
    pub fn via_relay(&self) -> bool {
        self.transport == TransportType::Relay
    }
}

/// Handles relay messages and link envelopes one at a time.
pub(super) async fn inbound_loop(
    inner: Weak<Inner>,
    mut relay_rx: UnboundedReceiver<PublishedMessage>,
    mut link_rx: UnboundedReceiver<Inbound>,
) {
    loop {
        let inbound = tokio::select! {
            Some(message) = relay_rx.recv() => {
                if !Payload::irn_tag_in_range(message.tag) {
                    debug!(topic = %message.topic, tag = message.tag, "dropping message with foreign tag");
                    continue;
                }

                Inbound {
                    topic: message.topic,
                    message: message.message,
                    transport: TransportType::Relay,
                }
            }

            Some(inbound) = link_rx.recv() => inbound,

            else => break,
        };

        let Some(inner) = inner.upgrade() else {
            break;
        };

        inner.handle_inbound(inbound).await;
    }
}

impl Inner {
    async fn handle_inbound(&self, inbound: Inbound) {
        let Inbound {
            topic,
            message,
            transport,
        } = inbound;

        let opened = match self.kms.open(&topic, &message) {
            Ok(opened) => opened,

            Err(err) => {
                warn!(%topic, %err, "dropping undecryptable message");
                return;
            }
        };

        let payload = match serde_json::from_str::<Payload>(&opened.message) {
            Ok(payload) => payload,

            Err(err) => {
                warn!(%topic, %err, "dropping malformed message");
                return;
            }
        };

        if let Err(err) = payload.validate() {
            warn!(%topic, %err, "dropping invalid message");
            return;
        }

        let received = Received {
            topic,
            transport,
            sender_public_key: opened.sender_public_key,
        };

        let id = payload.id();
        let result = match payload {
            Payload::Request(request) => self.on_request(&received, request).await,
            Payload::Response(response) => self.on_response(&received, response).await,
        };

        if let Err(err) = result {
            warn!(topic = %received.topic, %id, %err, "failed to handle message");
        }
    }

    async fn on_request(&self, received: &Received, request: Request) -> Result<(), SignError> {
        match self.history.set(&received.topic, &request) {
            Ok(()) => {}

            Err(HistoryError::Duplicate(id)) => {
                debug!(topic = %received.topic, %id, "dropping duplicate request");
                return Ok(());
            }

            Err(err) => return Err(err.into()),
        }

        self.activate_pairing(&received.topic, None)?;

        if !received.via_relay() {
            self.mark_link_mode(&received.topic)?;
        }

        let Request { id, params, .. } = request;
        debug!(topic = %received.topic, %id, method = params.method(), "request received");

        match params {
            RequestParams::SessionPropose(params) => self.on_session_propose(received, id, params).await,
            RequestParams::SessionSettle(params) => self.on_session_settle(received, id, params).await,
            RequestParams::SessionUpdate(params) => self.on_session_update(received, id, params).await,
            RequestParams::SessionExtend(params) => self.on_session_extend(received, id, params).await,
            RequestParams::SessionRequest(params) => self.on_session_request(received, id, params).await,
            RequestParams::SessionEvent(params) => self.on_session_event(received, id, params).await,
            RequestParams::SessionDelete(params) => self.on_session_delete(received, id, params).await,
            RequestParams::SessionPing(_) => self.on_session_ping(received, id).await,
            RequestParams::SessionAuthenticate(params) => {
                self.on_session_authenticate(received, id, params).await
            }
            RequestParams::PairingDelete(_) => self.on_pairing_delete(received, id).await,
            RequestParams::PairingPing(_) => self.on_pairing_ping(received, id).await,
            RequestParams::PairingExtend(params) => self.on_pairing_extend(received, id, params).await,
        }
    }

    async fn on_response(&self, received: &Received, response: Response) -> Result<(), SignError> {
        let Some(record) = self.history.resolve(&received.topic, &response)? else {
            return Ok(());
        };

        self.activate_pairing(&received.topic, None)?;

        let id = record.id;
        let result = match response.params {
            ResponseParams::Success(value) => Ok(value),
            ResponseParams::Err(value) => Err(serde_json::from_value::<ErrorParams>(value)?),
        };

        debug!(
            topic = %received.topic,
            %id,
            method = record.request.params.method(),
            success = result.is_ok(),
            "response received"
        );

        match record.request.params {
            RequestParams::SessionPropose(params) => {
                self.on_session_propose_response(id, params, result).await
            }
            RequestParams::SessionSettle(_) => {
                self.on_session_settle_response(received, result).await
            }
            RequestParams::SessionRequest(_) => {
                self.on_session_request_response(received, id, result);
                Ok(())
            }
            RequestParams::SessionPing(_) | RequestParams::PairingPing(_) => {
                self.on_ping_response(id, result);
                Ok(())
            }
            RequestParams::SessionAuthenticate(params) => {
                self.on_session_authenticate_response(received, id, params, result)
                    .await
            }
            RequestParams::SessionUpdate(_)
            | RequestParams::SessionExtend(_)
            | RequestParams::SessionEvent(_)
            | RequestParams::SessionDelete(_)
            | RequestParams::PairingDelete(_)
            | RequestParams::PairingExtend(_) => {
                if let Err(err) = result {
                    warn!(
                        topic = %received.topic,
                        %id,
                        code = ?err.code,
                        message = ?err.message,
                        "peer rejected request"
                    );
                }

                Ok(())
            }
        }
    }

    /// The delivery for answering a received request.
    pub(super) fn reply_to(&self, received: &Received) -> Result<Delivery, SignError> {
        if received.via_relay() {
            Ok(Delivery::relay(received.topic.clone()))
        } else {
            self.delivery_for(&received.topic)
        }
    }
}
