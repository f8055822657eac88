use {
    crate::{
        auth::Cacao,
        rpc::{ErrorParams, Event, SettleNamespaces},
        types::{AuthRequest, PendingRequest, Proposal, Session},
        verify::VerifyContext,
    },
    parking_lot::Mutex,
    relay_rpc::domain::{MessageId, Topic},
    serde_json::Value,
    tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};

/// Notifications produced by the Sign client, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum SignEvent {
    ProposalReceived {
        proposal: Proposal,
        context: VerifyContext,
    },
    ProposalExpired {
        proposal: Proposal,
    },
    SessionSettled(Session),
    SessionRejected {
        proposal_id: MessageId,
        reason: ErrorParams,
    },
    SessionUpdated {
        topic: Topic,
        namespaces: SettleNamespaces,
    },
    SessionExtended {
        topic: Topic,
        expiry: u64,
    },
    SessionEvent {
        topic: Topic,
        chain_id: String,
        event: Event,
    },
    SessionDeleted {
        topic: Topic,
        reason: ErrorParams,
    },
    SessionExpired {
        topic: Topic,
    },
    SessionRequest {
        request: PendingRequest,
        context: VerifyContext,
    },
    SessionResponse {
        topic: Topic,
        id: MessageId,
        result: Result<Value, ErrorParams>,
    },
    SessionAuthenticateRequest {
        request: AuthRequest,
    },
    SessionAuthenticated {
        session: Session,
        cacaos: Vec<Cacao>,
    },
    AuthenticateRejected {
        id: MessageId,
        reason: ErrorParams,
    },
    PairingDeleted {
        topic: Topic,
    },
    PairingExpired {
        topic: Topic,
    },
}

/// Fans events out to any number of subscribers. Closed receivers are
/// dropped on the next emit.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<UnboundedSender<SignEvent>>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self) -> UnboundedReceiver<SignEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: SignEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_in_order() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let topic = Topic::generate();
        bus.emit(SignEvent::PairingExpired {
            topic: topic.clone(),
        });
        bus.emit(SignEvent::PairingDeleted {
            topic: topic.clone(),
        });

        for rx in [&mut first, &mut second] {
            assert!(matches!(rx.recv().await, Some(SignEvent::PairingExpired { .. })));
            assert!(matches!(rx.recv().await, Some(SignEvent::PairingDeleted { .. })));
        }

        drop(first);
        bus.emit(SignEvent::SessionExpired { topic });
        assert_eq!(bus.subscribers.lock().len(), 1);
        assert!(matches!(second.recv().await, Some(SignEvent::SessionExpired { .. })));
    }
}
