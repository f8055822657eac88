use {
    super::Inner,
    crate::{error::SignError, events::SignEvent, types::now},
    std::{sync::Weak, time::Duration},
    tokio::time::{Instant, MissedTickBehavior},
    tracing::{debug, info, warn},
};

/// Periodically removes expired records until the client is dropped. The
/// first sweep runs one period after start.
pub(super) async fn expiry_loop(inner: Weak<Inner>, period: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let Some(inner) = inner.upgrade() else {
            break;
        };

        if let Err(err) = inner.sweep_expired().await {
            warn!(%err, "expiry sweep failed");
        }
    }
}

impl Inner {
    async fn sweep_expired(&self) -> Result<(), SignError> {
        let now = now();

        for session in self.sessions.take_where(|session| session.is_expired(now))? {
            info!(topic = %session.topic, "session expired");

            self.release_session(&session).await?;
            self.events.emit(SignEvent::SessionExpired {
                topic: session.topic,
            });
        }

        for pairing in self.pairings.take_where(|pairing| pairing.expiry <= now)? {
            info!(topic = %pairing.topic, "pairing expired");

            self.forget_topic(&pairing.topic).await;
            self.events.emit(SignEvent::PairingExpired {
                topic: pairing.topic,
            });
        }

        for proposal in self.proposals.take_where(|proposal| proposal.is_expired(now))? {
            debug!(id = %proposal.id, "proposal expired");

            self.verify_contexts.take(&proposal.id.to_string())?;
            self.events.emit(SignEvent::ProposalExpired { proposal });
        }

        for request in self.requests.take_where(|request| request.is_expired(now))? {
            debug!(id = %request.id, topic = %request.topic, "session request expired");
        }

        for request in self.auth_requests.take_where(|request| request.is_expired(now))? {
            debug!(id = %request.id, "authenticate request expired");
        }

        Ok(())
    }
}
