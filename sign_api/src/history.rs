//! Log of JSON-RPC requests and their responses, correlated by id and topic.

use {
    crate::{
        rpc::{Request, Response},
        storage::{KeyValueStorage, StorageError, Store},
    },
    relay_rpc::domain::{MessageId, Topic},
    serde::{Deserialize, Serialize},
    std::sync::Arc,
    tracing::debug,
};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Request already recorded: {0}")]
    Duplicate(MessageId),

    #[error("No request recorded for response: {0}")]
    NotFound(MessageId),

    #[error("Response {id} arrived on {actual}, request was sent on {expected}")]
    TopicMismatch {
        id: MessageId,
        expected: Topic,
        actual: Topic,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRecord {
    pub id: MessageId,
    pub topic: Topic,
    pub request: Request,
    pub response: Option<Response>,
}

#[derive(Debug)]
pub struct RpcHistory {
    records: Store<RpcRecord>,
}

impl RpcHistory {
    const STORAGE_KEY: &'static str = "wc@2:core:history";

    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            records: Store::new(storage, Self::STORAGE_KEY),
        }
    }

    fn key(topic: &Topic, id: MessageId) -> String {
        format!("{topic}:{id}")
    }

    /// Records a request sent or received on `topic`. A request id can only
    /// be recorded once per topic.
    pub fn set(&self, topic: &Topic, request: &Request) -> Result<(), HistoryError> {
        let record = RpcRecord {
            id: request.id,
            topic: topic.clone(),
            request: request.clone(),
            response: None,
        };

        if !self.records.insert_new(Self::key(topic, request.id), record)? {
            return Err(HistoryError::Duplicate(request.id));
        }

        Ok(())
    }

    pub fn get(&self, topic: &Topic, id: MessageId) -> Result<Option<RpcRecord>, HistoryError> {
        Ok(self.records.get(&Self::key(topic, id))?)
    }

    /// Attaches a response to its request.
    ///
    /// Returns `None` for a duplicate response to an already resolved request.
    pub fn resolve(&self, topic: &Topic, response: &Response) -> Result<Option<RpcRecord>, HistoryError> {
        let mut first = false;

        let updated = self.records.update(&Self::key(topic, response.id), |record| {
            if record.response.is_none() {
                record.response = Some(response.clone());
                first = true;
            }
        })?;

        let Some(record) = updated else {
            let elsewhere = self
                .records
                .all()?
                .into_iter()
                .find(|record| record.id == response.id);

            return Err(match elsewhere {
                Some(record) => HistoryError::TopicMismatch {
                    id: response.id,
                    expected: record.topic,
                    actual: topic.clone(),
                },
                None => HistoryError::NotFound(response.id),
            });
        };

        if !first {
            debug!(id = %response.id, %topic, "duplicate response ignored");
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Requests still waiting for a response.
    pub fn pending(&self) -> Result<Vec<RpcRecord>, HistoryError> {
        Ok(self
            .records
            .all()?
            .into_iter()
            .filter(|record| record.response.is_none())
            .collect())
    }

    pub fn delete(&self, topic: &Topic, id: MessageId) -> Result<Option<RpcRecord>, HistoryError> {
        Ok(self.records.take(&Self::key(topic, id))?)
    }

    /// Forgets everything recorded on `topic`.
    pub fn delete_topic(&self, topic: &Topic) -> Result<usize, HistoryError> {
        Ok(self.records.take_where(|record| &record.topic == topic)?.len())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            rpc::{RequestParams, ResponseParams, SessionPingRequest},
            storage::MemoryStorage,
        },
    };

    fn history() -> RpcHistory {
        RpcHistory::new(Arc::new(MemoryStorage::new()))
    }

    fn ping(id: u64) -> Request {
        Request::new(
            MessageId::new(id),
            RequestParams::SessionPing(SessionPingRequest::default()),
        )
    }

    fn pong(id: u64) -> Response {
        Response::new(MessageId::new(id), ResponseParams::Success(true.into()))
    }

    #[test]
    fn duplicate_requests_rejected() -> anyhow::Result<()> {
        let history = history();
        let topic = Topic::generate();

        history.set(&topic, &ping(1))?;
        assert!(matches!(
            history.set(&topic, &ping(1)),
            Err(HistoryError::Duplicate(_))
        ));

        // The same id on another topic is a different request.
        history.set(&Topic::generate(), &ping(1))?;

        Ok(())
    }

    #[test]
    fn concurrent_deliveries_recorded_once() {
        let history = history();
        let topic = Topic::generate();

        let recorded = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| history.set(&topic, &ping(7)).is_ok()))
                .collect();

            handles
                .into_iter()
                .map(|handle| matches!(handle.join(), Ok(true)))
                .filter(|recorded| *recorded)
                .count()
        });

        assert_eq!(recorded, 1);
    }

    #[test]
    fn resolve_requires_matching_topic() -> anyhow::Result<()> {
        let history = history();
        let topic = Topic::generate();
        history.set(&topic, &ping(1))?;

        assert!(matches!(
            history.resolve(&Topic::generate(), &pong(1)),
            Err(HistoryError::TopicMismatch { .. })
        ));
        assert!(matches!(
            history.resolve(&topic, &pong(2)),
            Err(HistoryError::NotFound(_))
        ));

        let record = history.resolve(&topic, &pong(1))?.expect("resolved");
        assert_eq!(record.response, Some(pong(1)));

        // Second delivery of the same response.
        assert_eq!(history.resolve(&topic, &pong(1))?, None);

        Ok(())
    }

    #[test]
    fn pending_and_topic_deletion() -> anyhow::Result<()> {
        let history = history();
        let first = Topic::generate();
        let second = Topic::generate();

        history.set(&first, &ping(1))?;
        history.set(&first, &ping(2))?;
        history.set(&second, &ping(3))?;
        history.resolve(&first, &pong(2))?;

        let mut pending: Vec<_> = history.pending()?.into_iter().map(|r| r.id).collect();
        pending.sort();
        assert_eq!(pending, vec![MessageId::new(1), MessageId::new(3)]);

        assert_eq!(history.delete_topic(&first)?, 2);
        assert_eq!(history.get(&first, MessageId::new(1))?, None);
        assert!(history.get(&second, MessageId::new(3))?.is_some());
        assert!(history.delete(&second, MessageId::new(3))?.is_some());

        Ok(())
    }
}
