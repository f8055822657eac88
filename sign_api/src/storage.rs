//! Persistence contract and typed collections on top of it.

use {
    dashmap::DashMap,
    parking_lot::Mutex,
    serde::{de::DeserializeOwned, Serialize},
    serde_json::Value,
    std::{
        collections::{btree_map::Entry, BTreeMap},
        marker::PhantomData,
        sync::Arc,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to (de)serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

/// Key-value persistence provided by the application.
pub trait KeyValueStorage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory [`KeyValueStorage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: DashMap<String, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.get(key).map(|value| value.clone()))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.values.insert(key.to_owned(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.values.remove(key);
        Ok(())
    }
}

/// A typed collection stored as one JSON object under `key`.
///
/// Every operation is a read-modify-write under the collection lock, so two
/// callers can never both [`take`](Store::take) the same record.
pub struct Store<T> {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
    lock: Mutex<()>,
    _record: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("key", &self.key).finish_non_exhaustive()
    }
}

impl<T> Store<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            lock: Mutex::new(()),
            _record: PhantomData,
        }
    }

    fn load(&self) -> Result<BTreeMap<String, T>, StorageError> {
        match self.storage.get(&self.key)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(BTreeMap::new()),
        }
    }

    fn save(&self, records: &BTreeMap<String, T>) -> Result<(), StorageError> {
        self.storage.set(&self.key, serde_json::to_value(records)?)
    }

    pub fn get(&self, id: &str) -> Result<Option<T>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(id))
    }

    pub fn contains(&self, id: &str) -> Result<bool, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.load()?.contains_key(id))
    }

    pub fn all(&self) -> Result<Vec<T>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.load()?.into_values().collect())
    }

    pub fn set(&self, id: impl Into<String>, record: T) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut records = self.load()?;
        records.insert(id.into(), record);
        self.save(&records)
    }

    /// Stores a record unless one already exists under `id`. Returns whether
    /// it was stored.
    pub fn insert_new(&self, id: impl Into<String>, record: T) -> Result<bool, StorageError> {
        let _guard = self.lock.lock();
        let mut records = self.load()?;

        match records.entry(id.into()) {
            Entry::Occupied(_) => Ok(false),

            Entry::Vacant(entry) => {
                entry.insert(record);
                self.save(&records)?;
                Ok(true)
            }
        }
    }

    /// Removes and returns a record.
    pub fn take(&self, id: &str) -> Result<Option<T>, StorageError> {
        let _guard = self.lock.lock();
        let mut records = self.load()?;
        let record = records.remove(id);

        if record.is_some() {
            self.save(&records)?;
        }

        Ok(record)
    }

    /// Applies `f` to a stored record and returns the updated copy.
    pub fn update(&self, id: &str, f: impl FnOnce(&mut T)) -> Result<Option<T>, StorageError>
    where
        T: Clone,
    {
        let _guard = self.lock.lock();
        let mut records = self.load()?;

        let Some(record) = records.get_mut(id) else {
            return Ok(None);
        };

        f(record);
        let updated = record.clone();
        self.save(&records)?;

        Ok(Some(updated))
    }

    /// Removes and returns every record matching `predicate`.
    pub fn take_where(&self, mut predicate: impl FnMut(&T) -> bool) -> Result<Vec<T>, StorageError> {
        let _guard = self.lock.lock();
        let records = self.load()?;

        let (taken, kept): (BTreeMap<_, _>, BTreeMap<_, _>) =
            records.into_iter().partition(|(_, record)| predicate(record));

        if !taken.is_empty() {
            self.save(&kept)?;
        }

        Ok(taken.into_values().collect())
    }
}
