use commonware_codec::{DecodeExt, Encode, Read};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Durable key-value store backing the ledger, inventories, the bank, and daily counters.
///
/// Every operation may fail transiently. The store provides no transactions; callers own the
/// atomicity of their read-modify-write cycles.
pub trait Store: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    /// Writes `value`, expiring it after `ttl` when set.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically increments a decimal counter, applying `ttl` when the key is created.
    fn incr(
        &self,
        key: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Lists every key starting with `prefix`.
    fn keys(&self, prefix: &str) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<S: Store> Store for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        S::get(self, key).await
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        S::set(self, key, value, ttl).await
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        S::incr(self, key, ttl).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        S::exists(self, key).await
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        S::keys(self, prefix).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        S::delete(self, key).await
    }
}

/// Reads and decodes a record, returning `None` when the key is absent.
pub async fn load<S, T>(store: &S, key: &str) -> Result<Option<T>, StoreError>
where
    S: Store,
    T: Read<Cfg = ()>,
{
    let Some(bytes) = store.get(key).await? else {
        return Ok(None);
    };
    T::decode(&mut bytes.as_slice())
        .map(Some)
        .map_err(|err| StoreError::Corrupt {
            key: key.to_string(),
            reason: err.to_string(),
        })
}

/// Encodes and writes a record without expiry.
pub async fn save<S, T>(store: &S, key: &str, value: &T) -> Result<(), StoreError>
where
    S: Store,
    T: Encode,
{
    store.set(key, value.encode().to_vec(), None).await
}

/// Parses a counter written by [Store::incr].
pub fn parse_counter(key: &str, bytes: &[u8]) -> Result<u64, StoreError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            reason: "counter is not a decimal integer".to_string(),
        })
}
