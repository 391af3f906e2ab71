use serde::Deserialize;
use socialcredit_types::{STORE_RETRY_ATTEMPTS, STORE_RETRY_BACKOFF_MS};
use std::{future::Future, time::Duration};
use tracing::warn;

use crate::store::{Store, StoreError};

/// Bounded retry budget applied to every store operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: STORE_RETRY_ATTEMPTS,
            backoff_ms: STORE_RETRY_BACKOFF_MS,
        }
    }
}

/// Store decorator that retries transient failures with a fixed backoff.
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: Store> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn run<T, F, Fut>(
        &self,
        op: &'static str,
        key: &str,
        mut attempt_op: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match attempt_op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(op, key, attempt, attempts, %err, "store operation failed, retrying");
                    tokio::time::sleep(self.policy.backoff()).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(op, key, attempt, %err, "store operation failed");
                    return Err(err);
                }
            }
        }
    }
}

impl<S: Store> Store for Retrying<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.run("get", key, || self.inner.get(key)).await
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.run("set", key, || self.inner.set(key, value.clone(), ttl))
            .await
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        self.run("incr", key, || self.inner.incr(key, ttl)).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.run("exists", key, || self.inner.exists(key)).await
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.run("keys", prefix, || self.inner.keys(prefix)).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.run("delete", key, || self.inner.delete(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::Memory;
    use std::sync::Arc;

    fn retrying(memory: &Arc<Memory>) -> Retrying<Arc<Memory>> {
        Retrying::new(
            Arc::clone(memory),
            RetryPolicy {
                attempts: 3,
                backoff_ms: 10,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_within_budget() {
        let memory = Arc::new(Memory::default());
        memory.set("k", b"v".to_vec(), None).await.unwrap();
        memory.fail_reads(2);

        let store = retrying(&memory);
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(memory.read_attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget() {
        let memory = Arc::new(Memory::default());
        memory.fail_writes(3);

        let store = retrying(&memory);
        let err = store.set("k", b"v".to_vec(), None).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(memory.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_corrupt_records() {
        let memory = Arc::new(Memory::default());
        memory.corrupt_reads(1);

        let store = retrying(&memory);
        let err = store.get("k").await.unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(memory.read_attempts(), 1);
    }
}
