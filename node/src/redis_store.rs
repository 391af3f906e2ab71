use redis::{aio::ConnectionManager, AsyncCommands};
use socialcredit_execution::{Store, StoreError};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

const SCAN_BATCH: usize = 500;

/// Ledger store on redis. Every key is namespaced under a fixed prefix.
pub struct RedisStore {
    client: redis::Client,
    connection: Mutex<Option<ConnectionManager>>,
    prefix: String,
}

impl RedisStore {
    pub fn new(url: &str, prefix: impl Into<String>) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            prefix: prefix.into(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Returns a handle to the shared connection, connecting on first use.
    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref() {
            return Ok(connection.clone());
        }
        let connection = self
            .client
            .get_connection_manager()
            .await
            .map_err(|err| unavailable("connect", err))?;
        *guard = Some(connection.clone());
        Ok(connection)
    }

    /// Drops the cached connection so the next operation reconnects.
    async fn reset(&self, op: &'static str, err: redis::RedisError) -> StoreError {
        warn!(op, %err, "redis operation failed");
        if err.is_connection_dropped() || err.is_io_error() {
            *self.connection.lock().await = None;
        }
        unavailable(op, err)
    }

    /// Issues one PING so startup fails fast on a bad address.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        match result {
            Ok(_) => Ok(()),
            Err(err) => Err(self.reset("ping", err).await),
        }
    }
}

fn unavailable(op: &str, err: redis::RedisError) -> StoreError {
    StoreError::Unavailable(format!("redis {op}: {err}"))
}

/// Builds a SCAN pattern matching every key that starts with `prefix`.
fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('*');
    pattern
}

impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<Option<Vec<u8>>> = conn.get(self.key(key)).await;
        match result {
            Ok(value) => Ok(value),
            Err(err) => Err(self.reset("get", err).await),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let full_key = self.key(key);
        let result: redis::RedisResult<()> = match ttl {
            Some(ttl) => conn.set_ex(full_key, value, ttl.as_secs().max(1)).await,
            None => conn.set(full_key, value).await,
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) => Err(self.reset("set", err).await),
        }
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        let full_key = self.key(key);
        let result: redis::RedisResult<u64> = conn.incr(&full_key, 1u64).await;
        let value = match result {
            Ok(value) => value,
            Err(err) => return Err(self.reset("incr", err).await),
        };
        if value == 1 {
            let seconds = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
            let result: redis::RedisResult<bool> = conn.expire(&full_key, seconds).await;
            if let Err(err) = result {
                return Err(self.reset("expire", err).await);
            }
        }
        Ok(value)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<bool> = conn.exists(self.key(key)).await;
        match result {
            Ok(exists) => Ok(exists),
            Err(err) => Err(self.reset("exists", err).await),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection().await?;
        let pattern = scan_pattern(&self.key(prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let result: redis::RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await;
            let (next, batch) = match result {
                Ok(page) => page,
                Err(err) => return Err(self.reset("scan", err).await),
            };
            keys.extend(
                batch
                    .into_iter()
                    .filter_map(|key| key.strip_prefix(&self.prefix).map(str::to_string)),
            );
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let result: redis::RedisResult<()> = conn.del(self.key(key)).await;
        match result {
            Ok(()) => Ok(()),
            Err(err) => Err(self.reset("del", err).await),
        }
    }
}
