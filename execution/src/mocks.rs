//! In-memory collaborators for tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, MutexGuard,
    },
    time::Duration,
};

use crate::{
    clock::Clock,
    entropy::{Entropy, SeededEntropy},
    ledger::{AuditRecord, AuditSink, OperatorAlert},
    store::{Store, StoreError},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
struct MemoryState {
    data: HashMap<String, Vec<u8>>,
    ttls: HashMap<String, Duration>,
    fail_reads: u32,
    fail_writes: u32,
    fail_key_writes: HashMap<String, u32>,
    corrupt_reads: u32,
    read_attempts: u64,
}

/// Store backed by a hash map, with injectable failures.
///
/// TTLs are recorded but never enforced.
#[derive(Default)]
pub struct Memory {
    state: Mutex<MemoryState>,
}

impl Memory {
    /// Fails the next `n` read operations with [StoreError::Unavailable].
    pub fn fail_reads(&self, n: u32) {
        lock(&self.state).fail_reads = n;
    }

    /// Fails the next `n` write operations with [StoreError::Unavailable].
    pub fn fail_writes(&self, n: u32) {
        lock(&self.state).fail_writes = n;
    }

    /// Fails the next `n` writes to `key` only.
    pub fn fail_writes_to(&self, key: &str, n: u32) {
        lock(&self.state).fail_key_writes.insert(key.to_string(), n);
    }

    /// Fails the next `n` reads with [StoreError::Corrupt].
    pub fn corrupt_reads(&self, n: u32) {
        lock(&self.state).corrupt_reads = n;
    }

    pub fn read_attempts(&self) -> u64 {
        lock(&self.state).read_attempts
    }

    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        lock(&self.state).ttls.get(key).copied()
    }

    fn read_gate(&self, key: &str) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let mut state = lock(&self.state);
        state.read_attempts += 1;
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        if state.corrupt_reads > 0 {
            state.corrupt_reads -= 1;
            return Err(StoreError::Corrupt {
                key: key.to_string(),
                reason: "injected corruption".to_string(),
            });
        }
        Ok(state)
    }

    fn write_gate(&self, key: &str) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let mut state = lock(&self.state);
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        if let Some(remaining) = state.fail_key_writes.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Unavailable(format!("injected write failure on {key}")));
            }
        }
        Ok(state)
    }
}

impl Store for Memory {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let state = self.read_gate(key)?;
        Ok(state.data.get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut state = self.write_gate(key)?;
        state.data.insert(key.to_string(), value);
        match ttl {
            Some(ttl) => state.ttls.insert(key.to_string(), ttl),
            None => state.ttls.remove(key),
        };
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut state = self.write_gate(key)?;
        let current = match state.data.get(key).cloned() {
            Some(bytes) => crate::store::parse_counter(key, &bytes)?,
            None => {
                state.ttls.insert(key.to_string(), ttl);
                0
            }
        };
        let next = current + 1;
        state
            .data
            .insert(key.to_string(), next.to_string().into_bytes());
        Ok(next)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let state = self.read_gate(key)?;
        Ok(state.data.contains_key(key))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let state = self.read_gate(prefix)?;
        let mut keys: Vec<String> = state
            .data
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.write_gate(key)?;
        state.data.remove(key);
        state.ttls.remove(key);
        Ok(())
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Entropy that replays queued outcomes before falling back to a seeded stream.
pub struct ScriptedEntropy {
    flips: Mutex<VecDeque<bool>>,
    values: Mutex<VecDeque<u64>>,
    fallback: SeededEntropy,
}

impl ScriptedEntropy {
    pub fn new() -> Self {
        Self {
            flips: Mutex::new(VecDeque::new()),
            values: Mutex::new(VecDeque::new()),
            fallback: SeededEntropy::from_seed(0),
        }
    }

    pub fn push_flips(&self, flips: impl IntoIterator<Item = bool>) {
        lock(&self.flips).extend(flips);
    }

    /// Queues raw values for [Entropy::below]; each is reduced modulo the requested bound.
    pub fn push_values(&self, values: impl IntoIterator<Item = u64>) {
        lock(&self.values).extend(values);
    }
}

impl Default for ScriptedEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl Entropy for ScriptedEntropy {
    fn flip(&self) -> bool {
        match lock(&self.flips).pop_front() {
            Some(flip) => flip,
            None => self.fallback.flip(),
        }
    }

    fn below(&self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        match lock(&self.values).pop_front() {
            Some(value) => value % bound,
            None => self.fallback.below(bound),
        }
    }
}

/// Audit sink that keeps everything it is given.
#[derive(Default)]
pub struct RecordingAudit {
    records: Mutex<Vec<AuditRecord>>,
    alerts: Mutex<Vec<OperatorAlert>>,
}

impl RecordingAudit {
    pub fn records(&self) -> Vec<AuditRecord> {
        lock(&self.records).clone()
    }

    pub fn alerts(&self) -> Vec<OperatorAlert> {
        lock(&self.alerts).clone()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, record: &AuditRecord) {
        lock(&self.records).push(record.clone());
    }

    fn alert(&self, alert: &OperatorAlert) {
        lock(&self.alerts).push(alert.clone());
    }
}
