use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock source for day buckets and bank refills.
pub trait Clock: Send + Sync + 'static {
    /// Unix seconds.
    fn now_secs(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0)
    }
}
