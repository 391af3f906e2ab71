use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const LATENCY_BUCKET_COUNT: usize = 10;
const LATENCY_BUCKETS_MS: [u64; LATENCY_BUCKET_COUNT] =
    [1, 5, 10, 25, 50, 100, 250, 1000, 5000, 10000];

#[derive(Clone, Debug, Serialize)]
pub struct LatencySnapshot {
    pub buckets_ms: Vec<u64>,
    pub counts: Vec<u64>,
    pub overflow: u64,
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Default)]
struct LatencyMetrics {
    buckets: [AtomicU64; LATENCY_BUCKET_COUNT],
    overflow: AtomicU64,
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyMetrics {
    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);

        match LATENCY_BUCKETS_MS.iter().position(|bucket| ms <= *bucket) {
            Some(idx) => self.buckets[idx].fetch_add(1, Ordering::Relaxed),
            None => self.overflow.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        let avg_ms = if count > 0 {
            total_ms as f64 / count as f64
        } else {
            0.0
        };
        LatencySnapshot {
            buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            counts: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            overflow: self.overflow.load(Ordering::Relaxed),
            count,
            avg_ms,
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Counter {
    Connections,
    Commands,
    Actions,
    Rejections,
    RateLimited,
    Malformed,
    Notices,
    PriceRefreshes,
    PriceFailures,
    SessionsSwept,
}

/// Process counters served as JSON on `/metrics`.
#[derive(Default)]
pub struct Metrics {
    connections: AtomicU64,
    commands: AtomicU64,
    actions: AtomicU64,
    rejections: AtomicU64,
    rate_limited: AtomicU64,
    malformed: AtomicU64,
    notices: AtomicU64,
    price_refreshes: AtomicU64,
    price_failures: AtomicU64,
    sessions_swept: AtomicU64,
    event_latency: LatencyMetrics,
}

#[derive(Clone, Debug, Serialize)]
pub struct MetricsSnapshot {
    pub connections: u64,
    pub commands: u64,
    pub actions: u64,
    pub rejections: u64,
    pub rate_limited: u64,
    pub malformed: u64,
    pub notices: u64,
    pub price_refreshes: u64,
    pub price_failures: u64,
    pub sessions_swept: u64,
    pub event_latency: LatencySnapshot,
}

impl Metrics {
    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::Connections => &self.connections,
            Counter::Commands => &self.commands,
            Counter::Actions => &self.actions,
            Counter::Rejections => &self.rejections,
            Counter::RateLimited => &self.rate_limited,
            Counter::Malformed => &self.malformed,
            Counter::Notices => &self.notices,
            Counter::PriceRefreshes => &self.price_refreshes,
            Counter::PriceFailures => &self.price_failures,
            Counter::SessionsSwept => &self.sessions_swept,
        }
    }

    pub fn inc(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, value: u64) {
        self.counter(counter).fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counter(counter).load(Ordering::Relaxed)
    }

    pub fn record_event(&self, elapsed: Duration) {
        self.event_latency.record(elapsed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections: self.get(Counter::Connections),
            commands: self.get(Counter::Commands),
            actions: self.get(Counter::Actions),
            rejections: self.get(Counter::Rejections),
            rate_limited: self.get(Counter::RateLimited),
            malformed: self.get(Counter::Malformed),
            notices: self.get(Counter::Notices),
            price_refreshes: self.get(Counter::PriceRefreshes),
            price_failures: self.get(Counter::PriceFailures),
            sessions_swept: self.get(Counter::SessionsSwept),
            event_latency: self.event_latency.snapshot(),
        }
    }
}
