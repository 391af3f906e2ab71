//! Periodic refresh of the market multiplier from an external reference rate.

use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use serde_json::Value;
use socialcredit_execution::{PriceBook, PriceFeed, PriceFeedError};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::PriceFeedSettings,
    metrics::{Counter, Metrics},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Reads the reference rate from a JSON document served over HTTP.
pub struct HttpPriceFeed {
    client: reqwest::Client,
    url: Url,
    pointer: String,
}

impl HttpPriceFeed {
    pub fn new(url: Url, pointer: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url,
            pointer: pointer.into(),
        })
    }
}

impl PriceFeed for HttpPriceFeed {
    async fn reference_rate(&self) -> Result<f64, PriceFeedError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|err| PriceFeedError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PriceFeedError::Request(format!("HTTP {status}")));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| PriceFeedError::BadRate(err.to_string()))?;
        extract_rate(&body, &self.pointer)
    }
}

/// Picks the rate at `pointer` (RFC 6901). Numbers and numeric strings are accepted.
pub fn extract_rate(body: &Value, pointer: &str) -> Result<f64, PriceFeedError> {
    let value = body
        .pointer(pointer)
        .ok_or_else(|| PriceFeedError::BadRate(format!("nothing at {pointer}")))?;
    let rate = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    rate.ok_or_else(|| PriceFeedError::BadRate(format!("{value} at {pointer}")))
}

/// Retry delay after failed refreshes. Each failure doubles the nominal delay up to `ceiling`,
/// and the delay actually waited is drawn from the upper half of the nominal one.
pub(crate) struct RetryDelay {
    nominal: Duration,
    ceiling: Duration,
}

impl RetryDelay {
    pub(crate) fn new(ceiling: Duration) -> Self {
        Self {
            nominal: INITIAL_RETRY_DELAY.min(ceiling),
            ceiling,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.nominal = INITIAL_RETRY_DELAY.min(self.ceiling);
    }

    pub(crate) fn next(&mut self, rng: &mut impl RngCore) -> Duration {
        let nominal = self.nominal;
        self.nominal = nominal.saturating_mul(2).min(self.ceiling);
        let floor = nominal / 2;
        let spread = (nominal - floor).as_millis() as u64;
        floor + Duration::from_millis(rng.gen_range(0..=spread))
    }
}

/// Refreshes `prices` forever. A failed refresh keeps the current multiplier and is retried
/// with backoff, never waiting longer than the regular interval.
pub async fn run_refresh<F: PriceFeed>(
    prices: Arc<PriceBook>,
    feed: F,
    settings: PriceFeedSettings,
    metrics: Arc<Metrics>,
) {
    let mut rng = StdRng::from_entropy();
    let mut retry = RetryDelay::new(settings.interval);
    loop {
        let delay = match prices.refresh(&feed, settings.baseline).await {
            Ok(bps) => {
                metrics.inc(Counter::PriceRefreshes);
                debug!(bps, "price refresh succeeded");
                retry.reset();
                settings.interval
            }
            Err(err) => {
                metrics.inc(Counter::PriceFailures);
                warn!(%err, multiplier_bps = prices.multiplier_bps(), "price refresh failed");
                retry.next(&mut rng)
            }
        };
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::json;
    use std::{collections::VecDeque, sync::Mutex};

    #[test]
    fn test_extract_rate() {
        let body = json!({"rate": 1.5, "data": {"quote": "2.25"}, "bad": "n/a", "list": [3]});
        assert_eq!(extract_rate(&body, "/rate").unwrap(), 1.5);
        assert_eq!(extract_rate(&body, "/data/quote").unwrap(), 2.25);
        assert_eq!(extract_rate(&body, "/list/0").unwrap(), 3.0);
        assert!(matches!(
            extract_rate(&body, "/bad"),
            Err(PriceFeedError::BadRate(_))
        ));
        assert!(matches!(
            extract_rate(&body, "/missing"),
            Err(PriceFeedError::BadRate(_))
        ));
    }

    #[test]
    fn test_retry_delay_doubles_to_ceiling() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut retry = RetryDelay::new(Duration::from_secs(5));
        let mut bounds = Vec::new();
        for _ in 0..5 {
            let delay = retry.next(&mut rng);
            bounds.push(delay);
        }
        // Nominal delays: 1s, 2s, 4s, 5s, 5s.
        let nominal = [1, 2, 4, 5, 5].map(Duration::from_secs);
        for (delay, nominal) in bounds.iter().zip(nominal) {
            assert!(*delay >= nominal / 2, "{delay:?} below {nominal:?}/2");
            assert!(*delay <= nominal, "{delay:?} above {nominal:?}");
        }

        retry.reset();
        assert!(retry.next(&mut rng) <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_http_feed_reads_pointer() {
        let app = Router::new().route(
            "/ticker",
            get(|| async { Json(json!({"market": {"last": "1.2"}})) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = Url::parse(&format!("http://{addr}/ticker")).unwrap();
        let feed = HttpPriceFeed::new(url, "/market/last").unwrap();
        assert_eq!(feed.reference_rate().await.unwrap(), 1.2);

        let url = Url::parse(&format!("http://{addr}/missing")).unwrap();
        let feed = HttpPriceFeed::new(url, "/market/last").unwrap();
        assert!(matches!(
            feed.reference_rate().await,
            Err(PriceFeedError::Request(_))
        ));
    }

    struct Scripted(Mutex<VecDeque<Result<f64, PriceFeedError>>>);

    impl PriceFeed for Scripted {
        async fn reference_rate(&self) -> Result<f64, PriceFeedError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(PriceFeedError::Request("exhausted".to_string())))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_keeps_multiplier_on_failure() {
        let prices = Arc::new(PriceBook::new());
        let metrics = Arc::new(Metrics::default());
        let feed = Scripted(Mutex::new(VecDeque::from([
            Ok(2.0),
            Err(PriceFeedError::Request("timeout".to_string())),
        ])));
        let settings = PriceFeedSettings {
            url: Url::parse("http://localhost/").unwrap(),
            pointer: "/rate".to_string(),
            baseline: 1.6,
            interval: Duration::from_secs(300),
        };
        let task = tokio::spawn(run_refresh(
            prices.clone(),
            feed,
            settings,
            metrics.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(prices.multiplier_bps(), 12_500);
        assert_eq!(metrics.get(Counter::PriceRefreshes), 1);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(prices.multiplier_bps(), 12_500);
        assert!(metrics.get(Counter::PriceFailures) >= 1);
        task.abort();
    }
}
