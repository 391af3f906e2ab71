//! Dynamic item pricing.
//!
//! Item prices are the rarity base price scaled by a market multiplier held in basis points.
//! The multiplier follows an external reference rate and is clamped to a fixed band.

use socialcredit_types::{Item, MAX_PRICE_MULTIPLIER_BPS, MIN_PRICE_MULTIPLIER_BPS, PRICE_SCALE_BPS};
use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PriceFeedError {
    #[error("price feed request failed: {0}")]
    Request(String),
    #[error("price feed returned an unusable rate: {0}")]
    BadRate(String),
}

/// Source of the external reference rate.
pub trait PriceFeed: Send + Sync {
    fn reference_rate(&self) -> impl Future<Output = Result<f64, PriceFeedError>> + Send;
}

pub struct PriceBook {
    multiplier_bps: AtomicU64,
}

impl PriceBook {
    pub fn new() -> Self {
        Self {
            multiplier_bps: AtomicU64::new(PRICE_SCALE_BPS),
        }
    }

    pub fn multiplier_bps(&self) -> u64 {
        self.multiplier_bps.load(Ordering::Relaxed)
    }

    /// Current market price of one unit of `item`; never below 1.
    pub fn unit_price(&self, item: &Item) -> u64 {
        let scaled = u128::from(item.base_price()) * u128::from(self.multiplier_bps())
            / u128::from(PRICE_SCALE_BPS);
        u64::try_from(scaled).unwrap_or(u64::MAX).max(1)
    }

    /// What the bank pays for one unit: half the market price, rounded down, never below 1.
    pub fn sale_price(&self, item: &Item) -> u64 {
        (self.unit_price(item) / 2).max(1)
    }

    /// Sets the multiplier directly, clamped to the allowed band. Returns the stored value.
    pub fn set_multiplier_bps(&self, bps: u64) -> u64 {
        let clamped = bps.clamp(MIN_PRICE_MULTIPLIER_BPS, MAX_PRICE_MULTIPLIER_BPS);
        self.multiplier_bps.store(clamped, Ordering::Relaxed);
        clamped
    }

    /// Recomputes the multiplier as `rate / baseline`.
    pub fn apply_rate(&self, rate: f64, baseline: f64) -> Result<u64, PriceFeedError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PriceFeedError::BadRate(rate.to_string()));
        }
        if !baseline.is_finite() || baseline <= 0.0 {
            return Err(PriceFeedError::BadRate(format!("baseline {baseline}")));
        }
        let raw = (rate / baseline * PRICE_SCALE_BPS as f64).round();
        let bps = if raw >= u64::MAX as f64 { u64::MAX } else { raw as u64 };
        Ok(self.set_multiplier_bps(bps))
    }

    /// Pulls one rate from `feed` and applies it.
    pub async fn refresh<F: PriceFeed>(
        &self,
        feed: &F,
        baseline: f64,
    ) -> Result<u64, PriceFeedError> {
        let rate = feed.reference_rate().await?;
        let previous = self.multiplier_bps();
        let bps = self.apply_rate(rate, baseline)?;
        if bps != previous {
            info!(rate, previous, bps, "price multiplier updated");
        } else {
            debug!(rate, bps, "price multiplier unchanged");
        }
        Ok(bps)
    }
}

impl Default for PriceBook {
    fn default() -> Self {
        Self::new()
    }
}
