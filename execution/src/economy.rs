use serde::Deserialize;
use socialcredit_types::{
    Catalogue, CatalogueError, RarityTable, BANK_REFILL_INTERVAL_SECS, BANK_STOCK_PER_KIND,
    DAILY_OPEN_LIMIT, DAILY_PURCHASE_LIMIT, DRAW_BATCH_SIZE, DUEL_TTL_SECS, REVEAL_DELAY_MS,
    REVEAL_FRAMES, ROUND_TTL_SECS, SALE_TTL_SECS, TRADE_TTL_SECS,
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

use crate::{
    clock::{Clock, SystemClock},
    coinflip::{CoinflipEngine, RoundConfig},
    duel::DuelEngine,
    entropy::{Entropy, SeededEntropy},
    gacha::{GachaConfig, GachaDeps, GachaEngine},
    ledger::{AuditSink, CreditLedger, TracingAudit},
    notice::Notice,
    pricing::PriceBook,
    retry::{RetryPolicy, Retrying},
    store::Store,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EconomyConfigError {
    #[error("invalid catalogue: {0}")]
    Catalogue(#[from] CatalogueError),
    #[error("{0} must be positive")]
    Zero(&'static str),
}

/// Tunables of the economy. Every field has a default.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    pub retry: RetryPolicy,
    pub duel_ttl_secs: u64,
    pub round_ttl_secs: u64,
    pub sale_ttl_secs: u64,
    pub trade_ttl_secs: u64,
    pub reveal_frames: u8,
    pub reveal_delay_ms: u64,
    pub daily_open_limit: u32,
    pub daily_purchase_limit: u32,
    pub draw_batch_size: u32,
    pub bank_stock: u32,
    pub bank_refill_interval_secs: u64,
    pub rarity: RarityTable,
    pub catalogue: Catalogue,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            duel_ttl_secs: DUEL_TTL_SECS,
            round_ttl_secs: ROUND_TTL_SECS,
            sale_ttl_secs: SALE_TTL_SECS,
            trade_ttl_secs: TRADE_TTL_SECS,
            reveal_frames: REVEAL_FRAMES,
            reveal_delay_ms: REVEAL_DELAY_MS,
            daily_open_limit: DAILY_OPEN_LIMIT,
            daily_purchase_limit: DAILY_PURCHASE_LIMIT,
            draw_batch_size: DRAW_BATCH_SIZE,
            bank_stock: BANK_STOCK_PER_KIND,
            bank_refill_interval_secs: BANK_REFILL_INTERVAL_SECS,
            rarity: RarityTable::default(),
            catalogue: Catalogue::default(),
        }
    }
}

impl EconomyConfig {
    pub fn validate(&self) -> Result<(), EconomyConfigError> {
        let positive = [
            ("duel_ttl_secs", self.duel_ttl_secs),
            ("round_ttl_secs", self.round_ttl_secs),
            ("sale_ttl_secs", self.sale_ttl_secs),
            ("trade_ttl_secs", self.trade_ttl_secs),
            ("draw_batch_size", u64::from(self.draw_batch_size)),
            ("bank_refill_interval_secs", self.bank_refill_interval_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(EconomyConfigError::Zero(*name));
        }
        self.catalogue.validate()?;
        Ok(())
    }

    fn round(&self) -> RoundConfig {
        RoundConfig {
            ttl: Duration::from_secs(self.round_ttl_secs),
            reveal_frames: self.reveal_frames,
            reveal_delay: Duration::from_millis(self.reveal_delay_ms),
        }
    }

    fn gacha(&self) -> GachaConfig {
        GachaConfig {
            daily_open_limit: self.daily_open_limit,
            daily_purchase_limit: self.daily_purchase_limit,
            batch_size: self.draw_batch_size,
            bank_stock: self.bank_stock,
            bank_refill_interval_secs: self.bank_refill_interval_secs,
            sale_ttl: Duration::from_secs(self.sale_ttl_secs),
            trade_ttl: Duration::from_secs(self.trade_ttl_secs),
        }
    }
}

/// Clock, randomness, and audit destination used by the engines.
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub entropy: Arc<dyn Entropy>,
    pub audit: Arc<dyn AuditSink>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            entropy: Arc::new(SeededEntropy::from_entropy()),
            audit: Arc::new(TracingAudit),
        }
    }
}

/// The whole economy: one ledger and every engine built on it, sharing a retrying store.
pub struct Economy<S: Store> {
    ledger: Arc<CreditLedger<Retrying<S>>>,
    duels: DuelEngine<Retrying<S>>,
    flips: CoinflipEngine<Retrying<S>>,
    gacha: GachaEngine<Retrying<S>>,
    prices: Arc<PriceBook>,
}

impl<S: Store> Clone for Economy<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            duels: self.duels.clone(),
            flips: self.flips.clone(),
            gacha: self.gacha.clone(),
            prices: Arc::clone(&self.prices),
        }
    }
}

impl<S: Store> Economy<S> {
    /// Builds the economy with the system clock, OS-seeded entropy, and tracing audit.
    ///
    /// The receiver yields a [Notice] whenever a session ends on its own.
    pub fn new(store: S, config: EconomyConfig) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        Self::with_collaborators(store, config, Collaborators::default())
    }

    pub fn with_collaborators(
        store: S,
        config: EconomyConfig,
        collaborators: Collaborators,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notices, receiver) = mpsc::unbounded_channel();
        let store = Arc::new(Retrying::new(store, config.retry));
        let ledger = Arc::new(CreditLedger::new(
            Arc::clone(&store),
            collaborators.audit,
        ));
        let prices = Arc::new(PriceBook::new());

        let duels = DuelEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&collaborators.entropy),
            notices.clone(),
            Duration::from_secs(config.duel_ttl_secs),
        );
        let flips = CoinflipEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&collaborators.entropy),
            notices.clone(),
            config.round(),
        );
        let gacha = GachaEngine::new(
            GachaDeps {
                store,
                ledger: Arc::clone(&ledger),
                prices: Arc::clone(&prices),
                entropy: collaborators.entropy,
                clock: collaborators.clock,
                notices,
            },
            config.catalogue.clone(),
            config.rarity.clone(),
            config.gacha(),
        );
        info!(
            items = config.catalogue.items.len(),
            containers = config.catalogue.containers.len(),
            "economy initialized"
        );

        (
            Self {
                ledger,
                duels,
                flips,
                gacha,
                prices,
            },
            receiver,
        )
    }

    pub fn ledger(&self) -> &CreditLedger<Retrying<S>> {
        &self.ledger
    }

    pub fn duels(&self) -> &DuelEngine<Retrying<S>> {
        &self.duels
    }

    pub fn flips(&self) -> &CoinflipEngine<Retrying<S>> {
        &self.flips
    }

    pub fn gacha(&self) -> &GachaEngine<Retrying<S>> {
        &self.gacha
    }

    pub fn prices(&self) -> &Arc<PriceBook> {
        &self.prices
    }

    /// Expires every session past its deadline whose timer has not fired yet.
    pub async fn sweep(&self) -> usize {
        self.duels.sweep().await + self.flips.sweep().await + self.gacha.sweep().await
    }

    /// Number of live sessions across all engines.
    pub async fn open_sessions(&self) -> usize {
        self.duels.open_challenges().await
            + self.flips.open_rounds().await
            + self.gacha.open_sessions().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_and_overrides() {
        let config: EconomyConfig = serde_yaml::from_str(
            r#"
duel_ttl_secs: 60
retry:
  attempts: 5
rarity:
  - [common, 9]
  - [legendary, 1]
"#,
        )
        .unwrap();
        assert_eq!(config.duel_ttl_secs, 60);
        assert_eq!(config.round_ttl_secs, ROUND_TTL_SECS);
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.backoff_ms, 100);
        assert_eq!(config.rarity.total_weight(), 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let config = EconomyConfig {
            draw_batch_size: 0,
            ..EconomyConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(EconomyConfigError::Zero("draw_batch_size"))
        );

        assert!(serde_yaml::from_str::<EconomyConfig>("rarity: []").is_err());
    }
}
