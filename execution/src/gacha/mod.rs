//! Collectibles: containers, the replenishing bank, sales back to the bank, and trades
//! between users.
//!
//! Inventories and the bank share one async lock. Sessions (sale prompts, trade offers) have
//! their own registries, always locked before the inventory lock, which is locked before the
//! ledger.

mod draw;
mod market;
mod sale;
mod trade;

pub use draw::draw_item;
pub use market::{BankView, DrawnItem, Grant, Opening, Purchase};
pub use sale::{SaleQuote, SaleReceipt, SaleSession};
pub use trade::{TradeCancelled, TradeOffer, TradeReceipt, TradeSession};

use socialcredit_types::{
    Catalogue, ContainerKind, Inventory, Item, RarityTable, UserId, BANK_REFILL_INTERVAL_SECS,
    BANK_STOCK_PER_KIND, DAILY_OPEN_LIMIT, DAILY_PURCHASE_LIMIT, DRAW_BATCH_SIZE, SALE_TTL_SECS,
    TRADE_TTL_SECS,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{
    clock::Clock,
    entropy::Entropy,
    error::EconomyError,
    ledger::{CreditLedger, OperatorAlert},
    limits::DailyLimiter,
    notice::Notifier,
    pricing::PriceBook,
    registry::SessionRegistry,
    store::{self, Store, StoreError},
};

#[derive(Clone, Debug)]
pub struct GachaConfig {
    pub daily_open_limit: u32,
    pub daily_purchase_limit: u32,
    pub batch_size: u32,
    pub bank_stock: u32,
    pub bank_refill_interval_secs: u64,
    pub sale_ttl: Duration,
    pub trade_ttl: Duration,
}

impl Default for GachaConfig {
    fn default() -> Self {
        Self {
            daily_open_limit: DAILY_OPEN_LIMIT,
            daily_purchase_limit: DAILY_PURCHASE_LIMIT,
            batch_size: DRAW_BATCH_SIZE,
            bank_stock: BANK_STOCK_PER_KIND,
            bank_refill_interval_secs: BANK_REFILL_INTERVAL_SECS,
            sale_ttl: Duration::from_secs(SALE_TTL_SECS),
            trade_ttl: Duration::from_secs(TRADE_TTL_SECS),
        }
    }
}

/// A stack of one item in an inventory, priced at the current market.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeldItem {
    pub item: Item,
    pub count: u32,
    pub unit_price: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InventoryView {
    pub owner: UserId,
    pub items: Vec<HeldItem>,
    pub containers: Vec<(ContainerKind, u32)>,
    pub distinct_seen: usize,
}

struct GachaInner<S> {
    store: Arc<S>,
    ledger: Arc<CreditLedger<S>>,
    limiter: DailyLimiter<S>,
    catalogue: Catalogue,
    rarity: RarityTable,
    prices: Arc<PriceBook>,
    entropy: Arc<dyn Entropy>,
    clock: Arc<dyn Clock>,
    sales: SessionRegistry<SaleSession>,
    trades: SessionRegistry<TradeSession>,
    notices: Notifier,
    config: GachaConfig,
    lock: Mutex<()>,
}

pub struct GachaEngine<S> {
    inner: Arc<GachaInner<S>>,
}

impl<S> Clone for GachaEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Collaborators shared with the rest of the economy.
pub struct GachaDeps<S> {
    pub store: Arc<S>,
    pub ledger: Arc<CreditLedger<S>>,
    pub prices: Arc<PriceBook>,
    pub entropy: Arc<dyn Entropy>,
    pub clock: Arc<dyn Clock>,
    pub notices: Notifier,
}

impl<S: Store> GachaEngine<S> {
    pub fn new(
        deps: GachaDeps<S>,
        catalogue: Catalogue,
        rarity: RarityTable,
        config: GachaConfig,
    ) -> Self {
        let limiter = DailyLimiter::new(Arc::clone(&deps.store), Arc::clone(&deps.clock));
        Self {
            inner: Arc::new(GachaInner {
                store: deps.store,
                ledger: deps.ledger,
                limiter,
                catalogue,
                rarity,
                prices: deps.prices,
                entropy: deps.entropy,
                clock: deps.clock,
                sales: SessionRegistry::new(),
                trades: SessionRegistry::new(),
                notices: deps.notices,
                config,
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.inner.catalogue
    }

    pub fn prices(&self) -> &PriceBook {
        &self.inner.prices
    }

    /// Resolves a user-supplied item reference by id or case-insensitive name.
    pub fn find_item(&self, reference: &str) -> Result<&Item, EconomyError> {
        let reference = reference.trim();
        self.inner
            .catalogue
            .items
            .iter()
            .find(|item| item.id == reference || item.name.eq_ignore_ascii_case(reference))
            .ok_or_else(|| EconomyError::NotFound(format!("item {reference:?}")))
    }

    /// Resolves a container kind by id or case-insensitive name.
    pub fn find_container(&self, reference: &str) -> Result<&ContainerKind, EconomyError> {
        let reference = reference.trim();
        self.inner
            .catalogue
            .containers
            .iter()
            .find(|kind| kind.id == reference || kind.name.eq_ignore_ascii_case(reference))
            .ok_or_else(|| EconomyError::NotFound(format!("container {reference:?}")))
    }

    async fn load_inventory(&self, user: &UserId) -> Result<Inventory, StoreError> {
        Ok(
            store::load::<_, Inventory>(self.inner.store.as_ref(), &Inventory::key(user))
                .await?
                .unwrap_or_else(|| Inventory::new(user.clone())),
        )
    }

    async fn save_inventory(&self, inventory: &Inventory) -> Result<(), StoreError> {
        store::save(
            self.inner.store.as_ref(),
            &Inventory::key(&inventory.owner),
            inventory,
        )
        .await
    }

    /// Puts escrowed items back into `user`'s inventory, alerting an operator on failure.
    async fn return_items(&self, user: &UserId, item_id: &str, count: u32, reason: &str) {
        let _guard = self.inner.lock.lock().await;
        let result = async {
            let mut inventory = self.load_inventory(user).await?;
            inventory.add_items(item_id, count);
            self.save_inventory(&inventory).await
        }
        .await;
        if let Err(err) = result {
            self.inner.ledger.audit().alert(&OperatorAlert {
                user: user.clone(),
                amount: u64::from(count),
                detail: format!("{count}x {item_id} not returned ({reason}): {err}"),
            });
        }
    }

    pub async fn inventory(&self, user: &UserId) -> Result<InventoryView, EconomyError> {
        let inventory = self.load_inventory(user).await?;
        let mut items = Vec::with_capacity(inventory.items().len());
        for (id, count) in inventory.items() {
            match self.inner.catalogue.item(id) {
                Some(item) => items.push(HeldItem {
                    item: item.clone(),
                    count: *count,
                    unit_price: self.inner.prices.unit_price(item),
                }),
                None => {
                    warn!(%user, item = %id, "inventory holds an item missing from the catalogue")
                }
            }
        }
        let containers = inventory
            .containers()
            .iter()
            .filter_map(|(id, count)| {
                self.inner
                    .catalogue
                    .container(id)
                    .map(|kind| (kind.clone(), *count))
            })
            .collect();
        Ok(InventoryView {
            owner: user.clone(),
            items,
            containers,
            distinct_seen: inventory_seen(&inventory, &self.inner.catalogue),
        })
    }

    /// Expires sale prompts and trade offers past their deadline.
    pub async fn sweep(&self) -> usize {
        let now = tokio::time::Instant::now();
        let sales = self.inner.sales.lock().await.overdue(now);
        let trades = self.inner.trades.lock().await.overdue(now);
        let mut expired = 0;
        for id in sales {
            if self.expire_sale(&id).await {
                expired += 1;
            }
        }
        for id in trades {
            if self.expire_trade(&id).await {
                expired += 1;
            }
        }
        expired
    }

    pub async fn open_sessions(&self) -> usize {
        self.inner.sales.lock().await.len() + self.inner.trades.lock().await.len()
    }
}

fn inventory_seen(inventory: &Inventory, catalogue: &Catalogue) -> usize {
    catalogue
        .items
        .iter()
        .filter(|item| inventory.has_seen(&item.id))
        .count()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::mocks::{ManualClock, Memory, RecordingAudit, ScriptedEntropy};
    use tokio::sync::mpsc;

    pub struct Harness {
        pub memory: Arc<Memory>,
        pub ledger: Arc<CreditLedger<Memory>>,
        pub audit: Arc<RecordingAudit>,
        pub entropy: Arc<ScriptedEntropy>,
        pub clock: Arc<ManualClock>,
        pub engine: GachaEngine<Memory>,
        pub notices: mpsc::UnboundedReceiver<crate::notice::Notice>,
    }

    pub fn harness() -> Harness {
        harness_with(Catalogue::default())
    }

    pub fn harness_with(catalogue: Catalogue) -> Harness {
        let memory = Arc::new(Memory::default());
        let audit = Arc::new(RecordingAudit::default());
        let ledger = Arc::new(CreditLedger::new(Arc::clone(&memory), audit.clone()));
        let entropy = Arc::new(ScriptedEntropy::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let (tx, notices) = mpsc::unbounded_channel();
        let engine = GachaEngine::new(
            GachaDeps {
                store: Arc::clone(&memory),
                ledger: Arc::clone(&ledger),
                prices: Arc::new(PriceBook::new()),
                entropy: entropy.clone(),
                clock: clock.clone(),
                notices: tx,
            },
            catalogue,
            RarityTable::default(),
            GachaConfig::default(),
        );
        Harness {
            memory,
            ledger,
            audit,
            entropy,
            clock,
            engine,
            notices,
        }
    }

    impl Harness {
        pub async fn fund(&self, user: &str, amount: u64) -> UserId {
            let user = UserId::new(user);
            self.ledger.credit(&user, amount, "seed").await.unwrap();
            user
        }

        pub async fn give_items(&self, user: &UserId, item: &str, count: u32) {
            let mut inventory = self.engine.load_inventory(user).await.unwrap();
            inventory.add_items(item, count);
            self.engine.save_inventory(&inventory).await.unwrap();
        }

        pub async fn held(&self, user: &UserId, item: &str) -> u32 {
            self.engine
                .load_inventory(user)
                .await
                .unwrap()
                .item_count(item)
        }
    }
}
