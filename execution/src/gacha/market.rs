use socialcredit_types::{ContainerBank, ContainerKind, Item, UserId};
use tracing::{info, warn};

use super::{draw::draw_item, GachaEngine};
use crate::{
    error::EconomyError,
    limits::DailyAction,
    store::{self, Store, StoreError},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DrawnItem {
    pub item: Item,
    /// First time the user ever acquired this item.
    pub first_time: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Opening {
    pub container: ContainerKind,
    pub items: Vec<DrawnItem>,
    pub opens_left: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Purchase {
    pub container: ContainerKind,
    pub price: u64,
    pub balance: u64,
    pub stock_left: u32,
    pub purchases_left: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BankView {
    pub stock: Vec<(ContainerKind, u32)>,
    /// Seconds until the next refill.
    pub refill_in: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grant {
    pub user: UserId,
    pub container: ContainerKind,
    pub count: u32,
    pub held: u32,
}

impl<S: Store> GachaEngine<S> {
    /// Loads the bank, refilling it first when a refill is due. Callers hold the inventory lock.
    async fn load_bank(&self) -> Result<ContainerBank, StoreError> {
        let mut bank =
            store::load::<_, ContainerBank>(self.inner.store.as_ref(), ContainerBank::KEY)
                .await?
                .unwrap_or_default();
        let refilled = bank.refill_if_due(
            self.inner.clock.now_secs(),
            self.inner.config.bank_refill_interval_secs,
            self.inner.config.bank_stock,
            self.inner
                .catalogue
                .containers
                .iter()
                .map(|kind| kind.id.as_str()),
        );
        if refilled {
            store::save(self.inner.store.as_ref(), ContainerBank::KEY, &bank).await?;
            info!(last_refilled = bank.last_refilled, "container bank refilled");
        }
        Ok(bank)
    }

    pub async fn bank(&self) -> Result<BankView, EconomyError> {
        let _guard = self.inner.lock.lock().await;
        let bank = self.load_bank().await?;
        let stock = self
            .inner
            .catalogue
            .containers
            .iter()
            .map(|kind| (kind.clone(), bank.stock(&kind.id)))
            .collect();
        Ok(BankView {
            stock,
            refill_in: bank.refill_in(
                self.inner.clock.now_secs(),
                self.inner.config.bank_refill_interval_secs,
            ),
        })
    }

    /// Buys one container from the bank.
    pub async fn buy(&self, user: &UserId, container: &str) -> Result<Purchase, EconomyError> {
        let container = self.find_container(container)?.clone();
        let _guard = self.inner.lock.lock().await;

        let allowance = self
            .inner
            .limiter
            .check(
                DailyAction::Purchase,
                user,
                self.inner.config.daily_purchase_limit,
            )
            .await?;
        let mut bank = self.load_bank().await?;
        if bank.stock(&container.id) == 0 {
            return Err(EconomyError::OutOfStock(container.name));
        }
        let mut inventory = self.load_inventory(user).await?;

        let debit = self
            .inner
            .ledger
            .debit(user, container.price, "container purchase")
            .await?;
        inventory.add_containers(&container.id, 1);
        if let Err(err) = self.save_inventory(&inventory).await {
            self.inner
                .ledger
                .refund(user, container.price, "container purchase failed")
                .await;
            return Err(err.into());
        }
        bank.take(&container.id);
        if let Err(err) = store::save(self.inner.store.as_ref(), ContainerBank::KEY, &bank).await {
            warn!(%user, container = %container.id, %err, "bank stock not decremented");
        }
        if let Err(err) = self.inner.limiter.consume(DailyAction::Purchase, user).await {
            warn!(%user, %err, "purchase not counted toward the daily limit");
        }
        info!(%user, container = %container.id, price = container.price, "container purchased");

        Ok(Purchase {
            stock_left: bank.stock(&container.id),
            price: container.price,
            balance: debit.new,
            purchases_left: allowance - 1,
            container,
        })
    }

    /// Opens one container, drawing a batch of items into the user's inventory.
    pub async fn open(&self, user: &UserId, container: &str) -> Result<Opening, EconomyError> {
        let container = self.find_container(container)?.clone();
        let _guard = self.inner.lock.lock().await;

        let mut inventory = self.load_inventory(user).await?;
        inventory.remove_containers(&container.id, 1)?;
        let allowance = self
            .inner
            .limiter
            .check(DailyAction::Open, user, self.inner.config.daily_open_limit)
            .await?;

        let pool = self.inner.catalogue.pool_for(&container);
        let mut items = Vec::with_capacity(self.inner.config.batch_size as usize);
        for _ in 0..self.inner.config.batch_size {
            let Some(item) = draw_item(&pool, &self.inner.rarity, self.inner.entropy.as_ref())
            else {
                return Err(EconomyError::invalid(format!(
                    "{} has nothing to draw",
                    container.name
                )));
            };
            let first_time = inventory.add_items(&item.id, 1);
            items.push(DrawnItem {
                item: item.clone(),
                first_time,
            });
        }
        self.save_inventory(&inventory).await?;

        if let Err(err) = self.inner.limiter.consume(DailyAction::Open, user).await {
            warn!(%user, %err, "opening not counted toward the daily limit");
        }
        if let Err(err) = self.inner.ledger.record_opening(user).await {
            warn!(%user, %err, "failed to record container opening");
        }
        info!(%user, container = %container.id, drawn = items.len(), "container opened");

        Ok(Opening {
            container,
            items,
            opens_left: allowance - 1,
        })
    }

    /// Adds containers to a user's inventory without payment.
    pub async fn grant_container(
        &self,
        user: &UserId,
        container: &str,
        count: u32,
    ) -> Result<Grant, EconomyError> {
        if count == 0 {
            return Err(EconomyError::invalid("count must be positive"));
        }
        let container = self.find_container(container)?.clone();
        let _guard = self.inner.lock.lock().await;
        let mut inventory = self.load_inventory(user).await?;
        inventory.add_containers(&container.id, count);
        self.save_inventory(&inventory).await?;
        info!(%user, container = %container.id, count, "containers granted");

        Ok(Grant {
            user: user.clone(),
            held: inventory.container_count(&container.id),
            container,
            count,
        })
    }
}
