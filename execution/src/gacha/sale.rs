use socialcredit_types::{Item, UserId};
use std::time::Duration;
use tracing::info;

use super::GachaEngine;
use crate::{
    error::EconomyError,
    notice::{notify, Notice},
    registry::{Session, SessionId},
    store::Store,
};

/// A pending sale of items back to the bank, awaiting the seller's confirmation.
#[derive(Clone, Debug)]
pub struct SaleSession {
    pub item: Item,
    pub count: u32,
    pub unit_price: u64,
    pub total: u64,
}

impl Session for SaleSession {
    const KIND: &'static str = "sale";
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleQuote {
    pub id: SessionId,
    pub item: Item,
    pub count: u32,
    pub unit_price: u64,
    pub total: u64,
    pub ttl: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleReceipt {
    pub id: SessionId,
    pub item: Item,
    pub count: u32,
    pub credited: u64,
    pub balance: u64,
}

impl<S: Store> GachaEngine<S> {
    /// Quotes a sale at today's price and waits for the seller to confirm it.
    pub async fn offer_sale(
        &self,
        seller: &UserId,
        item: &str,
        count: u32,
    ) -> Result<SaleQuote, EconomyError> {
        if count == 0 {
            return Err(EconomyError::invalid("count must be positive"));
        }
        let item = self.find_item(item)?.clone();
        let held = self.load_inventory(seller).await?.item_count(&item.id);
        if held < count {
            return Err(EconomyError::InsufficientItems {
                id: item.id,
                held,
                requested: count,
            });
        }
        let unit_price = self.inner.prices.sale_price(&item);
        let total = unit_price.saturating_mul(u64::from(count));

        let engine = self.clone();
        let ttl = self.inner.config.sale_ttl;
        let id = self.inner.sales.lock().await.create(
            seller.clone(),
            SaleSession {
                item: item.clone(),
                count,
                unit_price,
                total,
            },
            ttl,
            move |id| async move {
                engine.expire_sale(&id).await;
            },
        );
        info!(%id, %seller, item = %item.id, count, total, "sale quoted");

        Ok(SaleQuote {
            id,
            item,
            count,
            unit_price,
            total,
            ttl,
        })
    }

    /// Completes a quoted sale: removes the items and credits the quoted total.
    pub async fn confirm_sale(
        &self,
        id: &SessionId,
        actor: &UserId,
    ) -> Result<SaleReceipt, EconomyError> {
        let mut sales = self.inner.sales.lock().await;
        let entry = sales
            .get(id)
            .ok_or_else(|| EconomyError::NotFound("sale".to_string()))?;
        if entry.owner != *actor {
            return Err(EconomyError::Forbidden("only the seller can confirm this sale"));
        }
        let Some(entry) = sales.resolve(id) else {
            return Err(EconomyError::AlreadyHandled);
        };
        let sale = entry.state;

        let _guard = self.inner.lock.lock().await;
        let mut inventory = self.load_inventory(actor).await?;
        inventory.remove_items(&sale.item.id, sale.count)?;
        self.save_inventory(&inventory).await?;

        let credit = match self
            .inner
            .ledger
            .credit(actor, sale.total, "item sale")
            .await
        {
            Ok(credit) => credit,
            Err(err) => {
                inventory.add_items(&sale.item.id, sale.count);
                if self.save_inventory(&inventory).await.is_err() {
                    self.inner.ledger.audit().alert(&crate::ledger::OperatorAlert {
                        user: actor.clone(),
                        amount: sale.total,
                        detail: format!(
                            "sale {id} lost {}x {} without payment",
                            sale.count, sale.item.id
                        ),
                    });
                }
                return Err(err);
            }
        };
        drop(sales);
        info!(
            %id,
            seller = %actor,
            item = %sale.item.id,
            count = sale.count,
            total = sale.total,
            "sale completed"
        );

        Ok(SaleReceipt {
            id: id.clone(),
            item: sale.item,
            count: sale.count,
            credited: sale.total,
            balance: credit.new,
        })
    }

    pub async fn cancel_sale(&self, id: &SessionId, actor: &UserId) -> Result<Item, EconomyError> {
        let mut sales = self.inner.sales.lock().await;
        let entry = sales
            .get(id)
            .ok_or_else(|| EconomyError::NotFound("sale".to_string()))?;
        if entry.owner != *actor {
            return Err(EconomyError::Forbidden("only the seller can cancel this sale"));
        }
        let entry = sales.resolve(id).ok_or(EconomyError::AlreadyHandled)?;
        info!(%id, seller = %actor, "sale cancelled");
        Ok(entry.state.item)
    }

    /// Drops an unconfirmed sale. Nothing was escrowed, so nothing moves.
    pub async fn expire_sale(&self, id: &SessionId) -> bool {
        let Some(entry) = self.inner.sales.lock().await.expire(id) else {
            return false;
        };
        info!(%id, seller = %entry.owner, "sale prompt expired");
        notify(
            &self.inner.notices,
            Notice::SaleExpired {
                id: id.clone(),
                seller: entry.owner,
            },
        );
        true
    }
}
