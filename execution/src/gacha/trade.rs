use socialcredit_types::{Item, UserId};
use std::time::Duration;
use tracing::{info, warn};

use super::GachaEngine;
use crate::{
    error::EconomyError,
    ledger::OperatorAlert,
    notice::{notify, Notice},
    registry::{Session, SessionId},
    store::Store,
};

/// Items escrowed from the seller, waiting for a buyer to pay the asking price.
#[derive(Clone, Debug)]
pub struct TradeSession {
    /// Only this user may accept, when set.
    pub buyer: Option<UserId>,
    pub item: Item,
    pub count: u32,
    pub price: u64,
}

impl Session for TradeSession {
    const KIND: &'static str = "trade";

    fn is_claimable(&self) -> bool {
        true
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TradeOffer {
    pub id: SessionId,
    pub seller: UserId,
    pub buyer: Option<UserId>,
    pub item: Item,
    pub count: u32,
    pub price: u64,
    pub ttl: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TradeReceipt {
    pub id: SessionId,
    pub seller: UserId,
    pub buyer: UserId,
    pub item: Item,
    pub count: u32,
    pub price: u64,
    pub buyer_balance: u64,
    pub first_time: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TradeCancelled {
    pub id: SessionId,
    pub item: Item,
    pub count: u32,
}

impl<S: Store> GachaEngine<S> {
    /// Lists items for sale to other users, escrowing them from the seller's inventory.
    pub async fn offer_trade(
        &self,
        seller: &UserId,
        item: &str,
        count: u32,
        price: u64,
        buyer: Option<&UserId>,
    ) -> Result<TradeOffer, EconomyError> {
        if count == 0 {
            return Err(EconomyError::invalid("count must be positive"));
        }
        if price == 0 {
            return Err(EconomyError::invalid("price must be positive"));
        }
        if buyer == Some(seller) {
            return Err(EconomyError::Forbidden("you cannot trade with yourself"));
        }
        let item = self.find_item(item)?.clone();

        let mut trades = self.inner.trades.lock().await;
        {
            let _guard = self.inner.lock.lock().await;
            let mut inventory = self.load_inventory(seller).await?;
            inventory.remove_items(&item.id, count)?;
            self.save_inventory(&inventory).await?;
        }

        let engine = self.clone();
        let ttl = self.inner.config.trade_ttl;
        let id = trades.create(
            seller.clone(),
            TradeSession {
                buyer: buyer.cloned(),
                item: item.clone(),
                count,
                price,
            },
            ttl,
            move |id| async move {
                engine.expire_trade(&id).await;
            },
        );
        info!(%id, %seller, item = %item.id, count, price, "trade offered");

        Ok(TradeOffer {
            id,
            seller: seller.clone(),
            buyer: buyer.cloned(),
            item,
            count,
            price,
            ttl,
        })
    }

    /// Pays the asking price and takes delivery of the escrowed items.
    pub async fn accept_trade(
        &self,
        id: &SessionId,
        buyer: &UserId,
    ) -> Result<TradeReceipt, EconomyError> {
        let mut trades = self.inner.trades.lock().await;
        let entry = trades.claim(id, buyer)?;
        if let Some(named) = &entry.state.buyer {
            if named != buyer {
                return Err(EconomyError::Forbidden("this offer is for someone else"));
            }
        }
        let seller = entry.owner.clone();
        let trade = entry.state.clone();

        let guard = self.inner.lock.lock().await;
        let mut inventory = self.load_inventory(buyer).await?;
        let (paid, _) = self
            .inner
            .ledger
            .transfer(buyer, &seller, trade.price, "trade")
            .await?;
        if trades.resolve(id).is_none() {
            return Err(EconomyError::AlreadyHandled);
        }

        let first_time = inventory.add_items(&trade.item.id, trade.count);
        if let Err(err) = self.save_inventory(&inventory).await {
            warn!(%id, %buyer, %err, "trade delivery failed, unwinding");
            drop(guard);
            if self
                .inner
                .ledger
                .transfer(&seller, buyer, trade.price, "trade reversal")
                .await
                .is_err()
            {
                self.inner.ledger.audit().alert(&OperatorAlert {
                    user: buyer.clone(),
                    amount: trade.price,
                    detail: format!("trade {id} payment not reversed after failed delivery"),
                });
            }
            self.return_items(&seller, &trade.item.id, trade.count, "trade delivery failed")
                .await;
            return Err(err.into());
        }
        drop(guard);
        drop(trades);
        info!(
            %id,
            %seller,
            %buyer,
            item = %trade.item.id,
            count = trade.count,
            price = trade.price,
            "trade completed"
        );

        Ok(TradeReceipt {
            id: id.clone(),
            seller,
            buyer: buyer.clone(),
            item: trade.item,
            count: trade.count,
            price: trade.price,
            buyer_balance: paid.new,
            first_time,
        })
    }

    /// Withdraws an offer and returns the escrowed items to the seller.
    pub async fn cancel_trade(
        &self,
        id: &SessionId,
        actor: &UserId,
    ) -> Result<TradeCancelled, EconomyError> {
        let mut trades = self.inner.trades.lock().await;
        let entry = trades
            .get(id)
            .ok_or_else(|| EconomyError::NotFound("trade".to_string()))?;
        if entry.owner != *actor {
            return Err(EconomyError::Forbidden("only the seller can cancel this offer"));
        }
        let entry = trades.resolve(id).ok_or(EconomyError::AlreadyHandled)?;
        self.return_items(actor, &entry.state.item.id, entry.state.count, "trade cancelled")
            .await;
        drop(trades);
        info!(%id, seller = %actor, "trade cancelled");

        Ok(TradeCancelled {
            id: id.clone(),
            item: entry.state.item,
            count: entry.state.count,
        })
    }

    /// Returns the escrowed items of an offer nobody accepted.
    pub async fn expire_trade(&self, id: &SessionId) -> bool {
        let mut trades = self.inner.trades.lock().await;
        let Some(entry) = trades.expire(id) else {
            return false;
        };
        self.return_items(
            &entry.owner,
            &entry.state.item.id,
            entry.state.count,
            "trade expired",
        )
        .await;
        drop(trades);
        info!(%id, seller = %entry.owner, "trade expired");

        notify(
            &self.inner.notices,
            Notice::TradeExpired {
                id: id.clone(),
                seller: entry.owner,
                item: entry.state.item.id,
                count: entry.state.count,
            },
        );
        true
    }
}
