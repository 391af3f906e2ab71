//! Two-party wagered duels.
//!
//! A challenge escrows the challenger's wager when it is created. Acceptance escrows the
//! opponent's matching wager and settles immediately on a fair coin; the winner takes the pot.
//! Unaccepted challenges are refunded when they expire or are declined.

use socialcredit_types::{GameKind, UserId, MAX_WAGER};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    entropy::Entropy,
    error::EconomyError,
    ledger::{CreditLedger, OperatorAlert},
    notice::{notify, Notice, Notifier},
    registry::{Entry, Session, SessionId, SessionRegistry},
    store::Store,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuelState {
    Open,
    Accepted,
}

#[derive(Clone, Debug)]
pub struct DuelSession {
    /// Only this user may accept, when set.
    pub target: Option<UserId>,
    pub wager: u64,
    pub state: DuelState,
}

impl Session for DuelSession {
    const KIND: &'static str = "duel";

    fn is_claimable(&self) -> bool {
        self.state == DuelState::Open
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuelChallenge {
    pub id: SessionId,
    pub challenger: UserId,
    pub target: Option<UserId>,
    pub wager: u64,
    /// Challenger balance after escrow.
    pub balance: u64,
    pub ttl: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuelOutcome {
    pub id: SessionId,
    pub winner: UserId,
    pub loser: UserId,
    pub wager: u64,
    pub pot: u64,
    pub winner_balance: u64,
    pub loser_balance: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuelDeclined {
    pub id: SessionId,
    pub challenger: UserId,
    pub declined_by: UserId,
    pub refunded: u64,
}

struct DuelInner<S> {
    ledger: Arc<CreditLedger<S>>,
    sessions: SessionRegistry<DuelSession>,
    entropy: Arc<dyn Entropy>,
    notices: Notifier,
    ttl: Duration,
}

pub struct DuelEngine<S> {
    inner: Arc<DuelInner<S>>,
}

impl<S> Clone for DuelEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Store> DuelEngine<S> {
    pub fn new(
        ledger: Arc<CreditLedger<S>>,
        entropy: Arc<dyn Entropy>,
        notices: Notifier,
        ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(DuelInner {
                ledger,
                sessions: SessionRegistry::new(),
                entropy,
                notices,
                ttl,
            }),
        }
    }

    /// Opens a challenge, escrowing `wager` from the challenger.
    pub async fn challenge(
        &self,
        challenger: &UserId,
        target: Option<&UserId>,
        wager: u64,
    ) -> Result<DuelChallenge, EconomyError> {
        if wager == 0 {
            return Err(EconomyError::invalid("wager must be positive"));
        }
        if wager > MAX_WAGER {
            return Err(EconomyError::invalid("wager is too large"));
        }
        if target == Some(challenger) {
            return Err(EconomyError::Forbidden("you cannot duel yourself"));
        }

        let mut sessions = self.inner.sessions.lock().await;
        let escrow = self
            .inner
            .ledger
            .debit(challenger, wager, "duel escrow")
            .await?;

        let engine = self.clone();
        let id = sessions.create(
            challenger.clone(),
            DuelSession {
                target: target.cloned(),
                wager,
                state: DuelState::Open,
            },
            self.inner.ttl,
            move |id| async move {
                engine.expire(&id).await;
            },
        );
        info!(%id, %challenger, wager, "duel opened");

        Ok(DuelChallenge {
            id,
            challenger: challenger.clone(),
            target: target.cloned(),
            wager,
            balance: escrow.new,
            ttl: self.inner.ttl,
        })
    }

    /// Accepts an open challenge and settles it.
    pub async fn accept(
        &self,
        id: &SessionId,
        opponent: &UserId,
    ) -> Result<DuelOutcome, EconomyError> {
        let mut sessions = self.inner.sessions.lock().await;
        let entry = sessions.claim(id, opponent)?;
        if let Some(target) = &entry.state.target {
            if target != opponent {
                return Err(EconomyError::Forbidden("this duel is for someone else"));
            }
        }
        let wager = entry.state.wager;

        let escrow = self
            .inner
            .ledger
            .debit(opponent, wager, "duel escrow")
            .await?;
        if let Some(entry) = sessions.get_mut(id) {
            entry.state.state = DuelState::Accepted;
        }
        let Some(entry) = sessions.resolve(id) else {
            self.inner
                .ledger
                .refund(opponent, wager, "duel escrow returned")
                .await;
            return Err(EconomyError::AlreadyHandled);
        };
        let challenger = entry.owner;

        let (winner, loser) = if self.inner.entropy.flip() {
            (challenger.clone(), opponent.clone())
        } else {
            (opponent.clone(), challenger.clone())
        };
        let pot = wager.saturating_mul(2);
        let winner_balance = match self.inner.ledger.credit(&winner, pot, "duel won").await {
            Ok(adjustment) => adjustment.new,
            Err(err) => {
                self.inner.ledger.audit().alert(&OperatorAlert {
                    user: winner.clone(),
                    amount: pot,
                    detail: format!("duel {id} pot was not paid out: {err}"),
                });
                return Err(err);
            }
        };
        drop(sessions);

        for (player, won) in [(&winner, true), (&loser, false)] {
            if let Err(err) = self.inner.ledger.record_game(player, GameKind::Duel, won).await {
                warn!(%id, %player, %err, "failed to record duel stats");
            }
        }
        let loser_balance = if loser == *opponent {
            escrow.new
        } else {
            self.inner.ledger.balance(&loser).await
        };
        info!(%id, %winner, %loser, pot, "duel settled");

        Ok(DuelOutcome {
            id: id.clone(),
            winner,
            loser,
            wager,
            pot,
            winner_balance,
            loser_balance,
        })
    }

    /// Withdraws (challenger) or refuses (target) an open challenge, refunding the escrow.
    pub async fn decline(
        &self,
        id: &SessionId,
        actor: &UserId,
    ) -> Result<DuelDeclined, EconomyError> {
        let mut sessions = self.inner.sessions.lock().await;
        let entry = sessions
            .get(id)
            .ok_or_else(|| EconomyError::NotFound("duel".to_string()))?;
        if entry.state.state != DuelState::Open {
            return Err(EconomyError::AlreadyHandled);
        }
        let allowed = entry.owner == *actor || entry.state.target.as_ref() == Some(actor);
        if !allowed {
            return Err(EconomyError::Forbidden(
                "only the challenger or the challenged player can decline",
            ));
        }
        let Some(entry) = sessions.resolve(id) else {
            return Err(EconomyError::AlreadyHandled);
        };
        self.inner
            .ledger
            .refund(&entry.owner, entry.state.wager, "duel declined")
            .await;
        info!(%id, by = %actor, "duel declined");

        Ok(DuelDeclined {
            id: id.clone(),
            challenger: entry.owner,
            declined_by: actor.clone(),
            refunded: entry.state.wager,
        })
    }

    /// Expires a challenge nobody accepted, refunding the challenger. Returns the refunded
    /// amount, or `None` when the duel already reached another terminal state.
    pub async fn expire(&self, id: &SessionId) -> Option<u64> {
        let mut sessions = self.inner.sessions.lock().await;
        let entry = sessions.expire(id)?;
        let refunded = self.settle_expired(&entry).await;
        drop(sessions);

        notify(
            &self.inner.notices,
            Notice::DuelExpired {
                id: id.clone(),
                challenger: entry.owner,
                refunded,
            },
        );
        Some(refunded)
    }

    async fn settle_expired(&self, entry: &Entry<DuelSession>) -> u64 {
        if entry.state.state != DuelState::Open {
            warn!(id = %entry.id, "expired duel was not open");
            return 0;
        }
        self.inner
            .ledger
            .refund(&entry.owner, entry.state.wager, "duel expired")
            .await;
        info!(id = %entry.id, challenger = %entry.owner, "duel expired");
        entry.state.wager
    }

    /// Expires every challenge past its deadline whose timer has not fired.
    pub async fn sweep(&self) -> usize {
        let overdue = self
            .inner
            .sessions
            .lock()
            .await
            .overdue(tokio::time::Instant::now());
        let mut expired = 0;
        for id in overdue {
            if self.expire(&id).await.is_some() {
                expired += 1;
            }
        }
        expired
    }

    pub async fn open_challenges(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }
}
