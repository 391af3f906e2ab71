//! Single-player coin-flip rounds with a cosmetic reveal.
//!
//! A round is opened with no money at stake. Placing a bet escrows the wager and marks the
//! round in progress; the reveal frames are then shown without holding the registry lock, and
//! settlement re-acquires it and removes the round before paying out.

use serde::Serialize;
use socialcredit_types::{GameKind, UserId, MAX_WAGER};
use std::{fmt, future::Future, str::FromStr, sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    entropy::Entropy,
    error::EconomyError,
    ledger::{CreditLedger, OperatorAlert},
    notice::{notify, Notice, Notifier},
    registry::{Session, SessionId, SessionRegistry},
    store::Store,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Red,
    Black,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Red => "red",
            Side::Black => "black",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Red => Side::Black,
            Side::Black => Side::Red,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "red" | "r" | "a" => Ok(Side::Red),
            "black" | "b" => Ok(Side::Black),
            other => Err(EconomyError::invalid(format!(
                "unknown side {other:?}, pick red or black"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundState {
    AwaitingBet,
    InProgress { side: Side, wager: u64 },
}

#[derive(Clone, Debug)]
pub struct RoundSession {
    pub state: RoundState,
}

impl Session for RoundSession {
    const KIND: &'static str = "round";
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundStarted {
    pub id: SessionId,
    pub player: UserId,
    pub balance: u64,
    pub ttl: Duration,
}

/// One cosmetic frame of the reveal animation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealFrame {
    pub round: SessionId,
    pub player: UserId,
    /// 1-based.
    pub step: u8,
    pub of: u8,
    pub showing: Side,
}

/// Receives reveal frames while a round is being settled.
pub trait Reveal: Send + Sync {
    fn show(&self, frame: RevealFrame) -> impl Future<Output = ()> + Send;
}

impl Reveal for () {
    async fn show(&self, _: RevealFrame) {}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundOutcome {
    pub id: SessionId,
    pub player: UserId,
    pub side: Side,
    pub landed: Side,
    pub wager: u64,
    pub won: bool,
    pub payout: u64,
    pub balance: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct RoundConfig {
    pub ttl: Duration,
    pub reveal_frames: u8,
    pub reveal_delay: Duration,
}

struct CoinflipInner<S> {
    ledger: Arc<CreditLedger<S>>,
    sessions: SessionRegistry<RoundSession>,
    entropy: Arc<dyn Entropy>,
    notices: Notifier,
    config: RoundConfig,
}

pub struct CoinflipEngine<S> {
    inner: Arc<CoinflipInner<S>>,
}

impl<S> Clone for CoinflipEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Store> CoinflipEngine<S> {
    pub fn new(
        ledger: Arc<CreditLedger<S>>,
        entropy: Arc<dyn Entropy>,
        notices: Notifier,
        config: RoundConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CoinflipInner {
                ledger,
                sessions: SessionRegistry::new(),
                entropy,
                notices,
                config,
            }),
        }
    }

    /// Opens a round awaiting a bet. Nothing is escrowed.
    pub async fn start(&self, player: &UserId) -> Result<RoundStarted, EconomyError> {
        let balance = self.inner.ledger.balance(player).await;
        let engine = self.clone();
        let id = self.inner.sessions.lock().await.create(
            player.clone(),
            RoundSession {
                state: RoundState::AwaitingBet,
            },
            self.inner.config.ttl,
            move |id| async move {
                engine.expire(&id).await;
            },
        );
        info!(%id, %player, "round opened");
        Ok(RoundStarted {
            id,
            player: player.clone(),
            balance,
            ttl: self.inner.config.ttl,
        })
    }

    /// Starts a fresh round for the same player.
    pub async fn replay(&self, player: &UserId) -> Result<RoundStarted, EconomyError> {
        self.start(player).await
    }

    /// Places a bet on `side` and settles the round.
    pub async fn play<R: Reveal>(
        &self,
        id: &SessionId,
        actor: &UserId,
        side: Side,
        wager: u64,
        reveal: &R,
    ) -> Result<RoundOutcome, EconomyError> {
        if wager == 0 {
            return Err(EconomyError::invalid("wager must be positive"));
        }
        if wager > MAX_WAGER {
            return Err(EconomyError::invalid("wager is too large"));
        }

        // Escrow and mark the round in progress.
        {
            let mut sessions = self.inner.sessions.lock().await;
            let entry = sessions
                .get(id)
                .ok_or_else(|| EconomyError::NotFound("round".to_string()))?;
            if entry.owner != *actor {
                return Err(EconomyError::Forbidden("this round belongs to someone else"));
            }
            if entry.state.state != RoundState::AwaitingBet {
                return Err(EconomyError::AlreadyHandled);
            }
            self.inner
                .ledger
                .debit(actor, wager, "coinflip wager")
                .await?;
            if let Some(entry) = sessions.get_mut(id) {
                entry.state.state = RoundState::InProgress { side, wager };
            }
        }

        let frames = self.inner.config.reveal_frames;
        for step in 1..=frames {
            let showing = if step % 2 == 1 { side } else { side.opposite() };
            reveal
                .show(RevealFrame {
                    round: id.clone(),
                    player: actor.clone(),
                    step,
                    of: frames,
                    showing,
                })
                .await;
            tokio::time::sleep(self.inner.config.reveal_delay).await;
        }

        let mut sessions = self.inner.sessions.lock().await;
        let Some(entry) = sessions.resolve(id) else {
            // Expired during the reveal; the wager was refunded.
            return Err(EconomyError::AlreadyHandled);
        };
        let RoundState::InProgress { side, wager } = entry.state.state else {
            return Err(EconomyError::AlreadyHandled);
        };

        let landed = if self.inner.entropy.flip() {
            Side::Red
        } else {
            Side::Black
        };
        let won = landed == side;
        let payout = if won { wager.saturating_mul(2) } else { 0 };
        let balance = if won {
            match self.inner.ledger.credit(actor, payout, "coinflip won").await {
                Ok(adjustment) => adjustment.new,
                Err(err) => {
                    self.inner.ledger.audit().alert(&OperatorAlert {
                        user: actor.clone(),
                        amount: payout,
                        detail: format!("round {id} payout failed: {err}"),
                    });
                    return Err(err);
                }
            }
        } else {
            self.inner.ledger.balance(actor).await
        };
        drop(sessions);

        if let Err(err) = self
            .inner
            .ledger
            .record_game(actor, GameKind::Coinflip, won)
            .await
        {
            warn!(%id, player = %actor, %err, "failed to record coinflip stats");
        }
        info!(%id, player = %actor, %side, %landed, wager, won, "round settled");

        Ok(RoundOutcome {
            id: id.clone(),
            player: actor.clone(),
            side,
            landed,
            wager,
            won,
            payout,
            balance,
        })
    }

    /// Expires a round. A bet that was escrowed but never settled is refunded.
    pub async fn expire(&self, id: &SessionId) -> Option<Option<u64>> {
        let mut sessions = self.inner.sessions.lock().await;
        let entry = sessions.expire(id)?;
        let refunded = match entry.state.state {
            RoundState::AwaitingBet => None,
            RoundState::InProgress { wager, .. } => {
                self.inner
                    .ledger
                    .refund(&entry.owner, wager, "coinflip round expired")
                    .await;
                Some(wager)
            }
        };
        drop(sessions);
        info!(%id, player = %entry.owner, ?refunded, "round expired");

        notify(
            &self.inner.notices,
            Notice::RoundExpired {
                id: id.clone(),
                player: entry.owner,
                refunded,
            },
        );
        Some(refunded)
    }

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

    pub async fn open_rounds(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }
}
