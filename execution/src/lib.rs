//! Social credit execution layer.
//!
//! This crate holds everything that mutates the economy: the credit ledger, the session
//! registry, and the duel, coin-flip, and collectible engines built on them. The node crate
//! drives it through the [Economy] service object.
//!
//! ## Consistency rules
//! - Balances never go negative. Escrow debits reject instead of clamping.
//! - Every session reaches exactly one terminal state. Resolution removes the session while
//!   its registry lock is held, before any credit moves.
//! - Locks are always taken in the order registry, inventories, ledger.
//! - Store failures are retried a bounded number of times, then surface as
//!   [EconomyError::Store]; credits stranded by a failure raise an [OperatorAlert].

pub mod clock;
pub mod coinflip;
pub mod duel;
pub mod economy;
pub mod entropy;
pub mod error;
pub mod gacha;
pub mod ledger;
pub mod limits;
pub mod notice;
pub mod pricing;
pub mod registry;
pub mod retry;
pub mod store;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

#[cfg(test)]
mod integration_tests;

pub use clock::{Clock, SystemClock};
pub use coinflip::{CoinflipEngine, Reveal, RevealFrame, RoundOutcome, RoundStarted, Side};
pub use duel::{DuelChallenge, DuelDeclined, DuelEngine, DuelOutcome};
pub use economy::{Collaborators, Economy, EconomyConfig, EconomyConfigError};
pub use entropy::{Entropy, SeededEntropy};
pub use error::EconomyError;
pub use gacha::GachaEngine;
pub use ledger::{Adjustment, AuditRecord, AuditSink, CreditLedger, OperatorAlert, TracingAudit};
pub use notice::Notice;
pub use pricing::{PriceBook, PriceFeed, PriceFeedError};
pub use registry::SessionId;
pub use retry::{RetryPolicy, Retrying};
pub use store::{Store, StoreError};
