//! Per-user balances and game statistics.
//!
//! All read-modify-write cycles on account records run under a single ledger-wide lock, so
//! concurrent adjustments to the same account cannot lose updates. Balances are clamped at zero
//! on every step; debits used for escrow are strict and reject instead of clamping.

use socialcredit_types::{Account, GameKind, UserId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::{
    error::EconomyError,
    store::{self, Store, StoreError},
};

/// Result of a single balance mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Adjustment {
    pub user: UserId,
    pub old: u64,
    pub new: u64,
}

impl Adjustment {
    /// Signed change actually applied (after clamping).
    pub fn delta(&self) -> i64 {
        if self.new >= self.old {
            i64::try_from(self.new - self.old).unwrap_or(i64::MAX)
        } else {
            i64::try_from(self.old - self.new).map_or(i64::MIN, |d| -d)
        }
    }
}

/// One audit-log entry, emitted for every balance change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditRecord {
    pub user: UserId,
    pub old: u64,
    pub new: u64,
    pub delta: i64,
    pub reason: String,
}

/// Something an operator must look at by hand, typically credits stranded by a store failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorAlert {
    pub user: UserId,
    pub amount: u64,
    pub detail: String,
}

/// Destination for audit records and operator alerts.
pub trait AuditSink: Send + Sync + 'static {
    fn record(&self, record: &AuditRecord);

    fn alert(&self, alert: &OperatorAlert) {
        error!(
            target: "socialcredit::operator",
            user = %alert.user,
            amount = alert.amount,
            detail = %alert.detail,
            "manual intervention required"
        );
    }
}

/// Writes audit records to the `socialcredit::audit` tracing target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, record: &AuditRecord) {
        info!(
            target: "socialcredit::audit",
            user = %record.user,
            old = record.old,
            new = record.new,
            delta = record.delta,
            reason = %record.reason,
            "balance adjusted"
        );
    }
}

fn to_delta(amount: u64) -> Result<i64, EconomyError> {
    i64::try_from(amount).map_err(|_| EconomyError::invalid("amount is too large"))
}

pub struct CreditLedger<S> {
    store: Arc<S>,
    audit: Arc<dyn AuditSink>,
    lock: Mutex<()>,
}

impl<S: Store> CreditLedger<S> {
    pub fn new(store: Arc<S>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            lock: Mutex::new(()),
        }
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    async fn load(&self, user: &UserId) -> Result<Account, StoreError> {
        let key = Account::key(user);
        Ok(store::load::<_, Account>(self.store.as_ref(), &key)
            .await?
            .unwrap_or_else(|| Account::new(user.clone())))
    }

    async fn write(&self, account: &Account) -> Result<(), StoreError> {
        store::save(self.store.as_ref(), &Account::key(&account.id), account).await
    }

    fn emit(&self, adjustment: &Adjustment, reason: &str) {
        if adjustment.old == adjustment.new {
            return;
        }
        self.audit.record(&AuditRecord {
            user: adjustment.user.clone(),
            old: adjustment.old,
            new: adjustment.new,
            delta: adjustment.delta(),
            reason: reason.to_string(),
        });
    }

    /// Current balance, reading as 0 when the account is missing or the store is down.
    pub async fn balance(&self, user: &UserId) -> u64 {
        match self.load(user).await {
            Ok(account) => account.balance,
            Err(err) => {
                warn!(%user, %err, "balance read failed, reporting 0");
                0
            }
        }
    }

    /// Full account record, including game statistics.
    pub async fn account(&self, user: &UserId) -> Result<Account, EconomyError> {
        Ok(self.load(user).await?)
    }

    /// Raises an operator alert for a balance change that never reached the store.
    fn lost(&self, user: &UserId, amount: u64, reason: &str, err: &StoreError) {
        self.audit.alert(&OperatorAlert {
            user: user.clone(),
            amount,
            detail: format!("balance write lost ({reason}): {err}"),
        });
    }

    /// Applies a signed delta, clamping the result at zero.
    ///
    /// On store failure no audit record is emitted and the returned error carries no partial
    /// state. A failed write also raises an operator alert, since the change is lost.
    pub async fn adjust(
        &self,
        user: &UserId,
        delta: i64,
        reason: &str,
    ) -> Result<Adjustment, EconomyError> {
        self.apply(user, delta, reason, true).await
    }

    /// Shared body of [Self::adjust]. Callers that compensate a failure themselves pass
    /// `alert_lost = false` and raise their own alert.
    async fn apply(
        &self,
        user: &UserId,
        delta: i64,
        reason: &str,
        alert_lost: bool,
    ) -> Result<Adjustment, EconomyError> {
        let _guard = self.lock.lock().await;
        let mut account = self.load(user).await?;
        let old = account.apply_delta(delta);
        let adjustment = Adjustment {
            user: user.clone(),
            old,
            new: account.balance,
        };
        if adjustment.old != adjustment.new {
            if let Err(err) = self.write(&account).await {
                if alert_lost {
                    self.lost(user, delta.unsigned_abs(), reason, &err);
                }
                return Err(err.into());
            }
        }
        self.emit(&adjustment, reason);
        Ok(adjustment)
    }

    pub async fn credit(
        &self,
        user: &UserId,
        amount: u64,
        reason: &str,
    ) -> Result<Adjustment, EconomyError> {
        self.adjust(user, to_delta(amount)?, reason).await
    }

    /// Removes exactly `amount`, rejecting when the balance cannot cover it.
    pub async fn debit(
        &self,
        user: &UserId,
        amount: u64,
        reason: &str,
    ) -> Result<Adjustment, EconomyError> {
        let delta = to_delta(amount)?;
        let _guard = self.lock.lock().await;
        let mut account = self.load(user).await?;
        if account.balance < amount {
            return Err(EconomyError::InsufficientFunds {
                needed: amount,
                available: account.balance,
            });
        }
        let old = account.apply_delta(-delta);
        let adjustment = Adjustment {
            user: user.clone(),
            old,
            new: account.balance,
        };
        if amount > 0 {
            if let Err(err) = self.write(&account).await {
                self.lost(user, amount, reason, &err);
                return Err(err.into());
            }
        }
        self.emit(&adjustment, reason);
        Ok(adjustment)
    }

    /// Credits back an amount already removed from `user`, alerting an operator if that fails.
    pub async fn refund(&self, user: &UserId, amount: u64, reason: &str) -> Option<Adjustment> {
        let applied = match to_delta(amount) {
            Ok(delta) => self.apply(user, delta, reason, false).await,
            Err(err) => Err(err),
        };
        match applied {
            Ok(adjustment) => Some(adjustment),
            Err(err) => {
                self.audit.alert(&OperatorAlert {
                    user: user.clone(),
                    amount,
                    detail: format!("refund failed ({reason}): {err}"),
                });
                None
            }
        }
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// The debit and credit are separate writes. If the credit fails after the debit succeeded,
    /// the debit is reversed; if the reversal also fails an operator alert is raised.
    pub async fn transfer(
        &self,
        from: &UserId,
        to: &UserId,
        amount: u64,
        reason: &str,
    ) -> Result<(Adjustment, Adjustment), EconomyError> {
        if from == to {
            return Err(EconomyError::Forbidden("you cannot transfer to yourself"));
        }
        if amount == 0 {
            return Err(EconomyError::invalid("amount must be positive"));
        }
        let delta = to_delta(amount)?;
        let debited = self.debit(from, amount, reason).await?;
        match self.apply(to, delta, reason, false).await {
            Ok(credited) => Ok((debited, credited)),
            Err(err) => {
                warn!(%from, %to, amount, %err, "transfer credit failed, reversing debit");
                self.refund(from, amount, "transfer reversal").await;
                Err(err)
            }
        }
    }

    /// Records a finished game in the player's statistics.
    pub async fn record_game(
        &self,
        user: &UserId,
        kind: GameKind,
        won: bool,
    ) -> Result<(), EconomyError> {
        let _guard = self.lock.lock().await;
        let mut account = self.load(user).await?;
        account.stats.record(kind, won);
        self.write(&account).await?;
        Ok(())
    }

    pub async fn record_opening(&self, user: &UserId) -> Result<(), EconomyError> {
        let _guard = self.lock.lock().await;
        let mut account = self.load(user).await?;
        account.stats.containers_opened = account.stats.containers_opened.saturating_add(1);
        self.write(&account).await?;
        Ok(())
    }

    /// Top `limit` accounts by balance, ties broken by user id.
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<Account>, EconomyError> {
        let keys = self.store.keys("account:").await?;
        let mut accounts = Vec::with_capacity(keys.len());
        for key in keys {
            match store::load::<_, Account>(self.store.as_ref(), &key).await {
                Ok(Some(account)) => accounts.push(account),
                Ok(None) => {}
                Err(err) => warn!(key, %err, "skipping unreadable account"),
            }
        }
        accounts.sort_by(|a, b| b.balance.cmp(&a.balance).then_with(|| a.id.cmp(&b.id)));
        accounts.truncate(limit);
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{Memory, RecordingAudit};

    fn ledger() -> (Arc<Memory>, Arc<RecordingAudit>, CreditLedger<Memory>) {
        let memory = Arc::new(Memory::default());
        let audit = Arc::new(RecordingAudit::default());
        let ledger = CreditLedger::new(Arc::clone(&memory), audit.clone());
        (memory, audit, ledger)
    }

    #[tokio::test]
    async fn test_missing_account_reads_zero() {
        let (_, _, ledger) = ledger();
        assert_eq!(ledger.balance(&UserId::new("ghost")).await, 0);
    }

    #[tokio::test]
    async fn test_adjust_clamps_each_step() {
        let (_, audit, ledger) = ledger();
        let user = UserId::new("alice");
        ledger.adjust(&user, 30, "seed").await.unwrap();
        let down = ledger.adjust(&user, -50, "penalty").await.unwrap();
        assert_eq!((down.old, down.new, down.delta()), (30, 0, -30));
        let up = ledger.adjust(&user, 10, "bonus").await.unwrap();
        assert_eq!(up.new, 10);

        let records = audit.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].delta, -30);
        assert_eq!(records[1].reason, "penalty");
    }

    #[tokio::test]
    async fn test_debit_is_strict() {
        let (_, audit, ledger) = ledger();
        let user = UserId::new("bob");
        ledger.credit(&user, 40, "seed").await.unwrap();
        let err = ledger.debit(&user, 41, "wager").await.unwrap_err();
        assert_eq!(
            err,
            EconomyError::InsufficientFunds {
                needed: 41,
                available: 40
            }
        );
        assert_eq!(ledger.balance(&user).await, 40);
        assert_eq!(audit.records().len(), 1);

        let exact = ledger.debit(&user, 40, "wager").await.unwrap();
        assert_eq!(exact.new, 0);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_audit() {
        let (memory, audit, ledger) = ledger();
        let user = UserId::new("carol");
        memory.fail_writes(1);
        assert!(matches!(
            ledger.credit(&user, 5, "seed").await,
            Err(EconomyError::Store(_))
        ));
        assert!(audit.records().is_empty());
        assert_eq!(ledger.balance(&user).await, 0);

        let alerts = audit.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].user, user);
        assert_eq!(alerts[0].amount, 5);
        assert!(alerts[0].detail.contains("seed"));
    }

    #[tokio::test]
    async fn test_failed_debit_write_alerts_operator() {
        let (memory, audit, ledger) = ledger();
        let user = UserId::new("frank");
        ledger.credit(&user, 50, "seed").await.unwrap();

        memory.fail_writes(1);
        assert!(matches!(
            ledger.debit(&user, 20, "wager").await,
            Err(EconomyError::Store(_))
        ));
        assert_eq!(ledger.balance(&user).await, 50);
        assert_eq!(audit.records().len(), 1);
        let alerts = audit.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].amount, 20);
    }

    #[tokio::test]
    async fn test_failed_read_raises_no_alert() {
        let (memory, audit, ledger) = ledger();
        let user = UserId::new("gina");
        memory.fail_reads(1);
        assert!(matches!(
            ledger.adjust(&user, 5, "seed").await,
            Err(EconomyError::Store(_))
        ));
        assert!(audit.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_balance_fails_open() {
        let (memory, _, ledger) = ledger();
        let user = UserId::new("dave");
        ledger.credit(&user, 5, "seed").await.unwrap();
        memory.fail_reads(1);
        assert_eq!(ledger.balance(&user).await, 0);
        assert_eq!(ledger.balance(&user).await, 5);
    }

    #[tokio::test]
    async fn test_transfer_moves_credits() {
        let (_, _, ledger) = ledger();
        let (a, b) = (UserId::new("a"), UserId::new("b"));
        ledger.credit(&a, 100, "seed").await.unwrap();
        let (debit, credit) = ledger.transfer(&a, &b, 60, "gift").await.unwrap();
        assert_eq!(debit.new, 40);
        assert_eq!(credit.new, 60);

        assert!(matches!(
            ledger.transfer(&a, &b, 41, "gift").await,
            Err(EconomyError::InsufficientFunds { .. })
        ));
        assert!(matches!(
            ledger.transfer(&a, &a, 1, "gift").await,
            Err(EconomyError::Forbidden(_))
        ));
        assert!(matches!(
            ledger.transfer(&a, &b, 0, "gift").await,
            Err(EconomyError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer_reverses_failed_credit() {
        let (memory, audit, ledger) = ledger();
        let (a, b) = (UserId::new("a"), UserId::new("b"));
        ledger.credit(&a, 100, "seed").await.unwrap();

        memory.fail_writes_to("account:b", 1);
        assert!(matches!(
            ledger.transfer(&a, &b, 30, "gift").await,
            Err(EconomyError::Store(_))
        ));
        assert_eq!(ledger.balance(&a).await, 100);
        assert_eq!(ledger.balance(&b).await, 0);
        assert!(audit.alerts().is_empty());
        let reasons: Vec<String> = audit.records().into_iter().map(|r| r.reason).collect();
        assert_eq!(reasons, vec!["seed", "gift", "transfer reversal"]);
    }

    #[tokio::test]
    async fn test_failed_refund_alerts_operator() {
        let (memory, audit, ledger) = ledger();
        let user = UserId::new("erin");
        memory.fail_writes(1);
        assert!(ledger.refund(&user, 25, "duel expired").await.is_none());
        let alerts = audit.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].amount, 25);
    }

    #[tokio::test]
    async fn test_stats_and_leaderboard() {
        let (_, _, ledger) = ledger();
        for (id, amount) in [("x", 10), ("y", 30), ("z", 30)] {
            ledger.credit(&UserId::new(id), amount, "seed").await.unwrap();
        }
        ledger
            .record_game(&UserId::new("x"), GameKind::Duel, true)
            .await
            .unwrap();
        ledger.record_opening(&UserId::new("x")).await.unwrap();

        let top = ledger.leaderboard(2).await.unwrap();
        let ids: Vec<&str> = top.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["y", "z"]);

        let x = ledger.account(&UserId::new("x")).await.unwrap();
        assert_eq!(x.stats.duels_won, 1);
        assert_eq!(x.stats.containers_opened, 1);
        assert_eq!(x.balance, 10);
    }
}
