use socialcredit_types::{UserId, SECONDS_PER_DAY};
use std::{sync::Arc, time::Duration};

use crate::{
    clock::Clock,
    error::EconomyError,
    store::{parse_counter, Store, StoreError},
};

/// Actions capped per user per UTC day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DailyAction {
    Open,
    Purchase,
}

impl DailyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DailyAction::Open => "open",
            DailyAction::Purchase => "purchase",
        }
    }
}

/// Counts daily actions in the store under `daily:<action>:<user>:<day>`.
///
/// Counters expire a day after their first increment, so old buckets clean themselves up.
pub struct DailyLimiter<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> DailyLimiter<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn key(&self, action: DailyAction, user: &UserId) -> String {
        let day = self.clock.now_secs() / SECONDS_PER_DAY;
        format!("daily:{}:{user}:{day}", action.as_str())
    }

    pub async fn used(&self, action: DailyAction, user: &UserId) -> Result<u32, StoreError> {
        let key = self.key(action, user);
        match self.store.get(&key).await? {
            Some(bytes) => Ok(u32::try_from(parse_counter(&key, &bytes)?).unwrap_or(u32::MAX)),
            None => Ok(0),
        }
    }

    /// Rejects with [EconomyError::DailyLimit] once `limit` actions were taken today; otherwise
    /// returns how many remain before this one.
    pub async fn check(
        &self,
        action: DailyAction,
        user: &UserId,
        limit: u32,
    ) -> Result<u32, EconomyError> {
        let used = self.used(action, user).await?;
        if used >= limit {
            return Err(EconomyError::DailyLimit { limit });
        }
        Ok(limit - used)
    }

    /// Counts one action, returning today's total.
    pub async fn consume(&self, action: DailyAction, user: &UserId) -> Result<u32, StoreError> {
        let key = self.key(action, user);
        let total = self
            .store
            .incr(&key, Duration::from_secs(SECONDS_PER_DAY))
            .await?;
        Ok(u32::try_from(total).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{ManualClock, Memory};

    #[tokio::test]
    async fn test_limit_resets_on_day_boundary() {
        let memory = Arc::new(Memory::default());
        let clock = Arc::new(ManualClock::new(SECONDS_PER_DAY * 100 + 10));
        let limiter = DailyLimiter::new(Arc::clone(&memory), clock.clone());
        let user = UserId::new("alice");

        for expected in 1..=2 {
            assert!(limiter.check(DailyAction::Open, &user, 2).await.is_ok());
            assert_eq!(limiter.consume(DailyAction::Open, &user).await.unwrap(), expected);
        }
        assert_eq!(
            limiter.check(DailyAction::Open, &user, 2).await,
            Err(EconomyError::DailyLimit { limit: 2 })
        );
        // Other actions have their own bucket.
        assert_eq!(limiter.check(DailyAction::Purchase, &user, 2).await, Ok(2));

        clock.set(SECONDS_PER_DAY * 101);
        assert_eq!(limiter.check(DailyAction::Open, &user, 2).await, Ok(2));
        assert_eq!(
            memory.ttl_of(&format!("daily:open:alice:{}", 100)),
            Some(Duration::from_secs(SECONDS_PER_DAY))
        );
    }
}
