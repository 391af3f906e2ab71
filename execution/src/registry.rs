//! Registry of short-lived interactive sessions (duels, rounds, sale prompts, trade offers).
//!
//! Each session is owned by the user who created it and carries an expiry timer. Every terminal
//! transition (resolve or expire) removes the session while the registry lock is held, so
//! exactly one of them can observe a given session. Callers perform their credit mutations after
//! removal and before releasing the lock.

use rand::Rng;
use socialcredit_types::UserId;
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{
    sync::{Mutex, MutexGuard},
    task::AbortHandle,
    time::Instant,
};

use crate::error::EconomyError;

/// State carried by a registry entry.
pub trait Session: Send + 'static {
    /// Prefix of generated ids and name used in messages.
    const KIND: &'static str;

    /// Whether a user other than the owner may currently claim this session.
    fn is_claimable(&self) -> bool {
        false
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn generate(kind: &str, owner: &UserId) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or(0);
        let suffix: u16 = rand::thread_rng().gen();
        Self(format!("{kind}-{owner}-{millis:x}-{suffix:04x}"))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug)]
pub struct Entry<T> {
    pub id: SessionId,
    pub owner: UserId,
    pub created_at: Instant,
    pub expires_at: Instant,
    pub state: T,
}

struct Inner<T> {
    entries: HashMap<SessionId, Entry<T>>,
    timers: HashMap<SessionId, AbortHandle>,
}

pub struct SessionRegistry<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Session> SessionRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                timers: HashMap::new(),
            }),
        }
    }

    /// Acquires exclusive access to every session of this kind.
    pub async fn lock(&self) -> Sessions<'_, T> {
        Sessions {
            inner: self.inner.lock().await,
        }
    }
}

impl<T: Session> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive view of a registry, held for the duration of a state transition.
pub struct Sessions<'a, T> {
    inner: MutexGuard<'a, Inner<T>>,
}

impl<T: Session> Sessions<'_, T> {
    /// Registers a new session and arms its expiry timer.
    ///
    /// When the timer fires, `on_expire` runs with the session id. It is expected to lock the
    /// registry and call [Sessions::expire], which is a no-op if the session already resolved.
    pub fn create<F, Fut>(
        &mut self,
        owner: UserId,
        state: T,
        ttl: Duration,
        on_expire: F,
    ) -> SessionId
    where
        F: FnOnce(SessionId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut id = SessionId::generate(T::KIND, &owner);
        while self.inner.entries.contains_key(&id) {
            id = SessionId::generate(T::KIND, &owner);
        }

        let created_at = Instant::now();
        let timer_id = id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            on_expire(timer_id).await;
        });
        self.inner.timers.insert(id.clone(), timer.abort_handle());
        self.inner.entries.insert(
            id.clone(),
            Entry {
                id: id.clone(),
                owner,
                created_at,
                expires_at: created_at + ttl,
                state,
            },
        );
        id
    }

    pub fn get(&self, id: &SessionId) -> Option<&Entry<T>> {
        self.inner.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Entry<T>> {
        self.inner.entries.get_mut(id)
    }

    /// Checks that `claimant` may join the session: it must exist, belong to someone else, and
    /// still be claimable.
    pub fn claim(
        &mut self,
        id: &SessionId,
        claimant: &UserId,
    ) -> Result<&mut Entry<T>, EconomyError> {
        let entry = self
            .inner
            .entries
            .get_mut(id)
            .ok_or_else(|| EconomyError::NotFound(T::KIND.to_string()))?;
        if entry.owner == *claimant {
            return Err(EconomyError::Forbidden("you cannot accept your own offer"));
        }
        if !entry.state.is_claimable() {
            return Err(EconomyError::AlreadyHandled);
        }
        Ok(entry)
    }

    /// Removes a session that reached a terminal state, cancelling its timer.
    pub fn resolve(&mut self, id: &SessionId) -> Option<Entry<T>> {
        if let Some(timer) = self.inner.timers.remove(id) {
            timer.abort();
        }
        self.inner.entries.remove(id)
    }

    /// Removes a session whose time ran out.
    ///
    /// The timer handle is dropped without aborting, since this usually runs inside the timer
    /// task itself.
    pub fn expire(&mut self, id: &SessionId) -> Option<Entry<T>> {
        self.inner.timers.remove(id);
        self.inner.entries.remove(id)
    }

    /// Ids of sessions past their deadline.
    pub fn overdue(&self, now: Instant) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .inner
            .entries
            .values()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    type ExpiryFuture = std::pin::Pin<Box<dyn Future<Output = ()> + Send>>;

    #[derive(Debug)]
    struct Offer {
        open: bool,
    }

    impl Session for Offer {
        const KIND: &'static str = "offer";

        fn is_claimable(&self) -> bool {
            self.open
        }
    }

    fn counting_expiry(
        registry: &Arc<SessionRegistry<Offer>>,
        fired: &Arc<AtomicUsize>,
    ) -> impl FnOnce(SessionId) -> ExpiryFuture + Send + 'static {
        let registry = Arc::clone(registry);
        let fired = Arc::clone(fired);
        move |id| {
            Box::pin(async move {
                if registry.lock().await.expire(&id).is_some() {
                    fired.fetch_add(1, Ordering::SeqCst);
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_session_expires() {
        let registry = Arc::new(SessionRegistry::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let id = registry.lock().await.create(
            UserId::new("alice"),
            Offer { open: true },
            Duration::from_secs(60),
            counting_expiry(&registry, &fired),
        );
        assert!(id.as_str().starts_with("offer-alice-"));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(registry.lock().await.len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(registry.lock().await.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_cancels_expiry() {
        let registry = Arc::new(SessionRegistry::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let id = registry.lock().await.create(
            UserId::new("alice"),
            Offer { open: true },
            Duration::from_secs(60),
            counting_expiry(&registry, &fired),
        );

        let entry = registry.lock().await.resolve(&id).unwrap();
        assert_eq!(entry.owner, UserId::new("alice"));
        assert!(registry.lock().await.resolve(&id).is_none());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_rules() {
        let registry = Arc::new(SessionRegistry::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let mut sessions = registry.lock().await;
        let id = sessions.create(
            UserId::new("alice"),
            Offer { open: true },
            Duration::from_secs(60),
            counting_expiry(&registry, &fired),
        );

        assert!(matches!(
            sessions.claim(&id, &UserId::new("alice")),
            Err(EconomyError::Forbidden(_))
        ));
        assert!(matches!(
            sessions.claim(&SessionId::from("offer-missing"), &UserId::new("bob")),
            Err(EconomyError::NotFound(_))
        ));

        let entry = sessions.claim(&id, &UserId::new("bob")).unwrap();
        entry.state.open = false;
        assert_eq!(
            sessions.claim(&id, &UserId::new("carol")).unwrap_err(),
            EconomyError::AlreadyHandled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overdue_lists_late_sessions() {
        let registry = Arc::new(SessionRegistry::new());
        let fired = Arc::new(AtomicUsize::new(0));
        let mut sessions = registry.lock().await;
        let short = sessions.create(
            UserId::new("a"),
            Offer { open: true },
            Duration::from_secs(10),
            counting_expiry(&registry, &fired),
        );
        sessions.create(
            UserId::new("b"),
            Offer { open: true },
            Duration::from_secs(100),
            counting_expiry(&registry, &fired),
        );
        let later = Instant::now() + Duration::from_secs(50);
        assert_eq!(sessions.overdue(later), vec![short]);
    }
}
