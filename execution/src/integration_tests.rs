//! End-to-end flows through the [Economy] service with an in-memory store.

use crate::{
    mocks::{ManualClock, Memory, RecordingAudit, ScriptedEntropy},
    store, Collaborators, Economy, EconomyConfig, EconomyError, Notice, Side,
};
use socialcredit_types::{Inventory, Item, Rarity, UserId};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

struct World {
    memory: Arc<Memory>,
    audit: Arc<RecordingAudit>,
    entropy: Arc<ScriptedEntropy>,
    economy: Economy<Arc<Memory>>,
    notices: mpsc::UnboundedReceiver<Notice>,
}

fn world(config: EconomyConfig) -> World {
    let memory = Arc::new(Memory::default());
    let audit = Arc::new(RecordingAudit::default());
    let entropy = Arc::new(ScriptedEntropy::new());
    let (economy, notices) = Economy::with_collaborators(
        Arc::clone(&memory),
        config,
        Collaborators {
            clock: Arc::new(ManualClock::new(1_700_000_000)),
            entropy: entropy.clone(),
            audit: audit.clone(),
        },
    );
    World {
        memory,
        audit,
        entropy,
        economy,
        notices,
    }
}

impl World {
    async fn fund(&self, user: &str, amount: u64) -> UserId {
        let user = UserId::new(user);
        self.economy
            .ledger()
            .credit(&user, amount, "seed")
            .await
            .unwrap();
        user
    }

    async fn balance(&self, user: &UserId) -> u64 {
        self.economy.ledger().balance(user).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_duel_conserves_credits() {
    for challenger_wins in [true, false] {
        let w = world(EconomyConfig::default());
        let a = w.fund("a", 100).await;
        let b = w.fund("b", 80).await;

        let challenge = w.economy.duels().challenge(&a, None, 50).await.unwrap();
        assert_eq!(w.balance(&a).await, 50);

        w.entropy.push_flips([challenger_wins]);
        let outcome = w.economy.duels().accept(&challenge.id, &b).await.unwrap();
        let (a_balance, b_balance) = (w.balance(&a).await, w.balance(&b).await);
        assert_eq!(a_balance + b_balance, 180);
        if challenger_wins {
            assert_eq!((a_balance, b_balance), (150, 30));
            assert_eq!(outcome.winner, a);
        } else {
            assert_eq!((a_balance, b_balance), (50, 130));
            assert_eq!(outcome.winner, b);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_coinflip_forced_outcomes() {
    let w = world(EconomyConfig::default());
    let player = w.fund("p", 60).await;

    let round = w.economy.flips().start(&player).await.unwrap();
    w.entropy.push_flips([true]);
    let won = w
        .economy
        .flips()
        .play(&round.id, &player, Side::Red, 20, &())
        .await
        .unwrap();
    assert!(won.won);
    assert_eq!(w.balance(&player).await, 80);

    let w = world(EconomyConfig::default());
    let player = w.fund("p", 60).await;
    let round = w.economy.flips().start(&player).await.unwrap();
    w.entropy.push_flips([false]);
    let lost = w
        .economy
        .flips()
        .play(&round.id, &player, Side::Red, 20, &())
        .await
        .unwrap();
    assert_eq!(lost.landed, Side::Black);
    assert_eq!(w.balance(&player).await, 40);
    let stats = w.economy.ledger().account(&player).await.unwrap().stats;
    assert_eq!((stats.flips_played, stats.flips_won), (1, 0));
}

#[tokio::test(start_paused = true)]
async fn test_unclaimed_duel_refunds_exactly() {
    let config = EconomyConfig {
        duel_ttl_secs: 1,
        ..EconomyConfig::default()
    };
    let mut w = world(config);
    let a = w.fund("a", 73).await;

    w.economy.duels().challenge(&a, None, 73).await.unwrap();
    assert_eq!(w.balance(&a).await, 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(matches!(
        w.notices.recv().await,
        Some(Notice::DuelExpired { refunded: 73, .. })
    ));
    assert_eq!(w.balance(&a).await, 73);
    assert_eq!(w.economy.open_sessions().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_sale_of_three_units() {
    let mut config = EconomyConfig::default();
    config.catalogue.items.push(Item {
        id: "centurion".to_string(),
        name: "Centurion".to_string(),
        rarity: Rarity::Rare,
        category: "relic".to_string(),
        base_price: Some(100),
    });
    let w = world(config);
    let seller = w.fund("s", 0).await;
    let mut inventory = Inventory::new(seller.clone());
    inventory.add_items("centurion", 4);
    store::save(w.memory.as_ref(), &Inventory::key(&seller), &inventory)
        .await
        .unwrap();

    assert!(matches!(
        w.economy.gacha().offer_sale(&seller, "centurion", 5).await,
        Err(EconomyError::InsufficientItems { held: 4, .. })
    ));

    let quote = w
        .economy
        .gacha()
        .offer_sale(&seller, "centurion", 3)
        .await
        .unwrap();
    let receipt = w
        .economy
        .gacha()
        .confirm_sale(&quote.id, &seller)
        .await
        .unwrap();
    assert_eq!(receipt.credited, 150);
    assert_eq!(w.balance(&seller).await, 150);
    let view = w.economy.gacha().inventory(&seller).await.unwrap();
    let held = view
        .items
        .iter()
        .find(|held| held.item.id == "centurion")
        .map(|held| held.count);
    assert_eq!(held, Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_transient_store_failures_are_retried() {
    let w = world(EconomyConfig::default());
    let user = w.fund("u", 10).await;

    w.memory.fail_writes(2);
    let adjustment = w.economy.ledger().adjust(&user, 5, "bonus").await.unwrap();
    assert_eq!(adjustment.new, 15);

    w.memory.fail_writes(3);
    assert!(matches!(
        w.economy.ledger().adjust(&user, 5, "bonus").await,
        Err(EconomyError::Store(_))
    ));
    assert_eq!(w.balance(&user).await, 15);
    assert_eq!(w.audit.records().len(), 2);
    let alerts = w.audit.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].amount, 5);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_accepts_settle_once() {
    let w = world(EconomyConfig::default());
    let a = w.fund("a", 100).await;
    let b = w.fund("b", 100).await;
    let c = w.fund("c", 100).await;

    let challenge = w.economy.duels().challenge(&a, None, 40).await.unwrap();
    let (first, second) = tokio::join!(
        w.economy.duels().accept(&challenge.id, &b),
        w.economy.duels().accept(&challenge.id, &c),
    );
    assert_eq!(
        [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(),
        1
    );
    let total = w.balance(&a).await + w.balance(&b).await + w.balance(&c).await;
    assert_eq!(total, 300);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_backstops_timers() {
    let w = world(EconomyConfig::default());
    let user = w.fund("u", 0).await;
    w.economy.flips().start(&user).await.unwrap();
    assert_eq!(w.economy.sweep().await, 0);
    assert_eq!(w.economy.open_sessions().await, 1);
}
