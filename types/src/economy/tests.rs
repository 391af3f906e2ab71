use super::*;
use commonware_codec::{Encode, EncodeSize, ReadExt};

#[test]
fn test_account_roundtrip() {
    let mut account = Account::new(UserId::new("alice"));
    account.balance = 1_234;
    account.stats.record(GameKind::Duel, true);
    account.stats.record(GameKind::Coinflip, false);
    account.stats.containers_opened = 7;

    let encoded = account.encode();
    assert_eq!(encoded.len(), account.encode_size());
    let decoded = Account::read(&mut &encoded[..]).unwrap();
    assert_eq!(account, decoded);
}

#[test]
fn test_account_reads_records_without_container_stats() {
    let mut account = Account::new(UserId::new("bob"));
    account.balance = 55;
    let encoded = account.encode();
    let legacy = &encoded[..encoded.len() - 8];

    let decoded = Account::read(&mut &legacy[..]).unwrap();
    assert_eq!(decoded.balance, 55);
    assert_eq!(decoded.stats.containers_opened, 0);
}

#[test]
fn test_account_rejects_more_wins_than_games() {
    let mut account = Account::new(UserId::new("carol"));
    account.stats.duels_won = 2;
    account.stats.duels_played = 1;
    let encoded = account.encode();
    assert!(Account::read(&mut &encoded[..]).is_err());
}

#[test]
fn test_apply_delta_floors_at_zero() {
    let mut account = Account::new(UserId::new("dave"));
    account.apply_delta(30);
    assert_eq!(account.apply_delta(-50), 30);
    assert_eq!(account.balance, 0);
    account.apply_delta(10);
    assert_eq!(account.balance, 10);
}

#[test]
fn test_user_id_validation() {
    assert_eq!("".parse::<UserId>(), Err(AccountError::EmptyId));
    assert!(matches!(
        "x".repeat(MAX_USER_ID_LENGTH + 1).parse::<UserId>(),
        Err(AccountError::IdTooLong { .. })
    ));
    assert_eq!(" 42 ".parse::<UserId>().unwrap().as_str(), "42");
}

#[test]
fn test_inventory_roundtrip() {
    let mut inventory = Inventory::new(UserId::new("erin"));
    assert!(inventory.add_items("pixel-cat", 2));
    assert!(!inventory.add_items("pixel-cat", 1));
    inventory.add_containers("standard", 3);
    inventory.add_items("stonks", 1);
    inventory.remove_items("stonks", 1).unwrap();

    let encoded = inventory.encode();
    assert_eq!(encoded.len(), inventory.encode_size());
    let decoded = Inventory::read(&mut &encoded[..]).unwrap();
    assert_eq!(inventory, decoded);
    assert!(decoded.has_seen("stonks"));
    assert_eq!(decoded.item_count("stonks"), 0);
}

#[test]
fn test_inventory_removes_empty_entries() {
    let mut inventory = Inventory::new(UserId::new("frank"));
    inventory.add_items("tin-medal", 3);
    inventory.remove_items("tin-medal", 3).unwrap();
    assert!(inventory.items().is_empty());

    inventory.add_containers("premium", 1);
    inventory.remove_containers("premium", 1).unwrap();
    assert!(inventory.containers().is_empty());
}

#[test]
fn test_inventory_rejects_overdraw() {
    let mut inventory = Inventory::new(UserId::new("grace"));
    inventory.add_items("old-coin", 2);
    assert_eq!(
        inventory.remove_items("old-coin", 3),
        Err(InventoryError::Insufficient {
            id: "old-coin".to_string(),
            held: 2,
            requested: 3,
        })
    );
    assert_eq!(inventory.item_count("old-coin"), 2);
    assert!(inventory.remove_containers("standard", 1).is_err());
}

#[test]
fn test_bank_roundtrip_and_take() {
    let mut bank = ContainerBank::default();
    assert!(bank.refill_if_due(1_000, BANK_REFILL_INTERVAL_SECS, 2, ["standard", "premium"]));
    assert!(bank.take("standard"));
    assert!(bank.take("standard"));
    assert!(!bank.take("standard"));
    assert_eq!(bank.stock("standard"), 0);
    assert_eq!(bank.stock("premium"), 2);

    let encoded = bank.encode();
    let decoded = ContainerBank::read(&mut &encoded[..]).unwrap();
    assert_eq!(bank, decoded);
}

#[test]
fn test_bank_refill_cadence() {
    let interval = BANK_REFILL_INTERVAL_SECS;
    let mut bank = ContainerBank::default();
    assert!(bank.refill_if_due(100, interval, 5, ["standard"]));
    assert!(bank.take("standard"));

    // Not due yet.
    assert!(!bank.refill_if_due(100 + interval - 1, interval, 5, ["standard"]));
    assert_eq!(bank.stock("standard"), 4);

    // Late access keeps the original cadence.
    assert!(bank.refill_if_due(100 + interval + 500, interval, 5, ["standard"]));
    assert_eq!(bank.stock("standard"), 5);
    assert_eq!(bank.last_refilled, 100 + interval);
    assert_eq!(bank.refill_in(100 + interval + 500, interval), interval - 500);
}

#[test]
fn test_rarity_table_walk() {
    let table = RarityTable::default();
    assert_eq!(table.total_weight(), 1_000);
    assert_eq!(table.tier_at(0), Rarity::Common);
    assert_eq!(table.tier_at(599), Rarity::Common);
    assert_eq!(table.tier_at(600), Rarity::Uncommon);
    assert_eq!(table.tier_at(949), Rarity::Rare);
    assert_eq!(table.tier_at(950), Rarity::Epic);
    assert_eq!(table.tier_at(999), Rarity::Legendary);
}

#[test]
fn test_rarity_table_validation() {
    assert_eq!(RarityTable::new(vec![]), Err(RarityTableError::Empty));
    assert_eq!(
        RarityTable::new(vec![(Rarity::Rare, 0)]),
        Err(RarityTableError::ZeroWeight(Rarity::Rare))
    );
    assert_eq!(
        RarityTable::new(vec![(Rarity::Rare, 1), (Rarity::Rare, 2)]),
        Err(RarityTableError::Duplicate(Rarity::Rare))
    );
    let table = RarityTable::new(vec![(Rarity::Epic, 3), (Rarity::Common, 1)]).unwrap();
    assert_eq!(table.total_weight(), 4);
    assert_eq!(table.tier_at(2), Rarity::Epic);
    assert_eq!(table.tier_at(3), Rarity::Common);
}

#[test]
fn test_default_catalogue_is_valid() {
    let catalogue = Catalogue::default();
    catalogue.validate().expect("default catalogue");
    let standard = catalogue.container("standard").unwrap();
    let pool = catalogue.pool_for(standard);
    assert!(pool
        .iter()
        .all(|item| item.category == "badge" || item.category == "meme"));
}

#[test]
fn test_catalogue_rejects_duplicates_and_empty_pools() {
    let mut catalogue = Catalogue::default();
    catalogue.items.push(catalogue.items[0].clone());
    assert!(matches!(
        catalogue.validate(),
        Err(CatalogueError::DuplicateId(_))
    ));

    let mut catalogue = Catalogue::default();
    catalogue.containers[0].categories = vec!["nothing".to_string()];
    assert!(matches!(
        catalogue.validate(),
        Err(CatalogueError::EmptyPool(_))
    ));
}
