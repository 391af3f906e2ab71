/// Maximum length of a platform user identifier
pub const MAX_USER_ID_LENGTH: usize = 64;

/// Maximum length of an item or container identifier
pub const MAX_ITEM_ID_LENGTH: usize = 32;

/// Maximum distinct entries in one inventory map
pub const MAX_INVENTORY_ENTRIES: usize = 1_024;

/// Maximum container kinds tracked by the bank
pub const MAX_BANK_ENTRIES: usize = 64;

/// Seconds in one daily-limit bucket
pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Duel challenge lifetime (15 minutes)
pub const DUEL_TTL_SECS: u64 = 15 * 60;

/// Coin-flip round lifetime (15 minutes)
pub const ROUND_TTL_SECS: u64 = 15 * 60;

/// Sale confirmation prompt lifetime
pub const SALE_TTL_SECS: u64 = 60;

/// Trade offer lifetime (10 minutes)
pub const TRADE_TTL_SECS: u64 = 10 * 60;

/// Largest accepted wager, so a doubled pot still fits a signed balance delta
pub const MAX_WAGER: u64 = i64::MAX as u64 / 2;

/// Daily per-user container opens
pub const DAILY_OPEN_LIMIT: u32 = 5;

/// Daily per-user bank purchases
pub const DAILY_PURCHASE_LIMIT: u32 = 5;

/// Items drawn per container opening
pub const DRAW_BATCH_SIZE: u32 = 3;

/// Stock of each container kind after a bank refill
pub const BANK_STOCK_PER_KIND: u32 = 10;

/// Bank refill cadence (12 hours)
pub const BANK_REFILL_INTERVAL_SECS: u64 = 12 * 60 * 60;

/// Ledger store retry budget
pub const STORE_RETRY_ATTEMPTS: u32 = 3;

/// Fixed delay between ledger store retries
pub const STORE_RETRY_BACKOFF_MS: u64 = 100;

/// Cosmetic reveal frames shown before a coin-flip result
pub const REVEAL_FRAMES: u8 = 5;

/// Delay between cosmetic reveal frames
pub const REVEAL_DELAY_MS: u64 = 700;

/// Price multiplier scale: 10_000 basis points is a 1.0x multiplier
pub const PRICE_SCALE_BPS: u64 = 10_000;

/// Lower bound on the dynamic price multiplier (0.25x)
pub const MIN_PRICE_MULTIPLIER_BPS: u64 = 2_500;

/// Upper bound on the dynamic price multiplier (4x)
pub const MAX_PRICE_MULTIPLIER_BPS: u64 = 40_000;
