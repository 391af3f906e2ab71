//! Common types used throughout the social credit economy.
//!
//! Everything in this crate is either persisted by the ledger store (accounts, inventories,
//! the container bank) or is static configuration shared by the engines (rarity table,
//! item catalogue, limits).

pub mod economy;

pub use economy::*;
