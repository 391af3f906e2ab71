//! Economy domain types.
//!
//! Defines account/inventory/bank records, the rarity table, the item catalogue, and the
//! constants used by the execution layer and the node.

mod account;
mod bank;
mod catalogue;
mod codec;
mod constants;
mod inventory;
mod rarity;

pub use account::*;
pub use bank::*;
pub use catalogue::*;
pub use codec::{
    count_map_encode_size, read_count_map, read_string, string_encode_size, write_count_map,
    write_string,
};
pub use constants::*;
pub use inventory::*;
pub use rarity::*;

#[cfg(test)]
mod tests;
