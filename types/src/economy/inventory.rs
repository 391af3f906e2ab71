use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error as ThisError;

use super::{
    count_map_encode_size, read_count_map, read_string, string_encode_size, write_count_map,
    write_string, UserId, MAX_INVENTORY_ENTRIES, MAX_ITEM_ID_LENGTH,
};

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum InventoryError {
    #[error("holding {held} of {id}, need {requested}")]
    Insufficient {
        id: String,
        held: u32,
        requested: u32,
    },
}

/// A user's collectibles and unopened containers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inventory {
    pub owner: UserId,
    items: BTreeMap<String, u32>,
    containers: BTreeMap<String, u32>,
    /// Every item id this user has ever held.
    seen: BTreeSet<String>,
}

impl Inventory {
    pub fn new(owner: UserId) -> Self {
        Self {
            owner,
            items: BTreeMap::new(),
            containers: BTreeMap::new(),
            seen: BTreeSet::new(),
        }
    }

    pub fn key(owner: &UserId) -> String {
        format!("inventory:{owner}")
    }

    pub fn items(&self) -> &BTreeMap<String, u32> {
        &self.items
    }

    pub fn containers(&self) -> &BTreeMap<String, u32> {
        &self.containers
    }

    pub fn item_count(&self, id: &str) -> u32 {
        self.items.get(id).copied().unwrap_or(0)
    }

    pub fn container_count(&self, id: &str) -> u32 {
        self.containers.get(id).copied().unwrap_or(0)
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Adds `count` units of an item, returning true if this is the first time the owner has
    /// ever acquired it.
    pub fn add_items(&mut self, id: &str, count: u32) -> bool {
        if count == 0 {
            return false;
        }
        let entry = self.items.entry(id.to_string()).or_insert(0);
        *entry = entry.saturating_add(count);
        self.seen.insert(id.to_string())
    }

    pub fn remove_items(&mut self, id: &str, count: u32) -> Result<(), InventoryError> {
        take(&mut self.items, id, count)
    }

    pub fn add_containers(&mut self, id: &str, count: u32) {
        if count == 0 {
            return;
        }
        let entry = self.containers.entry(id.to_string()).or_insert(0);
        *entry = entry.saturating_add(count);
    }

    pub fn remove_containers(&mut self, id: &str, count: u32) -> Result<(), InventoryError> {
        take(&mut self.containers, id, count)
    }
}

fn take(map: &mut BTreeMap<String, u32>, id: &str, count: u32) -> Result<(), InventoryError> {
    let held = map.get(id).copied().unwrap_or(0);
    if count == 0 || held < count {
        return Err(InventoryError::Insufficient {
            id: id.to_string(),
            held,
            requested: count,
        });
    }
    if held == count {
        map.remove(id);
    } else {
        map.insert(id.to_string(), held - count);
    }
    Ok(())
}

impl Write for Inventory {
    fn write(&self, writer: &mut impl BufMut) {
        self.owner.write(writer);
        write_count_map(&self.items, writer);
        write_count_map(&self.containers, writer);
        (self.seen.len() as u32).write(writer);
        for id in &self.seen {
            write_string(id, writer);
        }
    }
}

impl Read for Inventory {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let owner = UserId::read(reader)?;
        let items = read_count_map(reader, MAX_INVENTORY_ENTRIES, MAX_ITEM_ID_LENGTH)?;
        let containers = read_count_map(reader, MAX_INVENTORY_ENTRIES, MAX_ITEM_ID_LENGTH)?;
        let seen_len = u32::read(reader)? as usize;
        if seen_len > MAX_INVENTORY_ENTRIES {
            return Err(Error::Invalid("Inventory", "too many seen items"));
        }
        let mut seen = BTreeSet::new();
        for _ in 0..seen_len {
            seen.insert(read_string(reader, MAX_ITEM_ID_LENGTH)?);
        }
        if items.keys().any(|id| !seen.contains(id)) {
            return Err(Error::Invalid("Inventory", "held item never seen"));
        }
        Ok(Self {
            owner,
            items,
            containers,
            seen,
        })
    }
}

impl EncodeSize for Inventory {
    fn encode_size(&self) -> usize {
        self.owner.encode_size()
            + count_map_encode_size(&self.items)
            + count_map_encode_size(&self.containers)
            + 4
            + self
                .seen
                .iter()
                .map(|id| string_encode_size(id))
                .sum::<usize>()
    }
}
