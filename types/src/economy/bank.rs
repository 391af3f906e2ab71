use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use std::collections::BTreeMap;

use super::{
    count_map_encode_size, read_count_map, write_count_map, MAX_BANK_ENTRIES, MAX_ITEM_ID_LENGTH,
};

/// Shared stock of purchasable containers.
///
/// Kinds with no remaining stock are absent from the map.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ContainerBank {
    stock: BTreeMap<String, u32>,
    /// Unix seconds of the last refill (0 = never refilled).
    pub last_refilled: u64,
}

impl ContainerBank {
    pub const KEY: &'static str = "bank";

    pub fn stock(&self, kind: &str) -> u32 {
        self.stock.get(kind).copied().unwrap_or(0)
    }

    /// Refills every kind to `per_kind` if at least `interval` seconds have passed since the
    /// last refill. Returns true when a refill happened.
    ///
    /// The refill timestamp advances by whole intervals so the cadence does not drift with
    /// the time of the access that triggered it.
    pub fn refill_if_due<'a>(
        &mut self,
        now: u64,
        interval: u64,
        per_kind: u32,
        kinds: impl IntoIterator<Item = &'a str>,
    ) -> bool {
        let due = self.last_refilled == 0 || now.saturating_sub(self.last_refilled) >= interval;
        if !due {
            return false;
        }
        self.stock = kinds
            .into_iter()
            .filter(|_| per_kind > 0)
            .map(|kind| (kind.to_string(), per_kind))
            .collect();
        self.last_refilled = if self.last_refilled == 0 || interval == 0 {
            now
        } else {
            let elapsed = now.saturating_sub(self.last_refilled) / interval;
            self.last_refilled.saturating_add(elapsed.saturating_mul(interval))
        };
        true
    }

    /// Seconds until the next refill becomes due.
    pub fn refill_in(&self, now: u64, interval: u64) -> u64 {
        self.last_refilled
            .saturating_add(interval)
            .saturating_sub(now)
    }

    /// Removes one unit of `kind`, returning false when out of stock.
    pub fn take(&mut self, kind: &str) -> bool {
        match self.stock.get_mut(kind) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.stock.remove(kind);
                true
            }
            None => false,
        }
    }
}

impl Write for ContainerBank {
    fn write(&self, writer: &mut impl BufMut) {
        write_count_map(&self.stock, writer);
        self.last_refilled.write(writer);
    }
}

impl Read for ContainerBank {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let stock = read_count_map(reader, MAX_BANK_ENTRIES, MAX_ITEM_ID_LENGTH)?;
        let last_refilled = u64::read(reader)?;
        Ok(Self {
            stock,
            last_refilled,
        })
    }
}

impl EncodeSize for ContainerBank {
    fn encode_size(&self) -> usize {
        count_map_encode_size(&self.stock) + u64::SIZE
    }
}
