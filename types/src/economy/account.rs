use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;

use super::{read_string, string_encode_size, write_string, MAX_USER_ID_LENGTH};

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum AccountError {
    #[error("user id is empty")]
    EmptyId,
    #[error("user id too long (len={len}, max={max})")]
    IdTooLong { len: usize, max: usize },
}

/// Opaque platform user identifier.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn validate(&self) -> Result<(), AccountError> {
        if self.0.is_empty() {
            return Err(AccountError::EmptyId);
        }
        if self.0.len() > MAX_USER_ID_LENGTH {
            return Err(AccountError::IdTooLong {
                len: self.0.len(),
                max: MAX_USER_ID_LENGTH,
            });
        }
        Ok(())
    }
}

impl FromStr for UserId {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self(s.trim().to_string());
        id.validate()?;
        Ok(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Write for UserId {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.0, writer);
    }
}

impl Read for UserId {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let id = read_string(reader, MAX_USER_ID_LENGTH)?;
        if id.is_empty() {
            return Err(Error::Invalid("UserId", "empty"));
        }
        Ok(Self(id))
    }
}

impl EncodeSize for UserId {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.0)
    }
}

/// Games that keep per-account played/won counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameKind {
    Duel,
    Coinflip,
}

impl GameKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameKind::Duel => "duel",
            GameKind::Coinflip => "coinflip",
        }
    }
}

/// Cumulative per-game counters.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize)]
pub struct GameStats {
    pub duels_played: u64,
    pub duels_won: u64,
    pub flips_played: u64,
    pub flips_won: u64,
    pub containers_opened: u64,
}

impl GameStats {
    pub fn record(&mut self, kind: GameKind, won: bool) {
        let (played, wins) = match kind {
            GameKind::Duel => (&mut self.duels_played, &mut self.duels_won),
            GameKind::Coinflip => (&mut self.flips_played, &mut self.flips_won),
        };
        *played = played.saturating_add(1);
        if won {
            *wins = wins.saturating_add(1);
        }
    }
}

/// A user's account.
///
/// The encoded form of an `Account` is the ledger record stored under its
/// [account key](Account::key).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: UserId,
    pub balance: u64,
    pub stats: GameStats,
}

impl Account {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            balance: 0,
            stats: GameStats::default(),
        }
    }

    pub fn key(id: &UserId) -> String {
        format!("account:{id}")
    }

    /// Applies a signed delta, flooring the balance at zero.
    ///
    /// Returns the previous balance.
    pub fn apply_delta(&mut self, delta: i64) -> u64 {
        let old = self.balance;
        self.balance = if delta >= 0 {
            old.saturating_add(delta as u64)
        } else {
            old.saturating_sub(delta.unsigned_abs())
        };
        old
    }
}

impl Write for Account {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.write(writer);
        self.balance.write(writer);
        self.stats.duels_played.write(writer);
        self.stats.duels_won.write(writer);
        self.stats.flips_played.write(writer);
        self.stats.flips_won.write(writer);
        self.stats.containers_opened.write(writer);
    }
}

impl Read for Account {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let id = UserId::read(reader)?;
        let balance = u64::read(reader)?;
        let duels_played = u64::read(reader)?;
        let duels_won = u64::read(reader)?;
        let flips_played = u64::read(reader)?;
        let flips_won = u64::read(reader)?;

        // Records written before container stats existed end here.
        let containers_opened = if reader.remaining() >= u64::SIZE {
            u64::read(reader)?
        } else {
            0
        };

        if duels_won > duels_played || flips_won > flips_played {
            return Err(Error::Invalid("Account", "more wins than games"));
        }

        Ok(Self {
            id,
            balance,
            stats: GameStats {
                duels_played,
                duels_won,
                flips_played,
                flips_won,
                containers_opened,
            },
        })
    }
}

impl EncodeSize for Account {
    fn encode_size(&self) -> usize {
        self.id.encode_size() + 6 * u64::SIZE
    }
}
