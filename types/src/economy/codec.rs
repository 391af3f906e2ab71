//! Length-prefixed identifiers and `name -> count` maps shared by the persisted records.

use bytes::{Buf, BufMut};
use commonware_codec::{Error, FixedSize, ReadExt, Write};
use std::collections::BTreeMap;

/// Writes an identifier as a u32 byte length followed by its UTF-8 bytes.
pub fn write_string(s: &str, writer: &mut impl BufMut) {
    (s.len() as u32).write(writer);
    writer.put_slice(s.as_bytes());
}

/// Reads an identifier written by [write_string], rejecting anything longer than `max_len`
/// bytes before allocating.
pub fn read_string(reader: &mut impl Buf, max_len: usize) -> Result<String, Error> {
    let len = u32::read(reader)? as usize;
    if len > max_len {
        return Err(Error::Invalid("Identifier", "too long"));
    }
    if reader.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    let bytes = reader.copy_to_bytes(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| Error::Invalid("Identifier", "not UTF-8"))
}

pub fn string_encode_size(s: &str) -> usize {
    u32::SIZE + s.len()
}

/// Writes a `name -> count` map as a u32 entry count followed by sorted entries.
pub fn write_count_map(map: &BTreeMap<String, u32>, writer: &mut impl BufMut) {
    (map.len() as u32).write(writer);
    for (name, count) in map {
        write_string(name, writer);
        count.write(writer);
    }
}

/// Reads a map written by [write_count_map].
///
/// Entries with a zero count are rejected: a stored map never carries empty entries.
pub fn read_count_map(
    reader: &mut impl Buf,
    max_entries: usize,
    max_name_len: usize,
) -> Result<BTreeMap<String, u32>, Error> {
    let len = u32::read(reader)? as usize;
    if len > max_entries {
        return Err(Error::Invalid("CountMap", "too many entries"));
    }
    let mut map = BTreeMap::new();
    for _ in 0..len {
        let name = read_string(reader, max_name_len)?;
        let count = u32::read(reader)?;
        if count == 0 {
            return Err(Error::Invalid("CountMap", "zero count"));
        }
        if map.insert(name, count).is_some() {
            return Err(Error::Invalid("CountMap", "duplicate entry"));
        }
    }
    Ok(map)
}

pub fn count_map_encode_size(map: &BTreeMap<String, u32>) -> usize {
    u32::SIZE
        + map
            .keys()
            .map(|name| string_encode_size(name) + u32::SIZE)
            .sum::<usize>()
}
