//! Data section encoding.
//!
//! Values use the MaxMind DB type encoding: a control byte carrying three type
//! bits and five size bits, optional size extension bytes, then the payload.
//! Types above 7 are "extended": their control byte has type 0 and the next
//! byte holds `type - 7`.
//!
//! The encoder doubles as the record pool. Identical values are stored once
//! and share an offset; nested values that already exist in the section are
//! replaced by a pointer whenever the pointer is shorter.

use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::{Error, Result};

const TYPE_POINTER: u8 = 1;
const TYPE_STRING: u8 = 2;
const TYPE_UINT16: u8 = 5;
const TYPE_UINT32: u8 = 6;
const TYPE_MAP: u8 = 7;
const TYPE_UINT64: u8 = 9;
const TYPE_ARRAY: u8 = 11;
const TYPE_BOOL: u8 = 14;

/// Largest size expressible with the 3-byte size extension.
const MAX_SIZE: usize = 65_821 + 0xFF_FFFF;

/// Structured value stored in the data section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataValue {
    /// UTF-8 string
    String(String),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Boolean value
    Bool(bool),
    /// Ordered list of values
    Array(Vec<DataValue>),
    /// String-keyed map
    Map(BTreeMap<String, DataValue>),
}

impl DataValue {
    /// Build a map value from key/value pairs.
    pub fn map<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, DataValue)>,
    {
        DataValue::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn string(s: impl Into<String>) -> Self {
        DataValue::String(s.into())
    }
}

/// Data section encoder with structural deduplication.
pub struct DataEncoder {
    buffer: Vec<u8>,
    /// Standalone encoding of a value -> offset of its first copy
    offsets: AHashMap<Vec<u8>, u32>,
}

impl DataEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            offsets: AHashMap::new(),
        }
    }

    /// Store a value and return its offset in the data section.
    ///
    /// Storing a structurally equal value again returns the first offset
    /// without growing the section.
    pub fn encode(&mut self, value: &DataValue) -> Result<u32> {
        let key = standalone(value)?;
        if let Some(&offset) = self.offsets.get(&key) {
            return Ok(offset);
        }
        let offset = self.next_offset()?;
        self.write_value(value)?;
        self.offsets.insert(key, offset);
        Ok(offset)
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of distinct values with an offset.
    pub fn distinct_values(&self) -> usize {
        self.offsets.len()
    }

    /// Encoded data section.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn next_offset(&self) -> Result<u32> {
        u32::try_from(self.buffer.len())
            .map_err(|_| Error::Encoding("data section exceeds 4 GiB".to_string()))
    }

    /// Write a nested value, pointing at an earlier copy when that is shorter.
    fn write_child(&mut self, value: &DataValue) -> Result<()> {
        let key = standalone(value)?;
        if let Some(&offset) = self.offsets.get(&key) {
            if pointer_len(offset) < key.len() {
                write_pointer(offset, &mut self.buffer);
                return Ok(());
            }
        }
        let offset = self.next_offset()?;
        self.write_value(value)?;
        self.offsets.entry(key).or_insert(offset);
        Ok(())
    }

    fn write_value(&mut self, value: &DataValue) -> Result<()> {
        match value {
            DataValue::Map(map) => {
                write_control(TYPE_MAP, map.len(), &mut self.buffer)?;
                for (key, val) in map {
                    self.write_child(&DataValue::String(key.clone()))?;
                    self.write_child(val)?;
                }
                Ok(())
            }
            DataValue::Array(items) => {
                write_control(TYPE_ARRAY, items.len(), &mut self.buffer)?;
                for item in items {
                    self.write_child(item)?;
                }
                Ok(())
            }
            scalar => write_plain(scalar, &mut self.buffer),
        }
    }
}

impl Default for DataEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a value without pointers.
pub fn standalone(value: &DataValue) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_plain(value, &mut out)?;
    Ok(out)
}

fn write_plain(value: &DataValue, out: &mut Vec<u8>) -> Result<()> {
    match value {
        DataValue::String(s) => {
            write_control(TYPE_STRING, s.len(), out)?;
            out.extend_from_slice(s.as_bytes());
        }
        DataValue::Uint16(n) => write_uint(TYPE_UINT16, *n as u64, out)?,
        DataValue::Uint32(n) => write_uint(TYPE_UINT32, *n as u64, out)?,
        DataValue::Uint64(n) => write_uint(TYPE_UINT64, *n, out)?,
        DataValue::Bool(b) => write_control(TYPE_BOOL, *b as usize, out)?,
        DataValue::Array(items) => {
            write_control(TYPE_ARRAY, items.len(), out)?;
            for item in items {
                write_plain(item, out)?;
            }
        }
        DataValue::Map(map) => {
            write_control(TYPE_MAP, map.len(), out)?;
            for (key, val) in map {
                write_control(TYPE_STRING, key.len(), out)?;
                out.extend_from_slice(key.as_bytes());
                write_plain(val, out)?;
            }
        }
    }
    Ok(())
}

/// Unsigned integers are stored big-endian without leading zero bytes.
fn write_uint(type_id: u8, value: u64, out: &mut Vec<u8>) -> Result<()> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    write_control(type_id, bytes.len() - skip, out)?;
    out.extend_from_slice(&bytes[skip..]);
    Ok(())
}

/// Control byte, extended type byte and size extension bytes.
fn write_control(type_id: u8, size: usize, out: &mut Vec<u8>) -> Result<()> {
    if size > MAX_SIZE {
        return Err(Error::Encoding(format!(
            "value of size {} exceeds the maximum of {}",
            size, MAX_SIZE
        )));
    }

    let type_bits = if type_id > 7 { 0 } else { type_id << 5 };
    let (size_bits, extra): (u8, Vec<u8>) = if size < 29 {
        (size as u8, Vec::new())
    } else if size < 285 {
        (29, vec![(size - 29) as u8])
    } else if size < 65_821 {
        (30, ((size - 285) as u16).to_be_bytes().to_vec())
    } else {
        (31, ((size - 65_821) as u32).to_be_bytes()[1..].to_vec())
    };

    out.push(type_bits | size_bits);
    if type_id > 7 {
        out.push(type_id - 7);
    }
    out.extend_from_slice(&extra);
    Ok(())
}

fn pointer_len(offset: u32) -> usize {
    match offset {
        0..=0x7FF => 2,
        0x800..=0x807FF => 3,
        0x80800..=0x80807FF => 4,
        _ => 5,
    }
}

/// Pointer control byte is `001SSVVV`; VVV holds the top bits of the offset
/// for sizes 0 to 2.
fn write_pointer(offset: u32, out: &mut Vec<u8>) {
    let ptr = TYPE_POINTER << 5;
    match offset {
        0..=0x7FF => {
            out.push(ptr | ((offset >> 8) & 0x07) as u8);
            out.push(offset as u8);
        }
        0x800..=0x807FF => {
            let v = offset - 0x800;
            out.push(ptr | (1 << 3) | ((v >> 16) & 0x07) as u8);
            out.extend_from_slice(&v.to_be_bytes()[2..]);
        }
        0x80800..=0x80807FF => {
            let v = offset - 0x80800;
            out.push(ptr | (2 << 3) | ((v >> 24) & 0x07) as u8);
            out.extend_from_slice(&v.to_be_bytes()[1..]);
        }
        _ => {
            out.push(ptr | (3 << 3));
            out.extend_from_slice(&offset.to_be_bytes());
        }
    }
}
