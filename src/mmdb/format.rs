//! MaxMind DB format constants and structures.

use crate::{Error, Result};

/// Marker preceding the metadata section: "\xAB\xCD\xEFMaxMind.com".
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Zero bytes between the search tree and the data section.
pub const DATA_SECTION_SEPARATOR_SIZE: usize = 16;

/// Binary format version written to metadata.
pub const BINARY_FORMAT_MAJOR_VERSION: u16 = 2;
pub const BINARY_FORMAT_MINOR_VERSION: u16 = 0;

/// Default database type.
pub const DEFAULT_DATABASE_TYPE: &str = "GeoIP2-Country";

/// Default English description.
pub const DEFAULT_DESCRIPTION: &str = "GeoIP2 Country database converted by geoip tool";

/// IP version of the search tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    /// 32-bit tree, IPv4 only
    V4,
    /// 128-bit tree, IPv4 lives under ::/96
    V6,
}

impl IpVersion {
    /// Depth of the tree in bits.
    pub fn bit_count(self) -> u8 {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }

    /// Value of the `ip_version` metadata key.
    pub fn as_u16(self) -> u16 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }
}

/// Record size in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Deserialize)]
#[serde(try_from = "u16")]
pub enum RecordSize {
    /// 24-bit records (6 bytes per node)
    Bits24,
    /// 28-bit records (7 bytes per node)
    #[default]
    Bits28,
    /// 32-bit records (8 bytes per node)
    Bits32,
}

impl RecordSize {
    /// All allowed sizes, smallest first.
    pub const ALL: [RecordSize; 3] = [RecordSize::Bits24, RecordSize::Bits28, RecordSize::Bits32];

    pub fn bits(self) -> u16 {
        match self {
            RecordSize::Bits24 => 24,
            RecordSize::Bits28 => 28,
            RecordSize::Bits32 => 32,
        }
    }

    /// Size of a node (two records) in bytes.
    pub fn node_bytes(self) -> usize {
        match self {
            RecordSize::Bits24 => 6,
            RecordSize::Bits28 => 7,
            RecordSize::Bits32 => 8,
        }
    }

    /// Largest record value this size can hold.
    pub fn max_value(self) -> u64 {
        (1u64 << self.bits()) - 1
    }

    /// Smallest size not below `self` that can hold `value`.
    pub fn fitting(self, value: u64) -> Option<RecordSize> {
        Self::ALL
            .into_iter()
            .filter(|size| *size >= self)
            .find(|size| value <= size.max_value())
    }

    /// Create from bit size.
    pub fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            24 => Ok(RecordSize::Bits24),
            28 => Ok(RecordSize::Bits28),
            32 => Ok(RecordSize::Bits32),
            _ => Err(Error::Config(format!(
                "invalid record size: {} bits (expected 24, 28 or 32)",
                bits
            ))),
        }
    }

    /// Encode one node into `out` (which must be `node_bytes()` long).
    pub fn write_node(self, out: &mut [u8], left: u32, right: u32) {
        match self {
            RecordSize::Bits24 => {
                out[0..3].copy_from_slice(&left.to_be_bytes()[1..]);
                out[3..6].copy_from_slice(&right.to_be_bytes()[1..]);
            }
            RecordSize::Bits28 => {
                // Middle byte: high nibble of left, then high nibble of right.
                out[0..3].copy_from_slice(&left.to_be_bytes()[1..]);
                out[3] = (((left >> 24) & 0x0F) as u8) << 4 | ((right >> 24) & 0x0F) as u8;
                out[4..7].copy_from_slice(&right.to_be_bytes()[1..]);
            }
            RecordSize::Bits32 => {
                out[0..4].copy_from_slice(&left.to_be_bytes());
                out[4..8].copy_from_slice(&right.to_be_bytes());
            }
        }
    }
}

impl TryFrom<u16> for RecordSize {
    type Error = Error;

    fn try_from(bits: u16) -> Result<Self> {
        Self::from_bits(bits)
    }
}
