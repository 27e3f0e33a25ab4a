//! MaxMind DB (format 2.0) writing and reading.
//!
//! # File Layout
//!
//! ```text
//! ┌─────────────────────────────┐
//! │ Search tree                 │  node_count * record_size * 2 / 8 bytes
//! ├─────────────────────────────┤
//! │ 16 zero bytes               │  separator
//! ├─────────────────────────────┤
//! │ Data section                │  deduplicated records
//! ├─────────────────────────────┤
//! │ \xAB\xCD\xEFMaxMind.com     │  metadata marker
//! ├─────────────────────────────┤
//! │ Metadata map                │
//! └─────────────────────────────┘
//! ```
//!
//! A record value below `node_count` points at another node, a value equal
//! to `node_count` means "no data", and a larger value `v` points at data
//! offset `v - node_count - 16`.

pub mod data;
pub mod format;
pub mod reader;
pub mod tree;
pub mod writer;

pub use data::{DataEncoder, DataValue};
pub use format::{IpVersion, RecordSize};
pub use reader::MmdbReader;
pub use tree::{SearchTree, TrieBuilder};
pub use writer::{BuildStats, MmdbWriter, WriterOptions};
