//! MaxMind DB writer.

use std::collections::BTreeMap;
use std::net::IpAddr;

use ipnet::IpNet;

use super::data::{standalone, DataEncoder, DataValue};
use super::format::*;
use super::tree::{SearchTree, TrieBuilder};
use crate::{Error, Result};

/// Options controlling the metadata and tree layout of a database.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// `database_type` metadata value
    pub database_type: String,
    /// Language code -> description
    pub description: BTreeMap<String, String>,
    /// `languages` metadata value
    pub languages: Vec<String>,
    /// Tree depth and `ip_version` metadata value
    pub ip_version: IpVersion,
    /// Smallest record size to use
    pub record_size: RecordSize,
    /// Fixed build timestamp; current time if unset
    pub build_epoch: Option<u64>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            database_type: DEFAULT_DATABASE_TYPE.to_string(),
            description: BTreeMap::from([("en".to_string(), DEFAULT_DESCRIPTION.to_string())]),
            languages: Vec::new(),
            ip_version: IpVersion::V6,
            record_size: RecordSize::default(),
            build_epoch: None,
        }
    }
}

/// Builds one database: search tree, record pool and metadata.
pub struct MmdbWriter {
    options: WriterOptions,
    tree: TrieBuilder,
    data: DataEncoder,
}

/// Layout figures of a serialized database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub node_count: usize,
    pub record_size: RecordSize,
    pub data_section_size: usize,
    pub distinct_records: usize,
    pub total_size: usize,
}

impl MmdbWriter {
    /// Create a writer.
    pub fn new(options: WriterOptions) -> Self {
        let tree = TrieBuilder::new(options.ip_version);
        Self {
            options,
            tree,
            data: DataEncoder::new(),
        }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Number of prefixes inserted so far.
    pub fn inserted(&self) -> usize {
        self.tree.inserted()
    }

    /// Associate `value` with every address of `net`.
    ///
    /// Overlapping earlier insertions are overwritten in the covered range.
    pub fn insert(&mut self, net: IpNet, value: &DataValue) -> Result<()> {
        let offset = self.data.encode(value)?;
        self.tree.insert(net, offset)
    }

    /// Data offset an address currently resolves to.
    pub fn lookup_offset(&self, addr: IpAddr) -> Option<u32> {
        self.tree.lookup(addr)
    }

    /// Serialize the database.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        self.build().map(|(bytes, _)| bytes)
    }

    /// Serialize the database and report its layout.
    pub fn build(self) -> Result<(Vec<u8>, BuildStats)> {
        let tree = self.tree.finish();
        let data = self.data;
        let record_size = choose_record_size(&tree, data.len(), self.options.record_size)?;

        let tree_bytes = tree.to_bytes(record_size)?;
        let metadata = metadata_value(&self.options, &tree, record_size, build_epoch(&self.options));
        let metadata_bytes = standalone(&metadata)?;

        let total_size = tree_bytes.len()
            + DATA_SECTION_SEPARATOR_SIZE
            + data.len()
            + METADATA_MARKER.len()
            + metadata_bytes.len();

        let stats = BuildStats {
            node_count: tree.node_count(),
            record_size,
            data_section_size: data.len(),
            distinct_records: tree.record_offsets().len(),
            total_size,
        };

        let mut out = Vec::with_capacity(total_size);
        out.extend_from_slice(&tree_bytes);
        out.extend_from_slice(&[0u8; DATA_SECTION_SEPARATOR_SIZE]);
        out.extend_from_slice(data.as_bytes());
        out.extend_from_slice(METADATA_MARKER);
        out.extend_from_slice(&metadata_bytes);

        Ok((out, stats))
    }
}

fn choose_record_size(tree: &SearchTree, data_len: usize, min: RecordSize) -> Result<RecordSize> {
    let max_value = tree.max_record_value(data_len);
    let size = min.fitting(max_value).ok_or_else(|| {
        Error::Encoding(format!(
            "database too large: record value {} exceeds 32 bits",
            max_value
        ))
    })?;
    if size != min {
        log::debug!(
            "Record size {} too small for {} nodes, using {}",
            min.bits(),
            tree.node_count(),
            size.bits()
        );
    }
    Ok(size)
}

fn build_epoch(options: &WriterOptions) -> u64 {
    options.build_epoch.unwrap_or_else(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    })
}

fn metadata_value(
    options: &WriterOptions,
    tree: &SearchTree,
    record_size: RecordSize,
    build_epoch: u64,
) -> DataValue {
    let description = options
        .description
        .iter()
        .map(|(lang, text)| (lang.clone(), DataValue::string(text.clone())));
    let languages = options
        .languages
        .iter()
        .map(|lang| DataValue::string(lang.clone()))
        .collect();

    DataValue::map([
        (
            "binary_format_major_version",
            DataValue::Uint16(BINARY_FORMAT_MAJOR_VERSION),
        ),
        (
            "binary_format_minor_version",
            DataValue::Uint16(BINARY_FORMAT_MINOR_VERSION),
        ),
        ("build_epoch", DataValue::Uint64(build_epoch)),
        ("database_type", DataValue::string(options.database_type.clone())),
        ("description", DataValue::map(description)),
        ("ip_version", DataValue::Uint16(tree.ip_version().as_u16())),
        ("languages", DataValue::Array(languages)),
        ("node_count", DataValue::Uint32(tree.node_count() as u32)),
        ("record_size", DataValue::Uint16(record_size.bits())),
    ])
}
