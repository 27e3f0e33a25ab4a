//! Compilation of a prefix source into MaxMind DB files.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::config::OutputConfig;
use crate::mmdb::{BuildStats, IpVersion, MmdbWriter, WriterOptions};
use crate::record::country_record;
use crate::selector::select;
use crate::{Error, IpScope, PrefixSet, PrefixSource, Result};

/// Extension of per-label database files.
pub const MMDB_EXTENSION: &str = "mmdb";

/// Log prefix naming this output format.
const LOG_TAG: &str = "maxmindMMDB";

/// Writes MaxMind DB country databases.
///
/// In aggregate mode every selected label goes into one database named
/// `outputName`. In per-label mode each label gets its own database named
/// `<lowercase label>.mmdb`.
#[derive(Debug, Clone)]
pub struct MmdbOutput {
    config: OutputConfig,
}

impl MmdbOutput {
    /// Create an output. The configuration is validated here.
    pub fn new(config: OutputConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Tree version implied by the configured address families.
    pub fn ip_version(&self) -> IpVersion {
        match self.config.only_ip_type {
            IpScope::V4Only => IpVersion::V4,
            IpScope::Any | IpScope::V6Only => IpVersion::V6,
        }
    }

    /// Compile `source` and return the paths of the written files.
    pub fn output(&self, source: &dyn PrefixSource) -> Result<Vec<PathBuf>> {
        let labels = select(
            &self.config.wanted_list,
            &self.config.excluded_list,
            source,
        );

        let dir = &self.config.output_dir;
        std::fs::create_dir_all(dir).map_err(|e| Error::at_path(dir, e))?;

        if self.config.one_file_per_list {
            self.write_per_label(source, &labels)
        } else {
            self.write_aggregate(source, &labels).map(|path| vec![path])
        }
    }

    /// Selected labels that `source` does not have.
    ///
    /// Aggregate mode warns about and skips these; per-label mode fails on the first.
    pub fn missing_labels(&self, source: &dyn PrefixSource) -> Vec<String> {
        select(
            &self.config.wanted_list,
            &self.config.excluded_list,
            source,
        )
        .into_iter()
        .filter(|label| source.get(label).is_none())
        .collect()
    }

    fn write_aggregate(&self, source: &dyn PrefixSource, labels: &[String]) -> Result<PathBuf> {
        let mut entries = Vec::with_capacity(labels.len());
        for label in labels {
            match source.get(label) {
                Some(set) => entries.push((label.as_str(), set)),
                None => log::warn!("[{}] entry {} not found", LOG_TAG, label),
            }
        }

        let (bytes, stats) = self.build(&entries)?;
        self.write_file(&self.config.output_name, &bytes, &stats)
    }

    fn write_per_label(&self, source: &dyn PrefixSource, labels: &[String]) -> Result<Vec<PathBuf>> {
        // Resolve every label before writing so a missing one leaves no files behind.
        let mut entries = Vec::with_capacity(labels.len());
        for label in labels {
            let set = source
                .get(label)
                .ok_or_else(|| Error::NotFound(label.clone()))?;
            entries.push((label.as_str(), set));
        }

        let mut paths = Vec::with_capacity(entries.len());
        for entry in entries {
            let (bytes, stats) = self
                .build(&[entry])
                .map_err(|e| Error::for_entry(entry.0, e))?;
            let name = format!("{}.{}", entry.0.to_lowercase(), MMDB_EXTENSION);
            let path = self
                .write_file(&name, &bytes, &stats)
                .map_err(|e| Error::for_entry(entry.0, e))?;
            paths.push(path);
        }
        Ok(paths)
    }

    /// Build one database from labels in insertion order.
    ///
    /// Later labels overwrite earlier ones where their prefixes overlap.
    fn build(&self, entries: &[(&str, &PrefixSet)]) -> Result<(Vec<u8>, BuildStats)> {
        let scope = self.config.only_ip_type;
        let mut writer = MmdbWriter::new(WriterOptions {
            ip_version: self.ip_version(),
            record_size: self.config.record_size,
            ..WriterOptions::default()
        });

        for (label, set) in entries {
            let record = country_record(label);
            for net in set.prefixes(scope) {
                writer
                    .insert(net, &record)
                    .map_err(|e| Error::for_entry(*label, e))?;
            }
        }

        log::debug!(
            "[{}] {} labels, {} prefixes",
            LOG_TAG,
            entries.len(),
            writer.inserted()
        );
        writer.build()
    }

    fn write_file(&self, name: &str, bytes: &[u8], stats: &BuildStats) -> Result<PathBuf> {
        let dir = &self.config.output_dir;
        let path = write_atomic(dir, name, bytes)?;

        log::info!("[{}] {} --> {}", LOG_TAG, name, dir.display());
        log::debug!(
            "[{}] {}: {} nodes, {}-bit records, {} distinct records, {} bytes data, {} bytes total",
            LOG_TAG,
            name,
            stats.node_count,
            stats.record_size.bits(),
            stats.distinct_records,
            stats.data_section_size,
            stats.total_size
        );
        Ok(path)
    }
}

/// Write `bytes` to `dir/name` through a temporary file and rename.
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::at_path(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::at_path(&path, e))?;
    tmp.persist(&path)
        .map_err(|e| Error::at_path(&path, e.error))?;
    Ok(path)
}
