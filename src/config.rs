//! JSON configuration.
//!
//! A configuration file lists the inputs that fill the prefix container and
//! the outputs that compile it:
//!
//! ```json
//! {
//!   "input":  [{ "type": "text", "action": "add", "args": { "name": "CN", "uri": "./cn.txt" } }],
//!   "output": [{ "type": "maxmindMMDB", "action": "output", "args": { "outputDir": "./output/mmdb" } }]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::mmdb::RecordSize;
use crate::{Error, IpScope, Result};

/// Default file name in aggregate mode.
pub const DEFAULT_OUTPUT_NAME: &str = "Country.mmdb";

/// Default destination directory.
pub const DEFAULT_OUTPUT_DIR: &str = "./output/mmdb";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: Vec<FormatEntry>,
    #[serde(default)]
    pub output: Vec<FormatEntry>,
}

/// One input or output step.
#[derive(Debug, Clone, Deserialize)]
pub struct FormatEntry {
    /// Format type name, e.g. `text` or `maxmindMMDB`
    #[serde(rename = "type")]
    pub type_name: String,
    /// `add` for inputs, `output` for outputs
    pub action: String,
    /// Format-specific arguments
    #[serde(default)]
    pub args: Option<serde_json::Value>,
}

impl Config {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::at_path(path, e))?;
        Self::from_slice(&bytes)
    }

    /// Parse a configuration document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Arguments of a `maxmindMMDB` output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputConfig {
    /// File name in aggregate mode
    pub output_name: String,
    /// Destination directory
    pub output_dir: PathBuf,
    /// Labels to include; empty means every known label
    pub wanted_list: Vec<String>,
    /// Labels to always omit
    pub excluded_list: Vec<String>,
    /// One file per label instead of a single database
    pub one_file_per_list: bool,
    /// Address families to keep
    #[serde(rename = "onlyIPType")]
    pub only_ip_type: IpScope,
    /// Smallest record size of the search tree
    pub record_size: RecordSize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            wanted_list: Vec::new(),
            excluded_list: Vec::new(),
            one_file_per_list: false,
            only_ip_type: IpScope::Any,
            record_size: RecordSize::default(),
        }
    }
}

impl OutputConfig {
    /// Build from the `args` value of a configuration entry.
    pub fn from_args(args: Option<&serde_json::Value>) -> Result<Self> {
        let config = match args {
            Some(value) if !value.is_null() => Self::deserialize(value)?,
            _ => Self::default(),
        };
        config.normalized()
    }

    /// Substitute defaults for empty values and validate.
    pub fn normalized(mut self) -> Result<Self> {
        if self.output_name.trim().is_empty() {
            self.output_name = DEFAULT_OUTPUT_NAME.to_string();
        }
        if self.output_dir.as_os_str().is_empty() {
            self.output_dir = PathBuf::from(DEFAULT_OUTPUT_DIR);
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that the configuration describes a writable destination.
    pub fn validate(&self) -> Result<()> {
        let name = Path::new(&self.output_name);
        let plain = name.file_name().map(|f| f == name.as_os_str()).unwrap_or(false);
        if !plain {
            return Err(Error::Config(format!(
                "outputName {:?} must be a plain file name",
                self.output_name
            )));
        }
        Ok(())
    }

    /// Path of the aggregate database.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_name)
    }
}
