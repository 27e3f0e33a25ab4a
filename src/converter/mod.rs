//! Input and output formats.
//!
//! Formats are a closed set resolved from the configuration's `type` names
//! when an [`Instance`](crate::Instance) is built.

mod text;

use std::fmt;
use std::path::PathBuf;

pub use text::{TextInput, TextInputConfig, TextParser};

use crate::config::{FormatEntry, OutputConfig};
use crate::output::MmdbOutput;
use crate::{Container, Error, PrefixSource, Result};

/// Action of input entries.
pub const ACTION_ADD: &str = "add";

/// Action of output entries.
pub const ACTION_OUTPUT: &str = "output";

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// Plain-text CIDR lists
    Text,
}

impl InputFormat {
    pub const ALL: [InputFormat; 1] = [InputFormat::Text];

    /// Type name used in configuration files.
    pub fn type_name(self) -> &'static str {
        match self {
            InputFormat::Text => "text",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            InputFormat::Text => "Convert plaintext IP and CIDR to other formats",
        }
    }

    /// Look up a format by type name (case-insensitive).
    pub fn from_type(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.type_name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| Error::Config(format!("unknown input type: {}", name)))
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// MaxMind DB country database
    MaxmindMmdb,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 1] = [OutputFormat::MaxmindMmdb];

    /// Type name used in configuration files.
    pub fn type_name(self) -> &'static str {
        match self {
            OutputFormat::MaxmindMmdb => "maxmindMMDB",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            OutputFormat::MaxmindMmdb => "Convert data to MaxMind mmdb database format",
        }
    }

    /// Look up a format by type name (case-insensitive).
    pub fn from_type(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.type_name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| Error::Config(format!("unknown output type: {}", name)))
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A configured input.
#[derive(Debug, Clone)]
pub enum Input {
    Text(TextInput),
}

impl Input {
    /// Resolve an `input` entry of a configuration file.
    pub fn from_entry(entry: &FormatEntry) -> Result<Self> {
        let format = InputFormat::from_type(&entry.type_name)?;
        check_action(&entry.action, ACTION_ADD, format.type_name())?;
        match format {
            InputFormat::Text => TextInput::from_args(entry.args.as_ref()).map(Input::Text),
        }
    }

    pub fn format(&self) -> InputFormat {
        match self {
            Input::Text(_) => InputFormat::Text,
        }
    }

    /// Add this input's prefixes to `container`.
    pub fn input(&self, container: &mut Container) -> Result<()> {
        match self {
            Input::Text(text) => text.input(container),
        }
    }
}

/// A configured output.
#[derive(Debug, Clone)]
pub enum Output {
    MaxmindMmdb(MmdbOutput),
}

impl Output {
    /// Resolve an `output` entry of a configuration file.
    pub fn from_entry(entry: &FormatEntry) -> Result<Self> {
        let format = OutputFormat::from_type(&entry.type_name)?;
        check_action(&entry.action, ACTION_OUTPUT, format.type_name())?;
        match format {
            OutputFormat::MaxmindMmdb => {
                let config = OutputConfig::from_args(entry.args.as_ref())?;
                MmdbOutput::new(config).map(Output::MaxmindMmdb)
            }
        }
    }

    pub fn format(&self) -> OutputFormat {
        match self {
            Output::MaxmindMmdb(_) => OutputFormat::MaxmindMmdb,
        }
    }

    /// Write `source` and return the produced files.
    pub fn output(&self, source: &dyn PrefixSource) -> Result<Vec<PathBuf>> {
        match self {
            Output::MaxmindMmdb(mmdb) => mmdb.output(source),
        }
    }
}

fn check_action(action: &str, expected: &str, type_name: &str) -> Result<()> {
    if action.trim().eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "unsupported action {:?} for type {} (expected {:?})",
            action, type_name, expected
        )))
    }
}
