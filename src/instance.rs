//! One conversion run: inputs fill a container, outputs compile it.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::converter::{Input, Output};
use crate::{Container, Error, Result};

/// Inputs and outputs resolved from a configuration.
#[derive(Debug, Clone)]
pub struct Instance {
    inputs: Vec<Input>,
    outputs: Vec<Output>,
}

impl Instance {
    /// Resolve every entry of `config`. Unknown types and invalid
    /// arguments fail here, before anything is read or written.
    pub fn new(config: &Config) -> Result<Self> {
        if config.input.is_empty() {
            return Err(Error::Config("input list is empty".to_string()));
        }
        if config.output.is_empty() {
            return Err(Error::Config("output list is empty".to_string()));
        }

        let inputs = config
            .input
            .iter()
            .map(Input::from_entry)
            .collect::<Result<Vec<_>>>()?;
        let outputs = config
            .output
            .iter()
            .map(Output::from_entry)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { inputs, outputs })
    }

    /// Load and resolve a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::new(&Config::load(path)?)
    }

    /// Parse and resolve a configuration document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::new(&Config::from_slice(bytes)?)
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Run every input, then every output. Returns the produced files.
    pub fn run(&self) -> Result<Vec<PathBuf>> {
        let mut container = Container::new();
        for input in &self.inputs {
            input.input(&mut container)?;
        }
        log::debug!("Loaded {} entries", container.len());

        let mut paths = Vec::new();
        for output in &self.outputs {
            paths.extend(output.output(&container)?);
        }
        Ok(paths)
    }
}
