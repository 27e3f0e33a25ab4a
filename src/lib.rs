//! geoip-mmdb - Compile labeled IP prefix lists into MaxMind DB country databases.
//!
//! This crate turns sets of CIDR prefixes, each tagged with a label (usually
//! an ISO country code), into a binary database that any MaxMind DB reader
//! can query with a single address.
//!
//! # Features
//!
//! - **Deterministic label selection**: want/exclude lists, sorted output
//! - **Overlap resolution**: later and more specific prefixes win
//! - **Deduplicated records**: identical records are stored once
//! - **Aggregate or per-label output**: one database, or one per label
//! - **Address-family filtering**: IPv4-only or IPv6-only databases
//! - **Atomic writes**: a failed build never leaves a partial file
//!
//! # Quick Start
//!
//! ```ignore
//! use geoip_mmdb::{Container, MmdbOutput, OutputConfig};
//!
//! let mut container = Container::new();
//! container.add("US", ["192.0.2.0/24".parse()?]);
//! container.add("JP", ["203.0.113.0/24".parse()?]);
//!
//! let output = MmdbOutput::new(OutputConfig::default())?;
//! for path in output.output(&container)? {
//!     println!("wrote {}", path.display());
//! }
//! ```
//!
//! # Configuration Files
//!
//! ```ignore
//! use geoip_mmdb::Instance;
//! use std::path::Path;
//!
//! let instance = Instance::from_file(Path::new("config.json"))?;
//! instance.run()?;
//! ```
//!
//! # Record Layout
//!
//! Every label `L` is stored as
//! `{"country": {"iso_code": L}, "registered_country": {"iso_code": L}}`,
//! the shape GeoIP2 country readers expect.

mod error;
mod scope;
mod source;

pub mod config;
pub mod converter;
pub mod instance;
pub mod mmdb;
pub mod output;
pub mod record;
pub mod selector;

pub use config::{Config, FormatEntry, OutputConfig};
pub use converter::{InputFormat, OutputFormat};
pub use error::{Error, Result};
pub use instance::Instance;
pub use mmdb::{IpVersion, MmdbReader, MmdbWriter, RecordSize, WriterOptions};
pub use output::MmdbOutput;
pub use scope::IpScope;
pub use selector::select;
pub use source::{Container, PrefixSet, PrefixSource};
