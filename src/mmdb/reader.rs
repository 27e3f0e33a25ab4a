//! Memory-mapped reader for compiled databases.

use std::fs::File;
use std::net::IpAddr;
use std::path::Path;

use maxminddb::MaxMindDBError;
use memmap2::Mmap;
use serde::de::DeserializeOwned;

use crate::{Error, Result};

#[derive(serde::Deserialize)]
struct Country {
    iso_code: Option<String>,
}

#[derive(serde::Deserialize)]
struct CountryResponse {
    country: Option<Country>,
}

/// Reader over a MaxMind DB file.
///
/// Lookups go through the `maxminddb` crate, so anything this reader can
/// resolve, other MaxMind DB readers can too.
pub struct MmdbReader<S: AsRef<[u8]> = Mmap> {
    reader: maxminddb::Reader<S>,
}

impl MmdbReader<Mmap> {
    /// Open and memory-map a database file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::at_path(path, e))?;
        let mmap = unsafe { Mmap::map(&file).map_err(|e| Error::at_path(path, e))? };
        Self::from_source(mmap)
    }
}

impl MmdbReader<Vec<u8>> {
    /// Read a database from bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_source(data)
    }
}

impl<S: AsRef<[u8]>> MmdbReader<S> {
    fn from_source(source: S) -> Result<Self> {
        let reader =
            maxminddb::Reader::from_source(source).map_err(|e| Error::GeoIp(e.to_string()))?;
        Ok(Self { reader })
    }

    /// Label (`country.iso_code`) an address resolves to.
    pub fn lookup_label(&self, ip: IpAddr) -> Result<Option<String>> {
        let response: Option<CountryResponse> = self.lookup(ip)?;
        Ok(response.and_then(|r| r.country).and_then(|c| c.iso_code))
    }

    /// Decode the record an address resolves to.
    ///
    /// Returns `Ok(None)` for addresses without data.
    pub fn lookup<T: DeserializeOwned>(&self, ip: IpAddr) -> Result<Option<T>> {
        match self.reader.lookup::<T>(ip) {
            Ok(record) => Ok(Some(record)),
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(None),
            Err(e) => Err(Error::GeoIp(e.to_string())),
        }
    }

    pub fn metadata(&self) -> &maxminddb::Metadata {
        &self.reader.metadata
    }
}
