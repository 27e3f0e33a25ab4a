//! Plain-text prefix lists.
//!
//! One CIDR or address per line. `#` and `//` start comments, blank lines
//! are ignored, and a bare address is read as a host prefix.
//!
//! ```text
//! # China
//! 1.0.1.0/24
//! 1.0.2.0/23
//! 240e::/20
//! 203.0.113.7
//! ```

use std::io::{BufRead, BufReader, Read};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use ipnet::IpNet;
use serde::Deserialize;

use crate::{Container, Error, IpScope, Result};

/// Gzip magic number.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Arguments of a `text` input.
///
/// Either `name` + `uri` (one label) or `inputDir` (one label per file).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextInputConfig {
    /// Label of the prefixes read from `uri`
    pub name: String,
    /// Local path or http(s) URL
    pub uri: String,
    /// Directory whose files are each read as one label
    pub input_dir: Option<PathBuf>,
    /// Address families to keep
    #[serde(rename = "onlyIPType")]
    pub only_ip_type: IpScope,
}

/// Reads plain-text prefix lists into a container.
#[derive(Debug, Clone)]
pub struct TextInput {
    config: TextInputConfig,
}

impl TextInput {
    /// Create an input, checking that exactly one source is configured.
    pub fn new(config: TextInputConfig) -> Result<Self> {
        let single = !config.name.trim().is_empty() && !config.uri.trim().is_empty();
        match (single, &config.input_dir) {
            (true, None) | (false, Some(_)) => Ok(Self { config }),
            (true, Some(_)) => Err(Error::Config(
                "text input: set either name + uri or inputDir, not both".to_string(),
            )),
            (false, None) => Err(Error::Config(
                "text input: name + uri or inputDir is required".to_string(),
            )),
        }
    }

    /// Build from the `args` value of a configuration entry.
    pub fn from_args(args: Option<&serde_json::Value>) -> Result<Self> {
        let config = match args {
            Some(value) if !value.is_null() => TextInputConfig::deserialize(value)?,
            _ => TextInputConfig::default(),
        };
        Self::new(config)
    }

    pub fn config(&self) -> &TextInputConfig {
        &self.config
    }

    /// Read every configured list and add it to `container`.
    pub fn input(&self, container: &mut Container) -> Result<()> {
        match &self.config.input_dir {
            Some(dir) => {
                for (label, path) in list_dir(dir)? {
                    self.add(container, &label, &path.to_string_lossy())?;
                }
            }
            None => self.add(container, &self.config.name, &self.config.uri)?,
        }
        Ok(())
    }

    fn add(&self, container: &mut Container, label: &str, uri: &str) -> Result<()> {
        let data = read_uri(uri)?;
        let scope = self.config.only_ip_type;
        let prefixes: Vec<IpNet> = TextParser::parse(&data[..])
            .map_err(|e| Error::for_entry(label, e))?
            .into_iter()
            .filter(|net| scope.allows(net))
            .collect();

        log::debug!("[text] {}: {} prefixes from {}", label, prefixes.len(), uri);
        if !container.add(label, prefixes) {
            return Err(Error::Config(format!("text input: empty label for {}", uri)));
        }
        Ok(())
    }
}

/// Text prefix list parser.
pub struct TextParser;

impl TextParser {
    /// Parse prefixes from a reader. Gzip input is decompressed.
    pub fn parse<R: Read>(reader: R) -> Result<Vec<IpNet>> {
        let mut buf_reader = BufReader::new(reader);
        let gzipped = buf_reader.fill_buf()?.starts_with(&GZIP_MAGIC);
        if gzipped {
            Self::parse_lines(BufReader::new(GzDecoder::new(buf_reader)))
        } else {
            Self::parse_lines(buf_reader)
        }
    }

    fn parse_lines<R: BufRead>(reader: R) -> Result<Vec<IpNet>> {
        let mut prefixes = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = strip_comment(&line).trim();
            if line.is_empty() {
                continue;
            }
            prefixes.push(parse_prefix(line)?);
        }
        Ok(prefixes)
    }
}

fn strip_comment(line: &str) -> &str {
    let end = [line.find('#'), line.find("//")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..end]
}

/// Parse a CIDR or a bare address (host prefix). Host bits are cleared.
fn parse_prefix(s: &str) -> Result<IpNet> {
    if s.contains('/') {
        return s
            .parse::<IpNet>()
            .map(|net| net.trunc())
            .map_err(|_| Error::InvalidCidrPattern(s.to_string()));
    }
    let addr = s
        .parse::<IpAddr>()
        .map_err(|_| Error::InvalidCidrPattern(s.to_string()))?;
    let host_len = if addr.is_ipv4() { 32 } else { 128 };
    IpNet::new(addr, host_len).map_err(|_| Error::InvalidCidrPattern(s.to_string()))
}

/// Files of `dir` as (label, path), sorted by path.
fn list_dir(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| Error::at_path(dir, e))? {
        let path = entry.map_err(|e| Error::at_path(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(label) = label_for_file(&path) {
            files.push((label, path));
        }
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// `cn.txt` and `cn.txt.gz` both name label `cn`.
fn label_for_file(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let name = name.strip_suffix(".gz").unwrap_or(name);
    let stem = Path::new(name).file_stem()?.to_str()?;
    Some(stem.to_string())
}

/// Read a local file or fetch an http(s) URL.
fn read_uri(uri: &str) -> Result<Vec<u8>> {
    let lower = uri.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return fetch(uri);
    }
    std::fs::read(uri).map_err(|e| Error::at_path(uri, e))
}

fn fetch(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url).call().map_err(|e| match e {
        ureq::Error::Status(code, _) => Error::Download(format!("{}: HTTP error {}", url, code)),
        ureq::Error::Transport(t) => Error::Download(format!("{}: {}", url, t)),
    })?;

    let mut data = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut data)
        .map_err(|e| Error::Download(format!("{}: failed to read response: {}", url, e)))?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PrefixSource;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    fn nets(list: &[&str]) -> Vec<IpNet> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_parse_lines() {
        let text = "
# header comment
1.0.1.0/24
1.0.2.0/23   # trailing comment
// slash comment
240e::/20
203.0.113.7
2001:db8::1
10.1.2.3/8
";
        let prefixes = TextParser::parse(text.as_bytes()).unwrap();
        assert_eq!(
            prefixes,
            nets(&[
                "1.0.1.0/24",
                "1.0.2.0/23",
                "240e::/20",
                "203.0.113.7/32",
                "2001:db8::1/128",
                "10.0.0.0/8",
            ])
        );
    }

    #[test]
    fn test_invalid_line() {
        let err = TextParser::parse("1.0.1.0/24\nnot-an-ip\n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidCidrPattern(ref s) if s == "not-an-ip"));

        assert!(TextParser::parse("10.0.0.0/33".as_bytes()).is_err());
    }

    #[test]
    fn test_parse_gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"192.0.2.0/24\n").unwrap();
        let compressed = encoder.finish().unwrap();

        let prefixes = TextParser::parse(&compressed[..]).unwrap();
        assert_eq!(prefixes, nets(&["192.0.2.0/24"]));
    }

    #[test]
    fn test_config_requires_one_source() {
        assert!(TextInput::from_args(None).is_err());

        let args = serde_json::json!({ "name": "cn" });
        assert!(TextInput::from_args(Some(&args)).is_err());

        let args = serde_json::json!({ "name": "cn", "uri": "cn.txt", "inputDir": "./data" });
        assert!(matches!(TextInput::from_args(Some(&args)), Err(Error::Config(_))));

        let args = serde_json::json!({ "inputDir": "./data", "onlyIPType": "ipv6" });
        let input = TextInput::from_args(Some(&args)).unwrap();
        assert_eq!(input.config().only_ip_type, IpScope::V6Only);
    }

    #[test]
    fn test_input_single_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cn.txt");
        std::fs::write(&path, "1.0.1.0/24\n1.0.2.0/23\n240e::/20\n").unwrap();

        let input = TextInput::new(TextInputConfig {
            name: "cn".into(),
            uri: path.to_string_lossy().into_owned(),
            only_ip_type: IpScope::V4Only,
            ..TextInputConfig::default()
        })
        .unwrap();

        let mut container = Container::new();
        input.input(&mut container).unwrap();

        let set = container.get("CN").unwrap();
        assert_eq!(set.ipv4().len(), 2);
        assert!(set.ipv6().is_empty());
    }

    #[test]
    fn test_input_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("us.txt"), "192.0.2.0/24\n").unwrap();
        std::fs::write(dir.path().join("jp"), "203.0.113.0/24\n").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"198.51.100.0/24\n").unwrap();
        std::fs::write(dir.path().join("cn.txt.gz"), encoder.finish().unwrap()).unwrap();

        let input = TextInput::new(TextInputConfig {
            input_dir: Some(dir.path().to_path_buf()),
            ..TextInputConfig::default()
        })
        .unwrap();

        let mut container = Container::new();
        input.input(&mut container).unwrap();

        assert_eq!(container.labels(), vec!["CN", "JP", "US"]);
    }

    #[test]
    fn test_missing_file_names_path() {
        let input = TextInput::new(TextInputConfig {
            name: "cn".into(),
            uri: "/nonexistent/cn.txt".into(),
            ..TextInputConfig::default()
        })
        .unwrap();

        let err = input.input(&mut Container::new()).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cn.txt"));
    }
}
