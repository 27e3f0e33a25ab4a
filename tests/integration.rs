//! End-to-end tests: compile databases and read them back with `maxminddb`.

use geoip_mmdb::mmdb::DataValue;
use geoip_mmdb::{
    select, Container, Error, Instance, IpScope, IpVersion, MmdbOutput, MmdbWriter, OutputConfig,
    WriterOptions,
};
use maxminddb::{MaxMindDBError, Reader};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use tempfile::tempdir;

#[derive(Deserialize)]
struct IsoCode {
    iso_code: String,
}

#[derive(Deserialize)]
struct CountryRecord {
    country: IsoCode,
    registered_country: IsoCode,
}

fn container(entries: &[(&str, &str)]) -> Container {
    let mut container = Container::new();
    for (label, cidr) in entries {
        container.add(label, [cidr.parse().unwrap()]);
    }
    container
}

fn output_config(dir: &Path) -> OutputConfig {
    OutputConfig {
        output_dir: dir.to_path_buf(),
        ..OutputConfig::default()
    }
}

fn country(reader: &Reader<Vec<u8>>, ip: &str) -> Option<String> {
    let ip: IpAddr = ip.parse().unwrap();
    match reader.lookup::<CountryRecord>(ip) {
        Ok(record) => {
            assert_eq!(record.country.iso_code, record.registered_country.iso_code);
            Some(record.country.iso_code)
        }
        Err(MaxMindDBError::AddressNotFoundError(_)) => None,
        Err(e) => panic!("lookup {} failed: {}", ip, e),
    }
}

fn open(path: &Path) -> Reader<Vec<u8>> {
    Reader::open_readfile(path).unwrap()
}

#[test]
fn test_round_trip() {
    let dir = tempdir().unwrap();
    let source = container(&[("US", "192.0.2.0/24"), ("JP", "203.0.113.0/24")]);

    let paths = MmdbOutput::new(output_config(dir.path()))
        .unwrap()
        .output(&source)
        .unwrap();
    let reader = open(&paths[0]);

    for ip in ["192.0.2.0", "192.0.2.128", "192.0.2.255"] {
        assert_eq!(country(&reader, ip).as_deref(), Some("US"), "{}", ip);
    }
    for ip in ["203.0.113.0", "203.0.113.77", "203.0.113.255"] {
        assert_eq!(country(&reader, ip).as_deref(), Some("JP"), "{}", ip);
    }
    for ip in ["192.0.1.255", "192.0.3.0", "8.8.8.8", "2001:db8::1"] {
        assert_eq!(country(&reader, ip), None, "{}", ip);
    }

    // IPv4-mapped, Teredo and 6to4 forms reach the IPv4 data.
    assert_eq!(country(&reader, "::ffff:192.0.2.1").as_deref(), Some("US"));
    assert_eq!(country(&reader, "2001:0:c000:201::").as_deref(), Some("US"));
    assert_eq!(country(&reader, "2002:cb00:7101::").as_deref(), Some("JP"));
}

#[test]
fn test_metadata() {
    let dir = tempdir().unwrap();
    let source = container(&[("US", "192.0.2.0/24")]);

    let paths = MmdbOutput::new(output_config(dir.path()))
        .unwrap()
        .output(&source)
        .unwrap();
    let reader = open(&paths[0]);
    let meta = &reader.metadata;

    assert_eq!(meta.binary_format_major_version, 2);
    assert_eq!(meta.binary_format_minor_version, 0);
    assert_eq!(meta.database_type, "GeoIP2-Country");
    assert_eq!(meta.ip_version, 6);
    assert_eq!(meta.record_size, 28);
    assert!(meta.node_count > 0);
    assert!(meta.build_epoch > 0);
    assert_eq!(
        meta.description,
        BTreeMap::from([(
            "en".to_string(),
            "GeoIP2 Country database converted by geoip tool".to_string()
        )])
    );
}

#[test]
fn test_more_specific_label_wins() {
    let dir = tempdir().unwrap();
    // A sorts before B, so B's /16 is inserted after A's /8.
    let source = container(&[("A", "10.0.0.0/8"), ("B", "10.1.0.0/16")]);

    let paths = MmdbOutput::new(output_config(dir.path()))
        .unwrap()
        .output(&source)
        .unwrap();
    let reader = open(&paths[0]);

    assert_eq!(country(&reader, "10.1.2.3").as_deref(), Some("B"));
    assert_eq!(country(&reader, "10.0.255.255").as_deref(), Some("A"));
    assert_eq!(country(&reader, "10.2.0.0").as_deref(), Some("A"));
    assert_eq!(country(&reader, "11.0.0.0"), None);
}

#[test]
fn test_last_write_wins_by_sorted_label() {
    let dir = tempdir().unwrap();
    let source = container(&[("ZZ", "198.51.100.0/24"), ("AA", "198.51.100.0/24")]);

    let paths = MmdbOutput::new(output_config(dir.path()))
        .unwrap()
        .output(&source)
        .unwrap();
    let reader = open(&paths[0]);

    assert_eq!(country(&reader, "198.51.100.1").as_deref(), Some("ZZ"));
}

#[test]
fn test_ipv4_only_scope() {
    let dir = tempdir().unwrap();
    let source = container(&[("US", "192.0.2.0/24"), ("US", "2001:db8::/32")]);

    let mut config = output_config(dir.path());
    config.only_ip_type = IpScope::V4Only;
    let paths = MmdbOutput::new(config).unwrap().output(&source).unwrap();
    let reader = open(&paths[0]);

    assert_eq!(reader.metadata.ip_version, 4);
    assert_eq!(reader.metadata.node_count, 24);
    assert_eq!(country(&reader, "192.0.2.1").as_deref(), Some("US"));
}

#[test]
fn test_ipv6_only_scope() {
    let dir = tempdir().unwrap();
    let source = container(&[("JP", "203.0.113.0/24"), ("JP", "2001:db8::/32")]);

    let mut config = output_config(dir.path());
    config.only_ip_type = IpScope::V6Only;
    let paths = MmdbOutput::new(config).unwrap().output(&source).unwrap();
    let reader = open(&paths[0]);

    assert_eq!(reader.metadata.ip_version, 6);
    assert_eq!(country(&reader, "2001:db8::1").as_deref(), Some("JP"));
    assert_eq!(country(&reader, "203.0.113.1"), None);
}

#[test]
fn test_per_label_file_count() {
    let dir = tempdir().unwrap();
    let source = container(&[
        ("US", "192.0.2.0/24"),
        ("JP", "203.0.113.0/24"),
        ("CN", "198.51.100.0/24"),
    ]);

    let mut config = output_config(dir.path());
    config.one_file_per_list = true;
    MmdbOutput::new(config).unwrap().output(&source).unwrap();

    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["cn.mmdb", "jp.mmdb", "us.mmdb"]);

    let cn = open(&dir.path().join("cn.mmdb"));
    assert_eq!(country(&cn, "198.51.100.1").as_deref(), Some("CN"));
    assert_eq!(country(&cn, "192.0.2.1"), None);
}

#[test]
fn test_missing_wanted_label() {
    let source = container(&[("US", "192.0.2.0/24")]);

    let dir = tempdir().unwrap();
    let mut config = output_config(dir.path());
    config.wanted_list = vec!["US".into(), "FR".into()];
    let output = MmdbOutput::new(config.clone()).unwrap();
    // These are the labels aggregate mode logs a warning for.
    assert_eq!(output.missing_labels(&source), vec!["FR"]);
    let paths = output.output(&source).unwrap();
    assert_eq!(country(&open(&paths[0]), "192.0.2.1").as_deref(), Some("US"));

    let dir = tempdir().unwrap();
    config.output_dir = dir.path().to_path_buf();
    config.one_file_per_list = true;
    let err = MmdbOutput::new(config).unwrap().output(&source).unwrap_err();
    assert!(matches!(err, Error::NotFound(ref label) if label == "FR"));
    assert!(err.to_string().contains("FR"));
}

#[test]
fn test_selector_algebra() {
    let source = container(&[
        ("US", "192.0.2.0/24"),
        ("CN", "198.51.100.0/24"),
        ("JP", "203.0.113.0/24"),
    ]);
    let none: [&str; 0] = [];

    assert_eq!(select(&["US", "CN"], &["CN"], &source), vec!["US"]);
    assert_eq!(select(&none, &["US"], &source), vec!["CN", "JP"]);
    assert_eq!(
        select(&none, &none, &source),
        select(&none, &none, &source)
    );
}

#[test]
fn test_shared_record_stored_once() {
    let iso = DataValue::map([("iso_code", DataValue::string("EU"))]);
    let record = DataValue::map([("country", iso)]);

    let mut writer = MmdbWriter::new(WriterOptions {
        ip_version: IpVersion::V6,
        ..WriterOptions::default()
    });
    writer.insert("192.0.2.0/24".parse().unwrap(), &record).unwrap();
    writer.insert("2001:db8::/32".parse().unwrap(), &record).unwrap();
    let (bytes, stats) = writer.build().unwrap();
    assert_eq!(stats.distinct_records, 1);

    let reader = Reader::from_source(bytes).unwrap();
    #[derive(Deserialize)]
    struct Partial {
        country: IsoCode,
    }
    let v4: Partial = reader.lookup("192.0.2.1".parse().unwrap()).unwrap();
    let v6: Partial = reader.lookup("2001:db8::1".parse().unwrap()).unwrap();
    assert_eq!(v4.country.iso_code, "EU");
    assert_eq!(v6.country.iso_code, "EU");
}

#[test]
fn test_instance_from_text_lists() {
    let dir = tempdir().unwrap();
    let list = dir.path().join("private.txt");
    std::fs::write(&list, "# private ranges\n10.0.0.0/8\n172.16.0.0/12\nfc00::/7\n").unwrap();
    let out = dir.path().join("out");

    let config = serde_json::json!({
        "input": [{ "type": "text", "action": "add", "args": { "name": "private", "uri": list } }],
        "output": [{
            "type": "maxmindMMDB",
            "action": "output",
            "args": { "outputDir": out, "outputName": "private.mmdb", "recordSize": 24 }
        }]
    });
    let paths = Instance::from_slice(config.to_string().as_bytes())
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(paths, vec![out.join("private.mmdb")]);

    let reader = open(&paths[0]);
    assert_eq!(reader.metadata.record_size, 24);
    assert_eq!(country(&reader, "10.20.30.40").as_deref(), Some("PRIVATE"));
    assert_eq!(country(&reader, "172.31.0.1").as_deref(), Some("PRIVATE"));
    assert_eq!(country(&reader, "fd00::1").as_deref(), Some("PRIVATE"));
    assert_eq!(country(&reader, "172.32.0.1"), None);
}
