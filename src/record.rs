//! Country records stored in the data section.

use crate::mmdb::DataValue;

/// Record for a label: `{"country": {"iso_code": L}, "registered_country": {"iso_code": L}}`.
///
/// The label is written as given; callers pass normalized (uppercase) labels.
pub fn country_record(label: &str) -> DataValue {
    let country = || DataValue::map([("iso_code", DataValue::string(label))]);
    DataValue::map([("country", country()), ("registered_country", country())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmdb::DataEncoder;

    #[test]
    fn test_record_shape() {
        let record = country_record("US");
        let DataValue::Map(fields) = &record else {
            panic!("expected map, got {:?}", record);
        };
        assert_eq!(
            fields.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["country", "registered_country"]
        );
        assert_eq!(fields["country"], fields["registered_country"]);
        assert_eq!(
            fields["country"],
            DataValue::map([("iso_code", DataValue::string("US"))])
        );
    }

    #[test]
    fn test_inner_map_shared_once_encoded() {
        let mut encoder = DataEncoder::new();
        encoder.encode(&country_record("JP")).unwrap();

        let bytes = encoder.as_bytes();
        assert_eq!(bytes.windows(8).filter(|w| *w == b"iso_code").count(), 1);
        assert_eq!(bytes.windows(2).filter(|w| *w == b"JP").count(), 1);
    }
}
