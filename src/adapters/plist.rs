//! Property list decoding (binary and XML).

use std::io::Cursor;
use std::path::Path;

use serde_json::{Map, Number, Value};

use crate::adapters::files::read_bounded;
use crate::adapters::ReadPolicy;
use crate::error::SourceError;
use crate::models::FileFacts;
use crate::utils::hash::sha256_bytes;

/// Read a plist file and convert it to a JSON value.
pub fn read_plist(path: &Path, policy: &ReadPolicy) -> Result<(Value, FileFacts), SourceError> {
    let read = read_bounded(path, policy)?;
    let value = plist::Value::from_reader(Cursor::new(&read.bytes))
        .map_err(|e| SourceError::format(path, e.to_string()))?;
    Ok((plist_to_json(&value), read.facts))
}

/// Convert a plist value to JSON.
///
/// Dates become RFC 3339 strings. Binary blobs are never copied out; they are
/// replaced by their length and a short digest.
pub fn plist_to_json(value: &plist::Value) -> Value {
    match value {
        plist::Value::Dictionary(dict) => {
            let map: Map<String, Value> = dict
                .iter()
                .map(|(k, v)| (k.clone(), plist_to_json(v)))
                .collect();
            Value::Object(map)
        }
        plist::Value::Array(items) => Value::Array(items.iter().map(plist_to_json).collect()),
        plist::Value::Boolean(b) => Value::Bool(*b),
        plist::Value::Integer(i) => i
            .as_signed()
            .map(Value::from)
            .or_else(|| i.as_unsigned().map(Value::from))
            .unwrap_or(Value::Null),
        plist::Value::Real(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        plist::Value::String(s) => Value::String(s.clone()),
        plist::Value::Date(date) => Value::String(date.to_xml_format()),
        plist::Value::Data(bytes) => Value::String(format!(
            "<binary:{} bytes sha256:{}>",
            bytes.len(),
            &sha256_bytes(bytes)[..16]
        )),
        plist::Value::Uid(uid) => Value::from(uid.get()),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const XML_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>defaultModel</key>
    <string>gpt-4o</string>
    <key>launchCount</key>
    <integer>12</integer>
    <key>blob</key>
    <data>AAECAw==</data>
    <key>enabled</key>
    <true/>
</dict>
</plist>"#;

    #[test]
    fn test_xml_plist_to_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("com.openai.chat.plist");
        std::fs::write(&path, XML_PLIST).unwrap();

        let (value, facts) = read_plist(&path, &ReadPolicy::default()).unwrap();
        assert_eq!(value["defaultModel"], json!("gpt-4o"));
        assert_eq!(value["launchCount"], json!(12));
        assert_eq!(value["enabled"], json!(true));
        assert!(value["blob"].as_str().unwrap().starts_with("<binary:4 bytes"));
        assert!(facts.sha256.is_some());
    }

    #[test]
    fn test_binary_plist_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.plist");
        let mut dict = plist::Dictionary::new();
        dict.insert("name".to_string(), plist::Value::String("ChatGPT".into()));
        plist::Value::Dictionary(dict).to_file_binary(&path).unwrap();

        let (value, _) = read_plist(&path, &ReadPolicy::default()).unwrap();
        assert_eq!(value, json!({"name": "ChatGPT"}));
    }

    #[test]
    fn test_garbage_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.plist");
        std::fs::write(&path, b"\x00\x01 not a plist").unwrap();

        assert!(matches!(
            read_plist(&path, &ReadPolicy::default()),
            Err(SourceError::Format { .. })
        ));
    }
}
