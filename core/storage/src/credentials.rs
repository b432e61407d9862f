//! Credential bundle parsing and access.

use serde_json::{Map, Value};

use nimbus_common::{Error, Result};

/// Credential bundle supplied by the platform.
///
/// A read-only view over the JSON object serialized into the storage key.
/// The bundle always carries vendor key material; it may also name the
/// `provider` to use and carry per-deployment overrides such as `weburl`
/// and `endpoint`. Providers keep their own clone and read the keys they
/// understand.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    values: Map<String, Value>,
}

impl Credentials {
    /// Parse a bundle from its serialized JSON form.
    ///
    /// # Errors
    /// - Input is not valid JSON
    /// - Input is valid JSON but not an object
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw).map_err(|e| {
            Error::Config(format!("Storage credentials are not valid JSON: {}", e))
        })?;
        match value {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(Error::Config(
                "Storage credentials must be a JSON object".to_string(),
            )),
        }
    }

    /// Wrap an already-parsed JSON object.
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// String value for `key`, if present.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|value| value.as_str())
    }

    /// Driver identifier selecting the storage backend.
    pub fn provider(&self) -> Option<&str> {
        self.get_str("provider")
    }

    /// Explicit web-URL override for the web bucket.
    pub fn web_url(&self) -> Option<&str> {
        self.get_str("weburl")
    }

    /// Vendor API endpoint override.
    pub fn endpoint(&self) -> Option<&str> {
        self.get_str("endpoint")
    }

    /// The bundle as a JSON value, for vendor-specific deserialization.
    pub fn as_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_object() {
        let credentials =
            Credentials::from_json(r#"{"provider":"@nimbus/storage-s3","endpoint":"http://localhost:9000"}"#)
                .unwrap();
        assert_eq!(credentials.provider(), Some("@nimbus/storage-s3"));
        assert_eq!(credentials.endpoint(), Some("http://localhost:9000"));
        assert_eq!(credentials.web_url(), None);
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(Credentials::from_json("[1, 2]").is_err());
        assert!(Credentials::from_json("\"creds\"").is_err());
        assert!(Credentials::from_json("not json at all").is_err());
    }

    #[test]
    fn test_get_str_ignores_non_strings() {
        let credentials = Credentials::from_json(r#"{"expires": 3600}"#).unwrap();
        assert_eq!(credentials.get_str("expires"), None);
    }

    #[test]
    fn test_as_value_round_trips() {
        let credentials = Credentials::from_json(r#"{"weburl":"https://cdn.example.com"}"#).unwrap();
        let value = credentials.as_value();
        assert_eq!(value["weburl"], "https://cdn.example.com");
    }
}
