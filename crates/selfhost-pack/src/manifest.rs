//! Bundle manifest carried as the header's metadata record.
//!
//! The container stores the record as opaque JSON. This typed view exists
//! for callers that inspect bundles.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{IoContext, Result};

/// Name of the manifest file inside a bundle directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Metadata describing a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    /// Display name.
    pub name: String,

    /// Bundle version.
    pub version: String,

    /// Apps deployed into the bundle.
    #[serde(default)]
    pub apps: Vec<String>,

    /// Target platform token (e.g., "linux-x64").
    pub platform: String,

    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl BundleManifest {
    /// Interpret an opaque JSON record.
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }

    /// Platform token declared by a record.
    ///
    /// Records that lack the full manifest shape still yield their
    /// `platform` string if they carry one.
    pub fn platform_of(record: &Value) -> Option<String> {
        match Self::from_value(record) {
            Ok(manifest) => Some(manifest.platform),
            Err(_) => record
                .get("platform")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
        .filter(|platform| !platform.is_empty())
    }
}

/// Load a manifest file as an opaque JSON record, without imposing a shape.
pub fn read_record(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let data = fs::read(path).at("read manifest", path)?;
    Ok(serde_json::from_slice(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_record() -> Value {
        serde_json::json!({
            "name": "Convex Backend",
            "version": "1.0.0",
            "apps": ["app"],
            "platform": "darwin-arm64",
            "createdAt": "2024-01-01T00:00:00Z",
            "extra": true,
        })
    }

    #[test]
    fn test_from_value() {
        let manifest = BundleManifest::from_value(&full_record()).unwrap();
        assert_eq!(manifest.name, "Convex Backend");
        assert_eq!(manifest.apps, vec!["app".to_string()]);
        assert_eq!(manifest.platform, "darwin-arm64");
        assert_eq!(manifest.created_at, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_platform_of() {
        assert_eq!(
            BundleManifest::platform_of(&full_record()).as_deref(),
            Some("darwin-arm64")
        );

        let partial = serde_json::json!({"name": "x", "platform": "linux-x64"});
        assert_eq!(BundleManifest::platform_of(&partial).as_deref(), Some("linux-x64"));

        assert_eq!(BundleManifest::platform_of(&serde_json::json!({"name": "x"})), None);
        assert_eq!(BundleManifest::platform_of(&serde_json::json!({"platform": ""})), None);
        assert_eq!(BundleManifest::platform_of(&serde_json::json!({"platform": 3})), None);
    }

    #[test]
    fn test_read_record_keeps_unknown_fields() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(MANIFEST_FILE);
        fs::write(&path, br#"{"name":"n","custom":{"a":1}}"#).unwrap();

        let record = read_record(&path).unwrap();
        assert_eq!(record["custom"]["a"], 1);
        assert!(BundleManifest::from_value(&record).is_err());
    }
}
