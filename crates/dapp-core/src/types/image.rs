//! Application image payload types.
//!
//! An [`AppImage`] is what the store persists: a CNAB bundle document, kept
//! opaque, plus the relocation map and the registry digest it travelled with.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::digest::Digest;
use crate::error::{StoreError, StoreResult};

/// Original image reference -> relocated image reference
pub type RelocationMap = BTreeMap<String, String>;

/// An opaque CNAB bundle document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bundle(Value);

impl Bundle {
    /// Wrap a JSON document; bundles are always JSON objects
    pub fn from_value(value: Value) -> StoreResult<Self> {
        if !value.is_object() {
            return Err(StoreError::CorruptContent {
                path: "<memory>".to_string(),
                message: "bundle document must be a JSON object".to_string(),
                source: None,
            });
        }
        Ok(Self(value))
    }

    /// Decode a bundle from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> StoreResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| StoreError::serialization("Failed to decode bundle document", e))?;
        Self::from_value(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// The bundle's `name` field, if any
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// The bundle's `version` field, if any
    pub fn version(&self) -> Option<&str> {
        self.0.get("version").and_then(Value::as_str)
    }

    /// Compact JSON with object keys sorted at every level
    ///
    /// This is the byte form that is hashed into the content ID and written
    /// to `bundle.json`.
    pub fn canonical_bytes(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(&sort_keys(&self.0))
            .map_err(|e| StoreError::serialization("Failed to serialize bundle document", e))
    }
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        },
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// A bundle together with its relocation data
#[derive(Debug, Clone, PartialEq)]
pub struct AppImage {
    bundle: Bundle,
    relocation_map: RelocationMap,
    repo_digest: Option<Digest>,
}

impl AppImage {
    /// Create an image with an empty relocation map
    pub fn from_bundle(bundle: Bundle) -> Self {
        Self {
            bundle,
            relocation_map: RelocationMap::new(),
            repo_digest: None,
        }
    }

    pub fn with_relocation_map(mut self, relocation_map: RelocationMap) -> Self {
        self.relocation_map = relocation_map;
        self
    }

    pub fn with_repo_digest(mut self, repo_digest: Digest) -> Self {
        self.repo_digest = Some(repo_digest);
        self
    }

    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    pub fn relocation_map(&self) -> &RelocationMap {
        &self.relocation_map
    }

    pub fn repo_digest(&self) -> Option<&Digest> {
        self.repo_digest.as_ref()
    }

    /// The bundle's `images` section with every image rewritten through the
    /// relocation map
    pub fn relocated_images(&self) -> BTreeMap<String, Value> {
        let images = match self.bundle.as_value().get("images").and_then(Value::as_object) {
            Some(images) => images,
            None => return BTreeMap::new(),
        };

        images
            .iter()
            .map(|(name, definition)| {
                let mut definition = definition.clone();
                let relocated = definition
                    .get("image")
                    .and_then(Value::as_str)
                    .and_then(|image| self.relocation_map.get(image))
                    .cloned();
                if let (Some(relocated), Some(fields)) = (relocated, definition.as_object_mut()) {
                    fields.insert("image".to_string(), Value::String(relocated));
                }
                (name.clone(), definition)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bundle_must_be_object() {
        assert!(Bundle::from_value(json!({"name": "bundle-name"})).is_ok());
        assert!(Bundle::from_value(json!(["not", "a", "bundle"])).is_err());
        assert!(Bundle::from_slice(b"{not json").is_err());
    }

    #[test]
    fn test_canonical_bytes_sorted_and_compact() {
        let bundle = Bundle::from_value(json!({
            "version": "1.0.0",
            "name": "app",
            "images": {"web": {"image": "nginx", "description": "front"}}
        }))
        .unwrap();
        let bytes = bundle.canonical_bytes().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"images":{"web":{"description":"front","image":"nginx"}},"name":"app","version":"1.0.0"}"#
        );
    }

    #[test]
    fn test_canonical_bytes_ignore_input_order() {
        let a = Bundle::from_slice(br#"{"a": 1, "b": {"d": 2, "c": 3}}"#).unwrap();
        let b = Bundle::from_slice(br#"{"b": {"c": 3, "d": 2}, "a": 1}"#).unwrap();
        assert_eq!(a.canonical_bytes().unwrap(), b.canonical_bytes().unwrap());
    }

    #[test]
    fn test_relocated_images() {
        let bundle = Bundle::from_value(json!({
            "name": "app",
            "images": {
                "web": {"image": "nginx:latest", "imageType": "docker"},
                "db": {"image": "postgres:13"}
            }
        }))
        .unwrap();
        let mut map = RelocationMap::new();
        map.insert(
            "nginx:latest".to_string(),
            "registry.local/nginx@sha256:beef".to_string(),
        );
        let image = AppImage::from_bundle(bundle).with_relocation_map(map);

        let images = image.relocated_images();
        assert_eq!(images["web"]["image"], "registry.local/nginx@sha256:beef");
        assert_eq!(images["web"]["imageType"], "docker");
        assert_eq!(images["db"]["image"], "postgres:13");
        // The stored document itself is untouched
        assert_eq!(image.bundle().as_value()["images"]["web"]["image"], "nginx:latest");
    }

    #[test]
    fn test_bundle_accessors() {
        let bundle = Bundle::from_value(json!({"name": "bundle-name", "version": "0.1.0"})).unwrap();
        assert_eq!(bundle.name(), Some("bundle-name"));
        assert_eq!(bundle.version(), Some("0.1.0"));
        let image = AppImage::from_bundle(bundle);
        assert!(image.relocation_map().is_empty());
        assert!(image.repo_digest().is_none());
        assert!(image.relocated_images().is_empty());
    }
}
