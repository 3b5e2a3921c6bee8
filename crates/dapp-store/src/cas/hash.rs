//! Content ID computation
//!
//! The ID of an application image is the SHA-256 of its bundle's canonical
//! JSON bytes. The relocation map and repository digest do not take part.

use dapp_core::types::{AppImage, ImageId};
use dapp_core::utils::sha256_digest;

use crate::StoreResult;

/// Compute the content ID of an image
pub fn compute_id(image: &AppImage) -> StoreResult<ImageId> {
    let bytes = image.bundle().canonical_bytes()?;
    ImageId::from_digest(sha256_digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapp_core::types::{Bundle, Digest, RelocationMap};
    use serde_json::json;

    fn image(value: serde_json::Value) -> AppImage {
        AppImage::from_bundle(Bundle::from_value(value).unwrap())
    }

    #[test]
    fn test_compute_id_matches_canonical_bytes() {
        let image = image(json!({"name": "bundle-name"}));
        let id = compute_id(&image).unwrap();

        let expected = sha256_digest(br#"{"name":"bundle-name"}"#);
        assert_eq!(id.digest(), &expected);
        assert_eq!(id.encoded().len(), 64);
    }

    #[test]
    fn test_different_bundles_different_ids() {
        let a = compute_id(&image(json!({"name": "a"}))).unwrap();
        let b = compute_id(&image(json!({"name": "b"}))).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_relocation_data_not_hashed() {
        let plain = image(json!({"name": "app", "version": "1.0.0"}));
        let mut map = RelocationMap::new();
        map.insert("nginx".to_string(), "mirror.local/nginx".to_string());
        let relocated = plain
            .clone()
            .with_relocation_map(map)
            .with_repo_digest(
                Digest::parse("sha256:2957c6606cc94099f7dfe0011b5c8daf4a605ed6124d4eee773bab1e05a8ce87")
                    .unwrap(),
            );

        assert_eq!(compute_id(&plain).unwrap(), compute_id(&relocated).unwrap());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use dapp_core::types::Bundle;
    use proptest::prelude::*;
    use proptest::test_runner::Config as ProptestConfig;
    use serde_json::{Map, Value};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Same document, any key order, same ID
        #[test]
        fn id_independent_of_key_order(
            entries in prop::collection::btree_map("[a-z]{1,8}", "[a-zA-Z0-9 ]{0,16}", 1..12)
        ) {
            let forward: Map<String, Value> = entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            let reversed: Map<String, Value> = entries
                .iter()
                .rev()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();

            let id1 = compute_id(&AppImage::from_bundle(Bundle::from_value(Value::Object(forward)).unwrap())).unwrap();
            let id2 = compute_id(&AppImage::from_bundle(Bundle::from_value(Value::Object(reversed)).unwrap())).unwrap();
            prop_assert_eq!(id1, id2);
        }

        /// Hashing is deterministic and the ID round-trips through its text form
        #[test]
        fn id_determinism(name in "[a-z0-9-]{1,32}", version in "[0-9]\\.[0-9]\\.[0-9]") {
            let bundle = serde_json::json!({"name": name, "version": version});
            let image = AppImage::from_bundle(Bundle::from_value(bundle).unwrap());

            let id1 = compute_id(&image).unwrap();
            let id2 = compute_id(&image).unwrap();
            prop_assert_eq!(&id1, &id2);
            prop_assert_eq!(ImageId::parse(&id1.to_string()).unwrap(), id1);
        }
    }
}
