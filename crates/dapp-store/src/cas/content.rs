//! Digest-keyed content directories
//!
//! Each stored application image lives in
//! `<root>/contents/<algorithm>/<encoded>/` as a `bundle.json`, an optional
//! `relocation-map.json` and an optional `digest` file.

use camino::{Utf8Path, Utf8PathBuf};
use dapp_core::error::{StoreError, StoreResult};
use dapp_core::types::{Algorithm, AppImage, Bundle, Digest, ImageId, RelocationMap};
use dapp_core::utils::verify_digest;
use std::fs;
use std::io::ErrorKind;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directory under the store root holding all content
pub const CONTENTS_DIRECTORY: &str = "contents";
/// Bundle document file name
pub const BUNDLE_FILENAME: &str = "bundle.json";
/// Relocation map file name
pub const RELOCATION_MAP_FILENAME: &str = "relocation-map.json";
/// Repository digest file name
pub const DIGEST_FILENAME: &str = "digest";

/// Filesystem persistence for application image content
#[derive(Debug, Clone)]
pub struct ContentStore {
    /// `<store-root>/contents`
    root_path: Utf8PathBuf,
}

impl ContentStore {
    /// Open the content area of a store, creating it if needed
    pub fn new<P: AsRef<Utf8Path>>(store_root: P) -> StoreResult<Self> {
        let root_path = store_root.as_ref().join(CONTENTS_DIRECTORY);
        let sha256_dir = root_path.join(Algorithm::Sha256.as_str());

        fs::create_dir_all(&sha256_dir)
            .map_err(|e| StoreError::io(format!("Failed to create content directory {}", sha256_dir), e))?;

        Ok(Self { root_path })
    }

    /// Get the directory for an ID
    pub fn path_for(&self, id: &ImageId) -> Utf8PathBuf {
        let digest = id.digest();
        self.root_path
            .join(digest.algorithm().as_str())
            .join(digest.encoded())
    }

    /// Check if content exists for an ID
    pub fn contains(&self, id: &ImageId) -> bool {
        self.path_for(id).is_dir()
    }

    /// Get the root path of the content area
    pub fn root_path(&self) -> &Utf8Path {
        &self.root_path
    }

    /// Persist an image under its ID
    ///
    /// Safe to repeat: the same image always produces the same files.
    pub fn write(&self, id: &ImageId, image: &AppImage) -> StoreResult<()> {
        let dir = self.path_for(id);
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::io(format!("Failed to create content directory {}", dir), e))?;

        let bundle_bytes = image.bundle().canonical_bytes()?;
        let bundle_path = dir.join(BUNDLE_FILENAME);
        fs::write(&bundle_path, bundle_bytes)
            .map_err(|e| StoreError::io(format!("Failed to write {}", bundle_path), e))?;

        let map_path = dir.join(RELOCATION_MAP_FILENAME);
        if image.relocation_map().is_empty() {
            remove_if_exists(&map_path)?;
        } else {
            let map_bytes = serde_json::to_vec(image.relocation_map())
                .map_err(|e| StoreError::serialization("Failed to serialize relocation map", e))?;
            fs::write(&map_path, map_bytes)
                .map_err(|e| StoreError::io(format!("Failed to write {}", map_path), e))?;
        }

        let digest_path = dir.join(DIGEST_FILENAME);
        match image.repo_digest() {
            Some(digest) => fs::write(&digest_path, digest.to_string())
                .map_err(|e| StoreError::io(format!("Failed to write {}", digest_path), e))?,
            None => remove_if_exists(&digest_path)?,
        }

        debug!("Wrote content {} to {}", id, dir);
        Ok(())
    }

    /// Load the image stored under an ID
    pub fn read(&self, id: &ImageId) -> StoreResult<AppImage> {
        let dir = self.path_for(id);
        let bundle_path = dir.join(BUNDLE_FILENAME);

        let bundle_bytes = match fs::read(&bundle_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::ContentMissing { id: id.to_string() });
            },
            Err(e) => return Err(StoreError::io(format!("Failed to read {}", bundle_path), e)),
        };
        let value = serde_json::from_slice(&bundle_bytes).map_err(|e| corrupt(&bundle_path, e))?;
        let bundle = Bundle::from_value(value).map_err(|_| StoreError::CorruptContent {
            path: bundle_path.to_string(),
            message: "bundle document must be a JSON object".to_string(),
            source: None,
        })?;

        let mut image = AppImage::from_bundle(bundle).with_relocation_map(read_relocation_map(&dir)?);
        if let Some(digest) = read_repo_digest(&dir)? {
            image = image.with_repo_digest(digest);
        }
        Ok(image)
    }

    /// Remove the content directory of an ID; absent content is not an error
    pub fn delete(&self, id: &ImageId) -> StoreResult<()> {
        let dir = self.path_for(id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("Deleted content {}", id);
                Ok(())
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(format!("Failed to delete {}", dir), e)),
        }
    }

    /// Every ID with a content directory, sorted
    pub fn ids(&self) -> StoreResult<Vec<ImageId>> {
        let dir = self.root_path.join(Algorithm::Sha256.as_str());
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                let message = format!("Failed to scan {}", dir);
                match e.into_io_error() {
                    Some(source) => StoreError::io(message, source),
                    None => StoreError::io(message, std::io::Error::new(ErrorKind::Other, "walk error")),
                }
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            match ImageId::parse(&name) {
                Ok(id) => ids.push(id),
                Err(_) => warn!("Ignoring unexpected entry {} in content store", entry.path().display()),
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Check that the stored bundle still hashes to its ID
    pub fn verify(&self, id: &ImageId) -> StoreResult<bool> {
        let image = self.read(id)?;
        let bytes = image.bundle().canonical_bytes()?;
        Ok(verify_digest(&bytes, id.digest()))
    }
}

fn corrupt(path: &Utf8Path, source: serde_json::Error) -> StoreError {
    StoreError::CorruptContent {
        path: path.to_string(),
        message: source.to_string(),
        source: Some(source),
    }
}

fn remove_if_exists(path: &Utf8Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(format!("Failed to remove {}", path), e)),
    }
}

/// A missing relocation map reads as an empty one
fn read_relocation_map(dir: &Utf8Path) -> StoreResult<RelocationMap> {
    let path = dir.join(RELOCATION_MAP_FILENAME);
    match fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| corrupt(&path, e)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(RelocationMap::new()),
        Err(e) => Err(StoreError::io(format!("Failed to read {}", path), e)),
    }
}

fn read_repo_digest(dir: &Utf8Path) -> StoreResult<Option<Digest>> {
    let path = dir.join(DIGEST_FILENAME);
    match fs::read_to_string(&path) {
        Ok(content) => Digest::parse(content.trim())
            .map(Some)
            .map_err(|e| StoreError::CorruptContent {
                path: path.to_string(),
                message: e.to_string(),
                source: None,
            }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(format!("Failed to read {}", path), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cas::compute_id;
    use serde_json::json;
    use tempfile::tempdir;

    fn test_image(name: &str) -> AppImage {
        AppImage::from_bundle(Bundle::from_value(json!({"name": name})).unwrap())
    }

    fn open_store(temp_dir: &tempfile::TempDir) -> ContentStore {
        let store_path = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).unwrap();
        ContentStore::new(&store_path).unwrap()
    }

    #[test]
    fn test_path_layout() {
        let temp_dir = tempdir().unwrap();
        let store = open_store(&temp_dir);
        let id = ImageId::parse("2957c6606cc94099f7dfe0011b5c8daf4a605ed6124d4eee773bab1e05a8ce87").unwrap();

        let path = store.path_for(&id);
        assert!(path.ends_with(
            "contents/sha256/2957c6606cc94099f7dfe0011b5c8daf4a605ed6124d4eee773bab1e05a8ce87"
        ));
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = tempdir().unwrap();
        let store = open_store(&temp_dir);
        let image = test_image("bundle-name");
        let id = compute_id(&image).unwrap();

        store.write(&id, &image).unwrap();
        assert!(store.contains(&id));
        assert!(store.path_for(&id).join(BUNDLE_FILENAME).exists());
        assert!(!store.path_for(&id).join(RELOCATION_MAP_FILENAME).exists());
        assert_eq!(store.read(&id).unwrap(), image);
        assert!(store.verify(&id).unwrap());
    }

    #[test]
    fn test_relocation_map_and_digest_persisted() {
        let temp_dir = tempdir().unwrap();
        let store = open_store(&temp_dir);
        let mut map = RelocationMap::new();
        map.insert("nginx:latest".to_string(), "mirror.local/nginx:latest".to_string());
        let repo_digest =
            Digest::parse("sha256:2957c6606cc94099f7dfe0011b5c8daf4a605ed6124d4eee773bab1e05a8ce87").unwrap();
        let image = test_image("relocated")
            .with_relocation_map(map)
            .with_repo_digest(repo_digest);
        let id = compute_id(&image).unwrap();

        store.write(&id, &image).unwrap();
        assert!(store.path_for(&id).join(RELOCATION_MAP_FILENAME).exists());
        assert!(store.path_for(&id).join(DIGEST_FILENAME).exists());
        assert_eq!(store.read(&id).unwrap(), image);

        // Re-storing without relocation data clears the stale files
        let plain = test_image("relocated");
        store.write(&id, &plain).unwrap();
        assert!(!store.path_for(&id).join(RELOCATION_MAP_FILENAME).exists());
        assert!(!store.path_for(&id).join(DIGEST_FILENAME).exists());
        assert_eq!(store.read(&id).unwrap(), plain);
    }

    #[test]
    fn test_empty_relocation_map_file_reads_as_empty() {
        let temp_dir = tempdir().unwrap();
        let store = open_store(&temp_dir);
        let image = test_image("bundle-name");
        let id = compute_id(&image).unwrap();
        store.write(&id, &image).unwrap();
        fs::write(store.path_for(&id).join(RELOCATION_MAP_FILENAME), b"{}").unwrap();

        assert_eq!(store.read(&id).unwrap(), image);
    }

    #[test]
    fn test_read_missing_content() {
        let temp_dir = tempdir().unwrap();
        let store = open_store(&temp_dir);
        let id = compute_id(&test_image("not-stored")).unwrap();

        assert!(matches!(store.read(&id), Err(StoreError::ContentMissing { .. })));
    }

    #[test]
    fn test_read_corrupt_content() {
        let temp_dir = tempdir().unwrap();
        let store = open_store(&temp_dir);
        let image = test_image("bundle-name");
        let id = compute_id(&image).unwrap();
        store.write(&id, &image).unwrap();

        fs::write(store.path_for(&id).join(BUNDLE_FILENAME), b"{truncated").unwrap();
        assert!(matches!(store.read(&id), Err(StoreError::CorruptContent { .. })));

        fs::write(store.path_for(&id).join(BUNDLE_FILENAME), b"[1, 2]").unwrap();
        assert!(matches!(store.read(&id), Err(StoreError::CorruptContent { .. })));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let store = open_store(&temp_dir);
        let image = test_image("bundle-name");
        let id = compute_id(&image).unwrap();
        store.write(&id, &image).unwrap();

        store.delete(&id).unwrap();
        assert!(!store.contains(&id));
        store.delete(&id).unwrap();
    }

    #[test]
    fn test_ids_ignores_unknown_entries() {
        let temp_dir = tempdir().unwrap();
        let store = open_store(&temp_dir);
        let first = test_image("a");
        let second = test_image("b");
        let first_id = compute_id(&first).unwrap();
        let second_id = compute_id(&second).unwrap();
        store.write(&first_id, &first).unwrap();
        store.write(&second_id, &second).unwrap();

        let sha_dir = store.root_path().join("sha256");
        fs::write(sha_dir.join("filename"), b"").unwrap();
        fs::create_dir(sha_dir.join("not-an-id")).unwrap();

        let mut expected = vec![first_id, second_id];
        expected.sort();
        assert_eq!(store.ids().unwrap(), expected);
    }
}
