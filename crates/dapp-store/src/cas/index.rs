//! Reference index: tags and digests bound to content IDs
//!
//! The index is persisted as `repositories.json`:
//!
//! ```json
//! {"Repositories": {"docker.io/my/app": {"docker.io/my/app:1.0": "sha256:..."}}}
//! ```
//!
//! The reverse map from ID to references is rebuilt in memory whenever the
//! file is loaded. Within a process every store on the same root goes through
//! [`ReferenceIndex::shared`], so a stale copy never overwrites newer bindings.

use camino::{Utf8Path, Utf8PathBuf};
use dapp_core::error::{StoreError, StoreResult};
use dapp_core::types::{Digest, DigestedRef, ImageId, Reference, TaggedRef};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Index file name under the store root
pub const INDEX_FILENAME: &str = "repositories.json";

/// Live indexes keyed by canonical index path
static SHARED_INDEXES: Mutex<BTreeMap<Utf8PathBuf, Weak<ReferenceIndex>>> =
    parking_lot::const_mutex(BTreeMap::new());

/// repository name -> full reference -> content digest
type Repositories = BTreeMap<String, BTreeMap<String, Digest>>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepositoriesFile {
    #[serde(rename = "Repositories", default)]
    repositories: Repositories,
}

#[derive(Debug, Default, Clone)]
struct IndexState {
    repositories: Repositories,
    /// ID -> full reference string -> reference
    references_by_id: HashMap<ImageId, BTreeMap<String, Reference>>,
}

impl IndexState {
    fn from_repositories(repositories: Repositories) -> Self {
        let mut references_by_id: HashMap<ImageId, BTreeMap<String, Reference>> = HashMap::new();
        for refs in repositories.values() {
            for (key, digest) in refs {
                let reference = match Reference::parse_named(key) {
                    Ok(reference) => reference,
                    Err(e) => {
                        warn!("Skipping unparsable reference {} in index: {}", key, e);
                        continue;
                    },
                };
                let id = match ImageId::from_digest(digest.clone()) {
                    Ok(id) => id,
                    Err(e) => {
                        warn!("Skipping reference {} bound to {}: {}", key, digest, e);
                        continue;
                    },
                };
                references_by_id
                    .entry(id)
                    .or_default()
                    .insert(key.clone(), reference);
            }
        }
        Self {
            repositories,
            references_by_id,
        }
    }

    fn lookup(&self, repository: &str, key: &str) -> Option<&Digest> {
        self.repositories.get(repository).and_then(|refs| refs.get(key))
    }

    fn bind(&mut self, repository: String, key: String, reference: Reference, id: &ImageId) {
        if let Some(previous) = self.lookup(&repository, &key).cloned() {
            self.unbind_reverse(&previous, &key);
        }
        self.repositories
            .entry(repository)
            .or_default()
            .insert(key.clone(), id.digest().clone());
        self.references_by_id
            .entry(id.clone())
            .or_default()
            .insert(key, reference);
    }

    fn unbind(&mut self, repository: &str, key: &str) -> Option<Digest> {
        let refs = self.repositories.get_mut(repository)?;
        let digest = refs.remove(key)?;
        if refs.is_empty() {
            self.repositories.remove(repository);
        }
        self.unbind_reverse(&digest, key);
        Some(digest)
    }

    fn unbind_reverse(&mut self, digest: &Digest, key: &str) {
        let id = match ImageId::from_digest(digest.clone()) {
            Ok(id) => id,
            Err(_) => return,
        };
        if let Some(refs) = self.references_by_id.get_mut(&id) {
            refs.remove(key);
            if refs.is_empty() {
                self.references_by_id.remove(&id);
            }
        }
    }
}

/// Persistent reference index
#[derive(Debug)]
pub struct ReferenceIndex {
    /// Path to the index file
    index_path: Utf8PathBuf,
    /// In-memory view of the index file
    state: RwLock<IndexState>,
}

impl ReferenceIndex {
    /// Load existing index or create an empty one
    pub fn load_or_create<P: AsRef<Utf8Path>>(index_path: P) -> StoreResult<Self> {
        let index_path = index_path.as_ref().to_path_buf();
        let state = Self::read_state(&index_path)?;
        Ok(Self {
            index_path,
            state: RwLock::new(state),
        })
    }

    /// Return the index already open for this path, or load it
    ///
    /// The entry lives as long as some store holds it. Once the last handle
    /// is dropped the next call reads the file again.
    pub fn shared<P: AsRef<Utf8Path>>(index_path: P) -> StoreResult<Arc<Self>> {
        let index_path = canonical_index_path(index_path.as_ref())?;
        let mut indexes = SHARED_INDEXES.lock();
        if let Some(index) = indexes.get(&index_path).and_then(Weak::upgrade) {
            return Ok(index);
        }

        let index = Arc::new(Self::load_or_create(&index_path)?);
        debug!("Loaded {} references from {}", index.len(), index_path);
        indexes.retain(|_, index| index.strong_count() > 0);
        indexes.insert(index_path, Arc::downgrade(&index));
        Ok(index)
    }

    fn read_state(index_path: &Utf8Path) -> StoreResult<IndexState> {
        let content = match fs::read(index_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(IndexState::default()),
            Err(e) => return Err(StoreError::io(format!("Failed to read {}", index_path), e)),
        };
        let file: RepositoriesFile =
            serde_json::from_slice(&content).map_err(|e| StoreError::CorruptContent {
                path: index_path.to_string(),
                message: e.to_string(),
                source: Some(e),
            })?;
        Ok(IndexState::from_repositories(file.repositories))
    }

    /// Discard the in-memory view and re-read the index file
    pub fn reload(&self) -> StoreResult<()> {
        let state = Self::read_state(&self.index_path)?;
        *self.state.write() = state;
        Ok(())
    }

    /// Path of the index file
    pub fn index_path(&self) -> &Utf8Path {
        &self.index_path
    }

    /// Resolve a tagged or digested reference
    pub fn get(&self, reference: &Reference) -> StoreResult<ImageId> {
        let repository = repository_of(reference)?;
        let key = reference.to_string();
        let state = self.state.read();
        let digest = state
            .lookup(&repository, &key)
            .ok_or_else(|| StoreError::ReferenceNotFound { reference: key.clone() })?;
        ImageId::from_digest(digest.clone())
    }

    /// Bind a tag to an ID
    ///
    /// Fails with `TagConflict` when the tag points at another ID and
    /// `overwrite` is false.
    pub fn add_tag(&self, tagged: &TaggedRef, id: &ImageId, overwrite: bool) -> StoreResult<()> {
        let reference = Reference::Tagged(tagged.clone());
        self.add(reference, id, overwrite, |key, existing| StoreError::TagConflict {
            reference: key,
            existing,
        })
    }

    /// Bind a digest reference to an ID
    ///
    /// Rebinding to the same ID is a no-op.
    pub fn add_digest(&self, digested: &DigestedRef, id: &ImageId, overwrite: bool) -> StoreResult<()> {
        let reference = Reference::Digested(digested.clone());
        self.add(reference, id, overwrite, |key, existing| StoreError::DigestConflict {
            reference: key,
            existing,
        })
    }

    fn add(
        &self,
        reference: Reference,
        id: &ImageId,
        overwrite: bool,
        conflict: impl FnOnce(String, String) -> StoreError,
    ) -> StoreResult<()> {
        let repository = repository_of(&reference)?;
        let key = reference.to_string();
        let mut state = self.state.write();

        if let Some(existing) = state.lookup(&repository, &key) {
            if existing == id.digest() {
                return Ok(());
            }
            if !overwrite {
                return Err(conflict(key, existing.to_string()));
            }
            warn!("Rebinding {} from {} to {}", key, existing, id);
        }

        let previous = state.clone();
        state.bind(repository, key.clone(), reference, id);
        if let Err(e) = self.save(&state) {
            *state = previous;
            return Err(e);
        }
        debug!("Bound {} to {}", key, id);
        Ok(())
    }

    /// All references bound to an ID, sorted by their full string
    pub fn references(&self, id: &ImageId) -> Vec<Reference> {
        self.state
            .read()
            .references_by_id
            .get(id)
            .map(|refs| refs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Unbind one reference; content is never touched
    pub fn delete(&self, reference: &Reference) -> StoreResult<()> {
        let repository = repository_of(reference)?;
        let key = reference.to_string();
        let mut state = self.state.write();

        let previous = state.clone();
        if state.unbind(&repository, &key).is_none() {
            return Err(StoreError::ReferenceNotFound { reference: key });
        }
        if let Err(e) = self.save(&state) {
            *state = previous;
            return Err(e);
        }
        debug!("Unbound {}", key);
        Ok(())
    }

    /// Total number of bound references
    pub(crate) fn len(&self) -> usize {
        self.state.read().repositories.values().map(BTreeMap::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.state.read().repositories.is_empty()
    }

    /// Write the index file atomically
    fn save(&self, state: &IndexState) -> StoreResult<()> {
        let file = RepositoriesFile {
            repositories: state.repositories.clone(),
        };
        let content = serde_json::to_vec(&file)
            .map_err(|e| StoreError::serialization("Failed to serialize reference index", e))?;

        let parent = self
            .index_path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from("."));
        fs::create_dir_all(&parent)
            .map_err(|e| StoreError::io("Failed to create index directory", e))?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| StoreError::io("Failed to create temporary index file", e))?;
        temp.write_all(&content)
            .map_err(|e| StoreError::io("Failed to write temporary index file", e))?;
        temp.persist(&self.index_path)
            .map_err(|e| StoreError::io(format!("Failed to replace {}", self.index_path), e.error))?;

        Ok(())
    }
}

/// Resolve the directory holding the index so that different spellings of
/// one root share an entry
fn canonical_index_path(index_path: &Utf8Path) -> StoreResult<Utf8PathBuf> {
    let file_name = index_path.file_name().unwrap_or(INDEX_FILENAME);
    let parent = match index_path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent)
        .map_err(|e| StoreError::io(format!("Failed to create index directory {}", parent), e))?;
    let parent = parent
        .canonicalize_utf8()
        .map_err(|e| StoreError::io(format!("Failed to resolve index directory {}", parent), e))?;
    Ok(parent.join(file_name))
}

fn repository_of(reference: &Reference) -> StoreResult<String> {
    reference
        .name()
        .map(ToString::to_string)
        .ok_or_else(|| StoreError::InvalidReference {
            value: reference.to_string(),
            reason: "only tagged or digested references can be indexed".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ID_1: &str = "68720b2db729794a3521bc83e3699ac629f26beba6862b6ec491cd0d677d02a0";
    const ID_2: &str = "b7244e15970354cceb75f417f1e98b3a340cff35576eeeac603d33afa73b0b4b";

    fn tagged(value: &str) -> TaggedRef {
        match Reference::parse_named(value).unwrap() {
            Reference::Tagged(tagged) => tagged,
            other => panic!("expected tagged reference, got {}", other),
        }
    }

    fn digested(value: &str) -> DigestedRef {
        match Reference::parse_named(value).unwrap() {
            Reference::Digested(digested) => digested,
            other => panic!("expected digested reference, got {}", other),
        }
    }

    fn open_index(temp_dir: &tempfile::TempDir) -> ReferenceIndex {
        let path = Utf8PathBuf::from_path_buf(temp_dir.path().join(INDEX_FILENAME)).unwrap();
        ReferenceIndex::load_or_create(path).unwrap()
    }

    #[test]
    fn test_add_and_get_tag() {
        let temp_dir = tempdir().unwrap();
        let index = open_index(&temp_dir);
        let id = ImageId::parse(ID_1).unwrap();
        let tag = tagged("foo/bar:1.0");

        index.add_tag(&tag, &id, true).unwrap();
        assert_eq!(index.get(&Reference::Tagged(tag.clone())).unwrap(), id);
        assert_eq!(index.references(&id), vec![Reference::Tagged(tag)]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_get_missing_reference() {
        let temp_dir = tempdir().unwrap();
        let index = open_index(&temp_dir);
        let reference = Reference::Tagged(tagged("foo/bar:1.0"));

        assert!(matches!(index.get(&reference), Err(StoreError::ReferenceNotFound { .. })));
        assert!(matches!(index.delete(&reference), Err(StoreError::ReferenceNotFound { .. })));
    }

    #[test]
    fn test_ids_cannot_be_indexed() {
        let temp_dir = tempdir().unwrap();
        let index = open_index(&temp_dir);
        let reference = Reference::Id(ImageId::parse(ID_1).unwrap());

        assert!(matches!(index.get(&reference), Err(StoreError::InvalidReference { .. })));
    }

    #[test]
    fn test_tag_conflict_without_overwrite() {
        let temp_dir = tempdir().unwrap();
        let index = open_index(&temp_dir);
        let id1 = ImageId::parse(ID_1).unwrap();
        let id2 = ImageId::parse(ID_2).unwrap();
        let tag = tagged("foo/bar:1.0");

        index.add_tag(&tag, &id1, false).unwrap();
        // Same ID is fine
        index.add_tag(&tag, &id1, false).unwrap();
        assert!(matches!(
            index.add_tag(&tag, &id2, false),
            Err(StoreError::TagConflict { .. })
        ));
        assert_eq!(index.get(&Reference::Tagged(tag)).unwrap(), id1);
    }

    #[test]
    fn test_tag_overwrite_moves_reverse_mapping() {
        let temp_dir = tempdir().unwrap();
        let index = open_index(&temp_dir);
        let id1 = ImageId::parse(ID_1).unwrap();
        let id2 = ImageId::parse(ID_2).unwrap();
        let tag = tagged("foo/bar:1.0");

        index.add_tag(&tag, &id1, true).unwrap();
        index.add_tag(&tag, &id2, true).unwrap();

        assert!(index.references(&id1).is_empty());
        assert_eq!(index.references(&id2), vec![Reference::Tagged(tag)]);
    }

    #[test]
    fn test_add_digest_idempotent_and_conflicting() {
        let temp_dir = tempdir().unwrap();
        let index = open_index(&temp_dir);
        let id1 = ImageId::parse(ID_1).unwrap();
        let id2 = ImageId::parse(ID_2).unwrap();
        let reference = digested(&format!("my-repo/b-bundle@sha256:{}", ID_2));

        index.add_digest(&reference, &id1, false).unwrap();
        index.add_digest(&reference, &id1, false).unwrap();
        assert_eq!(index.references(&id1).len(), 1);

        assert!(matches!(
            index.add_digest(&reference, &id2, false),
            Err(StoreError::DigestConflict { .. })
        ));
        index.add_digest(&reference, &id2, true).unwrap();
        assert_eq!(index.get(&Reference::Digested(reference)).unwrap(), id2);
    }

    #[test]
    fn test_references_sorted_and_delete() {
        let temp_dir = tempdir().unwrap();
        let index = open_index(&temp_dir);
        let id = ImageId::parse(ID_1).unwrap();
        let zox = tagged("zox/zox:1.0");
        let foo = tagged("foo/bar:1.0");

        index.add_tag(&zox, &id, true).unwrap();
        index.add_tag(&foo, &id, true).unwrap();
        assert_eq!(
            index.references(&id),
            vec![Reference::Tagged(foo.clone()), Reference::Tagged(zox.clone())]
        );

        index.delete(&Reference::Tagged(foo)).unwrap();
        assert_eq!(index.references(&id), vec![Reference::Tagged(zox.clone())]);

        index.delete(&Reference::Tagged(zox)).unwrap();
        assert!(index.references(&id).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_index_persistence() {
        let temp_dir = tempdir().unwrap();
        let id = ImageId::parse(ID_1).unwrap();
        let tag = tagged("foo/bar:1.0");
        let digest_ref = digested(&format!("qix/qux@sha256:{}", ID_2));

        {
            let index = open_index(&temp_dir);
            index.add_tag(&tag, &id, true).unwrap();
            index.add_digest(&digest_ref, &id, true).unwrap();
        }

        let index = open_index(&temp_dir);
        assert_eq!(index.get(&Reference::Tagged(tag)).unwrap(), id);
        assert_eq!(index.get(&Reference::Digested(digest_ref)).unwrap(), id);
        assert_eq!(index.references(&id).len(), 2);
    }

    #[test]
    fn test_index_file_format() {
        let temp_dir = tempdir().unwrap();
        let index = open_index(&temp_dir);
        let id = ImageId::parse(ID_1).unwrap();
        index.add_tag(&tagged("foo/bar:1.0"), &id, true).unwrap();

        let content = fs::read_to_string(temp_dir.path().join(INDEX_FILENAME)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(
            value["Repositories"]["docker.io/foo/bar"]["docker.io/foo/bar:1.0"],
            format!("sha256:{}", ID_1)
        );
    }

    #[test]
    fn test_reload_sees_other_writers() {
        let temp_dir = tempdir().unwrap();
        let first = open_index(&temp_dir);
        let second = open_index(&temp_dir);
        let id = ImageId::parse(ID_1).unwrap();
        let tag = tagged("foo/bar:1.0");

        first.add_tag(&tag, &id, true).unwrap();
        assert!(second.get(&Reference::Tagged(tag.clone())).is_err());
        second.reload().unwrap();
        assert_eq!(second.get(&Reference::Tagged(tag)).unwrap(), id);
    }

    #[test]
    fn test_shared_returns_live_index_for_same_root() {
        let temp_dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).unwrap();
        let id = ImageId::parse(ID_1).unwrap();
        let tag = Reference::Tagged(tagged("foo/bar:1.0"));

        let first = ReferenceIndex::shared(root.join(INDEX_FILENAME)).unwrap();
        let second = ReferenceIndex::shared(root.join(".").join(INDEX_FILENAME)).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        first.add_tag(&tagged("foo/bar:1.0"), &id, true).unwrap();
        assert_eq!(second.get(&tag).unwrap(), id);

        drop(first);
        drop(second);
        let reopened = ReferenceIndex::shared(root.join(INDEX_FILENAME)).unwrap();
        assert_eq!(reopened.get(&tag).unwrap(), id);
    }

    #[test]
    fn test_corrupt_index_file_is_reported() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join(INDEX_FILENAME), b"{not json").unwrap();
        let path = Utf8PathBuf::from_path_buf(temp_dir.path().join(INDEX_FILENAME)).unwrap();

        assert!(matches!(
            ReferenceIndex::load_or_create(path),
            Err(StoreError::CorruptContent { .. })
        ));
    }
}
