//! Application image store
//!
//! Ties the content area and the reference index together. Content is
//! written before any reference is bound to it, and removed only once no
//! reference is left pointing at it.

use camino::{Utf8Path, Utf8PathBuf};
use dapp_core::error::StoreError;
use dapp_core::types::{AppImage, ImageId, Reference};
use std::fs;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cas::index::INDEX_FILENAME;
use crate::cas::{compute_id, ContentStore, ReferenceIndex};
use crate::StoreResult;

/// Content-addressed store of application images
#[derive(Debug, Clone)]
pub struct ImageStore {
    /// Root directory of the store
    root_path: Utf8PathBuf,
    /// Bundle and relocation data keyed by ID
    contents: ContentStore,
    /// Tags and digests, possibly shared with other stores on the same root
    index: Arc<ReferenceIndex>,
    /// Rebind tags that already point elsewhere
    overwrite_tags: bool,
}

impl ImageStore {
    /// Open or initialize a store at the given root
    ///
    /// Stores opened on the same root within a process share one index.
    pub fn new<P: AsRef<Utf8Path>>(root_path: P) -> StoreResult<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        fs::create_dir_all(&root_path)
            .map_err(|e| StoreError::io(format!("Failed to create store directory {}", root_path), e))?;

        let index = ReferenceIndex::shared(root_path.join(INDEX_FILENAME))?;
        Self::with_index(root_path, index)
    }

    /// Open a store sharing an already loaded index
    pub fn with_index<P: AsRef<Utf8Path>>(root_path: P, index: Arc<ReferenceIndex>) -> StoreResult<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        let contents = ContentStore::new(&root_path)?;

        Ok(Self {
            root_path,
            contents,
            index,
            overwrite_tags: true,
        })
    }

    /// Choose whether storing under a bound tag moves it (default) or fails
    pub fn with_tag_overwrite(mut self, overwrite_tags: bool) -> Self {
        self.overwrite_tags = overwrite_tags;
        self
    }

    /// Get the root path of the store
    pub fn root_path(&self) -> &Utf8Path {
        &self.root_path
    }

    pub fn contents(&self) -> &ContentStore {
        &self.contents
    }

    pub fn index(&self) -> &Arc<ReferenceIndex> {
        &self.index
    }

    /// Store an image, optionally binding a reference to it
    ///
    /// Digest references are trusted as given; they are not checked against
    /// the computed ID.
    pub fn store(&self, image: &AppImage, reference: Option<&Reference>) -> StoreResult<ImageId> {
        let id = compute_id(image)?;

        if let Some(Reference::Tagged(tagged)) = reference {
            if !self.overwrite_tags {
                let bound = Reference::Tagged(tagged.clone());
                if let Ok(existing) = self.index.get(&bound) {
                    if existing != id {
                        return Err(StoreError::TagConflict {
                            reference: bound.to_string(),
                            existing: existing.to_string(),
                        });
                    }
                }
            }
        }

        self.contents.write(&id, image)?;

        match reference {
            Some(Reference::Tagged(tagged)) => {
                self.index.add_tag(tagged, &id, self.overwrite_tags)?;
            },
            Some(Reference::Digested(digested)) => {
                if digested.digest() != id.digest() {
                    debug!("Binding {} to content {} without verification", digested, id);
                }
                self.index.add_digest(digested, &id, true)?;
            },
            Some(Reference::Id(given)) if given != &id => {
                warn!("Ignoring ID {} while storing content {}", given, id);
            },
            Some(Reference::Id(_)) | None => {},
        }

        match reference {
            Some(reference) if reference.is_named() => info!("Stored {} as {}", reference, id.short()),
            _ => info!("Stored {}", id),
        }
        Ok(id)
    }

    /// Load the image a reference points to
    pub fn read(&self, reference: &Reference) -> StoreResult<AppImage> {
        let id = self.resolve_id(reference)?;
        debug!("Reading {} from {}", reference, id);
        self.contents.read(&id).map_err(|e| match e {
            StoreError::ContentMissing { .. } => StoreError::unknown_reference(reference.to_string()),
            other => other,
        })
    }

    /// Map any reference to the ID it denotes
    pub fn resolve_id(&self, reference: &Reference) -> StoreResult<ImageId> {
        match reference {
            Reference::Id(id) => Ok(id.clone()),
            named => self.index.get(named).map_err(|e| match e {
                StoreError::ReferenceNotFound { .. } => StoreError::unknown_reference(named.to_string()),
                other => other,
            }),
        }
    }

    /// Every reference in the store, sorted by full string
    ///
    /// Content with no tag or digest bound to it is listed by bare ID.
    pub fn list(&self) -> StoreResult<Vec<Reference>> {
        let mut references = Vec::new();
        for id in self.contents.ids()? {
            let bound = self.index.references(&id);
            if bound.is_empty() {
                references.push(Reference::Id(id));
            } else {
                references.extend(bound);
            }
        }

        references.sort_by_cached_key(ToString::to_string);
        Ok(references)
    }

    /// Remove a reference, and the content once nothing points at it
    pub fn remove(&self, reference: &Reference, force: bool) -> StoreResult<()> {
        match reference {
            Reference::Id(id) => self.remove_id(id, force),
            named => self.remove_named(named),
        }
    }

    fn remove_named(&self, named: &Reference) -> StoreResult<()> {
        let id = self.resolve_id(named)?;
        self.index.delete(named).map_err(|e| match e {
            StoreError::ReferenceNotFound { .. } => StoreError::unknown_reference(named.to_string()),
            other => other,
        })?;

        if self.index.references(&id).is_empty() {
            self.contents.delete(&id)?;
            info!("Removed {} and content {}", named, id);
        } else {
            info!("Untagged {}", named);
        }
        Ok(())
    }

    fn remove_id(&self, id: &ImageId, force: bool) -> StoreResult<()> {
        let bound = self.index.references(id);
        if bound.is_empty() && !self.contents.contains(id) {
            return Err(StoreError::unknown_reference(id.to_string()));
        }
        if bound.len() > 1 && !force {
            return Err(StoreError::AmbiguousRemoval {
                reference: id.to_string(),
            });
        }

        let failures: Vec<StoreError> = bound
            .iter()
            .filter_map(|reference| {
                debug!("Unbinding {}", reference);
                self.index.delete(reference).err()
            })
            .collect();
        if !failures.is_empty() {
            return Err(StoreError::RemovalFailed { failures });
        }

        self.contents.delete(id)?;
        info!("Removed content {}", id);
        Ok(())
    }

    /// Resolve a user-supplied string to a stored reference
    ///
    /// Tried in order: a full ID, a unique ID prefix, then a named
    /// reference. Named references come back normalized rather than as the
    /// ID they point to.
    pub fn look_up(&self, ref_or_id: &str) -> StoreResult<Reference> {
        if let Ok(id) = ImageId::parse(ref_or_id) {
            if self.contents.contains(&id) {
                return Ok(Reference::Id(id));
            }
            return Err(StoreError::unknown_reference(ref_or_id));
        }

        if ImageId::is_short_id(ref_or_id) {
            if let Some(id) = self.match_short_id(ref_or_id)? {
                return Ok(Reference::Id(id));
            }
        }

        let named = Reference::parse_named(ref_or_id)?;
        match self.index.get(&named) {
            Ok(id) => {
                debug!("Resolved {} to {}", ref_or_id, id);
                Ok(named)
            },
            Err(StoreError::ReferenceNotFound { .. }) => Err(StoreError::unknown_reference(ref_or_id)),
            Err(e) => Err(e),
        }
    }

    fn match_short_id(&self, prefix: &str) -> StoreResult<Option<ImageId>> {
        let mut matches: Vec<ImageId> = self
            .contents
            .ids()?
            .into_iter()
            .filter(|id| id.encoded().starts_with(prefix))
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => Err(StoreError::AmbiguousReference {
                short_id: prefix.to_string(),
                matches: n,
            }),
        }
    }

    /// Bind `target` to the image `source` denotes
    pub fn tag(&self, source: &Reference, target: &Reference) -> StoreResult<ImageId> {
        if !target.is_named() {
            return Err(StoreError::InvalidReference {
                value: target.to_string(),
                reason: "target must be a tagged or digested reference".to_string(),
            });
        }
        let image = self.read(source)?;
        self.store(&image, Some(target))
    }
}
