//! Application store: the `app/` directory inside the Docker configuration
//! directory, and access to the image store it holds.

use camino::{Utf8Path, Utf8PathBuf};
use dapp_config::{
    StoreConfig, BUNDLE_STORE_DIRECTORY, CREDENTIAL_STORE_DIRECTORY, INSTALLATION_STORE_DIRECTORY,
};
use dapp_core::error::StoreError;
use std::fs;
use tracing::debug;

use crate::cas::index::INDEX_FILENAME;
use crate::cas::ReferenceIndex;
use crate::image::ImageStore;
use crate::StoreResult;

const STORE_DIRECTORIES: &[(&str, u32)] = &[
    (BUNDLE_STORE_DIRECTORY, 0o755),
    (CREDENTIAL_STORE_DIRECTORY, 0o700),
    (INSTALLATION_STORE_DIRECTORY, 0o755),
];

/// Entry point to the stores kept under `<config-dir>/app`
#[derive(Debug)]
pub struct AppStore {
    /// `<config-dir>/app`
    path: Utf8PathBuf,
    /// Image store root
    image_root: Utf8PathBuf,
    overwrite_tags: bool,
}

impl AppStore {
    /// Create the directory hierarchy if anything is missing
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let path = config.app_dir();
        for (dir, mode) in STORE_DIRECTORIES {
            create_dir(&path.join(dir), *mode).map_err(|e| {
                StoreError::io(format!("Failed to create application store directory \"{}\"", dir), e)
            })?;
        }
        debug!("Application store ready at {}", path);

        Ok(Self {
            path,
            image_root: config.image_store_dir(),
            overwrite_tags: config.overwrite_tags,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Open the image store
    ///
    /// Stores that are alive at the same time see the same reference index.
    pub fn image_store(&self) -> StoreResult<ImageStore> {
        fs::create_dir_all(&self.image_root).map_err(|e| {
            StoreError::io(format!("Failed to create image store directory {}", self.image_root), e)
        })?;
        let index = ReferenceIndex::shared(self.image_root.join(INDEX_FILENAME))?;

        Ok(ImageStore::with_index(&self.image_root, index)?.with_tag_overwrite(self.overwrite_tags))
    }
}

#[cfg(unix)]
fn create_dir(path: &Utf8Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new().recursive(true).mode(mode).create(path)
}

#[cfg(not(unix))]
fn create_dir(path: &Utf8Path, _mode: u32) -> std::io::Result<()> {
    fs::create_dir_all(path)
}
