//! The stores and static assets of one flash root, shared by both modes.

use std::path::{Path, PathBuf};

use picofan_core::{ConfigStore, CredentialStore, FileManager};

use crate::assets::AssetDir;

/// Everything persisted in the flash root.
#[derive(Debug, Clone)]
pub struct DeviceContext {
    root: PathBuf,
    pub files: FileManager,
    pub config: ConfigStore,
    pub credentials: CredentialStore,
    pub assets: AssetDir,
}

impl DeviceContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            files: FileManager::new(root.clone()),
            config: ConfigStore::new(&root),
            credentials: CredentialStore::new(&root),
            assets: AssetDir::new(&root),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// No stored credentials means the device boots into provisioning.
    pub fn needs_provisioning(&self) -> bool {
        !self.credentials.exists()
    }
}
