//! Static files served from `static/` in the flash root.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use picofan_protocol::response::{IMAGE_ICON, TEXT_CSS, TEXT_JAVASCRIPT};
use picofan_protocol::{ResponseHead, Status};

use crate::connection::Connection;
use crate::error::ServerError;

pub const STATIC_DIR: &str = "static";

/// The assets the pages reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    Favicon,
    Stylesheet,
    Script,
}

impl Asset {
    const ALL: [Asset; 3] = [Asset::Favicon, Asset::Stylesheet, Asset::Script];

    /// Match a request target by substring, so `/settings/custom.css` works
    /// as well as `/custom.css`.
    pub fn from_target(target: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|asset| target.contains(asset.file_name()))
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Asset::Favicon => "favicon.ico",
            Asset::Stylesheet => "custom.css",
            Asset::Script => "script.js",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Asset::Favicon => IMAGE_ICON,
            Asset::Stylesheet => TEXT_CSS,
            Asset::Script => TEXT_JAVASCRIPT,
        }
    }
}

/// The `static/` directory.
#[derive(Debug, Clone)]
pub struct AssetDir {
    dir: PathBuf,
}

impl AssetDir {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dir: root.as_ref().join(STATIC_DIR),
        }
    }

    pub fn read(&self, asset: Asset) -> Result<Vec<u8>, ServerError> {
        fs::read(self.dir.join(asset.file_name())).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ServerError::AssetNotFound(asset.file_name().to_string()),
            _ => ServerError::Io(e),
        })
    }

    /// Write the asset as a complete response.
    pub async fn serve(&self, asset: Asset, conn: &mut Connection) -> Result<(), ServerError> {
        let body = self.read(asset)?;
        let head = ResponseHead::new(Status::Ok, asset.content_type()).with_content_length(body.len());
        conn.write_head(&head).await?;
        conn.write_bytes(&body).await?;
        conn.flush().await
    }
}

/// Serve the asset named by `target`, or fail with 404.
pub async fn serve_target(
    assets: &AssetDir,
    target: &str,
    conn: &mut Connection,
) -> Result<(), ServerError> {
    match Asset::from_target(target) {
        Some(asset) => assets.serve(asset, conn).await,
        None => Err(ServerError::AssetNotFound(target.to_string())),
    }
}
