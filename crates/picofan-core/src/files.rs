//! File management on the flash filesystem.
//!
//! Lists every file under the flash root, builds the deletion form and
//! carries out deletion requests. Pages are produced as sequences of HTML
//! chunks so the caller can stream them without holding the whole file list.

use std::fs::{self, File, ReadDir};
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::codec::{escape_html, html_head, parse_form, simple_page};

/// Name and value of the hidden field marking a deletion form submission.
pub const DELETE_MARKER: &str = "delete";

/// Errors that can occur while accessing files on flash.
#[derive(Debug, Error)]
pub enum FileError {
    /// The named file does not exist.
    #[error("File not found: {0}")]
    NotFound(String),

    /// The name is absolute, empty or escapes the flash root.
    #[error("Invalid file path: {0}")]
    InvalidPath(String),

    /// Filesystem failure.
    #[error("Failed to access {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    fn from_io(name: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            FileError::NotFound(name.to_string())
        } else {
            FileError::Io {
                name: name.to_string(),
                source,
            }
        }
    }
}

/// Lazy, one-shot walk over every file below the flash root.
///
/// Paths are relative and `/`-separated. Directories are descended into but
/// never yielded. Order follows the platform's directory enumeration.
/// Entries that cannot be read are logged and skipped.
pub struct FileManifest {
    /// Directories still being enumerated, innermost last.
    stack: Vec<(String, ReadDir)>,
}

impl FileManifest {
    fn new(root: &Path) -> io::Result<Self> {
        Ok(Self {
            stack: vec![(String::new(), fs::read_dir(root)?)],
        })
    }
}

impl Iterator for FileManifest {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let (prefix, entries) = self.stack.last_mut()?;
            let entry = match entries.next() {
                Some(Ok(entry)) => entry,
                Some(Err(e)) => {
                    warn!("Skipping unreadable entry in '{}': {}", prefix, e);
                    continue;
                }
                None => {
                    self.stack.pop();
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };

            match entry.file_type() {
                Ok(kind) if kind.is_file() => return Some(relative),
                Ok(kind) if kind.is_dir() => match fs::read_dir(entry.path()) {
                    Ok(children) => self.stack.push((relative, children)),
                    Err(e) => warn!("Skipping unreadable directory '{}': {}", relative, e),
                },
                Ok(_) => {}
                Err(e) => warn!("Skipping '{}': {}", relative, e),
            }
        }
    }
}

/// File operations rooted at the flash root directory.
#[derive(Debug, Clone)]
pub struct FileManager {
    root: PathBuf,
}

impl FileManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a relative file name onto the flash root.
    ///
    /// Only plain path components are accepted, so a name can never point
    /// outside the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, FileError> {
        let relative = Path::new(name);
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if name.is_empty() || !plain {
            return Err(FileError::InvalidPath(name.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Start a walk over every file on flash.
    pub fn list_files(&self) -> Result<FileManifest, FileError> {
        FileManifest::new(&self.root).map_err(|source| FileError::Io {
            name: self.root.display().to_string(),
            source,
        })
    }

    /// Read a whole file.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, FileError> {
        let path = self.resolve(name)?;
        fs::read(path).map_err(|e| FileError::from_io(name, e))
    }

    /// Create (or truncate) a file for writing.
    pub fn create(&self, name: &str) -> Result<File, FileError> {
        let path = self.resolve(name)?;
        File::create(path).map_err(|e| FileError::from_io(name, e))
    }

    /// Remove the named files.
    ///
    /// Every name must exist before anything is removed, so a request naming
    /// a missing file fails with [`FileError::NotFound`] and changes nothing.
    /// Returns the removed names in request order.
    pub fn delete_files(&self, names: &[String]) -> Result<Vec<String>, FileError> {
        let mut targets = Vec::with_capacity(names.len());
        for name in names {
            let path = self.resolve(name)?;
            if !path.is_file() {
                return Err(FileError::NotFound(name.clone()));
            }
            targets.push((name, path));
        }

        for (name, path) in &targets {
            fs::remove_file(path).map_err(|e| FileError::from_io(name, e))?;
            info!("Deleted {}", name);
        }
        Ok(names.to_vec())
    }

    /// Deletion form with one checkbox per file, as HTML chunks.
    pub fn deletion_form(&self) -> Result<impl Iterator<Item = String>, FileError> {
        let manifest = self.list_files()?;
        let head = format!(
            "{}<body><h1>Select Files to Delete</h1><form id=\"delete\" action=\"\" method=\"post\">\n\
             <input type=\"hidden\" id=\"{marker}\" name=\"{marker}\" value=\"{marker}\">\n",
            html_head(),
            marker = DELETE_MARKER
        );
        let tail = "<button type=\"submit\" value=\"delete\">Submit</button></form></body></html>\n"
            .to_string();

        Ok(std::iter::once(head)
            .chain(manifest.map(|file| deletion_checkbox(&file)))
            .chain(std::iter::once(tail)))
    }
}

fn deletion_checkbox(file: &str) -> String {
    let file = escape_html(file);
    format!(
        "<input type=\"checkbox\" id=\"{0}\" name=\"{0}\" value=\"{0}\" class=checkbox>\n\
         <label for=\"{0}\" class=checkbox_label>{0}</label><br>\n",
        file
    )
}

/// File names selected on the deletion form.
///
/// Checkbox fields are named after the file; the hidden marker field is
/// dropped.
pub fn parse_deletion_request(body: &str) -> Vec<String> {
    parse_form(body)
        .into_iter()
        .map(|(name, _)| name)
        .filter(|name| name != DELETE_MARKER)
        .collect()
}

/// Confirmation page listing deleted files, as HTML chunks.
pub fn deletion_report(deleted: &[String]) -> impl Iterator<Item = String> + '_ {
    let head = format!("{}<body><h1>Deleted Files</h1><ol>\n", html_head());
    std::iter::once(head)
        .chain(
            deleted
                .iter()
                .map(|name| format!("<li>{}</li>\n", escape_html(name))),
        )
        .chain(std::iter::once("</ol></body></html>\n".to_string()))
}

/// Page with a multipart form for uploading a file to flash.
pub fn upload_form() -> String {
    simple_page(
        "Upload file",
        concat!(
            "<form method=\"post\" enctype=\"multipart/form-data\">\n",
            "            <div>\n",
            "                <label for=\"file\" class=upload_label>Choose file to upload: </label>\n",
            "                <input type=\"file\" class=upload id=\"file\" name=\"file\">\n",
            "            </div>\n",
            "            <br>\n",
            "            <div>\n",
            "                <button>Submit</button>\n",
            "            </div>\n",
            "        </form>",
        ),
    )
}

/// Page reporting a completed upload.
pub fn upload_report(name: &str) -> String {
    simple_page("Uploaded file", &format!("<p>{}</p>", escape_html(name)))
}

/// Reduce a client-supplied upload name to a bare file name.
///
/// Browsers may send a full local path; only the last component is kept.
/// Returns `None` when nothing usable remains.
pub fn upload_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(|c: char| c == '/' || c == '\\').next()?.trim();
    match name {
        "" | "." | ".." => None,
        _ => Some(name.to_string()),
    }
}
