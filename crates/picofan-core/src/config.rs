//! Device configuration stored as `config.json` on flash.
//!
//! The document is exactly two levels deep: named sections, each holding
//! scalar fields. The settings page is rendered and grouped purely from
//! declaration order, so both levels are ordered maps and a
//! load → edit → save cycle never reorders anything.
//!
//! ```json
//! {
//!     "hostname": {
//!         "hostname": "picofan"
//!     },
//!     "fan": {
//!         "num_fans": 2,
//!         "max_fan": 4
//!     }
//! }
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::codec::parse_form;

/// File name of the configuration document in the flash root.
pub const CONFIG_FILE: &str = "config.json";

/// Errors that can occur while reading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The stored text is not a two-level document of scalar fields.
    #[error("Invalid configuration document: {0}")]
    Parse(String),

    /// A submitted settings field is not named `section_field`.
    #[error("Settings field '{0}' is not of the form section_field")]
    InvalidField(String),

    /// The backing file could not be read or written.
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A single configuration value.
///
/// Only integers, booleans and strings are representable; anything else in
/// the stored document is a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Integer(i64),
    Boolean(bool),
    Text(String),
}

impl ConfigValue {
    /// Type a decoded form value by its literal shape.
    ///
    /// All ASCII digits become an integer, `true`/`false` a boolean, and
    /// anything else stays text.
    pub fn infer(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(number) = raw.parse() {
                return ConfigValue::Integer(number);
            }
        }
        match raw {
            "true" => ConfigValue::Boolean(true),
            "false" => ConfigValue::Boolean(false),
            _ => ConfigValue::Text(raw.to_string()),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ConfigValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Integer(n) => write!(f, "{}", n),
            ConfigValue::Boolean(b) => write!(f, "{}", b),
            ConfigValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Integer(value)
    }
}

impl From<i32> for ConfigValue {
    fn from(value: i32) -> Self {
        ConfigValue::Integer(i64::from(value))
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Boolean(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Text(value.to_string())
    }
}

/// Ordered fields of one section.
pub type Section = IndexMap<String, ConfigValue>;

/// The whole configuration document.
///
/// Note that `==` compares contents regardless of order; use
/// [`ConfigDocument::to_pretty_string`] when order matters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDocument {
    sections: IndexMap<String, Section>,
}

impl ConfigDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the stored text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize with 4-space indentation in the two-level shape
    /// [`ConfigDocument::from_json_str`] reads back.
    pub fn to_pretty_string(&self) -> Result<String, ConfigError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Rebuild a document from a submitted settings form.
    ///
    /// Every key is `section_field`, split on the first underscore. Sections
    /// and fields appear in submission order. The result only holds what was
    /// submitted: it replaces the stored document rather than merging into it.
    pub fn from_form(body: &str) -> Result<Self, ConfigError> {
        let mut document = Self::new();
        for (key, value) in parse_form(body) {
            let (section, field) = key
                .split_once('_')
                .map(|(section, field)| (section.trim(), field.trim()))
                .filter(|(section, field)| !section.is_empty() && !field.is_empty())
                .ok_or_else(|| ConfigError::InvalidField(key.clone()))?;
            document.insert(section, field, ConfigValue::infer(&value));
        }
        Ok(document)
    }

    /// Set a field, creating the section if needed.
    ///
    /// Replacing an existing field keeps its position.
    pub fn insert(&mut self, section: &str, field: &str, value: impl Into<ConfigValue>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(field.to_string(), value.into());
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn get(&self, section: &str, field: &str) -> Option<&ConfigValue> {
        self.sections.get(section)?.get(field)
    }

    /// Iterate sections in document order.
    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections.iter().map(|(name, fields)| (name.as_str(), fields))
    }

    /// Network hostname used when joining Wi-Fi in station mode.
    pub fn hostname(&self) -> Option<&str> {
        self.get("hostname", "hostname")?.as_str()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Reads and writes `config.json` in the flash root.
///
/// Nothing is cached: every [`ConfigStore::load`] reads the file again so
/// edits made by other means are picked up on the next request.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store backed by `config.json` under `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            path: root.as_ref().join(CONFIG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load and parse the stored document.
    pub fn load(&self) -> Result<ConfigDocument, ConfigError> {
        let text = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        let document = ConfigDocument::from_json_str(&text)?;
        debug!("Loaded {} configuration sections", document.len());
        Ok(document)
    }

    /// Overwrite the stored document in a single write.
    pub fn save(&self, document: &ConfigDocument) -> Result<(), ConfigError> {
        let text = document.to_pretty_string()?;
        fs::write(&self.path, text).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        info!("Saved {} configuration sections", document.len());
        Ok(())
    }
}
