//! Configuration for bibvcs-core
//!
//! Each database carries a `bibvcs.toml` in its root directory:
//!
//! ```toml
//! name = "Group literature"
//! bibfile = "references.bib"
//! journals = "journals.ini"
//! documents = "documents"
//! abbreviate = true
//!
//! [checks]
//! disabled = ["required-fields"]
//! orphan_severity = "error"
//! journal_fields = ["journal"]
//!
//! [linking]
//! strategy = "cite-key"
//! expect = "field:file"
//! field = "file"
//! ignore = ['^\.', '^Thumbs\.db$']
//! ```
//!
//! Every key is optional. The user-level configuration only remembers the
//! default database.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::checks::Severity;

/// File name of the per-database configuration
pub const CONFIG_FILE_NAME: &str = "bibvcs.toml";

/// Errors that can occur when loading or saving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(String),

    #[error("TOML serialize error: {0}")]
    Serialize(String),

    #[error("Invalid ignore pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: &'static str, message: String },
}

/// Per-database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Display name
    pub name: String,
    /// Bib file, relative to the database root
    pub bibfile: String,
    /// Journal registry file, relative to the database root
    pub journals: String,
    /// Document directory, relative to the database root
    pub documents: String,
    /// Render journal names abbreviated rather than in full
    pub abbreviate: bool,
    pub checks: ChecksConfig,
    pub linking: LinkingConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            bibfile: "references.bib".to_string(),
            journals: "journals.ini".to_string(),
            documents: "documents".to_string(),
            abbreviate: true,
            checks: ChecksConfig::default(),
            linking: LinkingConfig::default(),
        }
    }
}

impl DatabaseConfig {
    /// Load `bibvcs.toml` from a database root; a missing file yields the defaults
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.exists() {
            debug!("no {} in {}, using defaults", CONFIG_FILE_NAME, root.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Write `bibvcs.toml` into a database root
    pub fn save(&self, root: &Path) -> Result<(), ConfigError> {
        let path = root.join(CONFIG_FILE_NAME);
        std::fs::write(&path, self.to_toml_string()?)
            .map_err(|source| ConfigError::Io { path, source })
    }

    /// Reject empty file names and ignore patterns that do not compile
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("bibfile", &self.bibfile),
            ("journals", &self.journals),
            ("documents", &self.documents),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key,
                    message: "must not be empty".to_string(),
                });
            }
        }
        if self.linking.field.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "linking.field",
                message: "must not be empty".to_string(),
            });
        }
        self.linking.ignore_rules()?;
        Ok(())
    }
}

/// Settings of the check engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    /// Names of checks that are not registered
    pub disabled: Vec<String>,
    /// Severity of documents no entry links to
    pub orphan_severity: Severity,
    /// Fields whose macros must be journal macros
    pub journal_fields: Vec<String>,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            orphan_severity: Severity::Warning,
            journal_fields: vec!["journal".to_string()],
        }
    }
}

impl ChecksConfig {
    pub fn is_disabled(&self, check: &str) -> bool {
        self.disabled.iter().any(|name| name == check)
    }
}

/// How entries are linked to files in the document directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Linking {
    /// A document belongs to the entry whose key equals the file's base name
    CiteKey,
    /// Documents are listed in a JabRef-style file field
    FileField,
}

/// Which entries must have a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Expectation {
    Always,
    Never,
    /// Entries that have this field
    FieldPresent(String),
}

impl FromStr for Expectation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => match other.strip_prefix("field:") {
                Some(field) if !field.trim().is_empty() => {
                    Ok(Self::FieldPresent(field.trim().to_lowercase()))
                }
                _ => Err(ConfigError::InvalidValue {
                    key: "linking.expect",
                    message: format!(
                        "expected 'always', 'never' or 'field:<name>', got '{other}'"
                    ),
                }),
            },
        }
    }
}

impl TryFrom<String> for Expectation {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Expectation> for String {
    fn from(value: Expectation) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::Never => f.write_str("never"),
            Self::FieldPresent(field) => write!(f, "field:{field}"),
        }
    }
}

/// Document linking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkingConfig {
    pub strategy: Linking,
    pub expect: Expectation,
    /// Field holding linked files for [`Linking::FileField`]
    pub field: String,
    /// Regular expressions for files that are not documents
    pub ignore: Vec<String>,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            strategy: Linking::CiteKey,
            expect: Expectation::FieldPresent("file".to_string()),
            field: "file".to_string(),
            ignore: vec![
                r"^\.".to_string(),
                r"^Thumbs\.db$".to_string(),
                r"^desktop\.ini$".to_string(),
            ],
        }
    }
}

impl LinkingConfig {
    /// Compile the ignore patterns
    pub fn ignore_rules(&self) -> Result<Vec<Regex>, ConfigError> {
        self.ignore
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }
}

/// User-level configuration, stored under the platform config directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Database used when no `--database` is given
    pub default_database: Option<PathBuf>,
}

impl UserConfig {
    /// `<config dir>/bibvcs/config.toml`, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bibvcs").join("config.toml"))
    }

    /// Load from the default location; missing files yield defaults
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save to the default location, creating the directory
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::InvalidValue {
            key: "default_database",
            message: "no configuration directory on this platform".to_string(),
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
