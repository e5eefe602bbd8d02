use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Namespace whose members must never run in the stripped build
pub const DEFAULT_DISALLOWED_PREFIX: &str = "java/awt/";

pub const DEFAULT_EXCEPTION_CLASS: &str = "java/lang/UnsupportedOperationException";

pub const DEFAULT_MESSAGE_PREFIX: &str = "COMMAND IS UNSUPPORTED IN THIS BUILD. ";

/// Largest entry payload read into memory (256 MB)
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 256 * 1024 * 1024;

pub const DEFAULT_PACKAGES: &[&str] = &[
    "com.crowdin.cli",
    "com.crowdin.client",
    "org.apache.commons.logging.impl",
];

pub const DEFAULT_CLASSES: &[&str] = &["org.apache.commons.logging.impl.LogFactoryImpl"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// What to do with a `.class` entry that cannot be parsed or re-encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseErrorPolicy {
    /// Fail the whole transform
    #[default]
    Abort,
    /// Copy the entry through unchanged and keep going
    Copy,
}

impl FromStr for ParseErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(ParseErrorPolicy::Abort),
            "copy" => Ok(ParseErrorPolicy::Copy),
            other => Err(format!("unknown parse error policy '{other}' (expected abort or copy)")),
        }
    }
}

impl fmt::Display for ParseErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorPolicy::Abort => write!(f, "abort"),
            ParseErrorPolicy::Copy => write!(f, "copy"),
        }
    }
}

/// Settings for the archive transformer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StripConfig {
    /// Type-name prefix, dotted (`java.awt.`) or internal (`java/awt/`)
    pub disallowed_prefix: String,
    pub exception_class: String,
    pub message_prefix: String,
    pub on_parse_error: ParseErrorPolicy,
    pub max_entry_size: u64,
}

impl Default for StripConfig {
    fn default() -> Self {
        Self {
            disallowed_prefix: DEFAULT_DISALLOWED_PREFIX.to_string(),
            exception_class: DEFAULT_EXCEPTION_CLASS.to_string(),
            message_prefix: DEFAULT_MESSAGE_PREFIX.to_string(),
            on_parse_error: ParseErrorPolicy::default(),
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
        }
    }
}

impl StripConfig {
    pub fn disallowed_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.disallowed_prefix = prefix.into();
        self
    }

    pub fn on_parse_error(mut self, policy: ParseErrorPolicy) -> Self {
        self.on_parse_error = policy;
        self
    }

    /// Set maximum size of a single entry payload
    pub fn max_entry_size(mut self, size: u64) -> Self {
        self.max_entry_size = size;
        self
    }
}

/// Settings for reflection registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Dotted package prefixes whose classes are all registered
    pub packages: Vec<String>,
    /// Classes registered by name even when outside `packages`
    pub classes: Vec<String>,
    /// Directories and archives searched for classes
    pub classpath: Vec<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            packages: DEFAULT_PACKAGES.iter().map(|s| s.to_string()).collect(),
            classes: DEFAULT_CLASSES.iter().map(|s| s.to_string()).collect(),
            classpath: Vec::new(),
        }
    }
}

/// Top-level config file layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub strip: StripConfig,
    pub scan: ScanConfig,
}

impl Config {
    /// Load a JSON config file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
