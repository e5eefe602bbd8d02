use crate::classfile::ClassFileError;
use std::path::PathBuf;
use thiserror::Error;
use zip::result::ZipError;

/// Failure to enumerate a classpath root
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Failed to open classpath root {path}: {source}")]
    OpenRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("Failed to walk directory {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Failure to load one class by name
#[derive(Error, Debug)]
pub enum ClassLoadError {
    #[error("Class not found: {0}")]
    NotFound(String),

    #[error("Failed to read class {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read class {name} from archive: {source}")]
    Archive {
        name: String,
        #[source]
        source: ZipError,
    },

    #[error("Malformed class {name}: {source}")]
    Malformed {
        name: String,
        #[source]
        source: ClassFileError,
    },

    #[error("Class {name} too large: {size} bytes (max: {max})")]
    TooLarge { name: String, size: u64, max: u64 },

    #[error("Class file for {expected} declares {found}")]
    NameMismatch { expected: String, found: String },
}
