use crate::classfile::ClassFileError;
use std::path::PathBuf;
use thiserror::Error;
use zip::result::ZipError;

#[derive(Error, Debug)]
pub enum StripError {
    #[error("Failed to open input archive {path}: {source}")]
    OpenInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read input archive: {0}")]
    Input(#[source] ZipError),

    #[error("Failed to read entry {entry}: {source}")]
    InputEntry {
        entry: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Entry {entry} too large: {size} bytes (max: {max})")]
    EntryTooLarge { entry: String, size: u64, max: u64 },

    #[error("Failed to transform class {entry}: {source}")]
    Parse {
        entry: String,
        #[source]
        source: ClassFileError,
    },

    #[error("Failed to write output archive {path}: {source}")]
    OutputFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write output archive: {0}")]
    Output(#[source] ZipError),

    #[error("Failed to write entry {entry}: {source}")]
    OutputEntry {
        entry: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Input and output are the same file: {0}")]
    SamePath(PathBuf),
}
