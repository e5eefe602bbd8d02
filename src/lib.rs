// Public API exports
pub mod archive;
pub mod bytecode;
pub mod classfile;
pub mod config;
pub mod rewrite;
pub mod scan;

#[cfg(test)]
mod testutil;

// Re-export main types for convenience
pub use archive::{ArchiveEntry, ArchiveTransformer, StripError, StripReport};

pub use classfile::{ClassFile, ClassFileError};

pub use config::{Config, ConfigError, ParseErrorPolicy, ScanConfig, StripConfig};

pub use rewrite::{RewriteRule, RewrittenClass, SiteCounts, rewrite_class};

pub use scan::{
    ArchiveWalker, ClassLoadError, Classpath, DirectoryWalker, NamespaceWalker, ReflectConfig,
    ReflectionRegistrar, RegistrationReport, ScanError, register_namespaces,
};
