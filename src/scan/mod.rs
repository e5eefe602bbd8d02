//! Class discovery on a classpath and reflection registration for an
//! ahead-of-time compiler.

mod error;
mod names;
mod registrar;
mod walker;


pub use error::{ClassLoadError, ScanError};
pub use names::{class_name_for_entry, entry_path, in_package, sanitize};
pub use registrar::{
    ReflectConfig, ReflectEntry, ReflectionRegistrar, RegistrationReport, register_namespaces,
};
pub use walker::{ArchiveWalker, ClassNames, Classpath, DirectoryWalker, NamespaceWalker};
