//! Jar in, jar out: every `.class` entry goes through the rewriter, every
//! other entry is copied as is.

mod entry;
mod error;
mod transformer;

#[cfg(test)]
mod tests;

pub use entry::ArchiveEntry;
pub use error::StripError;
pub use transformer::{ArchiveTransformer, StripReport};
