use super::StripError;
use std::io::{Read, Seek};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive};

/// A single archive entry read fully into memory, with the metadata the
/// output entry is written back with
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Entry name as stored in the archive (e.g., "com/example/Main.class")
    pub name: String,
    pub data: Vec<u8>,
    pub is_dir: bool,
    pub compression: CompressionMethod,
    pub last_modified: Option<DateTime>,
    pub unix_mode: Option<u32>,
}

impl ArchiveEntry {
    /// Read entry `index`, refusing payloads larger than `max_size`
    pub(crate) fn read<R: Read + Seek>(
        archive: &mut ZipArchive<R>,
        index: usize,
        max_size: u64,
    ) -> Result<Self, StripError> {
        let mut file = archive.by_index(index).map_err(StripError::Input)?;
        let name = file.name().to_string();

        // Check the declared size first, then cap the actual read
        if file.size() > max_size {
            return Err(StripError::EntryTooLarge {
                entry: name,
                size: file.size(),
                max: max_size,
            });
        }
        let mut data = Vec::with_capacity(file.size() as usize);
        (&mut file)
            .take(max_size + 1)
            .read_to_end(&mut data)
            .map_err(|source| StripError::InputEntry {
                entry: name.clone(),
                source,
            })?;
        if data.len() as u64 > max_size {
            return Err(StripError::EntryTooLarge {
                entry: name,
                size: data.len() as u64,
                max: max_size,
            });
        }

        Ok(Self {
            data,
            is_dir: file.is_dir(),
            compression: file.compression(),
            last_modified: file.last_modified(),
            unix_mode: file.unix_mode(),
            name,
        })
    }

    pub fn is_class(&self) -> bool {
        !self.is_dir && self.name.ends_with(".class")
    }

    /// Options that reproduce this entry's compression, timestamp and mode
    pub(crate) fn write_options(&self) -> SimpleFileOptions {
        let method = match self.compression {
            CompressionMethod::Stored => CompressionMethod::Stored,
            _ => CompressionMethod::Deflated,
        };
        let mut options = SimpleFileOptions::default().compression_method(method);
        if let Some(time) = self.last_modified {
            options = options.last_modified_time(time);
        }
        if let Some(mode) = self.unix_mode {
            options = options.unix_permissions(mode);
        }
        options
    }
}
