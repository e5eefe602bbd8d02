use super::names;
use super::{ClassLoadError, ScanError};
use crate::classfile::ClassFile;
use crate::config::DEFAULT_MAX_ENTRY_SIZE;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::ZipArchive;
use zip::result::ZipError;

/// Lazy sequence of binary class names
pub type ClassNames<'a> = Box<dyn Iterator<Item = Result<String, ScanError>> + 'a>;

/// One classpath root that can list and read class files
pub trait NamespaceWalker {
    fn root(&self) -> &Path;

    /// Binary names of the classes in `package` and its subpackages.
    ///
    /// A multi-release archive can report the same name more than once.
    fn class_names<'a>(&'a self, package: &'a str) -> ClassNames<'a>;

    /// Raw bytes of the class file for a binary name
    fn read_class(&self, name: &str) -> Result<Vec<u8>, ClassLoadError>;

    /// Read and parse a class, checking that it declares the expected name
    fn load(&self, name: &str) -> Result<ClassFile, ClassLoadError> {
        let data = self.read_class(name)?;
        let malformed = |source| ClassLoadError::Malformed {
            name: name.to_string(),
            source,
        };
        let class = ClassFile::parse(&data).map_err(malformed)?;
        let found = class.name().map_err(malformed)?.replace('/', ".");
        if found != name {
            return Err(ClassLoadError::NameMismatch {
                expected: name.to_string(),
                found,
            });
        }
        Ok(class)
    }
}

/// Map an entry path to a class name in `package`, if it is one
fn filter_entry(path: &str, package: &str) -> Option<Result<String, ScanError>> {
    match names::class_name_for_entry(path) {
        Ok(Some(name)) if names::in_package(&name, package) => Some(Ok(name)),
        Ok(_) => None,
        Err(e) => Some(Err(e)),
    }
}

/// A directory of class files laid out by package
pub struct DirectoryWalker {
    root: PathBuf,
}

impl DirectoryWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl NamespaceWalker for DirectoryWalker {
    fn root(&self) -> &Path {
        &self.root
    }

    fn class_names<'a>(&'a self, package: &'a str) -> ClassNames<'a> {
        let walk = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Box::new(walk.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    return Some(Err(ScanError::Walk {
                        path: self.root.clone(),
                        source,
                    }))
                }
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let relative = entry.path().strip_prefix(&self.root).ok()?;
            let Some(relative) = relative.to_str() else {
                return Some(Err(ScanError::InvalidPath(format!(
                    "Invalid UTF-8 in path: {}",
                    relative.display()
                ))));
            };
            filter_entry(relative, package)
        }))
    }

    fn read_class(&self, name: &str) -> Result<Vec<u8>, ClassLoadError> {
        let path = self.root.join(names::entry_path(name));
        std::fs::read(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ClassLoadError::NotFound(name.to_string()),
            _ => ClassLoadError::Read {
                name: name.to_string(),
                source,
            },
        })
    }
}

/// A jar (or any ZIP) of class files
pub struct ArchiveWalker {
    path: PathBuf,
    archive: RefCell<ZipArchive<BufReader<File>>>,
    /// Entry names in archive order
    entries: Vec<String>,
    max_class_size: u64,
}

impl ArchiveWalker {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ScanError> {
        let path = path.into();
        let file = File::open(&path).map_err(|source| ScanError::OpenRoot {
            path: path.clone(),
            source,
        })?;
        let archive = ZipArchive::new(BufReader::new(file)).map_err(|source| ScanError::Archive {
            path: path.clone(),
            source,
        })?;
        let entries = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();
        Ok(Self {
            path,
            archive: RefCell::new(archive),
            entries,
            max_class_size: DEFAULT_MAX_ENTRY_SIZE,
        })
    }

    /// Set the largest class file that will be read into memory
    pub fn max_class_size(mut self, size: u64) -> Self {
        self.max_class_size = size;
        self
    }
}

impl NamespaceWalker for ArchiveWalker {
    fn root(&self) -> &Path {
        &self.path
    }

    fn class_names<'a>(&'a self, package: &'a str) -> ClassNames<'a> {
        Box::new(
            self.entries
                .iter()
                .filter_map(move |entry| filter_entry(entry, package)),
        )
    }

    fn read_class(&self, name: &str) -> Result<Vec<u8>, ClassLoadError> {
        let mut archive = self.archive.borrow_mut();
        let mut file = archive
            .by_name(&names::entry_path(name))
            .map_err(|source| match source {
                ZipError::FileNotFound => ClassLoadError::NotFound(name.to_string()),
                source => ClassLoadError::Archive {
                    name: name.to_string(),
                    source,
                },
            })?;
        let too_large = |size| ClassLoadError::TooLarge {
            name: name.to_string(),
            size,
            max: self.max_class_size,
        };
        if file.size() > self.max_class_size {
            return Err(too_large(file.size()));
        }
        // Declared size is untrusted
        let mut data = Vec::with_capacity(file.size() as usize);
        (&mut file)
            .take(self.max_class_size + 1)
            .read_to_end(&mut data)
            .map_err(|source| ClassLoadError::Read {
                name: name.to_string(),
                source,
            })?;
        if data.len() as u64 > self.max_class_size {
            return Err(too_large(data.len() as u64));
        }
        Ok(data)
    }
}

/// Classpath roots searched in order
#[derive(Default)]
pub struct Classpath {
    roots: Vec<Box<dyn NamespaceWalker>>,
}

impl Classpath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open each path as a directory tree or, failing that, an archive
    pub fn open(paths: &[PathBuf]) -> Result<Self, ScanError> {
        let mut classpath = Self::new();
        for path in paths {
            if path.is_dir() {
                classpath.push(DirectoryWalker::new(path));
            } else {
                classpath.push(ArchiveWalker::open(path)?);
            }
        }
        Ok(classpath)
    }

    pub fn push(&mut self, walker: impl NamespaceWalker + 'static) {
        self.roots.push(Box::new(walker));
    }

    pub fn roots(&self) -> impl Iterator<Item = &dyn NamespaceWalker> {
        self.roots.iter().map(|r| r.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Class names in `package` across every root, in root order
    pub fn class_names<'a>(&'a self, package: &'a str) -> ClassNames<'a> {
        Box::new(self.roots.iter().flat_map(move |root| root.class_names(package)))
    }

    /// Load a class from the first root that has it
    pub fn load(&self, name: &str) -> Result<ClassFile, ClassLoadError> {
        for root in &self.roots {
            match root.load(name) {
                Err(ClassLoadError::NotFound(_)) => continue,
                result => return result,
            }
        }
        Err(ClassLoadError::NotFound(name.to_string()))
    }
}
