use super::ScanError;
use std::path::{Component, Path};

const CLASS_SUFFIX: &str = ".class";
const VERSIONS_DIR: &str = "META-INF/versions/";

/// Normalize an entry path from a directory tree or archive to forward
/// slashes, rejecting:
/// - Directory traversal (../)
/// - Absolute paths (/etc/passwd)
/// - Non UTF-8 components
pub fn sanitize(raw_path: &str) -> Result<String, ScanError> {
    if raw_path.is_empty() {
        return Err(ScanError::InvalidPath("Empty path".to_string()));
    }

    let mut components = Vec::new();
    for component in Path::new(raw_path).components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                return Err(ScanError::InvalidPath(format!(
                    "Absolute path not allowed: {}",
                    raw_path
                )));
            }
            Component::ParentDir => {
                return Err(ScanError::InvalidPath(format!(
                    "Parent directory traversal not allowed: {}",
                    raw_path
                )));
            }
            Component::CurDir => continue,
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    ScanError::InvalidPath(format!("Invalid UTF-8 in path: {:?}", part))
                })?;
                components.push(part);
            }
        }
    }

    if components.is_empty() {
        return Err(ScanError::InvalidPath(format!(
            "No valid components: {}",
            raw_path
        )));
    }
    Ok(components.join("/"))
}

/// Binary class name (`com.example.Outer$Inner`) stored at `raw_path`.
///
/// Returns `None` for anything that is not a loadable class: resources,
/// `module-info`/`package-info`, and class files under `META-INF/` other
/// than multi-release versions, which map to their base name.
pub fn class_name_for_entry(raw_path: &str) -> Result<Option<String>, ScanError> {
    let path = sanitize(raw_path)?;
    let Some(stem) = path.strip_suffix(CLASS_SUFFIX) else {
        return Ok(None);
    };

    let stem = match stem.strip_prefix(VERSIONS_DIR) {
        Some(versioned) => match versioned.split_once('/') {
            Some((version, rest)) if version.bytes().all(|b| b.is_ascii_digit()) => rest,
            _ => return Ok(None),
        },
        None if stem.starts_with("META-INF/") => return Ok(None),
        None => stem,
    };

    let simple_name = stem.rsplit('/').next().unwrap_or(stem);
    if simple_name.is_empty() || simple_name == "module-info" || simple_name == "package-info" {
        return Ok(None);
    }
    Ok(Some(stem.replace('/', ".")))
}

/// Entry path of the class file for a binary name
pub fn entry_path(class_name: &str) -> String {
    format!("{}{}", class_name.replace('.', "/"), CLASS_SUFFIX)
}

/// Is `class_name` in `package` or one of its subpackages? An empty package
/// contains everything.
pub fn in_package(class_name: &str, package: &str) -> bool {
    let package = package.trim_end_matches('.');
    package.is_empty()
        || class_name
            .strip_prefix(package)
            .is_some_and(|rest| rest.starts_with('.'))
}
