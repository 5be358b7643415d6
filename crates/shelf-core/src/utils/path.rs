//! Path utilities for safe file system operations.
//!
//! Archive entries and server manifests name files relative to a cookbook
//! root; these helpers keep them from escaping it.

use crate::error::{ShelfError, ShelfResult};
use std::path::{Component, Path, PathBuf};

/// Normalize a path by resolving . and .. components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                if components.is_empty() {
                    components.push(component);
                } else {
                    components.pop();
                }
            },
            other => components.push(other),
        }
    }

    components.iter().collect()
}

/// Check if a path is safe (no directory traversal)
pub fn is_safe_path(path: &Path) -> bool {
    if path.is_absolute() {
        return false;
    }

    let mut depth = 0i32;

    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            },
            Component::Normal(_) => depth += 1,
            _ => return false,
        }
    }

    true
}

/// Safely join paths, preventing directory traversal
pub fn safe_join(base: &Path, path: &Path) -> ShelfResult<PathBuf> {
    if !is_safe_path(path) {
        return Err(ShelfError::UnsafePath {
            path: path.display().to_string(),
        });
    }

    Ok(base.join(normalize_path(path)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        let path = Path::new("./recipes/../templates/./default.erb");
        assert_eq!(normalize_path(path), Path::new("templates/default.erb"));
    }

    #[test]
    fn test_is_safe_path() {
        assert!(is_safe_path(Path::new("recipes/default.rb")));
        assert!(is_safe_path(Path::new("./metadata.json")));
        assert!(is_safe_path(Path::new("a/../b")));
        assert!(!is_safe_path(Path::new("../../../etc/passwd")));
        assert!(!is_safe_path(Path::new("/absolute/path")));
    }

    #[test]
    fn test_safe_join() {
        let base = Path::new("/store/app-1.0.0");

        let joined = safe_join(base, Path::new("recipes/default.rb")).unwrap();
        assert_eq!(joined, Path::new("/store/app-1.0.0/recipes/default.rb"));

        let err = safe_join(base, Path::new("../other/metadata.json")).unwrap_err();
        assert!(matches!(err, ShelfError::UnsafePath { .. }));
    }
}
