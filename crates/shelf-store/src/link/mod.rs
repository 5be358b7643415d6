//! Tree linking with hardlink-then-copy fallback
//!
//! Used to place a local cookbook directory into the store's staging area
//! without duplicating file contents when both sit on one filesystem.

use shelf_core::error::ShelfError;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

use crate::StoreResult;

/// Directory names never carried into the store
const SKIPPED_DIRS: &[&str] = &[".git", ".svn", ".hg"];

/// Counts of what a link or copy pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkResult {
    pub hardlinks_created: usize,
    pub files_copied: usize,
    pub directories_created: usize,
}

/// Mirror `source_dir` into `dest_dir`, hardlinking files where possible
pub fn link_tree(source_dir: &Path, dest_dir: &Path) -> StoreResult<LinkResult> {
    mirror_tree(source_dir, dest_dir, true)
}

/// Mirror `source_dir` into `dest_dir` by copying every file
pub fn copy_tree(source_dir: &Path, dest_dir: &Path) -> StoreResult<LinkResult> {
    mirror_tree(source_dir, dest_dir, false)
}

fn mirror_tree(source_dir: &Path, dest_dir: &Path, try_hardlink: bool) -> StoreResult<LinkResult> {
    let mut result = LinkResult::default();

    fs::create_dir_all(dest_dir)
        .map_err(|e| ShelfError::io(format!("Failed to create {}", dest_dir.display()), e))?;

    let walker = WalkDir::new(source_dir).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .map_or(false, |name| SKIPPED_DIRS.contains(&name)))
    });

    for entry in walker {
        let entry = entry.map_err(|e| {
            ShelfError::io(
                format!("Failed to walk {}", source_dir.display()),
                io::Error::new(io::ErrorKind::Other, e.to_string()),
            )
        })?;
        let source_path = entry.path();

        let Ok(relative_path) = source_path.strip_prefix(source_dir) else {
            continue;
        };
        if relative_path.as_os_str().is_empty() {
            continue;
        }

        let dest_path = dest_dir.join(relative_path);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path)
                .map_err(|e| ShelfError::io(format!("Failed to create {}", dest_path.display()), e))?;
            result.directories_created += 1;
        } else if entry.file_type().is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| ShelfError::io(format!("Failed to create {}", parent.display()), e))?;
            }

            if try_hardlink && fs::hard_link(source_path, &dest_path).is_ok() {
                result.hardlinks_created += 1;
                continue;
            }

            fs::copy(source_path, &dest_path)
                .map_err(|e| ShelfError::io(format!("Failed to copy {}", source_path.display()), e))?;
            result.files_copied += 1;
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn populate(dir: &Path) {
        fs::create_dir_all(dir.join("recipes")).unwrap();
        fs::create_dir_all(dir.join(".git/objects")).unwrap();
        fs::write(dir.join("metadata.rb"), "name 'a'").unwrap();
        fs::write(dir.join("recipes/default.rb"), "").unwrap();
        fs::write(dir.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
    }

    #[test]
    fn test_link_tree() {
        let temp_dir = tempdir().unwrap();
        let source_dir = temp_dir.path().join("source");
        let dest_dir = temp_dir.path().join("dest");
        populate(&source_dir);

        let result = link_tree(&source_dir, &dest_dir).unwrap();
        assert_eq!(result.hardlinks_created + result.files_copied, 2);
        assert_eq!(result.directories_created, 1);
        assert!(dest_dir.join("recipes/default.rb").exists());
        assert!(!dest_dir.join(".git").exists());
    }

    #[test]
    fn test_copy_tree() {
        let temp_dir = tempdir().unwrap();
        let source_dir = temp_dir.path().join("source");
        let dest_dir = temp_dir.path().join("dest");
        populate(&source_dir);

        let result = copy_tree(&source_dir, &dest_dir).unwrap();
        assert_eq!(result.files_copied, 2);
        assert_eq!(result.hardlinks_created, 0);
        assert_eq!(fs::read_to_string(dest_dir.join("metadata.rb")).unwrap(), "name 'a'");
    }
}
