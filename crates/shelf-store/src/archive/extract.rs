//! Archive extraction
//!
//! Entries are validated against the destination before anything is written,
//! so a hostile archive cannot place files outside it.

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use shelf_core::error::ShelfError;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive;

use crate::StoreResult;

/// Extract a gzipped tarball into a destination directory
pub fn extract_archive<R: Read>(reader: R, dest_dir: &Path) -> StoreResult<()> {
    extract_tar(GzDecoder::new(reader), dest_dir)
}

/// Extract an uncompressed tarball into a destination directory
pub fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> StoreResult<()> {
    let mut archive = Archive::new(reader);

    fs::create_dir_all(dest_dir)
        .map_err(|e| ShelfError::io(format!("Failed to create {}", dest_dir.display()), e))?;

    let entries = archive
        .entries()
        .map_err(|e| ShelfError::io("Failed to read archive".to_string(), e))?;

    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| ShelfError::io("Failed to read archive entry".to_string(), e))?;

        let entry_path = entry
            .path()
            .map_err(|e| ShelfError::io("Invalid archive entry path".to_string(), e))?
            .into_owned();
        let safe_path = validate_extract_path(&entry_path, dest_dir)?;

        let entry_type = entry.header().entry_type();
        let mode = entry.header().mode().ok();

        match entry_type {
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                extract_regular_file(&mut entry, &safe_path)?;
            },
            tar::EntryType::Directory => {
                fs::create_dir_all(&safe_path)
                    .map_err(|e| ShelfError::io(format!("Failed to create {}", safe_path.display()), e))?;
            },
            tar::EntryType::Symlink => {
                extract_symlink(&mut entry, &safe_path, dest_dir)?;
            },
            // git archive emits a global pax header carrying the commit id
            _ => continue,
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = mode {
                if entry_type != tar::EntryType::Symlink && safe_path.exists() {
                    let _ = fs::set_permissions(&safe_path, fs::Permissions::from_mode(mode | 0o200));
                }
            }
        }
        #[cfg(not(unix))]
        let _ = mode;
    }

    Ok(())
}

/// Locate the cookbook inside an extracted archive
///
/// Archives usually wrap the cookbook in one top-level directory named after
/// it; when that is the only entry, descend into it.
pub fn cookbook_root(dir: &Utf8Path) -> StoreResult<Utf8PathBuf> {
    let entries: Vec<_> = fs::read_dir(dir)
        .map_err(|e| ShelfError::io(format!("Failed to read {}", dir), e))?
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with("._"))
        .collect();

    if let [only] = entries.as_slice() {
        let is_dir = only.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            if let Some(name) = only.file_name().to_str() {
                return Ok(dir.join(name));
            }
        }
    }

    Ok(dir.to_path_buf())
}

/// Validate extraction path to prevent directory traversal
fn validate_extract_path(entry_path: &Path, dest_dir: &Path) -> StoreResult<PathBuf> {
    let mut safe_path = dest_dir.to_path_buf();

    for component in entry_path.components() {
        match component {
            Component::Normal(name) => safe_path.push(name),
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ShelfError::UnsafePath {
                    path: entry_path.display().to_string(),
                });
            },
        }
    }

    Ok(safe_path)
}

/// Extract a regular file from tar entry
fn extract_regular_file<R: Read>(entry: &mut tar::Entry<R>, dest_path: &Path) -> StoreResult<()> {
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ShelfError::io(format!("Failed to create {}", parent.display()), e))?;
    }

    let mut file = fs::File::create(dest_path)
        .map_err(|e| ShelfError::io(format!("Failed to create {}", dest_path.display()), e))?;

    std::io::copy(entry, &mut file)
        .map_err(|e| ShelfError::io(format!("Failed to write {}", dest_path.display()), e))?;

    Ok(())
}

/// Extract symlink safely (target must stay inside the destination)
fn extract_symlink<R: Read>(entry: &mut tar::Entry<R>, dest_path: &Path, dest_dir: &Path) -> StoreResult<()> {
    let target = entry
        .link_name()
        .map_err(|e| ShelfError::io("Invalid symlink in archive".to_string(), e))?;

    let Some(target_path) = target else {
        return Ok(());
    };

    if target_path.is_absolute() {
        return Err(ShelfError::UnsafePath {
            path: target_path.display().to_string(),
        });
    }

    let base = dest_path.parent().unwrap_or(dest_dir);
    let relative_base = base.strip_prefix(dest_dir).unwrap_or(Path::new(""));
    if !shelf_core::utils::is_safe_path(&relative_base.join(&target_path)) {
        return Err(ShelfError::UnsafePath {
            path: target_path.display().to_string(),
        });
    }

    fs::create_dir_all(base).map_err(|e| ShelfError::io(format!("Failed to create {}", base.display()), e))?;

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&target_path, dest_path)
            .map_err(|e| ShelfError::io(format!("Failed to link {}", dest_path.display()), e))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tar::{Builder, Header};
    use tempfile::tempdir;

    fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut data, Compression::default());
            let mut builder = Builder::new(encoder);
            for (path, content) in entries {
                let mut header = Header::new_gnu();
                header.set_path(path).unwrap();
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append(&header, content.as_bytes()).unwrap();
            }
            builder.into_inner().unwrap().finish().unwrap();
        }
        data
    }

    #[test]
    fn test_extract_simple_archive() {
        let temp_dir = tempdir().unwrap();
        let extract_dir = temp_dir.path().join("extract");

        let data = tarball(&[("nginx/metadata.json", "{}"), ("nginx/recipes/default.rb", "package 'nginx'")]);
        extract_archive(std::io::Cursor::new(data), &extract_dir).unwrap();

        let recipe = extract_dir.join("nginx/recipes/default.rb");
        assert_eq!(fs::read_to_string(recipe).unwrap(), "package 'nginx'");
    }

    #[test]
    fn test_validate_extract_path() {
        let dest = Path::new("/tmp/dest");
        assert_eq!(
            validate_extract_path(Path::new("./a/b.rb"), dest).unwrap(),
            Path::new("/tmp/dest/a/b.rb")
        );
        assert!(validate_extract_path(Path::new("a/../../etc/passwd"), dest).is_err());
        assert!(validate_extract_path(Path::new("/etc/passwd"), dest).is_err());
    }

    #[test]
    fn test_traversal_entry_rejected() {
        let temp_dir = tempdir().unwrap();
        let extract_dir = temp_dir.path().join("extract");

        let mut data = Vec::new();
        {
            let mut builder = Builder::new(&mut data);
            let mut header = Header::new_gnu();
            // set_path refuses "..", so write the raw name bytes
            let name = b"../escape.txt";
            header.as_old_mut().name[..name.len()].copy_from_slice(name);
            header.set_size(4);
            header.set_cksum();
            builder.append(&header, "evil".as_bytes()).unwrap();
            builder.finish().unwrap();
        }

        let err = extract_tar(std::io::Cursor::new(data), &extract_dir).unwrap_err();
        assert!(matches!(err, ShelfError::UnsafePath { .. }));
        assert!(!temp_dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_cookbook_root_descends_single_dir() {
        let temp_dir = tempdir().unwrap();
        let root = Utf8Path::from_path(temp_dir.path()).unwrap();
        fs::create_dir_all(root.join("nginx/recipes")).unwrap();

        assert_eq!(cookbook_root(root).unwrap(), root.join("nginx"));

        fs::write(root.join("README.md"), "hi").unwrap();
        assert_eq!(cookbook_root(root).unwrap(), root);
    }
}
