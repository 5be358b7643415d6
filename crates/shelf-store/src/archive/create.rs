//! Archive creation
//!
//! Packs a cookbook directory into a gzipped tarball, optionally nesting it
//! under a top-level directory the way community sites publish them.

use flate2::write::GzEncoder;
use flate2::Compression;
use shelf_core::error::ShelfError;
use std::io::Write;
use std::path::Path;
use tar::Builder;
use walkdir::WalkDir;

use crate::StoreResult;

/// Write a gzipped tarball of `source_dir`, nesting entries under `prefix` when given
pub fn create_archive<W: Write>(writer: W, source_dir: &Path, prefix: Option<&str>) -> StoreResult<W> {
    let encoder = GzEncoder::new(writer, Compression::default());
    let mut builder = Builder::new(encoder);

    for entry in WalkDir::new(source_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| ShelfError::io(format!("Failed to walk {}", source_dir.display()), e.into()))?;
        let path = entry.path();

        let Ok(relative_path) = path.strip_prefix(source_dir) else {
            continue;
        };
        if relative_path.as_os_str().is_empty() {
            continue;
        }

        let archive_path = match prefix {
            Some(prefix) => Path::new(prefix).join(relative_path),
            None => relative_path.to_path_buf(),
        };

        if entry.file_type().is_file() {
            builder
                .append_path_with_name(path, &archive_path)
                .map_err(|e| ShelfError::io(format!("Failed to archive {}", path.display()), e))?;
        } else if entry.file_type().is_dir() {
            builder
                .append_dir(&archive_path, path)
                .map_err(|e| ShelfError::io(format!("Failed to archive {}", path.display()), e))?;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| ShelfError::io("Failed to finish archive".to_string(), e))?;
    encoder
        .finish()
        .map_err(|e| ShelfError::io("Failed to finish archive".to_string(), e))
}

/// Create an archive and return it as bytes
pub fn create_archive_bytes(source_dir: &Path, prefix: Option<&str>) -> StoreResult<Vec<u8>> {
    create_archive(Vec::new(), source_dir, prefix)
}
