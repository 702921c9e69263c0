use std::cmp::Reverse;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};
use walkdir::WalkDir;

use super::filter::FileFilter;

/// Recursive listing of supported files already sitting in the drop folder,
/// newest first. Skips symlinks and 0-byte files. `limit` caps the result.
pub fn scan_existing(
    root: &Path,
    filter: &FileFilter,
    limit: Option<usize>,
) -> io::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Watch folder not found: {}", root.display()),
        ));
    }

    let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.io_error().map(|e| e.kind()) == Some(io::ErrorKind::PermissionDenied) {
                    error!("Access denied while scanning {}: {}", root.display(), err);
                    continue;
                }
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("Error scanning {}: {}", root.display(), err),
                ));
            }
        };

        if !entry.file_type().is_file() || !filter.is_supported(entry.path()) {
            continue;
        }

        let metadata = match fs::metadata(entry.path()) {
            Ok(metadata) => metadata,
            Err(err) => {
                error!("Error reading metadata for {}: {}", entry.path().display(), err);
                continue;
            }
        };
        if metadata.len() == 0 {
            continue;
        }

        let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
        found.push((modified, entry.into_path()));
    }

    found.sort_by_key(|(modified, path)| (Reverse(*modified), path.clone()));
    let total = found.len();
    if let Some(limit) = limit {
        if total > limit {
            info!("Limiting startup processing to {} most recent of {} files", limit, total);
            found.truncate(limit);
        }
    }

    info!("Found {} existing files in {}", total, root.display());
    Ok(found.into_iter().map(|(_, path)| path).collect())
}
