use glob::Pattern;
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::Path;
use tracing::error;

use crate::error::Error;

/// Decides which paths in the drop folder are planner scans.
#[derive(Debug, Clone)]
pub struct FileFilter {
    extensions: HashSet<String>,
    ignore_patterns: Vec<Pattern>,
}

impl FileFilter {
    pub fn new(extensions: &[String], ignore_globs: &[String]) -> Self {
        let extensions = extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        let ignore_patterns = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();

        Self {
            extensions,
            ignore_patterns,
        }
    }

    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.extensions.iter().cloned().collect();
        exts.sort();
        exts
    }

    /// Extension and ignore-pattern check only; does not touch the filesystem.
    pub fn is_supported(&self, path: &Path) -> bool {
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
            .unwrap_or(false);

        supported
            && !self
                .ignore_patterns
                .iter()
                .any(|pattern| pattern.matches_path(path))
    }

    /// A file is ready once it has content and can be opened for reading.
    /// Returns the file size.
    pub fn check_ready(path: &Path) -> Result<u64, Error> {
        let not_ready = || Error::NotReadyFile(path.to_path_buf());

        let metadata = fs::metadata(path).map_err(|_| not_ready())?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(not_ready());
        }
        File::open(path).map_err(|_| not_ready())?;
        Ok(metadata.len())
    }
}
