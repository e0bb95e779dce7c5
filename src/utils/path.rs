//! Path utilities for locating media files

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::domain::errors::DomainError;

/// Extensions treated as media when scanning a directory
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "ts"];

/// Path utilities
pub struct PathUtils;

impl PathUtils {
    /// Case-insensitive media extension check
    pub fn is_media_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// Media files in `source`, sorted. A directory is scanned recursively; a file is
    /// read as a list with one path per line, `#` starting a comment. Relative list
    /// entries resolve against the list's directory.
    pub fn collect_media(source: &Path) -> Result<Vec<PathBuf>, DomainError> {
        if !source.exists() {
            return Err(DomainError::Configuration(format!(
                "Reference source not found: {}",
                source.display()
            )));
        }

        let mut files = if source.is_dir() {
            Self::scan_directory(source)?
        } else {
            Self::read_list(source)?
        };
        files.sort();
        files.dedup();

        if files.is_empty() {
            return Err(DomainError::Configuration(format!(
                "No media files found in {}",
                source.display()
            )));
        }
        Ok(files)
    }

    fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>, DomainError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.map_err(|e| {
                DomainError::Configuration(format!("Unable to scan {}: {}", dir.display(), e))
            })?;
            if entry.file_type().is_file() && Self::is_media_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    fn read_list(list: &Path) -> Result<Vec<PathBuf>, DomainError> {
        let content = std::fs::read_to_string(list).map_err(|e| {
            DomainError::Configuration(format!("Unable to read {}: {}", list.display(), e))
        })?;
        let base = list.parent().unwrap_or_else(|| Path::new("."));

        Ok(content
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty())
            .map(|line| {
                let path = PathBuf::from(line);
                if path.is_absolute() {
                    path
                } else {
                    base.join(path)
                }
            })
            .collect())
    }
}
