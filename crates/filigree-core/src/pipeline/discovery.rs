//! Lists the images a batch will mark.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Finds images with a supported extension directly inside a directory.
pub struct FileDiscovery {
    formats: Vec<String>,
}

/// An input image found by [`FileDiscovery`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

impl FileDiscovery {
    pub fn new(formats: &[String]) -> Self {
        Self {
            formats: formats.to_vec(),
        }
    }

    /// Supported files directly inside `dir`, sorted by path.
    ///
    /// Subdirectories, the output directory among them, are never entered.
    /// A path that is not a readable directory yields nothing.
    pub fn discover(&self, dir: &Path) -> Vec<DiscoveredFile> {
        let mut files: Vec<_> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file() && self.is_supported(entry.path()))
            .filter_map(|entry| {
                let size = entry.metadata().ok()?.len();
                Some(DiscoveredFile {
                    path: entry.into_path(),
                    size,
                })
            })
            .collect();
        files.sort_unstable_by(|a, b| a.path.cmp(&b.path));
        files
    }

    fn is_supported(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        self.formats.iter().any(|format| format.eq_ignore_ascii_case(ext))
    }

    pub fn total_size(files: &[DiscoveredFile]) -> u64 {
        files.iter().map(|f| f.size).sum()
    }
}
