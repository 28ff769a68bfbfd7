use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Finds the freshest capture snapshot the external scanner has written.
/// The scanner rotates `<prefix>-NN<extension>` files in one directory.
pub struct CaptureLocator {
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl CaptureLocator {
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    /// Path of the most recently modified matching file, or None when the
    /// directory is missing or holds no match.
    pub fn locate(&self) -> Option<PathBuf> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.dir.display(), error = %e, "Capture directory unreadable");
                return None;
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| self.matches(&entry.path()))
            .filter_map(|entry| {
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((modified, entry.path()))
            })
            .max_by_key(|(modified, _)| *modified)
            .map(|(_, path)| path)
    }

    fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        name.starts_with(&self.prefix) && name.ends_with(&self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_missing_directory() {
        let locator = CaptureLocator::new("/nonexistent/airsentry-test", "scan", ".csv");
        assert!(locator.locate().is_none());
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let locator = CaptureLocator::new(dir.path(), "scan", ".csv");
        assert!(locator.locate().is_none());
    }

    #[test]
    fn test_ignores_non_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join("other-01.csv"), "x").unwrap();

        let locator = CaptureLocator::new(dir.path(), "scan", ".csv");
        assert!(locator.locate().is_none());

        std::fs::write(dir.path().join("scan-01.csv"), "x").unwrap();
        let found = locator.locate().unwrap();
        assert_eq!(found.file_name().unwrap(), "scan-01.csv");
    }

    #[test]
    fn test_newest_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan-01.csv"), "old").unwrap();
        sleep(Duration::from_millis(20));
        std::fs::write(dir.path().join("scan-02.csv"), "new").unwrap();

        let locator = CaptureLocator::new(dir.path(), "scan", ".csv");
        let found = locator.locate().unwrap();
        assert_eq!(found.file_name().unwrap(), "scan-02.csv");
    }

    #[test]
    fn test_rewrite_in_place_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan-01.csv"), "first").unwrap();
        sleep(Duration::from_millis(20));
        std::fs::write(dir.path().join("scan-02.csv"), "second").unwrap();
        sleep(Duration::from_millis(20));
        // Scanner re-wrote the first file; it is now the freshest
        std::fs::write(dir.path().join("scan-01.csv"), "third").unwrap();

        let locator = CaptureLocator::new(dir.path(), "scan", ".csv");
        let found = locator.locate().unwrap();
        assert_eq!(found.file_name().unwrap(), "scan-01.csv");
    }
}
