use crate::error::{CommonError, CommonResult};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// File storage seam used by the editor to read and persist durable files
///
/// Names are relative to the store's root. The editor never assumes that
/// what it reads back matches what it holds in memory.
pub trait FileStore {
    /// Check if a file exists
    fn exists(&self, name: &str) -> bool;

    /// Read the full text of a file
    fn get_file_content(&self, name: &str) -> CommonResult<String>;

    /// Replace the full text of a file, creating it if needed
    fn save_file(&mut self, name: &str, text: &str) -> CommonResult<()>;
}

/// Directory-backed file store
#[derive(Debug, Clone)]
pub struct RealFileSystem {
    root: PathBuf,
}

impl RealFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join a store-relative name onto the root, rejecting anything that
    /// could escape it.
    fn resolve(&self, name: &str) -> CommonResult<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if name.is_empty() || escapes {
            return Err(CommonError::InvalidName(name.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

impl FileStore for RealFileSystem {
    fn exists(&self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }

    fn get_file_content(&self, name: &str) -> CommonResult<String> {
        let path = self.resolve(name)?;
        if !path.is_file() {
            return Err(CommonError::NotFound(name.to_string()));
        }
        Ok(std::fs::read_to_string(path)?)
    }

    fn save_file(&mut self, name: &str, text: &str) -> CommonResult<()> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!(file = %path.display(), bytes = text.len(), "Writing file");
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// In-memory file store for testing
#[derive(Debug, Default)]
pub struct MockFileSystem {
    pub files: HashMap<String, String>,

    /// When set, every write fails with an IO error
    pub fail_writes: bool,

    /// Number of successful writes
    pub write_count: usize,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.files.insert(name.into(), text.into());
    }
}

impl FileStore for MockFileSystem {
    fn exists(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    fn get_file_content(&self, name: &str) -> CommonResult<String> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| CommonError::NotFound(name.to_string()))
    }

    fn save_file(&mut self, name: &str, text: &str) -> CommonResult<()> {
        if self.fail_writes {
            return Err(CommonError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("write rejected: {}", name),
            )));
        }
        self.files.insert(name.to_string(), text.to_string());
        self.write_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_file_system_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = RealFileSystem::new(dir.path());

        assert!(!fs.exists("styles/site.css"));
        fs.save_file("styles/site.css", ".a { color: red; }").unwrap();
        assert!(fs.exists("styles/site.css"));
        assert_eq!(
            fs.get_file_content("styles/site.css").unwrap(),
            ".a { color: red; }"
        );
    }

    #[test]
    fn test_real_file_system_rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = RealFileSystem::new(dir.path());

        assert!(matches!(
            fs.save_file("../outside.css", ""),
            Err(CommonError::InvalidName(_))
        ));
        assert!(matches!(
            fs.get_file_content("/etc/passwd"),
            Err(CommonError::InvalidName(_))
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = RealFileSystem::new(dir.path());
        assert!(matches!(
            fs.get_file_content("nope.css"),
            Err(CommonError::NotFound(_))
        ));
    }

    #[test]
    fn test_mock_file_system_failing_writes() {
        let mut fs = MockFileSystem::new();
        fs.add_file("site.css", "");
        fs.fail_writes = true;

        assert!(fs.save_file("site.css", "x").is_err());
        assert_eq!(fs.get_file_content("site.css").unwrap(), "");
        assert_eq!(fs.write_count, 0);

        fs.fail_writes = false;
        fs.save_file("site.css", "x").unwrap();
        assert_eq!(fs.write_count, 1);
    }
}
