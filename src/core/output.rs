//! Output directory for issued key files.

use crate::constants;
use crate::util::fs as fleet_fs;
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    /// Use `root` as the output directory, creating it if absent.
    pub fn create(root: &Path) -> Result<Self> {
        fleet_fs::ensure_dir(root, constants::OUTPUT_DIR_MODE)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Path of the key file for `stem`.
    pub fn key_path(&self, stem: &str) -> PathBuf {
        self.root
            .join(format!("{}{}", stem, constants::KEY_FILE_EXTENSION))
    }

    /// Atomically write `content` to the key file for `stem` with owner-only permissions.
    pub fn write_key(&self, stem: &str, content: &str) -> Result<PathBuf> {
        if stem.is_empty() || stem.contains(['/', '\\']) || stem.contains("..") {
            bail!("invalid key file name '{}'", stem);
        }
        let final_path = self.key_path(stem);
        let mut tmp = tempfile::Builder::new()
            .prefix(".key-")
            .tempfile_in(&self.root)
            .with_context(|| format!("create temp file in {}", self.root.display()))?;
        fleet_fs::set_permissions(tmp.path(), constants::KEY_FILE_MODE)?;
        tmp.write_all(content.as_bytes())
            .context("write key material")?;
        tmp.flush().context("flush key material")?;
        tmp.persist(&final_path)
            .map_err(|e| anyhow::anyhow!("persist {}: {}", final_path.display(), e))?;
        Ok(final_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_create_makes_directory() {
        let dir = TempDir::new().unwrap();
        let out = OutputDir::create(&dir.path().join("accounts")).unwrap();
        assert!(out.path().is_dir());
    }

    #[test]
    fn test_write_key_exact_content() {
        let dir = TempDir::new().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();
        let content = "{\"type\":\"service_account\",\"n\":\"ü\"}\n";
        let path = out.write_key("sa-001", content).unwrap();
        assert_eq!(path, dir.path().join("sa-001.json"));
        assert_eq!(fs::read(&path).unwrap(), content.as_bytes());
    }

    #[test]
    fn test_write_key_overwrites() {
        let dir = TempDir::new().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();
        out.write_key("7", "old").unwrap();
        out.write_key("7", "new").unwrap();
        assert_eq!(fs::read_to_string(out.key_path("7")).unwrap(), "new");
    }

    #[test]
    fn test_write_key_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();
        assert!(out.write_key("../evil", "x").is_err());
        assert!(out.write_key("", "x").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();
        let path = out.write_key("sa", "x").unwrap();
        let mode = fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
