use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

/// Directory holding one job's files: `slurm.sh`, `run.sh` and `run/`
pub struct WorkingDirectory {
    pub path: PathBuf,
}

/// Anchor a command line or config path at the directory the tool was launched from
///
/// Absolute paths are kept, `.` is the launch directory itself.
pub fn from_launch_dir(launch_dir: &Path, path: &Path) -> PathBuf {
    match path == Path::new(".") {
        true => launch_dir.to_path_buf(),
        false => launch_dir.join(path),
    }
}

impl WorkingDirectory {
    /// Relative paths are taken from `base`, the directory the tool was launched from
    pub fn pinned(base: &Path, path: &Path) -> WorkingDirectory {
        WorkingDirectory { path: from_launch_dir(base, path) }
    }

    pub fn create(&self) -> Result<()> {
        if !self.path.exists() {
            info!("Creating working directory {}", self.path.display());
        }
        fs::create_dir_all(&self.path).with_context(|| format!("Can't create {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn pinned_keeps_absolute_and_anchors_relative() {
        let base = Path::new("/home/me/project");
        assert_eq!(WorkingDirectory::pinned(base, Path::new("/scratch/job")).path, PathBuf::from("/scratch/job"));
        assert_eq!(WorkingDirectory::pinned(base, Path::new("jobs/a")).path, PathBuf::from("/home/me/project/jobs/a"));
        assert_eq!(WorkingDirectory::pinned(base, Path::new(".")).path, PathBuf::from("/home/me/project"));
    }

    #[test]
    fn relative_entry_point_is_taken_from_launch_dir() {
        let launch_dir = Path::new("/home/me/project");
        assert_eq!(
            from_launch_dir(launch_dir, Path::new("train.py")),
            PathBuf::from("/home/me/project/train.py")
        );
        assert_eq!(
            from_launch_dir(launch_dir, Path::new("src/train.py")),
            PathBuf::from("/home/me/project/src/train.py")
        );
        assert_eq!(from_launch_dir(launch_dir, Path::new("/opt/train.py")), PathBuf::from("/opt/train.py"));
    }

    #[test]
    fn create_is_recursive_and_idempotent() {
        let dir = tempdir().unwrap();
        let wd = WorkingDirectory { path: dir.path().join("a/b/c") };
        wd.create().unwrap();
        wd.create().unwrap();
        assert!(wd.path.is_dir());
    }
}
