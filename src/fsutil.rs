// src/fsutil.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Stage the full contents at `<path>.tmp`, then rename over `path`.
/// The rename is atomic within one filesystem, so a reader always observes
/// either the fully-old or fully-new file, never a torn one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming {} into place", tmp.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_previous_contents_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.json");

        write_atomic(&target, b"old").unwrap();
        write_atomic(&target, b"new").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(!tmp_path(&target).exists());
    }
}
