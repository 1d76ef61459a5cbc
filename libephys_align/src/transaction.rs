use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::error::CommitError;

/// Groups several file writes so that none of the targets change until all of them are staged.
///
/// Each file is first written to a temporary file in the target directory, then every
/// staged file is renamed over its target on [`CommitTransaction::commit`]. Dropping an
/// uncommitted transaction removes the staged files and leaves the targets untouched.
#[derive(Debug)]
pub struct CommitTransaction {
    dir: PathBuf,
    staged: Vec<(NamedTempFile, PathBuf)>,
}

impl CommitTransaction {
    /// Start a transaction writing into `dir`, creating it if needed
    pub fn new(dir: &Path) -> Result<Self, CommitError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            staged: Vec::new(),
        })
    }

    /// Stage `contents` for the file `name` inside the transaction directory
    pub fn stage(&mut self, name: &str, contents: &[u8]) -> Result<(), CommitError> {
        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(contents)?;
        file.as_file().sync_all()?;
        self.staged.push((file, self.dir.join(name)));
        Ok(())
    }

    pub fn n_staged(&self) -> usize {
        self.staged.len()
    }

    /// Move every staged file into place, returning the target paths
    pub fn commit(self) -> Result<Vec<PathBuf>, CommitError> {
        let mut written = Vec::with_capacity(self.staged.len());
        for (file, target) in self.staged {
            file.persist(&target)?;
            spdlog::info!("Wrote {}", target.display());
            written.push(target);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_writes_all() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out");
        let mut tx = CommitTransaction::new(&out).unwrap();
        tx.stage("a.json", b"{}").unwrap();
        tx.stage("b.json", b"[]").unwrap();
        assert_eq!(tx.n_staged(), 2);
        let written = tx.commit().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(std::fs::read_to_string(out.join("a.json")).unwrap(), "{}");
        assert_eq!(std::fs::read_to_string(out.join("b.json")).unwrap(), "[]");
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 2);
    }

    #[test]
    fn test_drop_leaves_targets_untouched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), "old").unwrap();
        {
            let mut tx = CommitTransaction::new(dir.path()).unwrap();
            tx.stage("a.json", b"new").unwrap();
        }
        assert_eq!(std::fs::read_to_string(dir.path().join("a.json")).unwrap(), "old");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
