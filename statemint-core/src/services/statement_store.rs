//! Statement store - uploaded files kept on disk between analyze and finalize
//!
//! Layout: `<root>/<statement_id>/<original file name>`

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::domain::result::{Error, Result};

/// An uploaded statement file read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredStatement {
    pub statement_id: Uuid,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub struct StatementStore {
    root: PathBuf,
}

impl StatementStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store an upload under a fresh statement id
    pub fn save(&self, file_name: &str, bytes: &[u8]) -> Result<Uuid> {
        let file_name = safe_file_name(file_name)?;
        let statement_id = Uuid::new_v4();
        let dir = self.root.join(statement_id.to_string());
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(file_name), bytes)?;
        Ok(statement_id)
    }

    pub fn load(&self, statement_id: Uuid) -> Result<StoredStatement> {
        let dir = self.root.join(statement_id.to_string());
        let entry = fs::read_dir(&dir)
            .map_err(|_| Error::not_found(format!("Statement {} not found", statement_id)))?
            .filter_map(|e| e.ok())
            .find(|e| e.path().is_file())
            .ok_or_else(|| Error::not_found(format!("Statement {} has no file", statement_id)))?;

        Ok(StoredStatement {
            statement_id,
            file_name: entry.file_name().to_string_lossy().into_owned(),
            bytes: fs::read(entry.path())?,
        })
    }

    /// Remove a stored upload; missing statements are ignored
    pub fn remove(&self, statement_id: Uuid) -> Result<()> {
        let dir = self.root.join(statement_id.to_string());
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Strip any directory part so uploads cannot escape their folder
fn safe_file_name(file_name: &str) -> Result<&str> {
    Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::validation(format!("Invalid file name: {}", file_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = StatementStore::new(dir.path().join("statements"));

        let id = store.save("../../march.csv", b"Date,Amount\n").unwrap();
        let stored = store.load(id).unwrap();
        assert_eq!(stored.file_name, "march.csv");
        assert_eq!(stored.bytes, b"Date,Amount\n");

        store.remove(id).unwrap();
        assert!(matches!(store.load(id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_rejects_empty_name() {
        let dir = tempdir().unwrap();
        let store = StatementStore::new(dir.path());
        assert!(store.save("..", b"x").is_err());
    }
}
