use crate::storage::Persistence;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// One file per key under a caller-supplied directory, named by the lowercase
/// hex of the key bytes. put() stages the value in a sibling temp file, syncs
/// it, renames over the final path, then syncs the directory; a reader
/// (including the recovery path) never observes a torn value, and a returned
/// put survives a crash.
pub struct FilePersistence {
    directory: PathBuf,
}

impl FilePersistence {
    pub fn create(directory: impl Into<PathBuf>) -> io::Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(FilePersistence { directory })
    }

    fn key_path(&self, key: &[u8]) -> PathBuf {
        let mut name = String::with_capacity(key.len() * 2);
        for byte in key {
            name.push_str(&format!("{:02x}", byte));
        }
        self.directory.join(name)
    }
}

impl Persistence for FilePersistence {
    fn put(&self, key: &[u8], value: &[u8]) -> io::Result<()> {
        let final_path = self.key_path(key);
        // Hex key names contain no '.', so the extension never clobbers one.
        let staging_path = final_path.with_extension("staged");

        let mut staged = File::create(&staging_path)?;
        staged.write_all(value)?;
        staged.sync_all()?;

        fs::rename(&staging_path, &final_path)?;
        // The rename updates a directory entry; that update is not durable
        // until the directory itself is synced.
        fsync_dir(&self.directory)
    }

    fn get(&self, key: &[u8]) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.key_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn remove(&self, key: &[u8]) -> io::Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => fsync_dir(&self.directory),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::create(dir.path()).unwrap();

        assert_eq!(store.get(b"rsm_done").unwrap(), None);

        store.put(b"rsm_done", &7i32.to_be_bytes()).unwrap();
        assert_eq!(store.get(b"rsm_done").unwrap(), Some(7i32.to_be_bytes().to_vec()));

        store.put(b"rsm_done", &8i32.to_be_bytes()).unwrap();
        assert_eq!(store.get(b"rsm_done").unwrap(), Some(8i32.to_be_bytes().to_vec()));

        store.remove(b"rsm_done").unwrap();
        assert_eq!(store.get(b"rsm_done").unwrap(), None);

        store.remove(b"rsm_done").unwrap();
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = FilePersistence::create(dir.path()).unwrap();
            store.put(b"k", b"survives").unwrap();
        }

        let reopened = FilePersistence::create(dir.path()).unwrap();
        assert_eq!(reopened.get(b"k").unwrap(), Some(b"survives".to_vec()));
    }

    #[test]
    fn distinct_keys_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::create(dir.path()).unwrap();

        store.put(b"rsm_done", b"a").unwrap();
        store.put(b"rsm_done_redo", b"b").unwrap();

        assert_eq!(store.get(b"rsm_done").unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.get(b"rsm_done_redo").unwrap(), Some(b"b".to_vec()));
    }
}
