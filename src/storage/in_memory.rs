use crate::storage::Persistence;
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

/// Theoretically-durable store. It models the Persistence contract exactly
/// (whole-value atomic puts, idempotent removes) without touching disk, which
/// is what tests and embedding experiments want.
pub struct InMemoryPersistence {
    entries: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        InMemoryPersistence {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl Persistence for InMemoryPersistence {
    fn put(&self, key: &[u8], value: &[u8]) -> io::Result<()> {
        self.entries
            .lock()
            .expect("InMemoryPersistence mutex poison")
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> io::Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .expect("InMemoryPersistence mutex poison")
            .get(key)
            .cloned())
    }

    fn remove(&self, key: &[u8]) -> io::Result<()> {
        self.entries
            .lock()
            .expect("InMemoryPersistence mutex poison")
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove() {
        let store = InMemoryPersistence::new();

        assert_eq!(store.get(b"k").unwrap(), None);

        store.put(b"k", b"v1").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v1".to_vec()));

        store.put(b"k", b"v2").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));

        store.remove(b"k").unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);

        // Removing an absent key succeeds.
        store.remove(b"k").unwrap();
    }
}
