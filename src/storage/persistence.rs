use std::io;

/// Persistence is the durable key/value store backing the driver's progress
/// records. The driver owns exactly two keys and writes them from a single
/// task, so implementations only need per-key atomicity, not transactions.
pub trait Persistence: Send + Sync {
    /// put() atomically replaces the value under `key`. The value must be
    /// durable before put returns; the crash-recovery contract depends on a
    /// returned put never being lost and a torn value never being observable.
    fn put(&self, key: &[u8], value: &[u8]) -> io::Result<()>;

    fn get(&self, key: &[u8]) -> io::Result<Option<Vec<u8>>>;

    /// remove() is idempotent: removing an absent key succeeds.
    fn remove(&self, key: &[u8]) -> io::Result<()>;
}
