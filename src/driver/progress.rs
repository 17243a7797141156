use crate::storage::Persistence;
use std::io;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

// Durable keys, bit-exact: other tooling reads the same store.
pub(crate) const RSM_DONE: &[u8] = b"rsm_done";
pub(crate) const RSM_DONE_REDO: &[u8] = b"rsm_done_redo";

/// Progress owns the driver's progress pointers and their durable form.
/// `done` is the highest id whose transform has returned and whose durable
/// record is written; `max` is the highest id the cluster is known to have
/// reached (advisory, drives catch-up). Written by the apply loop only, read
/// from any thread.
pub(crate) struct Progress {
    logger: slog::Logger,
    persistence: Arc<dyn Persistence>,
    done: AtomicI32,
    max: AtomicI32,
}

impl Progress {
    pub(crate) fn new(logger: slog::Logger, persistence: Arc<dyn Persistence>) -> Self {
        Progress {
            logger,
            persistence,
            done: AtomicI32::new(-1),
            max: AtomicI32::new(-1),
        }
    }

    pub(crate) fn done(&self) -> i32 {
        self.done.load(Ordering::Acquire)
    }

    pub(crate) fn max(&self) -> i32 {
        self.max.load(Ordering::Acquire)
    }

    pub(crate) fn observe_max(&self, max: i32) {
        self.max.store(max, Ordering::Release);
    }

    /// advance_done() writes the durable record first, then publishes the new
    /// value. A crash between the two is exactly what the redo record covers.
    pub(crate) fn advance_done(&self, done: i32) -> io::Result<()> {
        self.persistence.put(RSM_DONE, &done.to_be_bytes())?;
        self.done.store(done, Ordering::Release);
        Ok(())
    }

    /// recover() restores `done` after a restart. A well-formed redo record
    /// wins: it holds the pre-apply `done` of an apply that was in flight,
    /// and re-driving that id is safe because transforms are idempotent per
    /// id. Otherwise the last durable `done`; otherwise -1.
    pub(crate) fn recover(&self) -> io::Result<i32> {
        let done = match self.read_redo()? {
            Some(redo) => redo,
            None => match self.persistence.get(RSM_DONE)? {
                Some(bytes) => decode_progress(&bytes).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("rsm_done record of {} bytes is shorter than 4", bytes.len()),
                    )
                })?,
                None => -1,
            },
        };

        self.done.store(done, Ordering::Release);
        Ok(done)
    }

    /// write_redo() marks "applying done + 1 now" with the pre-apply `done`,
    /// so recovery re-drives the same id no matter where a crash landed.
    pub(crate) fn write_redo(&self, done: i32) -> io::Result<()> {
        self.persistence.put(RSM_DONE_REDO, &done.to_be_bytes())
    }

    pub(crate) fn clear_redo(&self) -> io::Result<()> {
        self.persistence.remove(RSM_DONE_REDO)
    }

    /// read_redo() is lenient: a short value means the redo record itself was
    /// torn mid-write, so the durable `done` is still authoritative.
    pub(crate) fn read_redo(&self) -> io::Result<Option<i32>> {
        match self.persistence.get(RSM_DONE_REDO)? {
            None => Ok(None),
            Some(bytes) => match decode_progress(&bytes) {
                Some(id) => Ok(Some(id)),
                None => {
                    slog::warn!(
                        self.logger,
                        "redo record of {} bytes is malformed; treating as absent",
                        bytes.len()
                    );
                    Ok(None)
                }
            },
        }
    }
}

// Durable integer format: 4-byte big-endian signed. Trailing bytes are
// tolerated, fewer than 4 are not.
fn decode_progress(bytes: &[u8]) -> Option<i32> {
    let head: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(i32::from_be_bytes(head))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryPersistence;

    fn new_progress() -> (Progress, Arc<InMemoryPersistence>) {
        let persistence = Arc::new(InMemoryPersistence::new());
        (progress_over(persistence.clone()), persistence)
    }

    fn progress_over(persistence: Arc<InMemoryPersistence>) -> Progress {
        Progress::new(slog::Logger::root(slog::Discard, slog::o!()), persistence)
    }

    #[test]
    fn recover_from_empty_store() {
        let (progress, _) = new_progress();

        assert_eq!(progress.recover().unwrap(), -1);
        assert_eq!(progress.done(), -1);
    }

    #[test]
    fn recover_from_done_record() {
        let (progress, persistence) = new_progress();
        persistence.put(RSM_DONE, &7i32.to_be_bytes()).unwrap();

        assert_eq!(progress.recover().unwrap(), 7);
        assert_eq!(progress.done(), 7);
    }

    #[test]
    fn redo_record_wins_over_done_record() {
        let (progress, persistence) = new_progress();
        persistence.put(RSM_DONE, &5i32.to_be_bytes()).unwrap();
        persistence.put(RSM_DONE_REDO, &4i32.to_be_bytes()).unwrap();

        assert_eq!(progress.recover().unwrap(), 4);
    }

    #[test]
    fn torn_redo_record_is_ignored() {
        let (progress, persistence) = new_progress();
        persistence.put(RSM_DONE, &5i32.to_be_bytes()).unwrap();
        persistence.put(RSM_DONE_REDO, &[0x00, 0x01]).unwrap();

        assert_eq!(progress.recover().unwrap(), 5);
    }

    #[test]
    fn torn_done_record_fails_recovery() {
        let (progress, persistence) = new_progress();
        persistence.put(RSM_DONE, &[0x00]).unwrap();

        let err = progress.recover().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn advance_then_recover() {
        let (progress, persistence) = new_progress();

        progress.advance_done(12).unwrap();
        assert_eq!(progress.done(), 12);
        assert_eq!(persistence.get(RSM_DONE).unwrap(), Some(12i32.to_be_bytes().to_vec()));

        let restarted = progress_over(persistence);
        assert_eq!(restarted.recover().unwrap(), 12);
    }

    #[test]
    fn redo_write_and_clear() {
        let (progress, persistence) = new_progress();

        progress.write_redo(3).unwrap();
        assert_eq!(persistence.get(RSM_DONE_REDO).unwrap(), Some(3i32.to_be_bytes().to_vec()));
        assert_eq!(progress.read_redo().unwrap(), Some(3));

        progress.clear_redo().unwrap();
        assert_eq!(progress.read_redo().unwrap(), None);

        // clear is idempotent
        progress.clear_redo().unwrap();
    }
}
