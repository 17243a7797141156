use crate::driver::input::Output;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;

/// PendingMap tracks, per instance id, the completion entry submitters wait
/// on. The map side holds only weak references: once every submitter has
/// dropped its handle for an id, the entry collects, and completing that id
/// becomes a no-op. The apply loop must never rely on an entry existing.
pub(crate) struct PendingMap {
    entries: Mutex<HashMap<i32, Weak<PendingEntry>>>,
}

struct PendingEntry {
    cell: watch::Sender<Option<Output>>,
}

impl PendingMap {
    pub(crate) fn new() -> Self {
        PendingMap {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// get_or_create() is idempotent: a live entry for `id` is shared with
    /// the caller, a collected or absent one is replaced.
    pub(crate) fn get_or_create(&self, id: i32) -> StateHandle {
        let mut entries = self.entries.lock().expect("PendingMap mutex poison");

        if let Some(live) = entries.get(&id).and_then(Weak::upgrade) {
            return StateHandle::new(live);
        }

        let (cell, _) = watch::channel(None);
        let entry = Arc::new(PendingEntry { cell });
        entries.insert(id, Arc::downgrade(&entry));
        StateHandle::new(entry)
    }

    /// complete() publishes `output` to every handle alive under `id`. The
    /// slot stays in the map while any handle holds the entry, so a retried
    /// submit for an already-applied id still observes the output rather
    /// than waiting forever on a fresh entry the loop has moved past. Only a
    /// collected entry is evicted, and completing one is a no-op.
    pub(crate) fn complete(&self, id: i32, output: Output) {
        let mut entries = self.entries.lock().expect("PendingMap mutex poison");

        match entries.get(&id).and_then(Weak::upgrade) {
            Some(entry) => {
                entry.cell.send_replace(Some(output));
            }
            None => {
                // No submitter is listening and nothing is retained for a
                // future one: clear the dead slot.
                entries.remove(&id);
            }
        }
    }
}

/// StateHandle resolves with the output of applying one submitted input.
/// Handles resolve in apply order, not submission order. The handle is what
/// keeps the pending entry alive; two submitters of the same id share one
/// entry and both observe its completion.
pub struct StateHandle {
    observer: watch::Receiver<Option<Output>>,
    _entry: Arc<PendingEntry>,
}

impl StateHandle {
    fn new(entry: Arc<PendingEntry>) -> Self {
        StateHandle {
            observer: entry.cell.subscribe(),
            _entry: entry,
        }
    }

    /// output() waits until the apply loop has applied this handle's id.
    pub async fn output(mut self) -> Output {
        let cell = self
            .observer
            .wait_for(Option::is_some)
            .await
            .expect("completion cell sender is held by this handle");

        cell.as_ref().cloned().expect("wait_for only returns a filled cell")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::time::{timeout, Duration};

    fn output(id: i32) -> Output {
        Output {
            id,
            content: Bytes::from_static(b"done"),
        }
    }

    #[tokio::test]
    async fn complete_resolves_waiting_handle() {
        let map = PendingMap::new();
        let handle = map.get_or_create(3);

        map.complete(3, output(3));

        let resolved = timeout(Duration::from_secs(1), handle.output()).await.unwrap();
        assert_eq!(resolved, output(3));
    }

    #[tokio::test]
    async fn both_handles_for_same_id_resolve() {
        let map = PendingMap::new();
        let first = map.get_or_create(1);
        let second = map.get_or_create(1);

        map.complete(1, output(1));

        assert_eq!(first.output().await, output(1));
        assert_eq!(second.output().await, output(1));
    }

    #[tokio::test]
    async fn handle_created_after_completion_still_resolves() {
        let map = PendingMap::new();

        // The first submitter keeps its handle alive across the apply.
        let original = map.get_or_create(2);
        map.complete(2, output(2));

        // A duplicate submit for the already-applied id shares the same
        // entry and observes the same output.
        let retried = map.get_or_create(2);

        assert_eq!(retried.output().await, output(2));
        assert_eq!(original.output().await, output(2));
    }

    #[tokio::test]
    async fn complete_without_listener_is_noop() {
        let map = PendingMap::new();

        // Never created.
        map.complete(9, output(9));

        // Created but dropped before application.
        drop(map.get_or_create(10));
        map.complete(10, output(10));
    }

    #[tokio::test]
    async fn dropped_entry_is_replaced_not_resurrected() {
        let map = PendingMap::new();

        drop(map.get_or_create(5));

        // The old collected entry must not shadow the fresh one.
        let fresh = map.get_or_create(5);
        map.complete(5, output(5));

        let resolved = timeout(Duration::from_secs(1), fresh.output()).await.unwrap();
        assert_eq!(resolved, output(5));
    }
}
