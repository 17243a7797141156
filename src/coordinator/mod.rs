use bytes::Bytes;
use std::io;

/// Coordinator is the consensus layer as seen by the driver: something that
/// agrees on the content of numbered slots. The driver never cares how
/// agreement is reached, only that a decided slot is final and that every
/// replica observes the same bytes for it.
#[async_trait::async_trait]
pub trait Coordinator: Send + Sync {
    /// coordinate() proposes `value` for slot `id`. Idempotent for the same
    /// `(id, value)` pair.
    async fn coordinate(&self, id: i32, value: Bytes) -> io::Result<()>;

    /// instance() resolves with the decided bytes once slot `id` is decided.
    async fn instance(&self, id: i32) -> io::Result<Bytes>;

    /// learn() hints the consensus layer to pull a missing decided slot from
    /// peers.
    async fn learn(&self, id: i32) -> io::Result<()>;

    /// max() returns the highest id the cluster is known to have reached.
    async fn max(&self) -> io::Result<i32>;

    /// forget() allows the consensus layer to drop slot records strictly
    /// below `before`.
    async fn forget(&self, before: i32) -> io::Result<()>;
}
