use crate::coordinator::Coordinator;
use crate::driver::apply_loop::ApplyLoop;
use crate::driver::input::{CodecError, Input};
use crate::driver::options::{RsmOptions, RsmOptionsValidated};
use crate::driver::pending::{PendingMap, StateHandle};
use crate::driver::progress::Progress;
use crate::driver::state_transfer::StateTransfer;
use crate::sequence::Sequence;
use crate::storage::Persistence;
use bytes::Bytes;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Everything needed to build a driver. The three collaborators are the
/// seams to the embedding system: the consensus layer, the durable store,
/// and the id allocator.
pub struct RsmConfig {
    pub persistence: Arc<dyn Persistence>,
    pub sequence: Arc<dyn Sequence>,
    pub coordinator: Arc<dyn Coordinator>,
    pub logger: slog::Logger,
    pub options: RsmOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverCreationError {
    #[error("Illegal options for configuring driver: {0}")]
    IllegalOptions(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("failed to recover applied progress from persistence")]
    Recovery(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    // An id the sequence has not handed out yet cannot have come from
    // new_state() on this driver. Caller bug.
    #[error("instance id {id} is ahead of the sequence value {current}")]
    IdAheadOfSequence { id: i32, current: i32 },

    #[error("failed to serialize input")]
    Codec(#[from] CodecError),

    #[error("failed to hand input to the coordinator")]
    Coordination(#[source] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ForgetError {
    #[error("cannot forget up to {before}: only applied up to {done}")]
    AboveDone { before: i32, done: i32 },

    #[error("coordinator failed to forget")]
    Coordination(#[source] io::Error),
}

/// RsmDriver sits between the consensus layer and the application state
/// machine. It allocates monotonically increasing instance ids to client
/// submissions, drives each submission through consensus, and applies the
/// decided values strictly in order, exactly once, durably.
///
/// Many threads may share one driver (it is cheap to clone); exactly one
/// apply-loop task owns the apply side once start() is called.
#[derive(Clone)]
pub struct RsmDriver {
    shared: Arc<DriverShared>,
}

/// State shared between submitter threads and the apply loop.
pub(crate) struct DriverShared {
    pub(crate) logger: slog::Logger,
    pub(crate) coordinator: Arc<dyn Coordinator>,
    pub(crate) sequence: Arc<dyn Sequence>,
    pub(crate) progress: Progress,
    pub(crate) pending: PendingMap,
    pub(crate) options: RsmOptionsValidated,

    // Serializes id allocation against the apply loop's sequence rebase, so
    // no locally allocated id can collide with one already decided remotely.
    sequence_gate: Mutex<()>,
    stop: AtomicBool,
}

impl RsmDriver {
    pub fn try_new(config: RsmConfig) -> Result<Self, DriverCreationError> {
        let options = RsmOptionsValidated::try_from(config.options).map_err(DriverCreationError::IllegalOptions)?;
        let progress = Progress::new(config.logger.clone(), Arc::clone(&config.persistence));

        Ok(RsmDriver {
            shared: Arc::new(DriverShared {
                logger: config.logger,
                coordinator: config.coordinator,
                sequence: config.sequence,
                progress,
                pending: PendingMap::new(),
                options,
                sequence_gate: Mutex::new(()),
                stop: AtomicBool::new(false),
            }),
        })
    }

    /// start() recovers the applied pointer from persistence, rebases the
    /// sequence to `done + 1`, and dispatches the apply loop onto the tokio
    /// runtime. Callable again after stop().
    pub fn start<S>(&self, transfer: S) -> Result<(), StartError>
    where
        S: StateTransfer + Send + Sync + 'static,
    {
        let done = self.shared.progress.recover()?;
        {
            let _gate = self.shared.sequence_gate.lock().expect("sequence gate poison");
            self.shared.sequence.set(done + 1);
        }
        self.shared.stop.store(false, Ordering::Release);

        slog::info!(self.shared.logger, "starting apply loop at done={}", done);
        tokio::spawn(ApplyLoop::new(Arc::clone(&self.shared), transfer).run());

        Ok(())
    }

    /// stop() is cooperative: the apply loop observes it at the top of its
    /// next iteration and exits. An in-flight transform is not interrupted.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    /// new_state() wraps `content` in a fresh Input: the next instance id
    /// plus a uuid naming this submitter's request. Ids are strictly
    /// increasing within a run and never reused.
    pub fn new_state(&self, content: Bytes) -> Input {
        let id = {
            let _gate = self.shared.sequence_gate.lock().expect("sequence gate poison");
            self.shared.sequence.next()
        };

        Input::new(id, content)
    }

    /// submit() drives `input` through consensus and returns the handle that
    /// resolves once the input has been applied. Handles resolve in apply
    /// order, which is not submission order.
    pub async fn submit(&self, input: &Input) -> Result<StateHandle, SubmitError> {
        let current = self.shared.sequence.current();
        if input.id > current {
            return Err(SubmitError::IdAheadOfSequence {
                id: input.id,
                current,
            });
        }

        let frame = input.serialize()?;
        self.shared
            .coordinator
            .coordinate(input.id, frame)
            .await
            .map_err(SubmitError::Coordination)?;

        Ok(self.shared.pending.get_or_create(input.id))
    }

    /// done() is the highest id whose transform has returned and whose
    /// durable record is written.
    pub fn done(&self) -> i32 {
        self.shared.progress.done()
    }

    /// max() is the highest id the coordinator has observed in the cluster.
    pub fn max(&self) -> i32 {
        self.shared.progress.max()
    }

    /// forget() hints the coordinator that slots strictly below `before` may
    /// be dropped. Only applied slots can be forgotten.
    pub async fn forget(&self, before: i32) -> Result<(), ForgetError> {
        let done = self.shared.progress.done();
        if before > done {
            return Err(ForgetError::AboveDone { before, done });
        }

        self.shared
            .coordinator
            .forget(before)
            .await
            .map_err(ForgetError::Coordination)
    }
}

impl DriverShared {
    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Mirrors the coordinator's view of cluster progress into `max`, then
    /// rebases the sequence past it, so an id another node already decided is
    /// never handed to a local submitter.
    pub(crate) async fn sync_max_and_sequence(&self) -> io::Result<()> {
        let max = self.coordinator.max().await?;
        self.progress.observe_max(max);

        let _gate = self.sequence_gate.lock().expect("sequence gate poison");
        if max >= self.sequence.current() {
            slog::debug!(self.logger, "rebasing sequence to {}", max + 1);
            self.sequence.set(max + 1);
        }

        Ok(())
    }
}
