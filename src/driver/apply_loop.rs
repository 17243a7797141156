use crate::driver::driver::DriverShared;
use crate::driver::input::Input;
use crate::driver::state_transfer::StateTransfer;
use std::io;
use std::process;
use std::sync::Arc;
use tokio::time::timeout;

/// ApplyLoop is the single consumer of decided slots. Exactly one instance
/// runs per started driver; nothing else writes `done`, touches the redo
/// record, or invokes the state transfer.
pub(crate) struct ApplyLoop<S: StateTransfer> {
    shared: Arc<DriverShared>,
    transfer: S,
    // Applies since the last trim hint. In-memory only; a restart resets the
    // cadence.
    threshold: u32,
}

impl<S: StateTransfer> ApplyLoop<S> {
    pub(crate) fn new(shared: Arc<DriverShared>, transfer: S) -> Self {
        ApplyLoop {
            shared,
            transfer,
            threshold: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            if self.shared.stop_requested() {
                slog::info!(self.shared.logger, "apply loop stop requested; exiting");
                return;
            }

            self.apply_next().await;
        }
    }

    /// One iteration: attempt to apply exactly `done + 1`. Every failure mode
    /// short of an undecodable decided value leaves `done` untouched and lets
    /// the next iteration retry the same id.
    async fn apply_next(&mut self) {
        let target = self.shared.progress.done() + 1;

        let fetch = timeout(
            self.shared.options.instance_fetch_timeout,
            self.shared.coordinator.instance(target),
        )
        .await;

        let decided = match fetch {
            // Not decided locally within the bound; peers may be ahead.
            Err(_elapsed) => {
                if let Err(e) = self.keep_up(target).await {
                    slog::warn!(self.shared.logger, "catch-up from instance {} failed: {}", target, e);
                }
                return;
            }
            Ok(Err(e)) => {
                slog::error!(self.shared.logger, "coordinator.instance({}) failed: {}", target, e);
                return;
            }
            Ok(Ok(bytes)) => bytes,
        };

        let input = match Input::deserialize(&decided) {
            Ok(input) => input,
            Err(e) => {
                // A decided slot this replica cannot parse is irrecoverable
                // divergence from the cluster's view: skipping it would break
                // exactly-once, retrying it would loop forever.
                slog::crit!(
                    self.shared.logger,
                    "decided value for instance {} is undecodable: {}; exiting",
                    target,
                    e
                );
                process::exit(1);
            }
        };

        // Hazard marker holding the pre-apply `done`: recovery re-drives the
        // same id no matter where a crash lands between here and the clear.
        if let Err(e) = self.shared.progress.write_redo(self.shared.progress.done()) {
            slog::error!(
                self.shared.logger,
                "failed to write redo record for instance {}: {}",
                target,
                e
            );
            return;
        }

        self.apply_decided(target, input).await;

        // Cleared on every exit path once written. A failed attempt rewrites
        // it when the retry iteration gets here again.
        if let Err(e) = self.shared.progress.clear_redo() {
            slog::error!(
                self.shared.logger,
                "failed to clear redo record after instance {}: {}",
                target,
                e
            );
        }
    }

    async fn apply_decided(&mut self, target: i32, input: Input) {
        let output = match self.transfer.transform(&input) {
            Ok(output) => output,
            Err(e) => {
                // Transient by contract: the transform is idempotent per id
                // and will be re-driven with the identical input.
                // TODO:3 back off when the same id keeps failing, so one
                //        poisoned input doesn't spin the loop at full speed.
                slog::error!(self.shared.logger, "transform failed for instance {}: {}", target, e);
                return;
            }
        };

        self.shared.pending.complete(target, output);

        if let Err(e) = self.shared.progress.advance_done(target) {
            slog::error!(self.shared.logger, "failed to persist done={}: {}", target, e);
            return;
        }

        if let Err(e) = self.shared.sync_max_and_sequence().await {
            slog::warn!(
                self.shared.logger,
                "failed to sync max after instance {}: {}",
                target,
                e
            );
        }

        self.forget_applied().await;
    }

    /// Periodic trim hint: once the apply count exceeds the configured
    /// interval, tell the coordinator everything at or below `done` is
    /// applied here, then restart the count.
    async fn forget_applied(&mut self) {
        self.threshold += 1;
        if self.threshold > self.shared.options.forget_interval {
            self.threshold = 0;
            let done = self.shared.progress.done();
            if let Err(e) = self.shared.coordinator.forget(done).await {
                slog::warn!(self.shared.logger, "coordinator.forget({}) failed: {}", done, e);
            }
        }
    }

    /// Catch-up: the local coordinator has not decided `target` within the
    /// fetch bound, but peers may have moved past it. Ask to learn every slot
    /// up to the cluster max; `done` does not advance here.
    async fn keep_up(&self, target: i32) -> io::Result<()> {
        let end = self.shared.coordinator.max().await?;

        let mut id = target;
        while id <= end {
            self.shared.coordinator.learn(id).await?;
            id += 1;
        }

        Ok(())
    }
}
