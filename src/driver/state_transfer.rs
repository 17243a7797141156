use crate::driver::input::{Input, Output};
use bytes::Bytes;

/// Boxed so applications surface whatever failure type they already use. A
/// failed transform is treated as transient: the loop retries the same id
/// with the identical input on its next iteration.
pub type TransformError = Box<dyn std::error::Error + Send + Sync>;

/// StateTransfer is the application's view of the replicated state machine:
/// a deterministic fold of each decided input into new state.
pub trait StateTransfer: Send {
    /// transform() is called in strict id order, and may be re-invoked with
    /// the identical input after a crash or a failed attempt. Implementations
    /// MUST be idempotent per id: any durable side effect keyed by something
    /// other than `input.id` will be duplicated by recovery.
    ///
    /// The driver does not respond to the submitter until this returns, so a
    /// successful return must mean the state transition is observable.
    fn transform(&mut self, input: &Input) -> Result<Output, TransformError>;
}

/// NoOpStateTransfer acknowledges every input without keeping any state.
/// Useful for wiring tests.
pub struct NoOpStateTransfer;

impl StateTransfer for NoOpStateTransfer {
    fn transform(&mut self, input: &Input) -> Result<Output, TransformError> {
        Ok(Output {
            id: input.id,
            content: Bytes::new(),
        })
    }
}
