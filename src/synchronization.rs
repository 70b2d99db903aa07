use std::sync::Arc;

use crate::error::Result;

/// Default order key for synchronization callbacks.
pub const DEFAULT_ORDER: i32 = 0;

/// Completion outcome reported to [`TransactionSynchronization::after_completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The transaction committed.
    Committed,
    /// The transaction rolled back.
    RolledBack,
    /// The outcome could not be determined (heuristic completion).
    Unknown,
}

/// Callback invoked at defined points of the transaction lifecycle,
/// independently of the resource manager itself.
///
/// Callbacks are registered per transaction via
/// [`ExecutionContext::register_synchronization`](crate::ExecutionContext::register_synchronization)
/// and invoked in [`order`](Self::order) (ties preserve registration order).
/// The order key is read lazily when the callback list is snapshotted, so it
/// may still change after registration.
///
/// Errors returned from the fallible callbacks are logged and swallowed by
/// the manager: a misbehaving listener never changes the transaction outcome
/// and never prevents the remaining listeners from running.
pub trait TransactionSynchronization: Send + Sync {
    /// Order key used to sort callbacks before each invocation round.
    fn order(&self) -> i32 {
        DEFAULT_ORDER
    }

    /// Invoked when this callback's transaction is suspended.
    fn suspend(&self) {}

    /// Invoked when this callback's transaction resumes after suspension.
    fn resume(&self) {}

    /// Invoked before the resource-manager commit, while the transaction can
    /// still be written to (e.g. to flush pending changes).
    fn before_commit(&self, _read_only: bool) -> Result<()> {
        Ok(())
    }

    /// Invoked before commit or rollback, after `before_commit`.
    fn before_completion(&self) -> Result<()> {
        Ok(())
    }

    /// Invoked after a successful resource-manager commit.
    fn after_commit(&self) -> Result<()> {
        Ok(())
    }

    /// Invoked after commit or rollback, with the final outcome.
    fn after_completion(&self, _status: CompletionStatus) -> Result<()> {
        Ok(())
    }
}

/// Shared handle under which callbacks are registered and snapshotted.
pub type SharedSynchronization = Arc<dyn TransactionSynchronization>;
