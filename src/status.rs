use tracing::debug;

use crate::definition::IsolationLevel;
use crate::error::{Error, Result};
use crate::resource::{ResourceManager, SmartTransaction};
use crate::synchronization::SharedSynchronization;

/// Snapshot of everything that was suspended to make room for another
/// transaction: the detached resource state, the suspended synchronization
/// callbacks, and the context's pre-suspend transaction characteristics.
///
/// Created by the manager's suspend step, consumed exactly once by the paired
/// resume. Suspend/resume pairs must nest LIFO; resuming out of order is a
/// caller bug the engine does not defend against.
pub struct SuspendedResources<S> {
    pub(crate) resource: Option<S>,
    pub(crate) synchronizations: Option<Vec<SharedSynchronization>>,
    pub(crate) name: Option<String>,
    pub(crate) read_only: bool,
    pub(crate) isolation_level: Option<IsolationLevel>,
    pub(crate) was_active: bool,
}

/// Per-transaction-attempt state handed out by
/// [`TransactionManager::get_transaction`](crate::TransactionManager::get_transaction)
/// and consumed by `commit` or `rollback` - exactly once: any further
/// completion call fails with [`Error::IllegalTransactionState`].
///
/// A status may carry no underlying transaction at all (an "empty"
/// transaction, used when propagation is `Supports`/`NotSupported`/`Never`
/// and nothing is active); [`is_new_transaction`](Self::is_new_transaction)
/// reports `true` only when this attempt actually created a resource
/// transaction.
pub struct TransactionStatus<R: ResourceManager> {
    transaction: Option<R::Transaction>,
    new_transaction: bool,
    new_synchronization: bool,
    read_only: bool,
    debug: bool,
    suspended: Option<SuspendedResources<R::Suspended>>,
    savepoint: Option<String>,
    completed: bool,
    rollback_only: bool,
}

impl<R: ResourceManager> std::fmt::Debug for TransactionStatus<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStatus")
            .field("has_transaction", &self.transaction.is_some())
            .field("new_transaction", &self.new_transaction)
            .field("new_synchronization", &self.new_synchronization)
            .field("read_only", &self.read_only)
            .field("debug", &self.debug)
            .field("suspended", &self.suspended.is_some())
            .field("savepoint", &self.savepoint)
            .field("completed", &self.completed)
            .field("rollback_only", &self.rollback_only)
            .finish()
    }
}

impl<R: ResourceManager> TransactionStatus<R> {
    pub(crate) fn new(
        transaction: Option<R::Transaction>,
        new_transaction: bool,
        new_synchronization: bool,
        read_only: bool,
        debug: bool,
        suspended: Option<SuspendedResources<R::Suspended>>,
    ) -> Self {
        Self {
            transaction,
            new_transaction,
            new_synchronization,
            read_only,
            debug,
            suspended,
            savepoint: None,
            completed: false,
            rollback_only: false,
        }
    }

    /// Whether this attempt created the underlying resource transaction.
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction && self.transaction.is_some()
    }

    /// Whether an underlying resource transaction is associated at all.
    pub fn has_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Whether this attempt activated the context's synchronization list.
    pub fn is_new_synchronization(&self) -> bool {
        self.new_synchronization
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether commit/rollback has already run for this status.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Marks this transaction rollback-only. The only outcome a subsequent
    /// `commit` can produce is a rollback; the marker cannot be reset.
    pub fn set_rollback_only(&mut self) {
        if self.debug {
            debug!("transaction marked as rollback-only");
        }
        self.rollback_only = true;
    }

    /// The local rollback-only marker, as set via
    /// [`set_rollback_only`](Self::set_rollback_only).
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// The global rollback-only marker, reported by the underlying handle
    /// itself through its [`SmartTransaction`] capability (if any).
    pub fn is_global_rollback_only(&self) -> bool {
        self.transaction
            .as_ref()
            .and_then(R::smart_transaction)
            .is_some_and(SmartTransaction::is_rollback_only)
    }

    /// Whether a savepoint is held for this (nested) transaction.
    pub fn has_savepoint(&self) -> bool {
        self.savepoint.is_some()
    }

    pub(crate) fn is_debug(&self) -> bool {
        self.debug
    }

    pub(crate) fn transaction_mut(&mut self) -> Result<&mut R::Transaction> {
        self.transaction.as_mut().ok_or_else(|| {
            Error::IllegalTransactionState(
                "no underlying transaction is associated with this status".into(),
            )
        })
    }

    pub(crate) fn take_transaction(&mut self) -> Option<R::Transaction> {
        self.transaction.take()
    }

    pub(crate) fn take_suspended(&mut self) -> Option<SuspendedResources<R::Suspended>> {
        self.suspended.take()
    }

    pub(crate) fn mark_completed(&mut self) {
        self.completed = true;
    }

    // ------------------------------------------------------------------
    // Savepoint delegation
    // ------------------------------------------------------------------

    pub(crate) fn create_and_hold_savepoint(&mut self, name: String) -> Result<()> {
        let savepoints = self.savepoint_manager()?;
        savepoints.create_savepoint(&name)?;
        debug!(savepoint = %name, "created transaction savepoint");
        self.savepoint = Some(name);
        Ok(())
    }

    /// Rolls the transaction back to the held savepoint.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::TransactionUsage`] if no savepoint is held, or
    /// [`Error::NestedTransactionNotSupported`] if the handle lacks the
    /// savepoint capability.
    pub fn rollback_to_held_savepoint(&mut self) -> Result<()> {
        let name = self.held_savepoint()?;
        self.savepoint_manager()?.rollback_to_savepoint(&name)
    }

    /// Releases the held savepoint. The held name is deliberately kept so the
    /// engine can still see that this status represents a savepoint-scoped
    /// transaction after release.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`rollback_to_held_savepoint`](Self::rollback_to_held_savepoint).
    pub fn release_held_savepoint(&mut self) -> Result<()> {
        let name = self.held_savepoint()?;
        self.savepoint_manager()?.release_savepoint(&name)
    }

    fn held_savepoint(&self) -> Result<String> {
        self.savepoint.clone().ok_or_else(|| {
            Error::TransactionUsage(
                "no savepoint is associated with the current transaction".into(),
            )
        })
    }

    fn savepoint_manager(&mut self) -> Result<&mut dyn crate::resource::SavepointManager> {
        let transaction = self.transaction.as_mut().ok_or_else(|| {
            Error::NestedTransactionNotSupported(
                "cannot perform savepoint operations without an active transaction".into(),
            )
        })?;
        R::savepoint_manager(transaction).ok_or_else(|| {
            Error::NestedTransactionNotSupported(
                "transaction handle does not expose a savepoint capability".into(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::definition::TransactionDefinition;
    use crate::resource::SavepointManager;

    #[derive(Default)]
    struct SavepointTx {
        created: Vec<String>,
        rolled_back: Vec<String>,
        released: Vec<String>,
    }

    impl SavepointManager for SavepointTx {
        fn create_savepoint(&mut self, name: &str) -> Result<()> {
            self.created.push(name.to_string());
            Ok(())
        }

        fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
            self.rolled_back.push(name.to_string());
            Ok(())
        }

        fn release_savepoint(&mut self, name: &str) -> Result<()> {
            self.released.push(name.to_string());
            Ok(())
        }
    }

    struct SavepointMgr;

    impl ResourceManager for SavepointMgr {
        type Transaction = SavepointTx;
        type Suspended = ();

        fn do_get_transaction(&mut self, _cx: &mut ExecutionContext) -> Result<SavepointTx> {
            Ok(SavepointTx::default())
        }

        fn do_begin(
            &mut self,
            _transaction: &mut SavepointTx,
            _definition: &TransactionDefinition,
            _cx: &mut ExecutionContext,
        ) -> Result<()> {
            Ok(())
        }

        fn do_commit(
            &mut self,
            _transaction: &mut SavepointTx,
            _cx: &mut ExecutionContext,
        ) -> Result<()> {
            Ok(())
        }

        fn do_rollback(
            &mut self,
            _transaction: &mut SavepointTx,
            _cx: &mut ExecutionContext,
        ) -> Result<()> {
            Ok(())
        }

        fn savepoint_manager(
            transaction: &mut SavepointTx,
        ) -> Option<&mut dyn SavepointManager> {
            Some(transaction)
        }
    }

    struct PlainMgr;

    impl ResourceManager for PlainMgr {
        type Transaction = u8;
        type Suspended = ();

        fn do_get_transaction(&mut self, _cx: &mut ExecutionContext) -> Result<u8> {
            Ok(0)
        }

        fn do_begin(
            &mut self,
            _transaction: &mut u8,
            _definition: &TransactionDefinition,
            _cx: &mut ExecutionContext,
        ) -> Result<()> {
            Ok(())
        }

        fn do_commit(&mut self, _transaction: &mut u8, _cx: &mut ExecutionContext) -> Result<()> {
            Ok(())
        }

        fn do_rollback(&mut self, _transaction: &mut u8, _cx: &mut ExecutionContext) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_savepoint_requires_held_name() {
        let mut status: TransactionStatus<SavepointMgr> =
            TransactionStatus::new(Some(SavepointTx::default()), false, false, false, false, None);
        assert!(matches!(
            status.rollback_to_held_savepoint(),
            Err(Error::TransactionUsage(_))
        ));
        assert!(matches!(
            status.release_held_savepoint(),
            Err(Error::TransactionUsage(_))
        ));
    }

    #[test]
    fn test_release_keeps_held_name() {
        let mut status: TransactionStatus<SavepointMgr> =
            TransactionStatus::new(Some(SavepointTx::default()), false, false, false, false, None);
        status.create_and_hold_savepoint("sp_1".into()).unwrap();
        assert!(status.has_savepoint());

        status.release_held_savepoint().unwrap();
        assert!(status.has_savepoint());

        status.rollback_to_held_savepoint().unwrap();
        let tx = status.take_transaction().unwrap();
        assert_eq!(tx.created, ["sp_1"]);
        assert_eq!(tx.released, ["sp_1"]);
        assert_eq!(tx.rolled_back, ["sp_1"]);
    }

    #[test]
    fn test_savepoint_without_capability_fails() {
        let mut status: TransactionStatus<PlainMgr> =
            TransactionStatus::new(Some(0), false, false, false, false, None);
        assert!(matches!(
            status.create_and_hold_savepoint("sp_1".into()),
            Err(Error::NestedTransactionNotSupported(_))
        ));
    }

    #[test]
    fn test_new_transaction_requires_handle() {
        let status: TransactionStatus<PlainMgr> =
            TransactionStatus::new(None, true, false, false, false, None);
        assert!(!status.is_new_transaction());
        assert!(!status.has_transaction());
    }

    #[test]
    fn test_rollback_only_is_one_way() {
        let mut status: TransactionStatus<PlainMgr> =
            TransactionStatus::new(Some(0), true, false, false, false, None);
        assert!(!status.is_rollback_only());
        status.set_rollback_only();
        assert!(status.is_rollback_only());
    }
}
