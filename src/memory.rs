//! In-memory resource manager, mainly useful for tests and for trying the
//! engine without a real resource behind it.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::context::ExecutionContext;
use crate::definition::TransactionDefinition;
use crate::error::{Error, Result};
use crate::resource::{ResourceManager, SavepointManager, SmartTransaction};

/// Context key under which the journal of the active transaction is bound.
pub const RESOURCE_KEY: &str = "memory-journal";

/// Buffered work of one in-flight transaction.
struct Journal {
    entries: Vec<String>,
    savepoints: Vec<(String, usize)>,
    rollback_only: bool,
    read_only: bool,
}

impl Journal {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            savepoints: Vec::new(),
            rollback_only: false,
            read_only: false,
        }
    }
}

type SharedJournal = Arc<Mutex<Journal>>;

/// Transaction handle of the [`MemoryResourceManager`].
pub struct MemoryTransaction {
    journal: SharedJournal,
    existing: bool,
}

impl SmartTransaction for MemoryTransaction {
    fn is_rollback_only(&self) -> bool {
        self.journal.lock().rollback_only
    }
}

impl SavepointManager for MemoryTransaction {
    fn create_savepoint(&mut self, name: &str) -> Result<()> {
        let mut journal = self.journal.lock();
        let mark = journal.entries.len();
        journal.savepoints.push((name.to_string(), mark));
        Ok(())
    }

    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        let mut journal = self.journal.lock();
        let position = journal
            .savepoints
            .iter()
            .position(|(savepoint, _)| savepoint == name)
            .ok_or_else(|| {
                Error::TransactionUsage(format!("unknown savepoint '{name}'"))
            })?;
        let mark = journal.savepoints[position].1;
        journal.entries.truncate(mark);
        // The savepoint itself stays valid; anything created after it is gone.
        journal.savepoints.truncate(position + 1);
        Ok(())
    }

    fn release_savepoint(&mut self, name: &str) -> Result<()> {
        let mut journal = self.journal.lock();
        let position = journal
            .savepoints
            .iter()
            .position(|(savepoint, _)| savepoint == name)
            .ok_or_else(|| {
                Error::TransactionUsage(format!("unknown savepoint '{name}'"))
            })?;
        journal.savepoints.remove(position);
        Ok(())
    }
}

/// Detached journal of a suspended in-memory transaction.
pub struct SuspendedJournal(SharedJournal);

/// A [`ResourceManager`] that buffers recorded entries in a journal bound to
/// the execution context and moves them to a committed list on commit.
///
/// Supports everything the engine can ask for: existing-transaction
/// detection, suspend/resume, savepoints, and the global rollback-only
/// marker. Rolled-back entries are simply discarded.
///
/// # Examples
///
/// ```rust
/// use tx_kernel::memory::MemoryResourceManager;
/// use tx_kernel::{ExecutionContext, TransactionManager};
///
/// let mut manager = TransactionManager::new(MemoryResourceManager::new());
/// let mut cx = ExecutionContext::new();
///
/// let mut status = manager.get_transaction(&mut cx, None)?;
/// MemoryResourceManager::record(&mut cx, "credit account")?;
/// manager.rollback(&mut cx, &mut status)?;
///
/// assert!(manager.resource_manager().committed().is_empty());
/// # Ok::<(), tx_kernel::Error>(())
/// ```
#[derive(Default)]
pub struct MemoryResourceManager {
    committed: Vec<String>,
}

impl MemoryResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries of all committed transactions, in commit order.
    pub fn committed(&self) -> &[String] {
        &self.committed
    }

    /// Appends an entry to the journal of the transaction bound to the
    /// context.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoResourceBound`] outside an actual transaction,
    /// or [`Error::TransactionUsage`] within a read-only one.
    pub fn record(cx: &mut ExecutionContext, entry: impl Into<String>) -> Result<()> {
        let journal = cx
            .resource::<SharedJournal>(RESOURCE_KEY)
            .ok_or_else(|| Error::NoResourceBound(RESOURCE_KEY.to_string()))?;
        let mut journal = journal.lock();
        if journal.read_only {
            return Err(Error::TransactionUsage(
                "cannot record entries in a read-only transaction".into(),
            ));
        }
        journal.entries.push(entry.into());
        Ok(())
    }
}

impl ResourceManager for MemoryResourceManager {
    type Transaction = MemoryTransaction;
    type Suspended = SuspendedJournal;

    fn do_get_transaction(&mut self, cx: &mut ExecutionContext) -> Result<MemoryTransaction> {
        match cx.resource::<SharedJournal>(RESOURCE_KEY) {
            Some(journal) => Ok(MemoryTransaction {
                journal: Arc::clone(journal),
                existing: true,
            }),
            None => Ok(MemoryTransaction {
                journal: Arc::new(Mutex::new(Journal::new())),
                existing: false,
            }),
        }
    }

    fn is_existing_transaction(&mut self, transaction: &MemoryTransaction) -> Result<bool> {
        Ok(transaction.existing)
    }

    fn do_begin(
        &mut self,
        transaction: &mut MemoryTransaction,
        definition: &TransactionDefinition,
        cx: &mut ExecutionContext,
    ) -> Result<()> {
        transaction.journal.lock().read_only = definition.is_read_only();
        cx.bind_resource(RESOURCE_KEY, Arc::clone(&transaction.journal))?;
        debug!(read_only = definition.is_read_only(), "began in-memory transaction");
        Ok(())
    }

    fn do_suspend(
        &mut self,
        _transaction: &mut MemoryTransaction,
        cx: &mut ExecutionContext,
    ) -> Result<SuspendedJournal> {
        let journal = cx.unbind_resource::<SharedJournal>(RESOURCE_KEY)?;
        Ok(SuspendedJournal(journal))
    }

    fn do_resume(&mut self, suspended: SuspendedJournal, cx: &mut ExecutionContext) -> Result<()> {
        cx.bind_resource(RESOURCE_KEY, suspended.0)
    }

    fn do_commit(
        &mut self,
        transaction: &mut MemoryTransaction,
        _cx: &mut ExecutionContext,
    ) -> Result<()> {
        let mut journal = transaction.journal.lock();
        self.committed.append(&mut journal.entries);
        journal.savepoints.clear();
        Ok(())
    }

    fn do_rollback(
        &mut self,
        transaction: &mut MemoryTransaction,
        _cx: &mut ExecutionContext,
    ) -> Result<()> {
        let mut journal = transaction.journal.lock();
        journal.entries.clear();
        journal.savepoints.clear();
        Ok(())
    }

    fn do_set_rollback_only(
        &mut self,
        transaction: &mut MemoryTransaction,
        _cx: &mut ExecutionContext,
    ) -> Result<()> {
        transaction.journal.lock().rollback_only = true;
        Ok(())
    }

    fn do_cleanup_after_completion(
        &mut self,
        transaction: MemoryTransaction,
        cx: &mut ExecutionContext,
    ) {
        let still_bound = cx
            .resource::<SharedJournal>(RESOURCE_KEY)
            .is_some_and(|journal| Arc::ptr_eq(journal, &transaction.journal));
        if still_bound {
            if let Err(err) = cx.unbind_resource::<SharedJournal>(RESOURCE_KEY) {
                debug!(error = %err, "journal already unbound during cleanup");
            }
        }
    }

    fn smart_transaction(transaction: &MemoryTransaction) -> Option<&dyn SmartTransaction> {
        Some(transaction)
    }

    fn savepoint_manager(
        transaction: &mut MemoryTransaction,
    ) -> Option<&mut dyn SavepointManager> {
        Some(transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Propagation;
    use crate::manager::TransactionManager;

    fn manager() -> TransactionManager<MemoryResourceManager> {
        TransactionManager::new(MemoryResourceManager::new())
    }

    #[test]
    fn test_commit_persists_recorded_entries() {
        let mut manager = manager();
        let mut cx = ExecutionContext::new();

        let mut status = manager.get_transaction(&mut cx, None).unwrap();
        MemoryResourceManager::record(&mut cx, "a").unwrap();
        MemoryResourceManager::record(&mut cx, "b").unwrap();
        manager.commit(&mut cx, &mut status).unwrap();

        assert_eq!(manager.resource_manager().committed(), ["a", "b"]);
        assert!(!cx.has_resource(RESOURCE_KEY));
    }

    #[test]
    fn test_rollback_discards_recorded_entries() {
        let mut manager = manager();
        let mut cx = ExecutionContext::new();

        let mut status = manager.get_transaction(&mut cx, None).unwrap();
        MemoryResourceManager::record(&mut cx, "a").unwrap();
        manager.rollback(&mut cx, &mut status).unwrap();

        assert!(manager.resource_manager().committed().is_empty());
        assert!(!cx.has_resource(RESOURCE_KEY));
    }

    #[test]
    fn test_record_without_transaction_fails() {
        let mut cx = ExecutionContext::new();
        assert!(matches!(
            MemoryResourceManager::record(&mut cx, "a"),
            Err(Error::NoResourceBound(_))
        ));
    }

    #[test]
    fn test_read_only_transaction_rejects_entries() {
        let mut manager = manager();
        let mut cx = ExecutionContext::new();
        let definition = TransactionDefinition::new().with_read_only(true);

        let mut status = manager.get_transaction(&mut cx, Some(&definition)).unwrap();
        assert!(matches!(
            MemoryResourceManager::record(&mut cx, "a"),
            Err(Error::TransactionUsage(_))
        ));
        manager.commit(&mut cx, &mut status).unwrap();
    }

    #[test]
    fn test_requires_new_commits_independently_of_outer_rollback() {
        let mut manager = manager();
        let mut cx = ExecutionContext::new();

        let mut outer = manager.get_transaction(&mut cx, None).unwrap();
        MemoryResourceManager::record(&mut cx, "outer work").unwrap();

        let definition =
            TransactionDefinition::new().with_propagation(Propagation::RequiresNew);
        let mut inner = manager.get_transaction(&mut cx, Some(&definition)).unwrap();
        MemoryResourceManager::record(&mut cx, "inner work").unwrap();
        manager.commit(&mut cx, &mut inner).unwrap();

        manager.rollback(&mut cx, &mut outer).unwrap();

        assert_eq!(manager.resource_manager().committed(), ["inner work"]);
    }

    #[test]
    fn test_nested_rollback_keeps_work_before_savepoint() {
        let mut manager = manager().with_nested_transaction_allowed(true);
        let mut cx = ExecutionContext::new();

        let mut outer = manager.get_transaction(&mut cx, None).unwrap();
        MemoryResourceManager::record(&mut cx, "before savepoint").unwrap();

        let definition = TransactionDefinition::new().with_propagation(Propagation::Nested);
        let mut nested = manager.get_transaction(&mut cx, Some(&definition)).unwrap();
        MemoryResourceManager::record(&mut cx, "after savepoint").unwrap();
        manager.rollback(&mut cx, &mut nested).unwrap();

        manager.commit(&mut cx, &mut outer).unwrap();
        assert_eq!(manager.resource_manager().committed(), ["before savepoint"]);
    }

    #[test]
    fn test_nested_commit_keeps_all_work() {
        let mut manager = manager().with_nested_transaction_allowed(true);
        let mut cx = ExecutionContext::new();

        let mut outer = manager.get_transaction(&mut cx, None).unwrap();
        MemoryResourceManager::record(&mut cx, "outer").unwrap();

        let definition = TransactionDefinition::new().with_propagation(Propagation::Nested);
        let mut nested = manager.get_transaction(&mut cx, Some(&definition)).unwrap();
        MemoryResourceManager::record(&mut cx, "nested").unwrap();
        manager.commit(&mut cx, &mut nested).unwrap();

        manager.commit(&mut cx, &mut outer).unwrap();
        assert_eq!(manager.resource_manager().committed(), ["outer", "nested"]);
    }

    #[test]
    fn test_participating_rollback_marks_outer_rollback_only() {
        let mut manager = manager();
        let mut cx = ExecutionContext::new();

        let mut outer = manager.get_transaction(&mut cx, None).unwrap();
        MemoryResourceManager::record(&mut cx, "outer").unwrap();

        let mut inner = manager.get_transaction(&mut cx, None).unwrap();
        assert!(!inner.is_new_transaction());
        manager.rollback(&mut cx, &mut inner).unwrap();

        let result = manager.commit(&mut cx, &mut outer);
        assert!(matches!(result, Err(Error::UnexpectedRollback(_))));
        assert!(manager.resource_manager().committed().is_empty());
    }

    #[test]
    fn test_not_supported_runs_outside_transaction() {
        let mut manager = manager();
        let mut cx = ExecutionContext::new();

        let mut outer = manager.get_transaction(&mut cx, None).unwrap();
        let definition =
            TransactionDefinition::new().with_propagation(Propagation::NotSupported);
        let mut detached = manager.get_transaction(&mut cx, Some(&definition)).unwrap();

        // No journal is bound while the outer transaction is suspended.
        assert!(matches!(
            MemoryResourceManager::record(&mut cx, "a"),
            Err(Error::NoResourceBound(_))
        ));
        manager.commit(&mut cx, &mut detached).unwrap();

        MemoryResourceManager::record(&mut cx, "outer work").unwrap();
        manager.commit(&mut cx, &mut outer).unwrap();
        assert_eq!(manager.resource_manager().committed(), ["outer work"]);
    }
}
