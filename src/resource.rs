use crate::context::ExecutionContext;
use crate::definition::TransactionDefinition;
use crate::error::{Error, Result};

/// Capability of a transaction handle that knows its own rollback-only state,
/// e.g. because an outer coordinator marked the shared transaction for
/// rollback.
pub trait SmartTransaction {
    fn is_rollback_only(&self) -> bool;
}

/// Capability of a transaction handle that supports named savepoints, used to
/// implement nested transactions without suspending the outer one.
pub trait SavepointManager {
    fn create_savepoint(&mut self, name: &str) -> Result<()>;
    fn rollback_to_savepoint(&mut self, name: &str) -> Result<()>;
    fn release_savepoint(&mut self, name: &str) -> Result<()>;
}

/// Hook contract a concrete resource manager (SQL connection manager,
/// message-session manager, in-memory store, ...) supplies to the
/// [`TransactionManager`](crate::TransactionManager).
///
/// The engine drives propagation, suspend/resume pairing, synchronization
/// callbacks, and completion ordering; the hooks own the actual resource
/// lifecycle. All hooks are treated as opaque synchronous calls - the engine
/// enforces no timeout of its own, it only resolves an effective timeout
/// value and hands it to [`do_begin`](Self::do_begin) inside the definition.
///
/// `Transaction` is the opaque per-attempt handle, `Suspended` whatever state
/// [`do_suspend`](Self::do_suspend) detaches from the context so a new
/// transaction can take its place. Managers that do not support suspension
/// can use `type Suspended = ();` and keep the default hook bodies.
pub trait ResourceManager: Sized {
    /// Opaque transaction handle produced by [`do_get_transaction`](Self::do_get_transaction).
    type Transaction;
    /// Opaque state detached by [`do_suspend`](Self::do_suspend) and handed
    /// back to [`do_resume`](Self::do_resume).
    type Suspended;

    /// Produces a transaction handle for the current context. The handle may
    /// represent an already-running transaction; see
    /// [`is_existing_transaction`](Self::is_existing_transaction).
    fn do_get_transaction(&mut self, cx: &mut ExecutionContext) -> Result<Self::Transaction>;

    /// Whether the handle represents an already-active transaction.
    fn is_existing_transaction(&mut self, _transaction: &Self::Transaction) -> Result<bool> {
        Ok(false)
    }

    /// Starts a new resource transaction for the given handle. The definition
    /// carries the effective timeout (manager default already applied).
    fn do_begin(
        &mut self,
        transaction: &mut Self::Transaction,
        definition: &TransactionDefinition,
        cx: &mut ExecutionContext,
    ) -> Result<()>;

    /// Detaches the handle's resources from the context so another
    /// transaction can run; the returned state is later passed to
    /// [`do_resume`](Self::do_resume).
    fn do_suspend(
        &mut self,
        _transaction: &mut Self::Transaction,
        _cx: &mut ExecutionContext,
    ) -> Result<Self::Suspended> {
        Err(Error::SuspensionNotSupported)
    }

    /// Reattaches previously suspended resources to the context.
    fn do_resume(&mut self, _suspended: Self::Suspended, _cx: &mut ExecutionContext) -> Result<()> {
        Err(Error::SuspensionNotSupported)
    }

    /// Commits the resource transaction. Rollback-only markers have already
    /// been handled by the engine; this hook need not check them.
    fn do_commit(
        &mut self,
        transaction: &mut Self::Transaction,
        cx: &mut ExecutionContext,
    ) -> Result<()>;

    /// Rolls the resource transaction back.
    fn do_rollback(
        &mut self,
        transaction: &mut Self::Transaction,
        cx: &mut ExecutionContext,
    ) -> Result<()>;

    /// Marks an existing transaction rollback-only, used when participating
    /// in a transaction this attempt does not own.
    fn do_set_rollback_only(
        &mut self,
        _transaction: &mut Self::Transaction,
        _cx: &mut ExecutionContext,
    ) -> Result<()> {
        Err(Error::IllegalTransactionState(
            "participating in an existing transaction but the resource manager \
             cannot mark it rollback-only"
                .into(),
        ))
    }

    /// Whether nested transactions are realized through savepoints on the
    /// existing handle (the default) or through a logically new transaction
    /// within the existing one.
    fn use_savepoint_for_nested_transaction(&self) -> bool {
        true
    }

    /// Releases resources held by a completed transaction. Must not fail;
    /// anything that goes wrong here should be logged by the implementation,
    /// not surfaced.
    fn do_cleanup_after_completion(
        &mut self,
        _transaction: Self::Transaction,
        _cx: &mut ExecutionContext,
    ) {
    }

    /// Projects the handle's [`SmartTransaction`] capability, if it has one.
    /// Checked exactly where the engine needs a global rollback-only answer.
    fn smart_transaction(_transaction: &Self::Transaction) -> Option<&dyn SmartTransaction> {
        None
    }

    /// Projects the handle's [`SavepointManager`] capability, if it has one.
    /// Checked exactly where the engine performs savepoint operations.
    fn savepoint_manager(
        _transaction: &mut Self::Transaction,
    ) -> Option<&mut dyn SavepointManager> {
        None
    }
}
