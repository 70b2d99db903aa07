use tracing::error;

use crate::context::ExecutionContext;
use crate::definition::{Propagation, TransactionDefinition};
use crate::error::Result;
use crate::manager::TransactionManager;
use crate::resource::ResourceManager;
use crate::status::TransactionStatus;

/// Executes a closure within a demarcated transaction.
///
/// This function handles the transaction lifecycle automatically:
/// - Obtains a transaction according to the definition's propagation behavior
/// - Executes the provided closure
/// - Commits on success
/// - Rolls back on error
///
/// The closure receives the execution context (for recording work against the
/// bound resource and registering synchronization callbacks) and the
/// transaction status (e.g. to mark the transaction rollback-only without
/// raising an error).
///
/// A `None` definition means all defaults: `Required` propagation, read-write,
/// manager-default timeout.
///
/// # Examples
///
/// ```rust
/// use tx_kernel::memory::MemoryResourceManager;
/// use tx_kernel::{with_transaction, ExecutionContext, TransactionManager};
///
/// let mut manager = TransactionManager::new(MemoryResourceManager::new());
/// let mut cx = ExecutionContext::new();
///
/// with_transaction(&mut manager, &mut cx, None, |cx, _status| {
///     MemoryResourceManager::record(cx, "insert user")?;
///     MemoryResourceManager::record(cx, "insert profile")?;
///     Ok(())
/// })?;
///
/// assert_eq!(
///     manager.resource_manager().committed(),
///     ["insert user", "insert profile"]
/// );
/// # Ok::<(), tx_kernel::Error>(())
/// ```
///
/// ## Error Handling
///
/// ```rust
/// use tx_kernel::memory::MemoryResourceManager;
/// use tx_kernel::{with_transaction, Error, ExecutionContext, TransactionManager};
///
/// let mut manager = TransactionManager::new(MemoryResourceManager::new());
/// let mut cx = ExecutionContext::new();
///
/// let result: Result<(), Error> = with_transaction(&mut manager, &mut cx, None, |cx, _status| {
///     MemoryResourceManager::record(cx, "insert user")?;
///     // If this fails, the entire transaction is rolled back
///     Err(Error::TransactionUsage("validation failed".into()))
/// });
///
/// assert!(result.is_err());
/// assert!(manager.resource_manager().committed().is_empty());
/// # Ok::<(), tx_kernel::Error>(())
/// ```
pub fn with_transaction<R, F, T>(
    manager: &mut TransactionManager<R>,
    cx: &mut ExecutionContext,
    definition: Option<&TransactionDefinition>,
    f: F,
) -> Result<T>
where
    R: ResourceManager,
    F: FnOnce(&mut ExecutionContext, &mut TransactionStatus<R>) -> Result<T>,
{
    let mut status = manager.get_transaction(cx, definition)?;

    match f(cx, &mut status) {
        Ok(result) => {
            manager.commit(cx, &mut status)?;
            Ok(result)
        }
        Err(err) => match manager.rollback(cx, &mut status) {
            Ok(()) => Err(err),
            Err(rollback_err) => {
                error!(error = %err, "application failure overridden by rollback failure");
                Err(rollback_err)
            }
        },
    }
}

/// Executes a closure within a nested transaction.
///
/// This is a convenience wrapper around [`with_transaction`] with
/// `Propagation::Nested`: against an existing transaction the closure runs
/// within a savepoint scope, so a failure rolls back only the work done since
/// the savepoint while the outer transaction can still commit. Without an
/// existing transaction it behaves like `Required`.
///
/// The transaction manager must have nested transactions enabled via
/// [`TransactionManager::with_nested_transaction_allowed`].
///
/// Because the executor borrows the manager exclusively for the duration of
/// the closure, nested scopes are opened between executor calls on the same
/// manager, around an outer status obtained from
/// [`TransactionManager::get_transaction`].
///
/// # Examples
///
/// ```rust
/// use tx_kernel::memory::MemoryResourceManager;
/// use tx_kernel::{
///     with_nested_transaction, Error, ExecutionContext, TransactionManager,
/// };
///
/// let mut manager = TransactionManager::new(MemoryResourceManager::new())
///     .with_nested_transaction_allowed(true);
/// let mut cx = ExecutionContext::new();
///
/// let mut outer = manager.get_transaction(&mut cx, None)?;
/// MemoryResourceManager::record(&mut cx, "insert user")?;
///
/// // If the audit entry fails, only the nested scope is rolled back
/// let audit: Result<(), Error> = with_nested_transaction(&mut manager, &mut cx, |cx, _status| {
///     MemoryResourceManager::record(cx, "append audit entry")?;
///     Err(Error::TransactionUsage("audit store unavailable".into()))
/// });
/// assert!(audit.is_err());
///
/// manager.commit(&mut cx, &mut outer)?;
/// assert_eq!(manager.resource_manager().committed(), ["insert user"]);
/// # Ok::<(), tx_kernel::Error>(())
/// ```
pub fn with_nested_transaction<R, F, T>(
    manager: &mut TransactionManager<R>,
    cx: &mut ExecutionContext,
    f: F,
) -> Result<T>
where
    R: ResourceManager,
    F: FnOnce(&mut ExecutionContext, &mut TransactionStatus<R>) -> Result<T>,
{
    let definition = TransactionDefinition::new().with_propagation(Propagation::Nested);
    with_transaction(manager, cx, Some(&definition), f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::MemoryResourceManager;

    #[test]
    fn test_commits_on_success() {
        let mut manager = TransactionManager::new(MemoryResourceManager::new());
        let mut cx = ExecutionContext::new();

        let value = with_transaction(&mut manager, &mut cx, None, |cx, _status| {
            MemoryResourceManager::record(cx, "a")?;
            Ok(42)
        })
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(manager.resource_manager().committed(), ["a"]);
    }

    #[test]
    fn test_rolls_back_on_error() {
        let mut manager = TransactionManager::new(MemoryResourceManager::new());
        let mut cx = ExecutionContext::new();

        let result: Result<()> = with_transaction(&mut manager, &mut cx, None, |cx, _status| {
            MemoryResourceManager::record(cx, "a")?;
            Err(Error::TransactionUsage("validation failed".into()))
        });

        assert!(matches!(result, Err(Error::TransactionUsage(_))));
        assert!(manager.resource_manager().committed().is_empty());
        assert!(!cx.is_synchronization_active());
    }

    #[test]
    fn test_rollback_only_status_completes_cleanly() {
        let mut manager = TransactionManager::new(MemoryResourceManager::new());
        let mut cx = ExecutionContext::new();

        with_transaction(&mut manager, &mut cx, None, |cx, status| {
            MemoryResourceManager::record(cx, "a")?;
            status.set_rollback_only();
            Ok(())
        })
        .unwrap();

        assert!(manager.resource_manager().committed().is_empty());
    }

    #[test]
    fn test_nested_failure_leaves_outer_intact() {
        let mut manager = TransactionManager::new(MemoryResourceManager::new())
            .with_nested_transaction_allowed(true);
        let mut cx = ExecutionContext::new();

        let mut outer = manager.get_transaction(&mut cx, None).unwrap();
        MemoryResourceManager::record(&mut cx, "outer").unwrap();

        let nested: Result<()> = with_nested_transaction(&mut manager, &mut cx, |cx, _status| {
            MemoryResourceManager::record(cx, "nested")?;
            Err(Error::TransactionUsage("nested failure".into()))
        });
        assert!(nested.is_err());

        manager.commit(&mut cx, &mut outer).unwrap();
        assert_eq!(manager.resource_manager().committed(), ["outer"]);
    }
}
