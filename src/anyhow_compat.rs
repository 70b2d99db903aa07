use tracing::error;

use crate::context::ExecutionContext;
use crate::definition::{Propagation, TransactionDefinition};
use crate::manager::TransactionManager;
use crate::resource::ResourceManager;
use crate::status::TransactionStatus;

/// Executes a closure within a demarcated transaction, using `anyhow::Error`
/// for error handling.
///
/// This is a convenience wrapper around the main
/// [`with_transaction`](crate::with_transaction) function that accepts
/// closures returning `anyhow::Result<T>` instead of `crate::Result<T>`, for
/// application code that already standardizes on `anyhow`.
///
/// # Examples
///
/// ```rust
/// use tx_kernel::memory::MemoryResourceManager;
/// use tx_kernel::{with_transaction_anyhow, ExecutionContext, TransactionManager};
///
/// # fn example() -> anyhow::Result<()> {
/// let mut manager = TransactionManager::new(MemoryResourceManager::new());
/// let mut cx = ExecutionContext::new();
///
/// with_transaction_anyhow(&mut manager, &mut cx, None, |cx, _status| {
///     MemoryResourceManager::record(cx, "insert user")?;
///     Ok(())
/// })?;
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
pub fn with_transaction_anyhow<R, F, T>(
    manager: &mut TransactionManager<R>,
    cx: &mut ExecutionContext,
    definition: Option<&TransactionDefinition>,
    f: F,
) -> anyhow::Result<T>
where
    R: ResourceManager,
    F: FnOnce(&mut ExecutionContext, &mut TransactionStatus<R>) -> anyhow::Result<T>,
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
                Err(rollback_err.into())
            }
        },
    }
}

/// Executes a closure within a nested transaction, using `anyhow::Error` for
/// error handling.
///
/// The convenience counterpart of
/// [`with_nested_transaction`](crate::with_nested_transaction); the
/// transaction manager must have nested transactions enabled.
///
/// # Examples
///
/// ```rust
/// use tx_kernel::memory::MemoryResourceManager;
/// use tx_kernel::{with_nested_transaction_anyhow, ExecutionContext, TransactionManager};
///
/// # fn example() -> anyhow::Result<()> {
/// let mut manager = TransactionManager::new(MemoryResourceManager::new())
///     .with_nested_transaction_allowed(true);
/// let mut cx = ExecutionContext::new();
///
/// let mut outer = manager.get_transaction(&mut cx, None)?;
/// MemoryResourceManager::record(&mut cx, "insert user")?;
///
/// let audit: anyhow::Result<()> = with_nested_transaction_anyhow(&mut manager, &mut cx, |cx, _status| {
///     MemoryResourceManager::record(cx, "append audit entry")?;
///     anyhow::bail!("audit store unavailable");
/// });
/// assert!(audit.is_err());
///
/// manager.commit(&mut cx, &mut outer)?;
/// assert_eq!(manager.resource_manager().committed(), ["insert user"]);
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
pub fn with_nested_transaction_anyhow<R, F, T>(
    manager: &mut TransactionManager<R>,
    cx: &mut ExecutionContext,
    f: F,
) -> anyhow::Result<T>
where
    R: ResourceManager,
    F: FnOnce(&mut ExecutionContext, &mut TransactionStatus<R>) -> anyhow::Result<T>,
{
    let definition = TransactionDefinition::new().with_propagation(Propagation::Nested);
    with_transaction_anyhow(manager, cx, Some(&definition), f)
}
