//! # tx-kernel
//!
//! A resource-agnostic transaction demarcation engine with propagation
//! behaviors, suspend/resume, savepoints, and synchronization callbacks.
//!
//! ## Features
//!
//! - **Propagation Behaviors**: `Required`, `RequiresNew`, `Nested`,
//!   `Mandatory`, `Supports`, `NotSupported`, and `Never`, resolved against
//!   existing-transaction detection
//! - **Resource-Agnostic**: The engine drives any [`ResourceManager`]
//!   implementation through a small hook contract; it never touches the
//!   resource itself
//! - **Explicit Context**: Transactional state lives in an explicit
//!   [`ExecutionContext`] value threaded by the caller, not in thread-local
//!   storage, so the engine works the same under threads and async runtimes
//! - **Suspend/Resume**: `RequiresNew` and `NotSupported` detach the current
//!   transaction and its synchronization callbacks, and restore them on
//!   completion
//! - **Nested Transactions**: Savepoint-scoped inner transactions whose
//!   rollback discards only the work done since the savepoint
//! - **Synchronization Callbacks**: Ordered before/after-commit and
//!   completion hooks, isolated from each other's failures
//!
//! ## Quick Start
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tx-kernel = "0.1"
//! ```
//!
//! ## Examples
//!
//! ### Basic Transaction
//!
//! ```rust
//! use tx_kernel::memory::MemoryResourceManager;
//! use tx_kernel::{with_transaction, ExecutionContext, TransactionManager};
//!
//! let mut manager = TransactionManager::new(MemoryResourceManager::new());
//! let mut cx = ExecutionContext::new();
//!
//! with_transaction(&mut manager, &mut cx, None, |cx, _status| {
//!     MemoryResourceManager::record(cx, "insert user")?;
//!     Ok(())
//! })?;
//!
//! assert_eq!(manager.resource_manager().committed(), ["insert user"]);
//! # Ok::<(), tx_kernel::Error>(())
//! ```
//!
//! ### Propagation
//!
//! ```rust
//! use tx_kernel::memory::MemoryResourceManager;
//! use tx_kernel::{
//!     ExecutionContext, Propagation, TransactionDefinition, TransactionManager,
//! };
//!
//! let mut manager = TransactionManager::new(MemoryResourceManager::new());
//! let mut cx = ExecutionContext::new();
//!
//! let mut outer = manager.get_transaction(&mut cx, None)?;
//! MemoryResourceManager::record(&mut cx, "outer work")?;
//!
//! // The inner transaction commits independently of the outer one.
//! let definition = TransactionDefinition::new().with_propagation(Propagation::RequiresNew);
//! let mut inner = manager.get_transaction(&mut cx, Some(&definition))?;
//! MemoryResourceManager::record(&mut cx, "inner work")?;
//! manager.commit(&mut cx, &mut inner)?;
//!
//! manager.rollback(&mut cx, &mut outer)?;
//! assert_eq!(manager.resource_manager().committed(), ["inner work"]);
//! # Ok::<(), tx_kernel::Error>(())
//! ```
//!
//! ### Synchronization Callbacks
//!
//! ```rust
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! use tx_kernel::memory::MemoryResourceManager;
//! use tx_kernel::{
//!     CompletionStatus, ExecutionContext, TransactionManager, TransactionSynchronization,
//! };
//!
//! #[derive(Default)]
//! struct CacheInvalidation {
//!     invalidated: AtomicBool,
//! }
//!
//! impl TransactionSynchronization for CacheInvalidation {
//!     fn after_completion(&self, status: CompletionStatus) -> tx_kernel::Result<()> {
//!         if status == CompletionStatus::Committed {
//!             self.invalidated.store(true, Ordering::Relaxed);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut manager = TransactionManager::new(MemoryResourceManager::new());
//! let mut cx = ExecutionContext::new();
//!
//! let mut status = manager.get_transaction(&mut cx, None)?;
//! let invalidation = Arc::new(CacheInvalidation::default());
//! cx.register_synchronization(Arc::clone(&invalidation) as _)?;
//!
//! MemoryResourceManager::record(&mut cx, "update user")?;
//! manager.commit(&mut cx, &mut status)?;
//!
//! assert!(invalidation.invalidated.load(Ordering::Relaxed));
//! # Ok::<(), tx_kernel::Error>(())
//! ```
//!
//! ### Rollback-Only
//!
//! ```rust
//! use tx_kernel::memory::MemoryResourceManager;
//! use tx_kernel::{Error, ExecutionContext, TransactionManager};
//!
//! let mut manager = TransactionManager::new(MemoryResourceManager::new());
//! let mut cx = ExecutionContext::new();
//!
//! let mut outer = manager.get_transaction(&mut cx, None)?;
//!
//! // An inner scope participates and vetoes the shared transaction.
//! let mut inner = manager.get_transaction(&mut cx, None)?;
//! manager.rollback(&mut cx, &mut inner)?;
//!
//! // The outer commit turns into a rollback and reports it.
//! let result = manager.commit(&mut cx, &mut outer);
//! assert!(matches!(result, Err(Error::UnexpectedRollback(_))));
//! # Ok::<(), tx_kernel::Error>(())
//! ```
//!
//! ## How It Works
//!
//! 1. **TransactionDefinition**: Describes the requested transaction
//!    (propagation, isolation, timeout, read-only, name)
//! 2. **TransactionManager**: Resolves the definition against the current
//!    state and hands out a **TransactionStatus** to complete exactly once
//! 3. **ResourceManager**: Supplies the begin/commit/rollback/suspend hooks
//!    for the actual resource; capabilities like savepoints and a global
//!    rollback-only marker are projected per transaction handle
//! 4. **ExecutionContext**: Carries the bound resources, the registered
//!    synchronization callbacks, and the current transaction characteristics
//!    for one logical unit of work
//!
//! ## Limitations
//!
//! - The engine is synchronous; resource-manager hooks must not block on an
//!   async runtime
//! - Timeouts are resolved and passed through to the resource manager, never
//!   enforced by the engine itself
//! - One `ExecutionContext` must not be shared between concurrently running
//!   units of work
//!
//! ## License
//!
//! Licensed under either of Apache License, Version 2.0 or MIT license at your option.

pub mod context;
pub mod definition;
pub mod error;
pub mod executor;
pub mod manager;
pub mod memory;
pub mod resource;
pub mod status;
pub mod synchronization;

#[cfg(feature = "anyhow")]
pub mod anyhow_compat;

pub use context::ExecutionContext;
pub use definition::{
    IsolationLevel, Propagation, TransactionDefinition, DEFAULT_TIMEOUT,
};
pub use error::{Error, Result};
pub use executor::{with_nested_transaction, with_transaction};
pub use manager::{SynchronizationPolicy, TransactionManager};
pub use resource::{ResourceManager, SavepointManager, SmartTransaction};
pub use status::{SuspendedResources, TransactionStatus};
pub use synchronization::{
    CompletionStatus, SharedSynchronization, TransactionSynchronization, DEFAULT_ORDER,
};

#[cfg(feature = "anyhow")]
pub use anyhow_compat::{with_nested_transaction_anyhow, with_transaction_anyhow};

/// Convenience re-exports for common use cases
pub mod prelude {
    pub use crate::context::ExecutionContext;
    pub use crate::definition::{IsolationLevel, Propagation, TransactionDefinition};
    pub use crate::error::{Error, Result};
    pub use crate::executor::{with_nested_transaction, with_transaction};
    pub use crate::manager::{SynchronizationPolicy, TransactionManager};
    pub use crate::resource::{ResourceManager, SavepointManager, SmartTransaction};
    pub use crate::status::TransactionStatus;
    pub use crate::synchronization::{CompletionStatus, TransactionSynchronization};
}
