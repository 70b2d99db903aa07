use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, warn};

use crate::context::ExecutionContext;
use crate::definition::{Propagation, TransactionDefinition, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};
use crate::resource::ResourceManager;
use crate::status::{SuspendedResources, TransactionStatus};
use crate::synchronization::{CompletionStatus, SharedSynchronization};

/// When the manager activates the context's synchronization list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SynchronizationPolicy {
    /// Activate synchronization for every demarcated scope, including empty
    /// transactions without an underlying resource transaction.
    #[default]
    Always,
    /// Activate synchronization only for actual resource transactions.
    OnActualTransaction,
    /// Never activate synchronization.
    Never,
}

static SAVEPOINT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Savepoint names are timestamped; the sequence disambiguates savepoints
/// created within the same millisecond.
fn next_savepoint_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64);
    format!("savepoint_{millis}_{}", SAVEPOINT_SEQ.fetch_add(1, Ordering::Relaxed))
}

/// Generic, resource-agnostic transaction demarcation engine.
///
/// The manager owns a [`ResourceManager`] hook implementation and drives it
/// through the transaction lifecycle: propagation-behavior resolution against
/// existing-transaction detection, suspend/resume of the ambient
/// transactional context, nested-transaction savepoints, and the ordered
/// synchronization-callback protocol around commit and rollback.
///
/// All operations take an explicit [`ExecutionContext`] representing the
/// current logical unit of work; within one context, operations are strictly
/// sequential, and independent contexts never share state.
///
/// # Examples
///
/// ```rust
/// use tx_kernel::memory::MemoryResourceManager;
/// use tx_kernel::{ExecutionContext, TransactionDefinition, TransactionManager};
///
/// let mut manager = TransactionManager::new(MemoryResourceManager::new());
/// let mut cx = ExecutionContext::new();
///
/// let mut status = manager.get_transaction(&mut cx, None)?;
/// assert!(status.is_new_transaction());
/// MemoryResourceManager::record(&mut cx, "insert user")?;
/// manager.commit(&mut cx, &mut status)?;
///
/// assert_eq!(manager.resource_manager().committed(), ["insert user"]);
/// # Ok::<(), tx_kernel::Error>(())
/// ```
pub struct TransactionManager<R: ResourceManager> {
    resource_manager: R,
    synchronization: SynchronizationPolicy,
    default_timeout: i32,
    nested_transaction_allowed: bool,
    fail_early_on_global_rollback_only: bool,
    rollback_on_commit_failure: bool,
    commit_on_global_rollback_only: bool,
}

impl<R: ResourceManager> TransactionManager<R> {
    /// Creates a manager around the given resource-manager hooks with the
    /// default policies: synchronization always on, no default timeout,
    /// nested transactions disallowed, fail-late on global rollback-only, no
    /// rollback on commit failure.
    pub fn new(resource_manager: R) -> Self {
        Self {
            resource_manager,
            synchronization: SynchronizationPolicy::Always,
            default_timeout: DEFAULT_TIMEOUT,
            nested_transaction_allowed: false,
            fail_early_on_global_rollback_only: false,
            rollback_on_commit_failure: false,
            commit_on_global_rollback_only: false,
        }
    }

    pub fn with_synchronization(mut self, policy: SynchronizationPolicy) -> Self {
        self.synchronization = policy;
        self
    }

    /// Default timeout in seconds applied when a definition carries `-1`.
    pub fn with_default_timeout(mut self, default_timeout: i32) -> Self {
        self.default_timeout = default_timeout;
        self
    }

    /// Allows `Propagation::Nested` against an existing transaction.
    pub fn with_nested_transaction_allowed(mut self, allowed: bool) -> Self {
        self.nested_transaction_allowed = allowed;
        self
    }

    /// Raise [`Error::UnexpectedRollback`] as early as a participating commit
    /// observes a globally rollback-only transaction, instead of only at the
    /// outermost transaction boundary.
    pub fn with_fail_early_on_global_rollback_only(mut self, fail_early: bool) -> Self {
        self.fail_early_on_global_rollback_only = fail_early;
        self
    }

    /// Attempt a compensating rollback when the commit hook fails. If that
    /// rollback fails too, the rollback failure is what propagates and the
    /// original commit failure is demoted to a log entry.
    pub fn with_rollback_on_commit_failure(mut self, rollback: bool) -> Self {
        self.rollback_on_commit_failure = rollback;
        self
    }

    /// Let commit proceed even when the transaction is globally marked
    /// rollback-only; a silent rollback by the resource manager is then
    /// surfaced as [`Error::UnexpectedRollback`] after the commit hook runs.
    pub fn with_commit_on_global_rollback_only(mut self, commit: bool) -> Self {
        self.commit_on_global_rollback_only = commit;
        self
    }

    pub fn resource_manager(&self) -> &R {
        &self.resource_manager
    }

    pub fn resource_manager_mut(&mut self) -> &mut R {
        &mut self.resource_manager
    }

    /// Resolves the effective timeout for a definition: the definition's own
    /// value when set, the manager default otherwise.
    pub fn determine_timeout(&self, definition: &TransactionDefinition) -> i32 {
        if definition.timeout() >= 0 {
            definition.timeout()
        } else {
            self.default_timeout
        }
    }

    // ------------------------------------------------------------------
    // GetTransaction
    // ------------------------------------------------------------------

    /// Returns a transaction status according to the definition's propagation
    /// behavior, creating, suspending, or joining transactions as required.
    /// A `None` definition means all defaults (`Required`, unspecified
    /// isolation, manager-default timeout, read-write).
    ///
    /// The returned status must be passed to exactly one of
    /// [`commit`](Self::commit) or [`rollback`](Self::rollback).
    pub fn get_transaction(
        &mut self,
        cx: &mut ExecutionContext,
        definition: Option<&TransactionDefinition>,
    ) -> Result<TransactionStatus<R>> {
        let default_definition;
        let definition = match definition {
            Some(definition) => definition,
            None => {
                default_definition = TransactionDefinition::new();
                &default_definition
            }
        };

        let transaction = self.resource_manager.do_get_transaction(cx)?;
        let debug_enabled = tracing::enabled!(tracing::Level::DEBUG);

        if self.resource_manager.is_existing_transaction(&transaction)? {
            return self.handle_existing_transaction(cx, definition, transaction, debug_enabled);
        }

        if definition.timeout() < DEFAULT_TIMEOUT {
            return Err(Error::InvalidTimeout(definition.timeout()));
        }

        match definition.propagation() {
            Propagation::Mandatory => Err(Error::IllegalTransactionState(
                "no existing transaction found for transaction marked with propagation \
                 'mandatory'"
                    .into(),
            )),
            Propagation::Required | Propagation::RequiresNew | Propagation::Nested => {
                // No actual transaction to suspend, but an independently
                // active synchronization scope still gets detached.
                let suspended = self.suspend(cx, None)?;
                if debug_enabled {
                    debug!(
                        name = ?definition.name(),
                        propagation = ?definition.propagation(),
                        "creating new transaction"
                    );
                }
                self.start_transaction(cx, definition, transaction, debug_enabled, suspended)
            }
            Propagation::Supports | Propagation::NotSupported | Propagation::Never => {
                if definition.isolation_level().is_some() && debug_enabled {
                    debug!(
                        "custom isolation level specified but no actual transaction will be \
                         started; isolation is effectively ignored"
                    );
                }
                let new_synchronization = self.synchronization == SynchronizationPolicy::Always
                    && !cx.is_synchronization_active();
                let status = TransactionStatus::new(
                    None,
                    true,
                    new_synchronization,
                    definition.is_read_only(),
                    debug_enabled,
                    None,
                );
                self.prepare_synchronization(cx, &status, definition)?;
                Ok(status)
            }
        }
    }

    /// Dispatch table for a request made while a transaction is already
    /// active in the context.
    fn handle_existing_transaction(
        &mut self,
        cx: &mut ExecutionContext,
        definition: &TransactionDefinition,
        mut transaction: R::Transaction,
        debug_enabled: bool,
    ) -> Result<TransactionStatus<R>> {
        match definition.propagation() {
            Propagation::Never => Err(Error::IllegalTransactionState(
                "existing transaction found for transaction marked with propagation 'never'"
                    .into(),
            )),
            Propagation::NotSupported => {
                if debug_enabled {
                    debug!("suspending current transaction");
                }
                let suspended = self.suspend(cx, Some(&mut transaction))?;
                let new_synchronization = self.synchronization == SynchronizationPolicy::Always
                    && !cx.is_synchronization_active();
                let status = TransactionStatus::new(
                    None,
                    false,
                    new_synchronization,
                    definition.is_read_only(),
                    debug_enabled,
                    suspended,
                );
                self.prepare_synchronization(cx, &status, definition)?;
                Ok(status)
            }
            Propagation::RequiresNew => {
                if debug_enabled {
                    debug!(name = ?definition.name(), "suspending current transaction, creating new one");
                }
                let suspended = self.suspend(cx, Some(&mut transaction))?;
                self.start_transaction(cx, definition, transaction, debug_enabled, suspended)
            }
            Propagation::Nested => {
                if !self.nested_transaction_allowed {
                    return Err(Error::NestedTransactionNotSupported(
                        "nested transactions are disallowed by this transaction manager; \
                         enable them via 'with_nested_transaction_allowed'"
                            .into(),
                    ));
                }
                if debug_enabled {
                    debug!(name = ?definition.name(), "creating nested transaction");
                }
                if self.resource_manager.use_savepoint_for_nested_transaction() {
                    // Nested scope within the existing transaction, delimited
                    // by a savepoint on the existing handle.
                    let mut status = TransactionStatus::new(
                        Some(transaction),
                        false,
                        false,
                        definition.is_read_only(),
                        debug_enabled,
                        None,
                    );
                    status.create_and_hold_savepoint(next_savepoint_name())?;
                    Ok(status)
                } else {
                    // Resource managers like JTA-style coordinators begin a
                    // logically new transaction within the existing one.
                    self.start_transaction(cx, definition, transaction, debug_enabled, None)
                }
            }
            Propagation::Required | Propagation::Supports | Propagation::Mandatory => {
                if !definition.is_read_only() && cx.is_current_transaction_read_only() {
                    return Err(Error::IllegalTransactionState(
                        "cannot participate read-write in an existing read-only transaction"
                            .into(),
                    ));
                }
                if debug_enabled {
                    debug!("participating in existing transaction");
                }
                let new_synchronization = self.synchronization != SynchronizationPolicy::Never
                    && !cx.is_synchronization_active();
                let status = TransactionStatus::new(
                    Some(transaction),
                    false,
                    new_synchronization,
                    definition.is_read_only(),
                    debug_enabled,
                    None,
                );
                self.prepare_synchronization(cx, &status, definition)?;
                Ok(status)
            }
        }
    }

    /// Begins a brand-new resource transaction, restoring whatever was
    /// suspended when the begin hook fails.
    fn start_transaction(
        &mut self,
        cx: &mut ExecutionContext,
        definition: &TransactionDefinition,
        transaction: R::Transaction,
        debug_enabled: bool,
        suspended: Option<SuspendedResources<R::Suspended>>,
    ) -> Result<TransactionStatus<R>> {
        let new_synchronization = self.synchronization != SynchronizationPolicy::Never
            && !cx.is_synchronization_active();
        let mut status = TransactionStatus::new(
            Some(transaction),
            true,
            new_synchronization,
            definition.is_read_only(),
            debug_enabled,
            suspended,
        );
        let effective = self.effective_definition(definition);
        let begin_result = match status.transaction_mut() {
            Ok(transaction) => self.resource_manager.do_begin(transaction, &effective, cx),
            Err(err) => Err(err),
        };
        match begin_result {
            Ok(()) => {
                self.prepare_synchronization(cx, &status, &effective)?;
                Ok(status)
            }
            Err(begin_err) => {
                let suspended = status.take_suspended();
                Err(self.resume_after_begin_failure(cx, suspended, begin_err))
            }
        }
    }

    /// Substitutes the manager default timeout into a definition that asks
    /// for it, so the begin hook always observes the effective value.
    fn effective_definition<'a>(
        &self,
        definition: &'a TransactionDefinition,
    ) -> Cow<'a, TransactionDefinition> {
        let timeout = self.determine_timeout(definition);
        if timeout == definition.timeout() {
            Cow::Borrowed(definition)
        } else {
            Cow::Owned(definition.clone().with_timeout(timeout))
        }
    }

    fn resume_after_begin_failure(
        &mut self,
        cx: &mut ExecutionContext,
        suspended: Option<SuspendedResources<R::Suspended>>,
        begin_err: Error,
    ) -> Error {
        if let Err(resume_err) = self.resume(cx, suspended) {
            error!(
                begin_error = %begin_err,
                "failed to resume the suspended transaction after a failed begin - \
                 the begin failure is overridden by the resume failure"
            );
            return resume_err;
        }
        begin_err
    }

    /// Initializes the context for a freshly created status that owns the
    /// synchronization scope.
    fn prepare_synchronization(
        &self,
        cx: &mut ExecutionContext,
        status: &TransactionStatus<R>,
        definition: &TransactionDefinition,
    ) -> Result<()> {
        if status.is_new_synchronization() {
            cx.set_actual_transaction_active(status.has_transaction());
            cx.set_current_transaction_isolation_level(definition.isolation_level());
            cx.set_current_transaction_read_only(definition.is_read_only());
            cx.set_current_transaction_name(definition.name().map(str::to_string));
            cx.init_synchronization()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Suspend / resume
    // ------------------------------------------------------------------

    /// Detaches the current transactional state of the context so another
    /// transaction (or none) can take its place. Returns `None` when there is
    /// nothing to suspend.
    fn suspend(
        &mut self,
        cx: &mut ExecutionContext,
        transaction: Option<&mut R::Transaction>,
    ) -> Result<Option<SuspendedResources<R::Suspended>>> {
        if cx.is_synchronization_active() {
            let suspended_synchronizations = self.suspend_synchronizations(cx)?;
            let resource = match transaction {
                Some(transaction) => {
                    match self.resource_manager.do_suspend(transaction, cx) {
                        Ok(resource) => Some(resource),
                        Err(suspend_err) => {
                            // Put the synchronizations back before surfacing
                            // the failure.
                            if let Err(resume_err) =
                                self.resume_synchronizations(cx, suspended_synchronizations)
                            {
                                error!(
                                    suspend_error = %suspend_err,
                                    "failed to restore synchronizations after a failed suspend"
                                );
                                return Err(resume_err);
                            }
                            return Err(suspend_err);
                        }
                    }
                }
                None => None,
            };
            let name = cx.current_transaction_name().map(str::to_string);
            cx.set_current_transaction_name(None);
            let read_only = cx.is_current_transaction_read_only();
            cx.set_current_transaction_read_only(false);
            let isolation_level = cx.current_transaction_isolation_level();
            cx.set_current_transaction_isolation_level(None);
            let was_active = cx.is_actual_transaction_active();
            cx.set_actual_transaction_active(false);
            Ok(Some(SuspendedResources {
                resource,
                synchronizations: Some(suspended_synchronizations),
                name,
                read_only,
                isolation_level,
                was_active,
            }))
        } else if let Some(transaction) = transaction {
            let resource = self.resource_manager.do_suspend(transaction, cx)?;
            Ok(Some(SuspendedResources {
                resource: Some(resource),
                synchronizations: None,
                name: None,
                read_only: false,
                isolation_level: None,
                was_active: false,
            }))
        } else {
            Ok(None)
        }
    }

    /// Reattaches previously suspended state to the context. A `None` holder
    /// is a no-op.
    fn resume(
        &mut self,
        cx: &mut ExecutionContext,
        suspended: Option<SuspendedResources<R::Suspended>>,
    ) -> Result<()> {
        let Some(holder) = suspended else {
            return Ok(());
        };
        if let Some(resource) = holder.resource {
            self.resource_manager.do_resume(resource, cx)?;
        }
        if let Some(synchronizations) = holder.synchronizations {
            cx.set_actual_transaction_active(holder.was_active);
            cx.set_current_transaction_isolation_level(holder.isolation_level);
            cx.set_current_transaction_read_only(holder.read_only);
            cx.set_current_transaction_name(holder.name);
            self.resume_synchronizations(cx, synchronizations)?;
        }
        Ok(())
    }

    fn suspend_synchronizations(
        &self,
        cx: &mut ExecutionContext,
    ) -> Result<Vec<SharedSynchronization>> {
        let synchronizations = cx.synchronizations()?;
        for synchronization in &synchronizations {
            synchronization.suspend();
        }
        cx.clear_synchronization()?;
        Ok(synchronizations)
    }

    fn resume_synchronizations(
        &self,
        cx: &mut ExecutionContext,
        synchronizations: Vec<SharedSynchronization>,
    ) -> Result<()> {
        cx.init_synchronization()?;
        for synchronization in synchronizations {
            synchronization.resume();
            cx.register_synchronization(synchronization)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// Commits the transaction described by the status, honoring local and
    /// global rollback-only markers, running the synchronization protocol,
    /// and always cleaning up (and resuming any suspended transaction)
    /// regardless of outcome.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::IllegalTransactionState`] if the status has
    /// already completed, [`Error::UnexpectedRollback`] when commit was
    /// requested but the transaction was rolled back instead, or whatever the
    /// resource-manager hooks raise.
    pub fn commit(
        &mut self,
        cx: &mut ExecutionContext,
        status: &mut TransactionStatus<R>,
    ) -> Result<()> {
        if status.is_completed() {
            return Err(Error::IllegalTransactionState(
                "transaction is already completed - do not call commit or rollback more than \
                 once per transaction"
                    .into(),
            ));
        }

        if status.is_rollback_only() {
            if status.is_debug() {
                debug!("transactional code has requested rollback");
            }
            return self.process_rollback(cx, status);
        }

        if !self.commit_on_global_rollback_only && status.is_global_rollback_only() {
            if status.is_debug() {
                debug!("global transaction is marked rollback-only but commit was requested");
            }
            // Captured before rollback processing consumes the handle.
            let outermost = status.is_new_transaction();
            self.process_rollback(cx, status)?;
            if outermost || self.fail_early_on_global_rollback_only {
                return Err(Error::UnexpectedRollback(
                    "transaction rolled back because it has been marked as rollback-only".into(),
                ));
            }
            return Ok(());
        }

        self.process_commit(cx, status)
    }

    fn process_commit(
        &mut self,
        cx: &mut ExecutionContext,
        status: &mut TransactionStatus<R>,
    ) -> Result<()> {
        let outcome = match self.attempt_commit(cx, status) {
            Ok(()) => {
                self.trigger_after_commit(cx, status);
                self.trigger_after_completion(cx, status, CompletionStatus::Committed);
                Ok(())
            }
            Err(err) => Err(err),
        };
        self.finish(cx, status, outcome)
    }

    /// The commit try-block: callback phases, savepoint release or resource
    /// commit, and the silent-rollback check.
    fn attempt_commit(
        &mut self,
        cx: &mut ExecutionContext,
        status: &mut TransactionStatus<R>,
    ) -> Result<()> {
        self.trigger_before_commit(cx, status);
        self.trigger_before_completion(cx, status);

        // Whether a successful resource commit must still surface as a
        // rollback, decided before the commit hook runs.
        let unexpected_rollback = (status.has_savepoint()
            || status.is_new_transaction()
            || self.fail_early_on_global_rollback_only)
            && status.is_global_rollback_only();

        let commit_result = if status.has_savepoint() {
            if status.is_debug() {
                debug!("releasing transaction savepoint");
            }
            status.release_held_savepoint()
        } else if status.is_new_transaction() {
            if status.is_debug() {
                debug!("initiating transaction commit");
            }
            match status.transaction_mut() {
                Ok(transaction) => self.resource_manager.do_commit(transaction, cx),
                Err(err) => Err(err),
            }
        } else {
            // Participating in a transaction someone else will complete.
            Ok(())
        };

        match commit_result {
            Ok(()) if unexpected_rollback => {
                self.trigger_after_completion(cx, status, CompletionStatus::RolledBack);
                Err(Error::UnexpectedRollback(
                    "transaction silently rolled back because it has been marked as \
                     rollback-only"
                        .into(),
                ))
            }
            Ok(()) => Ok(()),
            Err(Error::UnexpectedRollback(message)) => {
                self.trigger_after_completion(cx, status, CompletionStatus::RolledBack);
                Err(Error::UnexpectedRollback(message))
            }
            Err(commit_err) => {
                if self.rollback_on_commit_failure {
                    match self.rollback_on_commit_error(cx, status) {
                        Ok(()) => Err(commit_err),
                        Err(rollback_err) => {
                            // The original commit failure survives only in the
                            // log once the compensating rollback fails too.
                            error!(
                                commit_error = %commit_err,
                                "commit failure overridden by rollback failure"
                            );
                            Err(rollback_err)
                        }
                    }
                } else {
                    self.trigger_after_completion(cx, status, CompletionStatus::Unknown);
                    Err(commit_err)
                }
            }
        }
    }

    /// Compensating rollback after a failed commit hook.
    fn rollback_on_commit_error(
        &mut self,
        cx: &mut ExecutionContext,
        status: &mut TransactionStatus<R>,
    ) -> Result<()> {
        let rollback_result = if status.is_new_transaction() {
            if status.is_debug() {
                debug!("initiating transaction rollback after commit failure");
            }
            match status.transaction_mut() {
                Ok(transaction) => self.resource_manager.do_rollback(transaction, cx),
                Err(err) => Err(err),
            }
        } else if status.has_transaction() {
            match status.transaction_mut() {
                Ok(transaction) => self.resource_manager.do_set_rollback_only(transaction, cx),
                Err(err) => Err(err),
            }
        } else {
            Ok(())
        };
        match rollback_result {
            Ok(()) => {
                self.trigger_after_completion(cx, status, CompletionStatus::RolledBack);
                Ok(())
            }
            Err(rollback_err) => {
                self.trigger_after_completion(cx, status, CompletionStatus::Unknown);
                Err(rollback_err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Rollback
    // ------------------------------------------------------------------

    /// Rolls the transaction described by the status back.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::IllegalTransactionState`] if the status has
    /// already completed, or whatever the resource-manager hooks raise.
    pub fn rollback(
        &mut self,
        cx: &mut ExecutionContext,
        status: &mut TransactionStatus<R>,
    ) -> Result<()> {
        if status.is_completed() {
            return Err(Error::IllegalTransactionState(
                "transaction is already completed - do not call commit or rollback more than \
                 once per transaction"
                    .into(),
            ));
        }
        self.process_rollback(cx, status)
    }

    fn process_rollback(
        &mut self,
        cx: &mut ExecutionContext,
        status: &mut TransactionStatus<R>,
    ) -> Result<()> {
        self.trigger_before_completion(cx, status);

        let rollback_result = if status.has_savepoint() {
            if status.is_debug() {
                debug!("rolling back transaction to savepoint");
            }
            status.rollback_to_held_savepoint()
        } else if status.is_new_transaction() {
            if status.is_debug() {
                debug!("initiating transaction rollback");
            }
            match status.transaction_mut() {
                Ok(transaction) => self.resource_manager.do_rollback(transaction, cx),
                Err(err) => Err(err),
            }
        } else if status.has_transaction() {
            // Participating: the shared transaction cannot be rolled back
            // here, only marked.
            if status.is_debug() {
                debug!("participating in existing transaction - marking it rollback-only");
            }
            match status.transaction_mut() {
                Ok(transaction) => self.resource_manager.do_set_rollback_only(transaction, cx),
                Err(err) => Err(err),
            }
        } else {
            debug!("should roll back transaction but no transaction is available");
            Ok(())
        };

        let outcome = match rollback_result {
            Ok(()) => {
                self.trigger_after_completion(cx, status, CompletionStatus::RolledBack);
                Ok(())
            }
            Err(err) => {
                self.trigger_after_completion(cx, status, CompletionStatus::Unknown);
                Err(err)
            }
        };
        self.finish(cx, status, outcome)
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    /// Runs cleanup after an outcome has been determined and reconciles
    /// cleanup failures with the primary outcome.
    fn finish(
        &mut self,
        cx: &mut ExecutionContext,
        status: &mut TransactionStatus<R>,
        outcome: Result<()>,
    ) -> Result<()> {
        match self.cleanup_after_completion(cx, status) {
            Ok(()) => outcome,
            Err(cleanup_err) => {
                if let Err(err) = &outcome {
                    error!(error = %err, "transaction failure overridden by cleanup failure");
                }
                Err(cleanup_err)
            }
        }
    }

    /// Marks the status completed, clears the synchronization scope it owns,
    /// lets the resource manager release the transaction, and resumes
    /// whatever was suspended for it.
    fn cleanup_after_completion(
        &mut self,
        cx: &mut ExecutionContext,
        status: &mut TransactionStatus<R>,
    ) -> Result<()> {
        let new_transaction = status.is_new_transaction();
        status.mark_completed();
        if status.is_new_synchronization() {
            cx.clear()?;
        }
        if new_transaction {
            if let Some(transaction) = status.take_transaction() {
                self.resource_manager.do_cleanup_after_completion(transaction, cx);
            }
        }
        if let Some(suspended) = status.take_suspended() {
            if status.is_debug() {
                debug!("resuming suspended transaction");
            }
            self.resume(cx, Some(suspended))?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Synchronization callback phases
    // ------------------------------------------------------------------

    /// Sorted snapshot of the context's callbacks; empty when none are
    /// registered or synchronization is inactive.
    fn synchronizations_snapshot(&self, cx: &ExecutionContext) -> Vec<SharedSynchronization> {
        cx.synchronizations().unwrap_or_default()
    }

    fn trigger_before_commit(&self, cx: &ExecutionContext, status: &TransactionStatus<R>) {
        if !status.is_new_synchronization() {
            return;
        }
        if status.is_debug() {
            debug!("triggering before-commit synchronization");
        }
        for synchronization in self.synchronizations_snapshot(cx) {
            if let Err(err) = synchronization.before_commit(status.is_read_only()) {
                warn!(error = %err, "before-commit synchronization callback failed");
            }
        }
    }

    fn trigger_before_completion(&self, cx: &ExecutionContext, status: &TransactionStatus<R>) {
        if !status.is_new_synchronization() {
            return;
        }
        if status.is_debug() {
            debug!("triggering before-completion synchronization");
        }
        for synchronization in self.synchronizations_snapshot(cx) {
            if let Err(err) = synchronization.before_completion() {
                warn!(error = %err, "before-completion synchronization callback failed");
            }
        }
    }

    fn trigger_after_commit(&self, cx: &ExecutionContext, status: &TransactionStatus<R>) {
        if !status.is_new_synchronization() {
            return;
        }
        if status.is_debug() {
            debug!("triggering after-commit synchronization");
        }
        for synchronization in self.synchronizations_snapshot(cx) {
            if let Err(err) = synchronization.after_commit() {
                warn!(error = %err, "after-commit synchronization callback failed");
            }
        }
    }

    fn trigger_after_completion(
        &self,
        cx: &ExecutionContext,
        status: &TransactionStatus<R>,
        completion: CompletionStatus,
    ) {
        if !status.is_new_synchronization() {
            return;
        }
        if status.is_debug() {
            debug!(?completion, "triggering after-completion synchronization");
        }
        for synchronization in self.synchronizations_snapshot(cx) {
            if let Err(err) = synchronization.after_completion(completion) {
                warn!(error = %err, "after-completion synchronization callback failed");
            }
        }
    }
}
