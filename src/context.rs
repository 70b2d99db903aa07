use std::any::Any;
use std::collections::HashMap;

use tracing::debug;

use crate::definition::IsolationLevel;
use crate::error::{Error, Result};
use crate::synchronization::SharedSynchronization;

/// Per-logical-execution-context registry of transactional state.
///
/// One `ExecutionContext` represents "the currently executing unit of work":
/// a request handler, a worker task, a test case. It carries the registered
/// synchronization callbacks, the characteristics of the current transaction
/// (name, read-only flag, isolation level, actual-active flag), and a map of
/// resource-manager handles keyed by resource identity.
///
/// Instead of hiding this state in thread-local storage, the context is an
/// explicit value that calling code threads through the
/// [`TransactionManager`](crate::TransactionManager) operations. Independent
/// contexts are fully isolated; concurrent units of work each own their own
/// instance and never contend.
///
/// # Examples
///
/// ```rust
/// use tx_kernel::ExecutionContext;
///
/// let mut cx = ExecutionContext::new();
/// cx.bind_resource("session", 42u32)?;
/// assert_eq!(cx.resource::<u32>("session"), Some(&42));
/// assert!(cx.bind_resource("session", 7u32).is_err());
/// # Ok::<(), tx_kernel::Error>(())
/// ```
#[derive(Default)]
pub struct ExecutionContext {
    /// `Some` if and only if synchronization is active for this context.
    synchronizations: Option<Vec<SharedSynchronization>>,
    current_name: Option<String>,
    current_read_only: bool,
    current_isolation_level: Option<IsolationLevel>,
    actual_transaction_active: bool,
    resources: HashMap<String, Box<dyn Any + Send>>,
}

impl ExecutionContext {
    /// Creates an empty context: no synchronization, no transaction
    /// characteristics, no bound resources.
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Synchronization lifecycle
    // ------------------------------------------------------------------

    /// Whether synchronization is active for this context.
    pub fn is_synchronization_active(&self) -> bool {
        self.synchronizations.is_some()
    }

    /// Activates transaction synchronization.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::IllegalState`] if synchronization is already active.
    pub fn init_synchronization(&mut self) -> Result<()> {
        if self.synchronizations.is_some() {
            return Err(Error::IllegalState(
                "cannot activate transaction synchronization - already active".into(),
            ));
        }
        debug!("initializing transaction synchronization");
        self.synchronizations = Some(Vec::new());
        Ok(())
    }

    /// Deactivates transaction synchronization, dropping all registered
    /// callbacks.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::IllegalState`] if synchronization is not active.
    pub fn clear_synchronization(&mut self) -> Result<()> {
        if self.synchronizations.take().is_none() {
            return Err(Error::IllegalState(
                "cannot deactivate transaction synchronization - not active".into(),
            ));
        }
        Ok(())
    }

    /// Clears the entire transactional state of this context: deactivates
    /// synchronization, then resets name, read-only flag, isolation level,
    /// and the actual-transaction-active flag together.
    pub fn clear(&mut self) -> Result<()> {
        self.clear_synchronization()?;
        self.set_current_transaction_name(None);
        self.set_current_transaction_read_only(false);
        self.set_current_transaction_isolation_level(None);
        self.set_actual_transaction_active(false);
        debug!("cleared transaction context state");
        Ok(())
    }

    /// Registers a synchronization callback for the current transaction.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::IllegalState`] if synchronization is not active.
    pub fn register_synchronization(
        &mut self,
        synchronization: SharedSynchronization,
    ) -> Result<()> {
        let list = self.synchronizations.as_mut().ok_or_else(|| {
            Error::IllegalState("transaction synchronization is not active".into())
        })?;
        list.push(synchronization);
        Ok(())
    }

    /// Returns an immutable snapshot of the registered callbacks, stably
    /// sorted by [`order`](crate::TransactionSynchronization::order) with
    /// ties in registration order.
    ///
    /// Sorting happens here, on read, so order keys assigned after
    /// registration are honored, and iterating the snapshot stays safe even
    /// if further callbacks are registered while it is being walked.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::IllegalState`] if synchronization is not active.
    pub fn synchronizations(&self) -> Result<Vec<SharedSynchronization>> {
        let list = self.synchronizations.as_ref().ok_or_else(|| {
            Error::IllegalState("transaction synchronization is not active".into())
        })?;
        let mut snapshot = list.clone();
        snapshot.sort_by_key(|synchronization| synchronization.order());
        Ok(snapshot)
    }

    // ------------------------------------------------------------------
    // Current transaction characteristics
    // ------------------------------------------------------------------

    pub fn current_transaction_name(&self) -> Option<&str> {
        self.current_name.as_deref()
    }

    pub fn set_current_transaction_name(&mut self, name: Option<String>) {
        self.current_name = name;
    }

    pub fn is_current_transaction_read_only(&self) -> bool {
        self.current_read_only
    }

    pub fn set_current_transaction_read_only(&mut self, read_only: bool) {
        self.current_read_only = read_only;
    }

    /// `None` distinguishes "no transaction / unspecified" from a real level.
    pub fn current_transaction_isolation_level(&self) -> Option<IsolationLevel> {
        self.current_isolation_level
    }

    pub fn set_current_transaction_isolation_level(&mut self, level: Option<IsolationLevel>) {
        self.current_isolation_level = level;
    }

    /// Whether an actual resource transaction (as opposed to an empty,
    /// synchronization-only one) is active in this context.
    pub fn is_actual_transaction_active(&self) -> bool {
        self.actual_transaction_active
    }

    pub fn set_actual_transaction_active(&mut self, active: bool) {
        self.actual_transaction_active = active;
    }

    // ------------------------------------------------------------------
    // Resource bindings
    // ------------------------------------------------------------------

    /// Binds a resource-manager handle under the given key.
    ///
    /// One resource per key: a second bind for the same key fails with
    /// [`Error::DuplicateResourceBinding`] until the first is unbound.
    pub fn bind_resource<T: Any + Send>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<()> {
        let key = key.into();
        if self.resources.contains_key(&key) {
            return Err(Error::DuplicateResourceBinding(key));
        }
        debug!(key = %key, "bound resource to transaction context");
        self.resources.insert(key, Box::new(value));
        Ok(())
    }

    /// Removes and returns the resource bound under the given key.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoResourceBound`] if the key is absent, or
    /// [`Error::IllegalState`] if the bound value has a different type than
    /// requested (the value stays bound in that case).
    pub fn unbind_resource<T: Any>(&mut self, key: &str) -> Result<T> {
        let boxed = self
            .resources
            .remove(key)
            .ok_or_else(|| Error::NoResourceBound(key.to_string()))?;
        match boxed.downcast::<T>() {
            Ok(value) => {
                debug!(key = %key, "unbound resource from transaction context");
                Ok(*value)
            }
            Err(boxed) => {
                self.resources.insert(key.to_string(), boxed);
                Err(Error::IllegalState(format!(
                    "resource bound for key '{key}' has a different type"
                )))
            }
        }
    }

    /// Returns the resource bound under the given key, if any.
    pub fn resource<T: Any>(&self, key: &str) -> Option<&T> {
        self.resources.get(key).and_then(|boxed| boxed.downcast_ref())
    }

    /// Mutable variant of [`resource`](Self::resource).
    pub fn resource_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.resources
            .get_mut(key)
            .and_then(|boxed| boxed.downcast_mut())
    }

    pub fn has_resource(&self, key: &str) -> bool {
        self.resources.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::synchronization::TransactionSynchronization;

    struct Ordered {
        order: i32,
    }

    impl TransactionSynchronization for Ordered {
        fn order(&self) -> i32 {
            self.order
        }
    }

    #[test]
    fn test_init_twice_fails() {
        let mut cx = ExecutionContext::new();
        cx.init_synchronization().unwrap();
        assert!(matches!(
            cx.init_synchronization(),
            Err(Error::IllegalState(_))
        ));
    }

    #[test]
    fn test_clear_without_init_fails() {
        let mut cx = ExecutionContext::new();
        assert!(matches!(cx.clear_synchronization(), Err(Error::IllegalState(_))));
        assert!(matches!(cx.clear(), Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_register_requires_active_synchronization() {
        let mut cx = ExecutionContext::new();
        let result = cx.register_synchronization(Arc::new(Ordered { order: 0 }));
        assert!(matches!(result, Err(Error::IllegalState(_))));
        assert!(matches!(cx.synchronizations(), Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_registration_order_preserved_on_ties() {
        let mut cx = ExecutionContext::new();
        cx.init_synchronization().unwrap();
        let a: SharedSynchronization = Arc::new(Ordered { order: 0 });
        let b: SharedSynchronization = Arc::new(Ordered { order: 0 });
        cx.register_synchronization(Arc::clone(&a)).unwrap();
        cx.register_synchronization(Arc::clone(&b)).unwrap();

        let snapshot = cx.synchronizations().unwrap();
        assert!(Arc::ptr_eq(&snapshot[0], &a));
        assert!(Arc::ptr_eq(&snapshot[1], &b));
    }

    #[test]
    fn test_lower_order_key_sorts_first() {
        let mut cx = ExecutionContext::new();
        cx.init_synchronization().unwrap();
        let a: SharedSynchronization = Arc::new(Ordered { order: 10 });
        let b: SharedSynchronization = Arc::new(Ordered { order: -10 });
        cx.register_synchronization(Arc::clone(&a)).unwrap();
        cx.register_synchronization(Arc::clone(&b)).unwrap();

        let snapshot = cx.synchronizations().unwrap();
        assert!(Arc::ptr_eq(&snapshot[0], &b));
        assert!(Arc::ptr_eq(&snapshot[1], &a));
    }

    #[test]
    fn test_clear_resets_all_scalars() {
        let mut cx = ExecutionContext::new();
        cx.init_synchronization().unwrap();
        cx.set_current_transaction_name(Some("work".into()));
        cx.set_current_transaction_read_only(true);
        cx.set_current_transaction_isolation_level(Some(IsolationLevel::Serializable));
        cx.set_actual_transaction_active(true);

        cx.clear().unwrap();

        assert!(!cx.is_synchronization_active());
        assert_eq!(cx.current_transaction_name(), None);
        assert!(!cx.is_current_transaction_read_only());
        assert_eq!(cx.current_transaction_isolation_level(), None);
        assert!(!cx.is_actual_transaction_active());
    }

    #[test]
    fn test_double_bind_rejected() {
        let mut cx = ExecutionContext::new();
        cx.bind_resource("db", String::from("first")).unwrap();
        let result = cx.bind_resource("db", String::from("second"));
        assert!(matches!(result, Err(Error::DuplicateResourceBinding(key)) if key == "db"));
        assert_eq!(cx.resource::<String>("db").map(String::as_str), Some("first"));
    }

    #[test]
    fn test_unbind_round_trip() {
        let mut cx = ExecutionContext::new();
        cx.bind_resource("db", 7u64).unwrap();
        assert!(cx.has_resource("db"));
        assert_eq!(cx.unbind_resource::<u64>("db").unwrap(), 7);
        assert!(!cx.has_resource("db"));
        assert!(matches!(
            cx.unbind_resource::<u64>("db"),
            Err(Error::NoResourceBound(_))
        ));
    }

    #[test]
    fn test_unbind_with_wrong_type_keeps_binding() {
        let mut cx = ExecutionContext::new();
        cx.bind_resource("db", 7u64).unwrap();
        assert!(matches!(
            cx.unbind_resource::<String>("db"),
            Err(Error::IllegalState(_))
        ));
        assert!(cx.has_resource("db"));
    }
}
