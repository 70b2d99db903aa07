/// Timeout value meaning "use the transaction manager's default timeout".
pub const DEFAULT_TIMEOUT: i32 = -1;

/// How a transaction request relates to an already-active transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Propagation {
    /// Join the current transaction, or create a new one if none exists.
    #[default]
    Required,
    /// Always create a new transaction, suspending any current one.
    RequiresNew,
    /// Execute within a nested transaction (savepoint) if a transaction
    /// exists, otherwise behave like [`Propagation::Required`].
    Nested,
    /// Join the current transaction; fail if none exists.
    Mandatory,
    /// Join the current transaction if one exists, otherwise run without one.
    Supports,
    /// Run without a transaction, suspending any current one.
    NotSupported,
    /// Run without a transaction; fail if one exists.
    Never,
}

/// Standard transaction isolation levels.
///
/// "Unspecified" (use whatever the resource manager defaults to) is
/// represented by the absence of a level, i.e. `Option<IsolationLevel>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Immutable description of a transaction to be demarcated.
///
/// A definition carries the propagation behavior, an optional isolation
/// level, a timeout in seconds (`-1` delegates to the manager default), a
/// read-only hint, and an optional name for diagnostics.
///
/// # Examples
///
/// ```rust
/// use tx_kernel::{Propagation, TransactionDefinition};
///
/// let definition = TransactionDefinition::new()
///     .with_propagation(Propagation::RequiresNew)
///     .with_timeout(30)
///     .with_name("billing.charge");
///
/// assert_eq!(definition.propagation(), Propagation::RequiresNew);
/// assert_eq!(definition.timeout(), 30);
/// assert!(!definition.is_read_only());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDefinition {
    propagation: Propagation,
    isolation_level: Option<IsolationLevel>,
    timeout: i32,
    read_only: bool,
    name: Option<String>,
}

impl Default for TransactionDefinition {
    fn default() -> Self {
        Self {
            propagation: Propagation::Required,
            isolation_level: None,
            timeout: DEFAULT_TIMEOUT,
            read_only: false,
            name: None,
        }
    }
}

impl TransactionDefinition {
    /// Creates a definition with the defaults: `Required` propagation,
    /// unspecified isolation, manager-default timeout, read-write, unnamed.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn with_isolation_level(mut self, isolation_level: IsolationLevel) -> Self {
        self.isolation_level = Some(isolation_level);
        self
    }

    /// Sets the timeout in seconds. `-1` means "manager default"; values
    /// below that are rejected when the definition reaches the manager.
    pub fn with_timeout(mut self, timeout: i32) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    pub fn timeout(&self) -> i32 {
        self.timeout
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let definition = TransactionDefinition::new();
        assert_eq!(definition.propagation(), Propagation::Required);
        assert_eq!(definition.isolation_level(), None);
        assert_eq!(definition.timeout(), DEFAULT_TIMEOUT);
        assert!(!definition.is_read_only());
        assert_eq!(definition.name(), None);
    }

    #[test]
    fn test_builder_chain() {
        let definition = TransactionDefinition::new()
            .with_propagation(Propagation::Nested)
            .with_isolation_level(IsolationLevel::Serializable)
            .with_timeout(10)
            .with_read_only(true)
            .with_name("audit.append");
        assert_eq!(definition.propagation(), Propagation::Nested);
        assert_eq!(definition.isolation_level(), Some(IsolationLevel::Serializable));
        assert_eq!(definition.timeout(), 10);
        assert!(definition.is_read_only());
        assert_eq!(definition.name(), Some("audit.append"));
    }
}
