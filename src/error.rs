/// Error types for transaction demarcation
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transaction synchronization was activated, cleared, or used in the
    /// wrong state for the current execution context
    #[error("Illegal synchronization state: {0}")]
    IllegalState(String),

    /// A resource is already bound under the given key
    #[error("Resource already bound for key '{0}'")]
    DuplicateResourceBinding(String),

    /// No resource is bound under the given key
    #[error("No resource bound for key '{0}'")]
    NoResourceBound(String),

    /// Transaction definition carries a timeout below -1
    #[error("Invalid transaction timeout: {0}")]
    InvalidTimeout(i32),

    /// Transaction demarcation was used in a way the current state forbids
    /// (double completion, mandatory propagation without a transaction, ...)
    #[error("Illegal transaction state: {0}")]
    IllegalTransactionState(String),

    /// Savepoint API misuse, e.g. rolling back to a savepoint that was never created
    #[error("Invalid transaction usage: {0}")]
    TransactionUsage(String),

    /// Nested transactions are disabled or the resource manager's transaction
    /// handle does not expose a savepoint capability
    #[error("Nested transaction not supported: {0}")]
    NestedTransactionNotSupported(String),

    /// The resource manager does not implement suspend/resume
    #[error("Transaction suspension is not supported by this resource manager")]
    SuspensionNotSupported,

    /// The resource manager could not produce or start a transaction
    #[error("Cannot create transaction: {0}")]
    CannotCreateTransaction(String),

    /// Commit was requested but the transaction was (or will be) rolled back instead
    #[error("Unexpected rollback: {0}")]
    UnexpectedRollback(String),

    /// Failure raised by the resource manager during begin/commit/rollback/suspend/resume
    #[error("Resource manager failure: {0}")]
    Resource(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an arbitrary resource-manager error.
    pub fn resource(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Resource(Box::new(err))
    }
}

/// Result type alias for transaction operations
pub type Result<T> = std::result::Result<T, Error>;
