//! Repository error types
//!
//! Every failure surfaced by a [`Repository`](super::Repository) is a
//! [`RepositoryError`]. Driver errors are classified here, at the repository
//! boundary, so callers never match on `sqlx::Error` directly.
//!
//! # Example
//!
//! ```rust
//! use wao_store::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
//!
//! let error = RepositoryError::not_found("Product", "5b0c3c4e");
//! assert_eq!(error.kind, RepositoryErrorKind::NotFound);
//! assert!(!error.is_retriable());
//!
//! let error = RepositoryError::new(
//!     RepositoryOperation::BatchUpdateLock,
//!     RepositoryErrorKind::Deadlock,
//!     "deadlock detected",
//! );
//! assert!(error.is_retriable());
//! ```

use std::fmt;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Inserting a single entity
    Create,
    /// Inserting a slice of entities
    CreateMany,
    /// Insert-or-update by primary key
    Upsert,
    /// Listing entities matching a condition
    Find,
    /// Fetching exactly one entity matching a condition
    FindOne,
    /// Fetching an entity by id
    First,
    /// Counting entities matching a condition
    Count,
    /// Partial update of one entity by id
    Update,
    /// Partial update of every entity matching a condition
    UpdateFields,
    /// Deleting one entity by id
    Delete,
    /// Deleting every entity matching a condition
    DeleteWhere,
    /// Deleting a set of ids
    BulkDelete,
    /// Applying several updates atomically
    BatchUpdate,
    /// Applying several updates atomically under row locks
    BatchUpdateLock,
    /// Counting and fetching one page
    Paginate,
    /// Loading a related collection
    Preload,
    /// Beginning, committing or rolling back a transaction
    Transaction,
    /// Compiling conditions into SQL
    Compile,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::CreateMany => "create_many",
            Self::Upsert => "upsert",
            Self::Find => "find",
            Self::FindOne => "find_one",
            Self::First => "first",
            Self::Count => "count",
            Self::Update => "update",
            Self::UpdateFields => "update_fields",
            Self::Delete => "delete",
            Self::DeleteWhere => "delete_where",
            Self::BulkDelete => "bulk_delete",
            Self::BatchUpdate => "batch_update",
            Self::BatchUpdateLock => "batch_update_lock",
            Self::Paginate => "paginate",
            Self::Preload => "preload",
            Self::Transaction => "transaction",
            Self::Compile => "compile",
        };
        f.write_str(name)
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// No row matched
    NotFound,
    /// Unique constraint violated
    DuplicateKey,
    /// Foreign key constraint violated
    ForeignKeyViolation,
    /// Any other integrity constraint violated (check, not-null, exclusion)
    ConstraintViolation,
    /// Transport or pool failure
    ConnectionError,
    /// Deadlock or serialization failure detected by the server
    Deadlock,
    /// Client deadline elapsed or the server cancelled the statement
    Timeout,
    /// The caller cancelled the operation
    Cancelled,
    /// A condition, sort key or update set could not be compiled
    CompilerFault,
    /// Anything else
    Unknown,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not_found",
            Self::DuplicateKey => "duplicate_key",
            Self::ForeignKeyViolation => "foreign_key_violation",
            Self::ConstraintViolation => "constraint_violation",
            Self::ConnectionError => "connection_error",
            Self::Deadlock => "deadlock",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::CompilerFault => "compiler_fault",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Structured repository error with operation context
///
/// Carries the operation that failed, the classified kind, a message and,
/// when known, the entity kind and id involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The entity kind involved (e.g. "Product")
    pub entity_type: Option<String>,
    /// The id of the entity involved
    pub entity_id: Option<String>,
}

/// Result alias used by every repository operation
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// A lookup by id found nothing
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::First,
            RepositoryErrorKind::NotFound,
            "record not found",
        )
        .with_entity(entity_type, entity_id)
    }

    /// A condition, sort key or update set is malformed
    pub fn compiler_fault(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Compile,
            RepositoryErrorKind::CompilerFault,
            message,
        )
    }

    /// The client-side deadline elapsed
    pub fn timeout(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Timeout, message)
    }

    /// The caller's cancellation token fired
    pub fn cancelled(operation: RepositoryOperation) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::Cancelled,
            "operation cancelled",
        )
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the entity kind without an id
    #[must_use]
    pub fn with_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        if self.entity_type.is_none() {
            self.entity_type = Some(entity_type.into());
        }
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Transient failures that may succeed when the whole unit of work is retried
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionError
                | RepositoryErrorKind::Deadlock
                | RepositoryErrorKind::Timeout
        )
    }

    /// Shorthand for `kind == NotFound`
    pub fn is_not_found(&self) -> bool {
        self.kind == RepositoryErrorKind::NotFound
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        match (&self.entity_type, &self.entity_id) {
            (Some(entity_type), Some(entity_id)) => write!(f, " [{}: {}]", entity_type, entity_id)?,
            (Some(entity_type), None) => write!(f, " [{}]", entity_type)?,
            _ => {}
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

/// Map a PostgreSQL SQLSTATE code onto an error kind
pub fn classify_sqlstate(code: &str) -> RepositoryErrorKind {
    match code {
        "23505" => RepositoryErrorKind::DuplicateKey,
        "23503" => RepositoryErrorKind::ForeignKeyViolation,
        "40P01" | "40001" => RepositoryErrorKind::Deadlock,
        "57014" => RepositoryErrorKind::Timeout,
        "57P01" | "57P02" | "57P03" | "53300" => RepositoryErrorKind::ConnectionError,
        code if code.starts_with("23") => RepositoryErrorKind::ConstraintViolation,
        code if code.starts_with("08") => RepositoryErrorKind::ConnectionError,
        _ => RepositoryErrorKind::Unknown,
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => RepositoryErrorKind::NotFound,
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => RepositoryErrorKind::ConnectionError,
            sqlx::Error::Database(db_err) => db_err
                .code()
                .map(|code| classify_sqlstate(&code))
                .unwrap_or(RepositoryErrorKind::Unknown),
            _ => RepositoryErrorKind::Unknown,
        };

        let message = match &err {
            sqlx::Error::Database(db_err) => match db_err.constraint() {
                Some(constraint) => format!("{} (constraint: {})", db_err.message(), constraint),
                None => db_err.message().to_string(),
            },
            sqlx::Error::RowNotFound => "record not found".to_string(),
            other => other.to_string(),
        };

        // Operation is filled in by the repository that observed the failure.
        Self::new(RepositoryOperation::Find, kind, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(RepositoryOperation::CreateMany.to_string(), "create_many");
        assert_eq!(RepositoryOperation::FindOne.to_string(), "find_one");
        assert_eq!(
            RepositoryOperation::BatchUpdateLock.to_string(),
            "batch_update_lock"
        );
        assert_eq!(RepositoryOperation::DeleteWhere.to_string(), "delete_where");
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(RepositoryErrorKind::DuplicateKey.to_string(), "duplicate_key");
        assert_eq!(
            RepositoryErrorKind::ForeignKeyViolation.to_string(),
            "foreign_key_violation"
        );
        assert_eq!(RepositoryErrorKind::CompilerFault.to_string(), "compiler_fault");
    }

    #[test]
    fn test_classify_sqlstate() {
        assert_eq!(classify_sqlstate("23505"), RepositoryErrorKind::DuplicateKey);
        assert_eq!(
            classify_sqlstate("23503"),
            RepositoryErrorKind::ForeignKeyViolation
        );
        assert_eq!(
            classify_sqlstate("23514"),
            RepositoryErrorKind::ConstraintViolation
        );
        assert_eq!(
            classify_sqlstate("23502"),
            RepositoryErrorKind::ConstraintViolation
        );
        assert_eq!(classify_sqlstate("40P01"), RepositoryErrorKind::Deadlock);
        assert_eq!(classify_sqlstate("40001"), RepositoryErrorKind::Deadlock);
        assert_eq!(classify_sqlstate("57014"), RepositoryErrorKind::Timeout);
        assert_eq!(classify_sqlstate("08006"), RepositoryErrorKind::ConnectionError);
        assert_eq!(classify_sqlstate("57P01"), RepositoryErrorKind::ConnectionError);
        assert_eq!(classify_sqlstate("42P01"), RepositoryErrorKind::Unknown);
    }

    #[test]
    fn test_from_sqlx_row_not_found() {
        let error = RepositoryError::from(sqlx::Error::RowNotFound);
        assert!(error.is_not_found());
    }

    #[test]
    fn test_from_sqlx_pool_timeout_is_retriable() {
        let error = RepositoryError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(error.kind, RepositoryErrorKind::ConnectionError);
        assert!(error.is_retriable());
    }

    #[test]
    fn test_is_retriable() {
        let deadlock = RepositoryError::new(
            RepositoryOperation::BatchUpdateLock,
            RepositoryErrorKind::Deadlock,
            "deadlock detected",
        );
        assert!(deadlock.is_retriable());
        assert!(RepositoryError::timeout(RepositoryOperation::Find, "slow").is_retriable());

        assert!(!RepositoryError::not_found("Product", "1").is_retriable());
        assert!(!RepositoryError::compiler_fault("bad shape").is_retriable());
        assert!(!RepositoryError::cancelled(RepositoryOperation::Find).is_retriable());
        let duplicate = RepositoryError::new(
            RepositoryOperation::Create,
            RepositoryErrorKind::DuplicateKey,
            "dup",
        );
        assert!(!duplicate.is_retriable());
    }

    #[test]
    fn test_display_with_entity() {
        let error = RepositoryError::not_found("Product", "p-1");
        let display = error.to_string();
        assert!(display.contains("not_found"));
        assert!(display.contains("first"));
        assert!(display.contains("[Product: p-1]"));
    }

    #[test]
    fn test_display_with_entity_type_only() {
        let error = RepositoryError::compiler_fault("IN expects a sequence")
            .with_entity_type("ProductOption");
        assert_eq!(
            error.to_string(),
            "Repository compiler_fault error during compile: IN expects a sequence [ProductOption]"
        );
    }

    #[test]
    fn test_with_entity_type_keeps_existing() {
        let error = RepositoryError::not_found("Product", "1").with_entity_type("Other");
        assert_eq!(error.entity_type.as_deref(), Some("Product"));
    }
}
