//! Error types for query compilation, execution and entity persistence.
//!
//! Every fallible operation in this crate returns [`QueryResult`]. Errors carry
//! an [`ErrorCode`] for programmatic handling plus an [`ErrorContext`] with the
//! offending SQL, its bindings and the number of attempts made, so that a
//! failure deep inside the execution bridge can be diagnosed without
//! re-running it.
//!
//! # Error Codes
//!
//! Error codes follow a pattern: Q{category}{number}
//! - 1xxx: Query errors (not found, validation, ...)
//! - 2xxx: Constraint violations (unique, foreign key, restricted delete)
//! - 3xxx: Connection errors (timeout, dropped connection)
//! - 4xxx: Transaction errors
//! - 5xxx: Execution errors (timeout, syntax, cancellation)
//! - 6xxx: Data errors (type conversion)
//! - 7xxx: Configuration errors (operators, relations, missing tables)
//!
//! ```rust
//! use quarry_query::{QueryError, ErrorCode};
//!
//! let err = QueryError::not_found("User");
//! assert_eq!(err.code, ErrorCode::RecordNotFound);
//! assert!(err.to_string().contains("User"));
//!
//! let err = QueryError::invalid_operator("=~");
//! assert!(err.is_configuration());
//! ```

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::filter::FilterValue;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Query errors (1xxx)
    /// Record not found (Q1001).
    RecordNotFound = 1001,
    /// Invalid filter or where clause (Q1003).
    InvalidFilter = 1003,
    /// Required field missing or payload empty (Q1005).
    RequiredFieldMissing = 1005,
    /// Validation rejected the candidate attributes (Q1006).
    ValidationFailed = 1006,

    // Constraint errors (2xxx)
    /// Unique constraint violation (Q2001).
    UniqueConstraint = 2001,
    /// Foreign key constraint violation (Q2002).
    ForeignKeyConstraint = 2002,
    /// Not null constraint violation (Q2004).
    NotNullConstraint = 2004,
    /// A `restrict` relation still has related rows (Q2005).
    DeleteRestricted = 2005,

    // Connection errors (3xxx)
    /// Database connection failed or was dropped (Q3001).
    ConnectionFailed = 3001,
    /// Connection timeout (Q3003).
    ConnectionTimeout = 3003,

    // Transaction errors (4xxx)
    /// Transaction failed (Q4001).
    TransactionFailed = 4001,
    /// Deadlock detected (Q4002).
    Deadlock = 4002,

    // Query execution errors (5xxx)
    /// Query timeout (Q5001).
    QueryTimeout = 5001,
    /// SQL syntax error (Q5002).
    SqlSyntax = 5002,
    /// Invalid parameter (Q5003).
    InvalidParameter = 5003,
    /// General database error (Q5005).
    DatabaseError = 5005,
    /// The caller cancelled the operation (Q5006).
    Cancelled = 5006,

    // Data errors (6xxx)
    /// Invalid data type (Q6001).
    InvalidDataType = 6001,
    /// Deserialization error (Q6003).
    DeserializationError = 6003,

    // Configuration errors (7xxx)
    /// Invalid configuration (Q7001).
    InvalidConfiguration = 7001,
    /// Missing configuration, e.g. a query without a table (Q7002).
    MissingConfiguration = 7002,
    /// Operator not present in the allow-list (Q7003).
    InvalidOperator = 7003,
    /// Unknown relation name (Q7004).
    UnknownRelation = 7004,
    /// A relation cannot be used the way it was asked to (Q7005).
    InvalidRelation = 7005,

    // Internal errors (9xxx)
    /// Internal error (Q9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "Q1001").
    pub fn code(&self) -> String {
        format!("Q{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::RecordNotFound => "Record not found",
            Self::InvalidFilter => "Invalid filter condition",
            Self::RequiredFieldMissing => "Required field missing",
            Self::ValidationFailed => "Validation failed",
            Self::UniqueConstraint => "Unique constraint violation",
            Self::ForeignKeyConstraint => "Foreign key constraint violation",
            Self::NotNullConstraint => "Not null constraint violation",
            Self::DeleteRestricted => "Delete restricted by related records",
            Self::ConnectionFailed => "Database connection failed",
            Self::ConnectionTimeout => "Connection timeout",
            Self::TransactionFailed => "Transaction failed",
            Self::Deadlock => "Deadlock detected",
            Self::QueryTimeout => "Query timeout",
            Self::SqlSyntax => "SQL syntax error",
            Self::InvalidParameter => "Invalid parameter",
            Self::DatabaseError => "Database error",
            Self::Cancelled => "Operation cancelled",
            Self::InvalidDataType => "Invalid data type",
            Self::DeserializationError => "Deserialization error",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::MissingConfiguration => "Missing configuration",
            Self::InvalidOperator => "Invalid operator",
            Self::UnknownRelation => "Unknown relation",
            Self::InvalidRelation => "Invalid relation usage",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Field-keyed validation messages.
///
/// Fields keep the order in which their first message was added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: IndexMap<String, Vec<String>>,
}

impl ValidationErrors {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_default().push(message.into());
    }

    /// Whether no messages were recorded.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields with at least one message.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Messages recorded for a field.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// Whether a field has messages.
    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Iterate over `(field, messages)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Merge another bag into this one.
    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
    }

    /// `Ok(())` when empty, otherwise the bag itself.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The model involved.
    pub model: Option<String>,
    /// The field or relation involved.
    pub field: Option<String>,
    /// The SQL text (if available).
    pub sql: Option<String>,
    /// The bindings sent alongside the SQL.
    pub bindings: Option<Vec<FilterValue>>,
    /// How many times the statement was attempted.
    pub attempts: Option<u32>,
    /// Suggestions for fixing the error.
    pub suggestions: Vec<String>,
    /// Help text.
    pub help: Option<String>,
    /// Validation messages, present for `ValidationFailed`.
    pub validation: Option<ValidationErrors>,
}

/// Errors that can occur during query operations.
#[derive(Error, Debug)]
pub struct QueryError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl QueryError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add context about the operation.
    pub fn with_context(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Add a suggestion for fixing the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context.suggestions.push(suggestion.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.context.model = Some(model.into());
        self
    }

    /// Set the field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.field = Some(field.into());
        self
    }

    /// Set the SQL query.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Set the bindings that accompanied the SQL.
    pub fn with_bindings(mut self, bindings: Vec<FilterValue>) -> Self {
        self.context.bindings = Some(bindings);
        self
    }

    /// Set the attempt count.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.context.attempts = Some(attempts);
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create a not found error.
    pub fn not_found(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(
            ErrorCode::RecordNotFound,
            format!("No {} record found matching the query", model),
        )
        .with_model(&model)
        .with_suggestion("Use first() or find() to get None instead of an error")
    }

    /// Create a validation error from a message bag.
    pub fn validation(errors: ValidationErrors) -> Self {
        let mut err = Self::new(
            ErrorCode::ValidationFailed,
            format!("The given data was invalid: {}", errors),
        );
        err.context.validation = Some(errors);
        err
    }

    /// Create an error for an insert with nothing to write.
    pub fn empty_payload(model: impl Into<String>) -> Self {
        let model = model.into();
        Self::new(
            ErrorCode::RequiredFieldMissing,
            format!("Refusing to create {} from an empty payload", model),
        )
        .with_model(&model)
        .with_suggestion("Check that the attributes are listed as fillable")
    }

    /// Create an error for an operator outside the allow-list.
    pub fn invalid_operator(operator: impl Into<String>) -> Self {
        let operator = operator.into();
        Self::new(
            ErrorCode::InvalidOperator,
            format!("Operator '{}' is not allowed", operator),
        )
        .with_help("Operators are interpolated into SQL text and must come from the allow-list")
    }

    /// Create a generic configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// Create an error for a query without a target table.
    pub fn missing_table() -> Self {
        Self::new(ErrorCode::MissingConfiguration, "Query has no table")
            .with_suggestion("Call QueryBuilder::table() or from_raw() before compiling")
    }

    /// Create an error for a relation name the model does not declare.
    pub fn unknown_relation(model: impl Into<String>, relation: impl Into<String>) -> Self {
        let model = model.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::UnknownRelation,
            format!("{} has no relation named '{}'", model, relation),
        )
        .with_model(&model)
        .with_field(&relation)
        .with_suggestion(format!("Declare '{}' in {}::relations()", relation, model))
    }

    /// Create an error for a relation used in an unsupported way.
    pub fn invalid_relation(relation: impl Into<String>, message: impl Into<String>) -> Self {
        let relation = relation.into();
        Self::new(
            ErrorCode::InvalidRelation,
            format!("Relation '{}': {}", relation, message.into()),
        )
        .with_field(&relation)
    }

    /// Create an error for a delete blocked by a `restrict` relation.
    pub fn delete_restricted(model: impl Into<String>, relation: impl Into<String>) -> Self {
        let model = model.into();
        let relation = relation.into();
        Self::new(
            ErrorCode::DeleteRestricted,
            format!("Cannot delete {}: related '{}' records exist", model, relation),
        )
        .with_model(&model)
        .with_field(&relation)
    }

    /// Create an invalid input error.
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = message.into();
        Self::new(
            ErrorCode::InvalidParameter,
            format!("Invalid input for {}: {}", field, message),
        )
        .with_field(&field)
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ConnectionFailed,
            format!("Connection error: {}", message.into()),
        )
    }

    /// Create a connection timeout error.
    pub fn connection_timeout(duration_ms: u64) -> Self {
        Self::new(
            ErrorCode::ConnectionTimeout,
            format!("Connection timed out after {}ms", duration_ms),
        )
    }

    /// Create a query timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::new(
            ErrorCode::QueryTimeout,
            format!("Query timed out after {}ms", duration_ms),
        )
        .with_suggestion("Add indexes or paginate large result sets")
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::TransactionFailed,
            format!("Transaction error: {}", message.into()),
        )
    }

    /// Create a cancellation error.
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Operation cancelled by caller")
    }

    /// Create a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DeserializationError,
            format!("Failed to deserialize result: {}", message.into()),
        )
    }

    /// Create a general database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message.into()))
    }

    // ============== Error Checks ==============

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::RecordNotFound
    }

    /// Check if this is a validation error.
    pub fn is_validation(&self) -> bool {
        self.code == ErrorCode::ValidationFailed
    }

    /// Validation messages, if this is a validation error.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        self.context.validation.as_ref()
    }

    /// Check if this is a configuration error (never retried).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::InvalidConfiguration
                | ErrorCode::MissingConfiguration
                | ErrorCode::InvalidOperator
                | ErrorCode::UnknownRelation
                | ErrorCode::InvalidRelation
        )
    }

    /// Check if this is a constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::UniqueConstraint
                | ErrorCode::ForeignKeyConstraint
                | ErrorCode::NotNullConstraint
                | ErrorCode::DeleteRestricted
        )
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self.code, ErrorCode::QueryTimeout | ErrorCode::ConnectionTimeout)
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConnectionFailed | ErrorCode::ConnectionTimeout
        )
    }

    /// Transient failures: a dropped connection or a timeout.
    ///
    /// Only these are eligible for read retries.
    pub fn is_transient(&self) -> bool {
        self.is_connection_error() || self.is_timeout()
    }

    /// Display the full error with all context and suggestions.
    pub fn display_full(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error [{}]: {}\n", self.code.code(), self.message));

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref model) = self.context.model {
            output.push_str(&format!("  → Model: {}\n", model));
        }
        if let Some(ref field) = self.context.field {
            output.push_str(&format!("  → Field: {}\n", field));
        }
        if let Some(ref sql) = self.context.sql {
            let sql_display = if sql.len() > 200 {
                let cut = (0..=200).rev().find(|i| sql.is_char_boundary(*i)).unwrap_or(0);
                format!("{}...", &sql[..cut])
            } else {
                sql.clone()
            };
            output.push_str(&format!("  → SQL: {}\n", sql_display));
        }
        if let Some(ref bindings) = self.context.bindings {
            output.push_str(&format!("  → Bindings: {:?}\n", bindings));
        }
        if let Some(attempts) = self.context.attempts {
            output.push_str(&format!("  → Attempts: {}\n", attempts));
        }
        if let Some(ref errors) = self.context.validation {
            output.push_str("\nValidation:\n");
            for (field, messages) in errors.iter() {
                for message in messages {
                    output.push_str(&format!("  {}: {}\n", field, message));
                }
            }
        }

        if !self.context.suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for (i, suggestion) in self.context.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}

impl From<ValidationErrors> for QueryError {
    fn from(errors: ValidationErrors) -> Self {
        Self::validation(errors)
    }
}

/// Helper for creating errors with context.
#[macro_export]
macro_rules! query_error {
    ($code:expr, $msg:expr) => {
        $crate::error::QueryError::new($code, $msg)
    };
    ($code:expr, $msg:expr, $($key:ident = $value:expr),+ $(,)?) => {{
        let mut err = $crate::error::QueryError::new($code, $msg);
        $(
            err = err.$key($value);
        )+
        err
    }};
}
