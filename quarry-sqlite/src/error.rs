//! Mapping driver failures onto [`QueryError`] codes.

use quarry_query::error::{ErrorCode, QueryError};
use rusqlite::ffi;

/// Convert a driver error into a [`QueryError`].
///
/// Constraint violations keep their kind so callers can tell a duplicate key
/// from a dangling foreign key; a busy or locked database reads as a timeout.
pub fn map_error(err: tokio_rusqlite::Error) -> QueryError {
    match err {
        tokio_rusqlite::Error::Rusqlite(e) => map_rusqlite(e),
        tokio_rusqlite::Error::ConnectionClosed => {
            QueryError::connection("SQLite connection is closed")
        }
        tokio_rusqlite::Error::Close((_, e)) => {
            QueryError::connection(format!("failed to close SQLite connection: {}", e))
        }
        other => QueryError::database(other.to_string()),
    }
}

/// Convert a `rusqlite` error into a [`QueryError`].
pub fn map_rusqlite(err: rusqlite::Error) -> QueryError {
    let code = classify(&err);
    let message = err.to_string();
    let error = match code {
        ErrorCode::QueryTimeout => QueryError::new(code, format!("SQLite is busy: {}", message)),
        code => QueryError::new(code, message),
    };
    error.with_source(err)
}

fn classify(err: &rusqlite::Error) -> ErrorCode {
    match err {
        rusqlite::Error::SqliteFailure(failure, message) => match failure.code {
            ffi::ErrorCode::ConstraintViolation => match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    ErrorCode::UniqueConstraint
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ErrorCode::ForeignKeyConstraint,
                ffi::SQLITE_CONSTRAINT_NOTNULL => ErrorCode::NotNullConstraint,
                _ => ErrorCode::DatabaseError,
            },
            ffi::ErrorCode::DatabaseBusy | ffi::ErrorCode::DatabaseLocked => {
                ErrorCode::QueryTimeout
            }
            ffi::ErrorCode::CannotOpen | ffi::ErrorCode::NotADatabase => {
                ErrorCode::ConnectionFailed
            }
            _ if message.as_deref().is_some_and(|m| m.contains("syntax error")) => {
                ErrorCode::SqlSyntax
            }
            _ => ErrorCode::DatabaseError,
        },
        rusqlite::Error::InvalidParameterCount(..) | rusqlite::Error::InvalidParameterName(_) => {
            ErrorCode::InvalidParameter
        }
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => ErrorCode::InvalidDataType,
        _ => ErrorCode::DatabaseError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: std::ffi::c_int, message: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), Some(message.to_string()))
    }

    #[test]
    fn test_constraint_kinds() {
        let unique = map_rusqlite(failure(
            ffi::SQLITE_CONSTRAINT_UNIQUE,
            "UNIQUE constraint failed: users.email",
        ));
        assert_eq!(unique.code, ErrorCode::UniqueConstraint);
        assert!(unique.is_constraint_violation());

        let fk = map_rusqlite(failure(ffi::SQLITE_CONSTRAINT_FOREIGNKEY, "FOREIGN KEY constraint failed"));
        assert_eq!(fk.code, ErrorCode::ForeignKeyConstraint);
    }

    #[test]
    fn test_busy_is_transient() {
        let err = map_rusqlite(failure(5, "database is locked"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_syntax_error() {
        let err = map_rusqlite(failure(1, "near \"SELEC\": syntax error"));
        assert_eq!(err.code, ErrorCode::SqlSyntax);
    }

    #[test]
    fn test_closed_connection() {
        let err = map_error(tokio_rusqlite::Error::ConnectionClosed);
        assert!(err.is_connection_error());
    }
}
