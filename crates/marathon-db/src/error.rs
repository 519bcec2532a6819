use marathon_types::{LedgerError, LedgerResult};
use rusqlite::{ErrorCode, ffi};

/// Map a driver error onto the ledger taxonomy.
///
/// Busy/locked databases are transient; key collisions are conflicts;
/// everything else (CHECK and trigger aborts, I/O, schema drift) is fatal.
pub fn classify(err: rusqlite::Error) -> LedgerError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                LedgerError::Transient(err.to_string())
            }
            ErrorCode::ConstraintViolation
                if e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                LedgerError::Conflict(err.to_string())
            }
            _ => LedgerError::Fatal(err.to_string()),
        },
        _ => LedgerError::Fatal(err.to_string()),
    }
}

/// Extension trait for driver results.
pub(crate) trait SqlResultExt<T> {
    fn into_ledger(self) -> LedgerResult<T>;
    fn optional(self) -> LedgerResult<Option<T>>;
}

impl<T> SqlResultExt<T> for Result<T, rusqlite::Error> {
    fn into_ledger(self) -> LedgerResult<T> {
        self.map_err(classify)
    }

    fn optional(self) -> LedgerResult<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(classify(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn busy_and_locked_are_transient() {
        assert!(classify(failure(ffi::SQLITE_BUSY)).is_transient());
        assert!(classify(failure(ffi::SQLITE_LOCKED)).is_transient());
    }

    #[test]
    fn key_collisions_are_conflicts() {
        assert!(matches!(
            classify(failure(ffi::SQLITE_CONSTRAINT_PRIMARYKEY)),
            LedgerError::Conflict(_)
        ));
        assert!(matches!(
            classify(failure(ffi::SQLITE_CONSTRAINT_UNIQUE)),
            LedgerError::Conflict(_)
        ));
    }

    #[test]
    fn other_failures_are_fatal() {
        assert!(matches!(
            classify(failure(ffi::SQLITE_CONSTRAINT_CHECK)),
            LedgerError::Fatal(_)
        ));
        assert!(matches!(
            classify(failure(ffi::SQLITE_CORRUPT)),
            LedgerError::Fatal(_)
        ));
        assert!(matches!(
            classify(rusqlite::Error::InvalidColumnIndex(9)),
            LedgerError::Fatal(_)
        ));
    }

    #[test]
    fn missing_row_is_none() {
        let res: Result<i64, rusqlite::Error> = Err(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(res.optional().unwrap(), None);
    }
}
