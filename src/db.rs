use anyhow::{Context, Result};
use sqlx::MySqlPool;
use sqlx::error::ErrorKind;
use sqlx::migrate::Migrator;
use sqlx::mysql::MySqlPoolOptions;
use tracing::info;

use crate::config::Config;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLSTATE for "Data too long for column" (MySQL 1406).
pub const DATA_TOO_LONG: &str = "22001";

pub async fn init_db(config: &Config) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    if config.run_migrations {
        MIGRATOR
            .run(&pool)
            .await
            .context("Failed to apply database migrations")?;
        info!("Database migrations applied");
    }

    Ok(pool)
}

/// Constraint failures a handler can answer without a 500.
///
/// MySQL reports all integrity errors as SQLSTATE 23000, so these go by the
/// driver's error kind (1062, 1451/1452, 1048) instead of the SQLSTATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    Unique,
    ForeignKey,
    NotNull,
    TooLong,
}

pub fn violation(err: &sqlx::Error) -> Option<Violation> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };

    match db_err.kind() {
        ErrorKind::UniqueViolation => Some(Violation::Unique),
        ErrorKind::ForeignKeyViolation => Some(Violation::ForeignKey),
        ErrorKind::NotNullViolation => Some(Violation::NotNull),
        _ if db_err.code().as_deref() == Some(DATA_TOO_LONG) => Some(Violation::TooLong),
        _ => None,
    }
}

/// Duplicate-key message names the index, e.g. `for key 'users.uq_users_employee'`.
pub fn violates_key(err: &sqlx::Error, key: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.kind() == ErrorKind::UniqueViolation && db_err.message().contains(key)
        }
        _ => false,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    use sqlx::error::{DatabaseError, ErrorKind};

    /// Stand-in for a MySQL server error; `kind` follows the driver's number mapping.
    #[derive(Debug)]
    pub struct FakeMySqlError {
        number: u16,
        message: String,
    }

    impl fmt::Display for FakeMySqlError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} ({})", self.message, self.number)
        }
    }

    impl StdError for FakeMySqlError {}

    impl DatabaseError for FakeMySqlError {
        fn message(&self) -> &str {
            &self.message
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            let state = match self.number {
                1406 => "22001",
                1062 | 1048 | 1451 | 1452 => "23000",
                _ => "HY000",
            };
            Some(Cow::Borrowed(state))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.number {
                1062 => ErrorKind::UniqueViolation,
                1451 | 1452 => ErrorKind::ForeignKeyViolation,
                1048 => ErrorKind::NotNullViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    pub fn db_error(number: u16, message: &str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeMySqlError {
            number,
            message: message.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::db_error;
    use super::*;

    #[test]
    fn only_duplicate_keys_count_as_unique() {
        let dup = db_error(1062, "Duplicate entry 'E-1' for key 'employees.uq_employees_emp_id'");
        assert_eq!(violation(&dup), Some(Violation::Unique));

        // same SQLSTATE 23000, different failures
        assert_eq!(violation(&db_error(1048, "Column 'name' cannot be null")), Some(Violation::NotNull));
        assert_eq!(
            violation(&db_error(1452, "Cannot add or update a child row")),
            Some(Violation::ForeignKey)
        );
    }

    #[test]
    fn data_too_long_and_other_errors() {
        assert_eq!(
            violation(&db_error(1406, "Data too long for column 'phone' at row 1")),
            Some(Violation::TooLong)
        );
        assert_eq!(violation(&db_error(1213, "Deadlock found")), None);
        assert_eq!(violation(&sqlx::Error::RowNotFound), None);
    }

    #[test]
    fn key_name_is_read_from_the_message() {
        let err = db_error(1062, "Duplicate entry '7' for key 'users.uq_users_employee'");
        assert!(violates_key(&err, "uq_users_employee"));
        assert!(!violates_key(&err, "uq_users_username"));
        assert!(!violates_key(&db_error(1452, "uq_users_employee"), "uq_users_employee"));
    }
}
