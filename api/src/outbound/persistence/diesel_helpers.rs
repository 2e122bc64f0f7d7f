//! Shared helpers for the Diesel repositories: error mapping and the
//! integer conversions between PostgreSQL columns and domain types.

use tracing::debug;

use super::pool::PoolError;

/// Map a pool error through a repository's connection constructor.
pub fn map_basic_pool_error<E, C>(error: PoolError, connection: C) -> E
where
    C: FnOnce(String) -> E,
{
    connection(error.into_message())
}

/// Map a Diesel error through a repository's query and connection
/// constructors. Closed connections become connection errors; everything
/// else is a query error.
pub fn map_basic_diesel_error<E, Q, C>(error: diesel::result::Error, query: Q, connection: C) -> E
where
    Q: FnOnce(String) -> E,
    C: FnOnce(String) -> E,
{
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(%error, "diesel operation failed"),
    }

    match error {
        DieselError::NotFound => query("record not found".to_owned()),
        DieselError::QueryBuilderError(_) => query("database query error".to_owned()),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            connection("database connection error".to_owned())
        }
        DieselError::DatabaseError(_, info) => query(format!("database error: {}", info.message())),
        other => query(format!("database error: {other}")),
    }
}

/// Non-negative `INTEGER` column to a domain count. Negative values, which
/// check constraints forbid, read as zero.
pub fn count_from_db(raw: i32) -> u32 {
    u32::try_from(raw).unwrap_or(0)
}

/// Domain count to an `INTEGER` column, saturating at `i32::MAX`.
pub fn count_for_db(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// Decode a text column through a domain parser, naming the column on
/// failure.
pub fn decode<T>(
    raw: &str,
    column: &'static str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, String> {
    parse(raw).ok_or_else(|| format!("unexpected {column} value {raw:?}"))
}

/// Decode an optional text column through a domain parser.
pub fn decode_optional<T>(
    raw: Option<&str>,
    column: &'static str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<Option<T>, String> {
    raw.map(|value| decode(value, column, parse)).transpose()
}

#[cfg(test)]
mod tests {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};
    use rstest::rstest;

    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum Mapped {
        Query(String),
        Connection(String),
    }

    fn map(error: DieselError) -> Mapped {
        map_basic_diesel_error(error, Mapped::Query, Mapped::Connection)
    }

    #[rstest]
    fn not_found_is_a_query_error() {
        assert_eq!(
            map(DieselError::NotFound),
            Mapped::Query("record not found".to_owned())
        );
    }

    #[rstest]
    fn closed_connection_is_a_connection_error() {
        let error = DieselError::DatabaseError(
            DatabaseErrorKind::ClosedConnection,
            Box::new("server closed the connection".to_owned()),
        );
        assert_eq!(
            map(error),
            Mapped::Connection("database connection error".to_owned())
        );
    }

    #[rstest]
    fn pool_errors_map_to_connection() {
        let mapped = map_basic_pool_error(PoolError::checkout("timed out"), Mapped::Connection);
        assert_eq!(mapped, Mapped::Connection("timed out".to_owned()));
    }

    #[rstest]
    #[case(-3, 0)]
    #[case(0, 0)]
    #[case(12, 12)]
    fn counts_never_go_negative(#[case] raw: i32, #[case] expected: u32) {
        assert_eq!(count_from_db(raw), expected);
    }

    #[rstest]
    fn decode_names_the_column() {
        let err = decode("WAT", "status", |_| None::<u8>).expect_err("unknown value");
        assert_eq!(err, "unexpected status value \"WAT\"");
    }
}
