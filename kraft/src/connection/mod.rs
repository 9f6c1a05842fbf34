//! Database connection abstraction.
//!
//! The simulator treats the SQL engine as an opaque, blocking RPC: every
//! statement is one round trip, followed by an explicit commit. This trait is
//! the only seam the core talks through, so a real `postgres` client and the
//! in-memory [`SimulatedConnection`](crate::simulation::SimulatedConnection)
//! are interchangeable.
//!
//! Opening and closing the connection is the caller's job.

#[cfg(feature = "postgres")]
mod pg;

#[cfg(feature = "postgres")]
pub use self::pg::PostgresConnection;

use crate::sql::Statement;

/// Errors surfaced by the underlying database.
#[derive(Debug)]
pub enum DatabaseError {
    /// The target table does not exist.
    UndefinedTable(String),
    /// A statement referenced a column the table does not have.
    UndefinedColumn(String),
    /// `ADD COLUMN` for a column that already exists.
    DuplicateColumn(String),
    /// An insert collided with an existing primary key.
    DuplicateKey(String),
    /// Injected fault for simulation.
    InjectedFault(String),
    /// Any other driver-level failure (connectivity, type mismatch, ...).
    Driver(String),
    #[cfg(feature = "postgres")]
    Postgres(::postgres::Error),
}

impl std::fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UndefinedTable(table) => write!(f, "relation {table} does not exist"),
            Self::UndefinedColumn(column) => write!(f, "column {column} does not exist"),
            Self::DuplicateColumn(column) => write!(f, "column {column} already exists"),
            Self::DuplicateKey(key) => write!(f, "duplicate key value {key}"),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
            Self::Driver(msg) => write!(f, "driver error: {msg}"),
            #[cfg(feature = "postgres")]
            Self::Postgres(e) => write!(f, "postgres error: {e}"),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(e) => Some(e),
            _ => None,
        }
    }
}

/// A blocking connection that executes parameterized statements.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `execute` either applies the statement fully or returns an error
/// - `commit` makes everything executed so far durable
/// - No statement is ever retried internally
pub trait Connection {
    /// Execute one statement, returning the number of affected rows.
    fn execute(&mut self, statement: &Statement) -> Result<u64, DatabaseError>;

    /// Commit the work executed since the last commit.
    fn commit(&mut self) -> Result<(), DatabaseError>;
}

impl<C: Connection + ?Sized> Connection for &mut C {
    fn execute(&mut self, statement: &Statement) -> Result<u64, DatabaseError> {
        (**self).execute(statement)
    }

    fn commit(&mut self) -> Result<(), DatabaseError> {
        (**self).commit()
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn execute(&mut self, statement: &Statement) -> Result<u64, DatabaseError> {
        (**self).execute(statement)
    }

    fn commit(&mut self) -> Result<(), DatabaseError> {
        (**self).commit()
    }
}

/// Execute a single statement and commit it immediately.
pub fn execute_and_commit<C: Connection + ?Sized>(
    connection: &mut C,
    statement: &Statement,
) -> Result<u64, DatabaseError> {
    let affected = connection.execute(statement)?;
    connection.commit()?;
    Ok(affected)
}
