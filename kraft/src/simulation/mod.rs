//! In-memory stand-ins for deterministic runs.
//!
//! [`SimulatedConnection`] replaces the SQL server: it tracks one table's
//! columns and rows, rejects statements that reference columns the table does
//! not have, and can inject seeded execute/commit faults. Given the same seed,
//! a run against it is identical every time.
//!
//! # Usage
//!
//! ```ignore
//! use kraft::simulation::{FaultConfig, SimulatedConnection};
//!
//! let conn = SimulatedConnection::with_faults("id", 12345, FaultConfig::low_faults());
//! ```

mod connection;

pub use connection::{FaultConfig, SimulatedConnection, SimulatedConnectionStats};
