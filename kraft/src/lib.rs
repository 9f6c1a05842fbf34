// Life of a batch:
// 1. Pull the active columns from the schema into the generator
// 2. Generate rows and bulk insert them
// 3. Maybe update or delete a sample of the rows just inserted
// 4. Maybe add a reserved column or drop an active one
//
// System components:
//  - Column catalog (registry, specs, generators)
//  - Schema state and evolution policy
//  - Mutation executor over an opaque SQL connection

pub mod batch;
pub mod column;
pub mod config;
pub mod connection;
pub mod error;
pub mod evolution;
pub mod generators;
pub mod mutation;
pub mod random;
pub mod registry;
pub mod runner;
pub mod schema;
pub mod simulation;
pub mod sql;

#[cfg(test)]
mod testing;

pub use batch::{BatchGenerator, Row};
pub use column::{ColumnSet, ColumnSpec, Generator, Value};
pub use connection::{Connection, DatabaseError};
pub use error::{KraftError, Result};
pub use evolution::{EvolutionConfig, EvolutionOutcome, EvolutionPolicy, EvolutionSummary};
pub use mutation::{MutationCounters, MutationExecutor, MutationOutcome};
pub use random::RandomSource;
pub use registry::{ColumnDecl, ColumnRegistry};
pub use runner::{RunReport, SimulationRunner};
pub use schema::SchemaState;
pub use sql::TableRef;
