//! The batch loop: generate, insert, mutate, maybe evolve.
//!
//! # Invariants
//!
//! - The generator is re-pointed at the schema's active columns before every
//!   batch, and again right after a drop, so no row ever names a column the
//!   table no longer has.
//! - Every statement is issued sequentially on the one owned connection.
//! - The first error halts the loop and is returned unchanged.

use crate::batch::BatchGenerator;
use crate::connection::Connection;
use crate::error::Result;
use crate::evolution::{EvolutionOutcome, EvolutionPolicy};
use crate::mutation::{MutationExecutor, MutationOutcome};
use crate::random::RandomSource;
use crate::schema::SchemaState;

/// Number of full batches for a run; a partial trailing batch is not emitted.
#[must_use]
pub const fn num_batches(total_records: u64, batch_size: usize) -> u64 {
    if batch_size == 0 {
        return 0;
    }
    total_records / batch_size as u64
}

/// What a completed [`SimulationRunner::run`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub batches_run: u64,
    pub rows_inserted: u64,
    /// One entry per batch.
    pub mutations: Vec<MutationOutcome>,
    /// One entry per batch when a policy is configured.
    pub evolutions: Vec<EvolutionOutcome>,
}

impl RunReport {
    /// Evolution outcomes that changed the table.
    pub fn schema_changes(&self) -> impl Iterator<Item = &EvolutionOutcome> {
        self.evolutions.iter().filter(|o| o.changed_schema())
    }
}

/// Owns every component of one simulation and drives them batch by batch.
///
/// # Thread Safety
///
/// Not shared. One runner, one connection, one thread.
pub struct SimulationRunner<C, R> {
    connection: C,
    schema: SchemaState,
    generator: BatchGenerator,
    executor: MutationExecutor<R>,
    evolution: Option<EvolutionPolicy<R>>,
}

impl<C: Connection, R: RandomSource> SimulationRunner<C, R> {
    /// Create a runner whose generator starts from the schema's active columns.
    pub fn new(connection: C, schema: SchemaState, executor: MutationExecutor<R>) -> Result<Self> {
        let generator = BatchGenerator::new(schema.active_columns().clone())?;
        Ok(Self {
            connection,
            schema,
            generator,
            executor,
            evolution: None,
        })
    }

    #[must_use]
    pub fn with_evolution(mut self, policy: EvolutionPolicy<R>) -> Self {
        self.evolution = Some(policy);
        self
    }

    pub const fn connection(&self) -> &C {
        &self.connection
    }

    pub const fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    #[must_use]
    pub const fn schema(&self) -> &SchemaState {
        &self.schema
    }

    #[must_use]
    pub const fn generator(&self) -> &BatchGenerator {
        &self.generator
    }

    #[must_use]
    pub const fn executor(&self) -> &MutationExecutor<R> {
        &self.executor
    }

    #[must_use]
    pub const fn evolution(&self) -> Option<&EvolutionPolicy<R>> {
        self.evolution.as_ref()
    }

    /// Drop the table if present and create it from the active columns.
    pub fn reset_table(&mut self) -> Result<()> {
        self.schema.unmaterialize(&mut self.connection)?;
        self.schema.materialize(&mut self.connection)
    }

    /// Run `num_batches(total_records, batch_size)` batches.
    pub fn run(&mut self, total_records: u64, batch_size: usize) -> Result<RunReport> {
        let batches = num_batches(total_records, batch_size);
        let mut report = RunReport::default();
        if batches == 0 {
            tracing::info!(total_records, batch_size, "nothing to do");
            return Ok(report);
        }

        tracing::info!(batches, batch_size, table = %self.schema.target(), "starting simulation");
        for batch_number in 1..=batches {
            self.sync_generator()?;
            let rows = self.generator.generate_batch(batch_size);
            let ids = self.executor.insert_batch(&mut self.connection, &rows)?;
            report.rows_inserted += ids.len() as u64;

            let mutation = self
                .executor
                .maybe_mutate(&mut self.connection, &self.generator, &ids)?;
            tracing::debug!(batch_number, ?mutation, "batch mutated");
            report.mutations.push(mutation);

            if let Some(policy) = self.evolution.as_mut() {
                let outcome = policy.evolve(batch_number, &mut self.schema, &mut self.connection)?;
                if outcome.is_drop() {
                    self.sync_generator()?;
                }
                report.evolutions.push(outcome);
            }
            report.batches_run += 1;
        }

        let counters = self.executor.counters();
        tracing::info!(
            inserted = counters.inserted,
            updated = counters.updated,
            deleted = counters.deleted,
            version = self.schema.version(),
            "simulation finished"
        );
        Ok(report)
    }

    fn sync_generator(&mut self) -> Result<()> {
        self.generator.refresh(self.schema.active_columns().clone())
    }

    /// Give back the connection and schema.
    pub fn into_parts(self) -> (C, SchemaState) {
        (self.connection, self.schema)
    }
}
