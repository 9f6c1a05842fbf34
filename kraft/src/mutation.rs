//! Bulk insert plus probabilistic update/delete against the managed table.
//!
//! # Atomicity
//!
//! - An insert is one statement and one commit.
//! - An update touches each sampled row with its own statement and commit, so
//!   a failure mid-loop leaves earlier rows committed and later ones untouched.
//! - A delete removes every sampled row with one statement and one commit.
//!
//! Counters move only after the corresponding commit succeeds.

use serde::Serialize;

use crate::batch::{BatchGenerator, Row};
use crate::column::Value;
use crate::connection::{Connection, execute_and_commit};
use crate::error::{KraftError, Result};
use crate::random::RandomSource;
use crate::sql::{MAX_BIND_PARAMS, Statement, TableRef, array_cast_for};

/// Chance that a batch is left alone by [`MutationExecutor::maybe_mutate`].
const SKIP_PROBABILITY: f64 = 0.5;

/// Running totals across every batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MutationCounters {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
}

/// What one `maybe_mutate` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The dice said leave this batch alone (or there was nothing to touch).
    Skipped,
    Updated(usize),
    Deleted(usize),
}

/// Issues DML against one table, drawing decisions from `R`.
pub struct MutationExecutor<R> {
    target: TableRef,
    primary_key: String,
    modified_column: Option<String>,
    rng: R,
    counters: MutationCounters,
}

impl<R: RandomSource> MutationExecutor<R> {
    /// Create an executor keyed by `primary_key` (usually `id`).
    pub fn new(target: TableRef, primary_key: impl Into<String>, rng: R) -> Self {
        Self {
            target,
            primary_key: primary_key.into(),
            modified_column: None,
            rng,
            counters: MutationCounters::default(),
        }
    }

    /// Refresh this column to the server's `now()` on every update.
    #[must_use]
    pub fn with_modified_column(mut self, column: impl Into<String>) -> Self {
        self.modified_column = Some(column.into());
        self
    }

    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    #[must_use]
    pub const fn counters(&self) -> MutationCounters {
        self.counters
    }

    /// Insert every row with one statement, returning each row's key in order.
    ///
    /// The column list comes from the first row. An empty batch is a no-op.
    /// A batch needing more than [`MAX_BIND_PARAMS`] parameters is rejected
    /// before anything is sent.
    pub fn insert_batch<C: Connection + ?Sized>(
        &mut self,
        connection: &mut C,
        rows: &[Row],
    ) -> Result<Vec<Value>> {
        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let columns: Vec<String> = first.columns().map(str::to_owned).collect();
        let params = rows.len() * columns.len();
        if params > MAX_BIND_PARAMS {
            return Err(KraftError::Configuration(format!(
                "batch of {} rows needs {params} bind parameters, limit is {MAX_BIND_PARAMS}",
                rows.len()
            )));
        }

        let mut ids = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row
                .get(&self.primary_key)
                .ok_or_else(|| KraftError::UnknownColumn(self.primary_key.clone()))?;
            ids.push(id.clone());
            values.push(
                columns
                    .iter()
                    .map(|c| {
                        row.get(c)
                            .cloned()
                            .ok_or_else(|| KraftError::UnknownColumn(c.clone()))
                    })
                    .collect::<Result<Vec<_>>>()?,
            );
        }

        execute_and_commit(connection, &Statement::insert(&self.target, &columns, values))?;
        self.counters.inserted += rows.len() as u64;
        tracing::debug!(rows = rows.len(), table = %self.target, "inserted batch");
        Ok(ids)
    }

    /// Maybe update or delete a quarter of the rows just inserted.
    ///
    /// Half the time nothing happens. Otherwise update vs. delete is a coin
    /// flip, and `max(1, ids.len() / 4)` ids are sampled without replacement
    /// from `ids` only. Older rows are never touched.
    pub fn maybe_mutate<C: Connection + ?Sized>(
        &mut self,
        connection: &mut C,
        generator: &BatchGenerator,
        ids: &[Value],
    ) -> Result<MutationOutcome> {
        if ids.is_empty() || self.rng.unit() > SKIP_PROBABILITY {
            return Ok(MutationOutcome::Skipped);
        }

        let delete = self.rng.index(2) == 1;
        let sample_size = (ids.len() / 4).max(1);
        let subset: Vec<Value> = self
            .rng
            .choose_indices(ids.len(), sample_size)
            .into_iter()
            .map(|i| ids[i].clone())
            .collect();

        if delete {
            let deleted = self.delete_records(connection, generator, subset)?;
            Ok(MutationOutcome::Deleted(deleted))
        } else {
            let updated = self.update_records(connection, generator, &subset)?;
            Ok(MutationOutcome::Updated(updated))
        }
    }

    fn update_records<C: Connection + ?Sized>(
        &mut self,
        connection: &mut C,
        generator: &BatchGenerator,
        ids: &[Value],
    ) -> Result<usize> {
        // The modified column only exists on the table while it is in the snapshot.
        let touch = self
            .modified_column
            .as_deref()
            .filter(|c| generator.schema().contains(c));
        if let (Some(column), None) = (self.modified_column.as_deref(), touch) {
            tracing::warn!(
                column,
                table = %self.target,
                "modified column not in snapshot, skipping now() refresh"
            );
        }

        let mut exclude = vec![self.primary_key.as_str()];
        exclude.extend(touch);
        let modifiable = generator.modifiable_columns(&exclude);
        if modifiable.is_empty() {
            tracing::debug!(table = %self.target, "no modifiable columns, skipping update");
            return Ok(0);
        }

        for id in ids {
            let column = &modifiable[self.rng.index(modifiable.len())];
            let value = generator.generate_value(column)?;
            let statement =
                Statement::update(&self.target, column, value, touch, &self.primary_key, id.clone());
            execute_and_commit(connection, &statement)?;
            self.counters.updated += 1;
        }

        tracing::debug!(rows = ids.len(), table = %self.target, "updated rows");
        Ok(ids.len())
    }

    fn delete_records<C: Connection + ?Sized>(
        &mut self,
        connection: &mut C,
        generator: &BatchGenerator,
        ids: Vec<Value>,
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let cast = generator
            .schema()
            .get(&self.primary_key)
            .and_then(|spec| array_cast_for(spec.declared_type()));

        let count = ids.len();
        let statement = Statement::delete(&self.target, &self.primary_key, ids, cast);
        execute_and_commit(connection, &statement)?;
        self.counters.deleted += count as u64;

        tracing::debug!(rows = count, table = %self.target, "deleted rows");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnSet, ColumnSpec};
    use crate::connection::DatabaseError;
    use crate::schema::SchemaState;
    use crate::simulation::SimulatedConnection;
    use crate::sql::{Param, StatementKind};
    use crate::testing::ScriptedRandom;

    fn target() -> TableRef {
        TableRef::new("public", "events")
    }

    fn catalog(key_type: &str) -> ColumnSet {
        let ids = std::sync::Mutex::new(0);
        [
            ColumnSpec::new("id", key_type, move || {
                let mut n = ids.lock().unwrap();
                *n += 1;
                Value::Text(format!("k{n}"))
            })
            .protected(),
            ColumnSpec::new("updated_at", "TIMESTAMP", || Value::Null).protected(),
            ColumnSpec::new("price", "FLOAT", || Value::Float(1.5)),
            ColumnSpec::new("quantity", "INT", || Value::Int(7)),
        ]
        .into_iter()
        .collect()
    }

    struct Fixture {
        conn: SimulatedConnection,
        generator: BatchGenerator,
    }

    fn fixture(key_type: &str) -> Fixture {
        let schema = SchemaState::new(target(), catalog(key_type));
        let mut conn = SimulatedConnection::new("id");
        schema.materialize(&mut conn).unwrap();
        let generator = BatchGenerator::new(schema.active_columns().clone()).unwrap();
        Fixture { conn, generator }
    }

    fn executor(rng: ScriptedRandom) -> MutationExecutor<ScriptedRandom> {
        MutationExecutor::new(target(), "id", rng).with_modified_column("updated_at")
    }

    fn keys(n: usize) -> Vec<Value> {
        (1..=n).map(|i| Value::Text(format!("k{i}"))).collect()
    }

    #[test]
    fn test_insert_batch_returns_keys_in_order() {
        let mut f = fixture("TEXT");
        let mut engine = executor(ScriptedRandom::new());
        let rows = f.generator.generate_batch(3);

        let ids = engine.insert_batch(&mut f.conn, &rows).unwrap();

        assert_eq!(ids, keys(3));
        assert_eq!(engine.counters().inserted, 3);
        assert_eq!(f.conn.row_count(), 3);
        let inserts = f
            .conn
            .statements()
            .iter()
            .filter(|s| matches!(s.kind(), StatementKind::Insert { .. }))
            .count();
        assert_eq!(inserts, 1);
        assert_eq!(f.conn.commits(), 2);
    }

    #[test]
    fn test_insert_over_bind_limit_is_rejected() {
        let mut f = fixture("TEXT");
        let mut engine = executor(ScriptedRandom::new());
        let statements_before = f.conn.statements().len();
        // 16384 rows x 4 columns = 65536 parameters.
        let rows = f.generator.generate_batch(16_384);

        let err = engine.insert_batch(&mut f.conn, &rows).unwrap_err();

        assert!(matches!(err, KraftError::Configuration(_)));
        assert_eq!(f.conn.statements().len(), statements_before);
        assert_eq!(engine.counters().inserted, 0);
    }

    #[test]
    fn test_insert_empty_is_noop() {
        let mut f = fixture("TEXT");
        let mut engine = executor(ScriptedRandom::new());
        let statements_before = f.conn.statements().len();

        let ids = engine.insert_batch(&mut f.conn, &[]).unwrap();

        assert!(ids.is_empty());
        assert_eq!(engine.counters(), MutationCounters::default());
        assert_eq!(f.conn.statements().len(), statements_before);
    }

    #[test]
    fn test_insert_without_primary_key_fails() {
        let mut conn = SimulatedConnection::new("id");
        let set: ColumnSet = [ColumnSpec::new("name", "TEXT", || Value::Null)].into_iter().collect();
        let generator = BatchGenerator::new(set).unwrap();
        let mut engine = executor(ScriptedRandom::new());

        let err = engine
            .insert_batch(&mut conn, &generator.generate_batch(1))
            .unwrap_err();
        assert!(matches!(err, KraftError::UnknownColumn(c) if c == "id"));
        assert!(conn.statements().is_empty());
    }

    #[test]
    fn test_maybe_mutate_skips_on_high_roll() {
        let mut f = fixture("TEXT");
        let mut engine = executor(ScriptedRandom::new().with_units([0.9]));
        let ids = engine
            .insert_batch(&mut f.conn, &f.generator.generate_batch(4))
            .unwrap();
        let before = f.conn.statements().len();

        let outcome = engine.maybe_mutate(&mut f.conn, &f.generator, &ids).unwrap();

        assert_eq!(outcome, MutationOutcome::Skipped);
        assert_eq!(f.conn.statements().len(), before);
    }

    #[test]
    fn test_maybe_mutate_empty_ids_draws_nothing() {
        let mut f = fixture("TEXT");
        let mut engine = executor(ScriptedRandom::new());

        let outcome = engine.maybe_mutate(&mut f.conn, &f.generator, &[]).unwrap();

        assert_eq!(outcome, MutationOutcome::Skipped);
        assert_eq!(engine.rng.draws(), 0);
    }

    #[test]
    fn test_maybe_mutate_updates_sampled_rows() {
        let mut f = fixture("TEXT");
        // roll 0.4 -> mutate, index 0 -> update, sample [2], column index 1 -> quantity
        let rng = ScriptedRandom::new()
            .with_units([0.4])
            .with_indices([0, 1])
            .with_choice(vec![2]);
        let mut engine = executor(rng);
        let ids = engine
            .insert_batch(&mut f.conn, &f.generator.generate_batch(4))
            .unwrap();

        let outcome = engine.maybe_mutate(&mut f.conn, &f.generator, &ids).unwrap();

        assert_eq!(outcome, MutationOutcome::Updated(1));
        assert_eq!(engine.counters().updated, 1);
        let last = f.conn.statements().last().unwrap();
        assert_eq!(
            last.sql(),
            "UPDATE \"public\".\"events\" SET \"quantity\" = $1, \"updated_at\" = now() WHERE \"id\" = $2;"
        );
        assert_eq!(last.params()[1], Param::Value(Value::from("k3")));
        let row = f.conn.row(&Value::from("k3")).unwrap();
        assert!(matches!(row.get("updated_at"), Some(Value::Timestamp(_))));
    }

    #[test]
    fn test_update_commits_each_row() {
        let mut f = fixture("TEXT");
        let rng = ScriptedRandom::new()
            .with_units([0.0])
            .with_indices([0])
            .with_choice(vec![0, 3]);
        let mut engine = executor(rng);
        let ids = engine
            .insert_batch(&mut f.conn, &f.generator.generate_batch(8))
            .unwrap();
        let commits_before = f.conn.commits();

        let outcome = engine.maybe_mutate(&mut f.conn, &f.generator, &ids).unwrap();

        assert_eq!(outcome, MutationOutcome::Updated(2));
        assert_eq!(f.conn.commits(), commits_before + 2);
    }

    /// Fails the `fail_on`-th statement, counting from 1.
    struct FailingConnection {
        inner: SimulatedConnection,
        fail_on: usize,
        executed: usize,
    }

    impl Connection for FailingConnection {
        fn execute(&mut self, statement: &Statement) -> std::result::Result<u64, DatabaseError> {
            self.executed += 1;
            if self.executed == self.fail_on {
                return Err(DatabaseError::Driver("connection lost".to_string()));
            }
            self.inner.execute(statement)
        }

        fn commit(&mut self) -> std::result::Result<(), DatabaseError> {
            self.inner.commit()
        }
    }

    #[test]
    fn test_update_failure_keeps_earlier_rows_committed() {
        let Fixture { mut conn, generator } = fixture("TEXT");
        // roll 0.0 -> mutate, index 0 -> update, sample k1 then k4, column 0 -> price
        let rng = ScriptedRandom::new()
            .with_units([0.0])
            .with_indices([0, 0, 0])
            .with_choice(vec![0, 3]);
        let mut engine = executor(rng);
        let ids = engine
            .insert_batch(&mut conn, &generator.generate_batch(8))
            .unwrap();
        let mut conn = FailingConnection {
            inner: conn,
            fail_on: 2,
            executed: 0,
        };

        let err = engine.maybe_mutate(&mut conn, &generator, &ids).unwrap_err();

        assert!(matches!(err, KraftError::Database(DatabaseError::Driver(_))));
        assert_eq!(engine.counters().updated, 1);
        let first = conn.inner.row(&Value::from("k1")).unwrap();
        assert!(matches!(first.get("updated_at"), Some(Value::Timestamp(_))));
        let second = conn.inner.row(&Value::from("k4")).unwrap();
        assert_eq!(second.get("updated_at"), Some(&Value::Null));
    }

    #[test]
    fn test_update_never_targets_key_or_protected() {
        let mut f = fixture("TEXT");
        let mut engine = MutationExecutor::new(target(), "id", crate::random::seeded(3))
            .with_modified_column("updated_at");
        for _ in 0..20 {
            let ids = engine
                .insert_batch(&mut f.conn, &f.generator.generate_batch(8))
                .unwrap();
            engine.maybe_mutate(&mut f.conn, &f.generator, &ids).unwrap();
        }
        for statement in f.conn.statements() {
            if let StatementKind::Update { column, .. } = statement.kind() {
                assert!(column == "price" || column == "quantity", "{column}");
            }
        }
    }

    #[test]
    fn test_update_without_modifiable_columns_returns_zero() {
        let mut conn = SimulatedConnection::new("id");
        let schema = SchemaState::new(
            target(),
            [ColumnSpec::new("id", "TEXT", || Value::from("only")).protected()]
                .into_iter()
                .collect(),
        );
        schema.materialize(&mut conn).unwrap();
        let generator = BatchGenerator::new(schema.active_columns().clone()).unwrap();
        let mut engine = executor(ScriptedRandom::new());
        let ids = engine
            .insert_batch(&mut conn, &generator.generate_batch(1))
            .unwrap();

        let outcome = engine.maybe_mutate(&mut conn, &generator, &ids).unwrap();
        assert_eq!(outcome, MutationOutcome::Updated(0));
        assert_eq!(engine.counters().updated, 0);
    }

    #[test]
    fn test_touch_skipped_once_modified_column_is_gone() {
        let mut f = fixture("TEXT");
        let smaller: ColumnSet = f
            .generator
            .schema()
            .iter()
            .filter(|c| c.name() != "updated_at")
            .cloned()
            .collect();
        f.generator.refresh(smaller).unwrap();
        let mut engine = executor(ScriptedRandom::new());
        let ids = engine
            .insert_batch(&mut f.conn, &f.generator.generate_batch(2))
            .unwrap();

        engine.maybe_mutate(&mut f.conn, &f.generator, &ids).unwrap();

        let last = f.conn.statements().last().unwrap();
        assert!(matches!(last.kind(), StatementKind::Update { touch: None, .. }));
    }

    #[test]
    fn test_maybe_mutate_deletes_sampled_rows() {
        let mut f = fixture("TEXT");
        let rng = ScriptedRandom::new()
            .with_units([0.2])
            .with_indices([1])
            .with_choice(vec![1]);
        let mut engine = executor(rng);
        let ids = engine
            .insert_batch(&mut f.conn, &f.generator.generate_batch(4))
            .unwrap();

        let outcome = engine.maybe_mutate(&mut f.conn, &f.generator, &ids).unwrap();

        assert_eq!(outcome, MutationOutcome::Deleted(1));
        assert_eq!(engine.counters().deleted, 1);
        assert_eq!(f.conn.row_count(), 3);
        assert!(f.conn.row(&Value::from("k2")).is_none());
        let last = f.conn.statements().last().unwrap();
        assert!(!last.sql().contains("::uuid[]"));
    }

    #[test]
    fn test_delete_casts_uuid_keys() {
        let mut f = fixture("uuid");
        let rng = ScriptedRandom::new().with_units([0.0]).with_indices([1]);
        let mut engine = executor(rng);
        let ids = engine
            .insert_batch(&mut f.conn, &f.generator.generate_batch(8))
            .unwrap();

        let outcome = engine.maybe_mutate(&mut f.conn, &f.generator, &ids).unwrap();

        assert_eq!(outcome, MutationOutcome::Deleted(2));
        let last = f.conn.statements().last().unwrap();
        assert!(last.sql().contains("= ANY($1::uuid[])"));
        assert_eq!(last.params(), &[Param::Array(keys(2))]);
    }

    #[test]
    fn test_sample_only_from_given_ids() {
        let mut f = fixture("TEXT");
        let mut engine = MutationExecutor::new(target(), "id", crate::random::seeded(11));
        let old = engine
            .insert_batch(&mut f.conn, &f.generator.generate_batch(20))
            .unwrap();
        let fresh = engine
            .insert_batch(&mut f.conn, &f.generator.generate_batch(8))
            .unwrap();

        for _ in 0..30 {
            engine.maybe_mutate(&mut f.conn, &f.generator, &fresh).unwrap();
        }
        for id in &old {
            assert!(f.conn.row(id).is_some());
        }
    }
}
