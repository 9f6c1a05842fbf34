//! Simulated in-memory database for deterministic testing.
//!
//! Models a single table and applies statements by their [`StatementKind`],
//! rejecting anything a real server would reject: writes to a missing table,
//! references to columns the table does not have, duplicate columns and
//! duplicate keys. Faults can be injected at the execute and commit
//! boundaries with a seeded RNG.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::column::Value;
use crate::connection::{Connection, DatabaseError};
use crate::sql::{Param, Statement, StatementKind};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of an execute failing before it is applied (0.0 - 1.0).
    pub execute_error_rate: f64,
    /// Probability of a commit failing (0.0 - 1.0).
    pub commit_error_rate: f64,
}

impl FaultConfig {
    /// Create a fault config with no faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Create a fault config with low fault rates (for stress testing).
    #[must_use]
    pub const fn low_faults() -> Self {
        Self {
            execute_error_rate: 0.001,
            commit_error_rate: 0.001,
        }
    }

    /// Create a fault config with high fault rates (for extreme testing).
    #[must_use]
    pub const fn high_faults() -> Self {
        Self {
            execute_error_rate: 0.05,
            commit_error_rate: 0.05,
        }
    }
}

/// Statistics about simulated operations.
#[derive(Debug, Default, Clone)]
pub struct SimulatedConnectionStats {
    /// Statements that were applied.
    pub executed: u64,
    /// Statements rejected by the table model.
    pub rejected: u64,
    /// Number of injected execute errors.
    pub injected_execute_errors: u64,
    /// Number of injected commit errors.
    pub injected_commit_errors: u64,
}

/// Starting point of the simulated server clock (approximately November 2023).
const DEFAULT_START_MS: u64 = 1_700_000_000_000;

/// In-memory single-table database.
///
/// # Thread Safety
///
/// Not thread-safe. The simulator is single-threaded, so this is fine.
pub struct SimulatedConnection {
    key_column: String,
    table_exists: bool,
    columns: Vec<String>,
    /// Rows in insertion order, each as column -> value.
    rows: Vec<BTreeMap<String, Value>>,
    /// Server clock used for `now()`, advanced once per applied statement.
    now_ms: u64,

    statements: Vec<Statement>,
    commits: u64,

    fault_config: FaultConfig,
    rng: StdRng,
    stats: SimulatedConnectionStats,
}

impl SimulatedConnection {
    /// Create a fault-free connection whose table is keyed by `key_column`.
    #[must_use]
    pub fn new(key_column: impl Into<String>) -> Self {
        Self::with_faults(key_column, 0, FaultConfig::default())
    }

    /// Create a connection with seeded fault injection.
    #[must_use]
    pub fn with_faults(key_column: impl Into<String>, seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            key_column: key_column.into(),
            table_exists: false,
            columns: Vec::new(),
            rows: Vec::new(),
            now_ms: DEFAULT_START_MS,
            statements: Vec::new(),
            commits: 0,
            fault_config,
            rng: StdRng::seed_from_u64(seed),
            stats: SimulatedConnectionStats::default(),
        }
    }

    /// Update the fault configuration.
    pub const fn set_fault_config(&mut self, config: FaultConfig) {
        self.fault_config = config;
    }

    #[must_use]
    pub const fn table_exists(&self) -> bool {
        self.table_exists
    }

    /// Columns currently on the table, in physical order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Look up a row by its key value.
    #[must_use]
    pub fn row(&self, key: &Value) -> Option<&BTreeMap<String, Value>> {
        self.rows
            .iter()
            .find(|row| row.get(&self.key_column) == Some(key))
    }

    /// Every applied statement, in order.
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    #[must_use]
    pub const fn commits(&self) -> u64 {
        self.commits
    }

    #[must_use]
    pub const fn stats(&self) -> &SimulatedConnectionStats {
        &self.stats
    }

    /// Check if a fault should be injected based on the given rate.
    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.random::<f64>() < rate
    }

    fn require_table(&self) -> Result<(), DatabaseError> {
        if self.table_exists {
            Ok(())
        } else {
            Err(DatabaseError::UndefinedTable("simulated table".to_string()))
        }
    }

    fn require_column(&self, column: &str) -> Result<(), DatabaseError> {
        if self.columns.iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(DatabaseError::UndefinedColumn(column.to_owned()))
        }
    }

    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.now_ms)
    }

    fn apply(&mut self, statement: &Statement) -> Result<u64, DatabaseError> {
        match statement.kind() {
            StatementKind::CreateTable { columns } => {
                if !self.table_exists {
                    self.table_exists = true;
                    self.columns.clone_from(columns);
                }
                Ok(0)
            }
            StatementKind::DropTable => {
                self.table_exists = false;
                self.columns.clear();
                self.rows.clear();
                Ok(0)
            }
            StatementKind::AddColumn { column } => {
                self.require_table()?;
                if self.columns.contains(column) {
                    return Err(DatabaseError::DuplicateColumn(column.clone()));
                }
                self.columns.push(column.clone());
                for row in &mut self.rows {
                    row.insert(column.clone(), Value::Null);
                }
                Ok(0)
            }
            StatementKind::DropColumn { column } => {
                self.require_table()?;
                self.require_column(column)?;
                self.columns.retain(|c| c != column);
                for row in &mut self.rows {
                    row.remove(column);
                }
                Ok(0)
            }
            StatementKind::Insert { columns } => self.apply_insert(columns, statement.params()),
            StatementKind::Update {
                column,
                touch,
                key_column,
            } => self.apply_update(column, touch.as_deref(), key_column, statement.params()),
            StatementKind::Delete { key_column } => {
                self.require_table()?;
                self.require_column(key_column)?;
                let Some(Param::Array(keys)) = statement.params().first() else {
                    return Err(DatabaseError::Driver(
                        "delete expects one array parameter".to_string(),
                    ));
                };
                let before = self.rows.len();
                self.rows.retain(|row| {
                    row.get(key_column)
                        .is_none_or(|value| !keys.contains(value))
                });
                Ok((before - self.rows.len()) as u64)
            }
        }
    }

    fn apply_insert(&mut self, columns: &[String], params: &[Param]) -> Result<u64, DatabaseError> {
        self.require_table()?;
        for column in columns {
            self.require_column(column)?;
        }
        if columns.is_empty() || !params.len().is_multiple_of(columns.len()) {
            return Err(DatabaseError::Driver(format!(
                "{} parameters do not fill rows of {} columns",
                params.len(),
                columns.len()
            )));
        }

        let mut new_rows = Vec::with_capacity(params.len() / columns.len());
        for chunk in params.chunks(columns.len()) {
            let mut row: BTreeMap<String, Value> = self
                .columns
                .iter()
                .map(|c| (c.clone(), Value::Null))
                .collect();
            for (column, param) in columns.iter().zip(chunk) {
                let Param::Value(value) = param else {
                    return Err(DatabaseError::Driver(format!(
                        "array bound to scalar column {column}"
                    )));
                };
                row.insert(column.clone(), value.clone());
            }
            if let Some(key) = row.get(&self.key_column) {
                let taken = self.row(key).is_some()
                    || new_rows
                        .iter()
                        .any(|r: &BTreeMap<String, Value>| r.get(&self.key_column) == Some(key));
                if taken {
                    return Err(DatabaseError::DuplicateKey(format!("{key:?}")));
                }
            }
            new_rows.push(row);
        }

        let inserted = new_rows.len() as u64;
        self.rows.extend(new_rows);
        Ok(inserted)
    }

    fn apply_update(
        &mut self,
        column: &str,
        touch: Option<&str>,
        key_column: &str,
        params: &[Param],
    ) -> Result<u64, DatabaseError> {
        self.require_table()?;
        self.require_column(column)?;
        self.require_column(key_column)?;
        if let Some(touch) = touch {
            self.require_column(touch)?;
        }
        let [Param::Value(value), Param::Value(key)] = params else {
            return Err(DatabaseError::Driver(
                "update expects a value and a key parameter".to_string(),
            ));
        };

        let now = self.now();
        let mut affected = 0;
        for row in &mut self.rows {
            if row.get(key_column) == Some(key) {
                row.insert(column.to_owned(), value.clone());
                if let Some(touch) = touch {
                    row.insert(touch.to_owned(), Value::Timestamp(now));
                }
                affected += 1;
            }
        }
        Ok(affected)
    }
}

impl Connection for SimulatedConnection {
    fn execute(&mut self, statement: &Statement) -> Result<u64, DatabaseError> {
        if self.should_inject_fault(self.fault_config.execute_error_rate) {
            self.stats.injected_execute_errors += 1;
            return Err(DatabaseError::InjectedFault("execute".to_string()));
        }

        match self.apply(statement) {
            Ok(affected) => {
                self.stats.executed += 1;
                self.now_ms += 1;
                self.statements.push(statement.clone());
                Ok(affected)
            }
            Err(e) => {
                self.stats.rejected += 1;
                Err(e)
            }
        }
    }

    fn commit(&mut self) -> Result<(), DatabaseError> {
        if self.should_inject_fault(self.fault_config.commit_error_rate) {
            self.stats.injected_commit_errors += 1;
            return Err(DatabaseError::InjectedFault("commit".to_string()));
        }
        self.commits += 1;
        Ok(())
    }
}
