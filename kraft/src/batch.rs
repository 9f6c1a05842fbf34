//! Synthetic row generation.
//!
//! The generator holds an immutable snapshot of the active columns handed to
//! it by the orchestrator. It never reads [`SchemaState`](crate::SchemaState)
//! itself and never refreshes on its own: after a structural change the caller
//! must pass a fresh snapshot to [`BatchGenerator::refresh`].

use std::collections::HashSet;

use crate::column::{ColumnSet, ColumnSpec, Value};
use crate::error::{KraftError, Result};
use crate::registry::ColumnRegistry;

/// One generated row: every snapshot column paired with a value, in snapshot order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find_map(|(name, value)| (name == column).then_some(value))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }
}

/// Produces rows shaped like the snapshot it was last given.
#[derive(Debug)]
pub struct BatchGenerator {
    schema: ColumnSet,
}

impl BatchGenerator {
    /// Build from an active-column snapshot.
    ///
    /// Fails fast on an empty or malformed snapshot, before any row is generated.
    pub fn new(schema: ColumnSet) -> Result<Self> {
        validate(&schema)?;
        Ok(Self { schema })
    }

    /// Build from a copy of everything registered.
    pub fn from_registry(registry: &ColumnRegistry) -> Result<Self> {
        Self::new(registry.snapshot())
    }

    /// Point the generator at a fresh snapshot.
    ///
    /// On error the previous snapshot is kept.
    pub fn refresh(&mut self, schema: ColumnSet) -> Result<()> {
        validate(&schema)?;
        self.schema = schema;
        Ok(())
    }

    #[must_use]
    pub const fn schema(&self) -> &ColumnSet {
        &self.schema
    }

    /// A fresh value for one column of the snapshot.
    pub fn generate_value(&self, column: &str) -> Result<Value> {
        self.schema
            .get(column)
            .map(ColumnSpec::generate)
            .ok_or_else(|| KraftError::UnknownColumn(column.to_owned()))
    }

    /// One row with a value for every snapshot column.
    #[must_use]
    pub fn generate_row(&self) -> Row {
        Row {
            values: self
                .schema
                .iter()
                .map(|spec| (spec.name().to_owned(), spec.generate()))
                .collect(),
        }
    }

    /// `n` independently generated rows.
    #[must_use]
    pub fn generate_batch(&self, n: usize) -> Vec<Row> {
        (0..n).map(|_| self.generate_row()).collect()
    }

    /// Snapshot columns that are safe update targets: neither reserved nor
    /// protected, and not in `exclude`.
    #[must_use]
    pub fn modifiable_columns(&self, exclude: &[&str]) -> Vec<String> {
        let excluded: HashSet<&str> = exclude.iter().copied().collect();
        self.schema
            .iter()
            .filter(|c| !c.is_reserved() && !c.is_protected() && !excluded.contains(c.name()))
            .map(|c| c.name().to_owned())
            .collect()
    }
}

fn validate(schema: &ColumnSet) -> Result<()> {
    if schema.is_empty() {
        return Err(KraftError::Configuration(
            "batch generator needs at least one column".to_string(),
        ));
    }
    for spec in schema {
        if spec.name().trim().is_empty() {
            return Err(KraftError::SchemaValidation(
                "column with an empty name".to_string(),
            ));
        }
        if spec.declared_type().trim().is_empty() {
            return Err(KraftError::SchemaValidation(format!(
                "column '{}' has no declared type",
                spec.name()
            )));
        }
    }
    Ok(())
}
