//! Schema state: which columns exist on the table and which are waiting.
//!
//! `SchemaState` owns the catalog of every known column, the active subset
//! currently materialized on the table, a version counter and one history
//! snapshot per version.
//!
//! # Invariants
//!
//! - `active ⊆ catalog`
//! - No reserved column is in the initial active set
//! - A protected column, once active, is never removed
//! - `history.len() == version`; version starts at 1 and only ever grows by one
//!
//! Every structural change issues its statement and commits *before* the
//! in-memory state is touched. A database error leaves the version, the active
//! set and the history exactly as they were.

use std::collections::BTreeSet;

use crate::column::{ColumnSet, ColumnSpec};
use crate::connection::{Connection, execute_and_commit};
use crate::error::Result;
use crate::sql::{Statement, TableRef};

/// The set of active column names recorded for one schema version.
pub type HistoryEntry = BTreeSet<String>;

pub struct SchemaState {
    target: TableRef,
    catalog: ColumnSet,
    active: ColumnSet,
    version: u64,
    history: Vec<HistoryEntry>,
}

impl SchemaState {
    /// Seed the state from a catalog; every non-reserved column starts active.
    #[must_use]
    pub fn new(target: TableRef, catalog: ColumnSet) -> Self {
        let active: ColumnSet = catalog.iter().filter(|c| !c.is_reserved()).cloned().collect();
        let history = vec![names_of(&active)];
        Self {
            target,
            catalog,
            active,
            version: 1,
            history,
        }
    }

    #[must_use]
    pub const fn target(&self) -> &TableRef {
        &self.target
    }

    /// `"schema"."table"`
    #[must_use]
    pub fn qualified_name(&self) -> String {
        self.target.qualified()
    }

    /// Current read-only view of the active columns.
    #[must_use]
    pub const fn active_columns(&self) -> &ColumnSet {
        &self.active
    }

    #[must_use]
    pub const fn catalog(&self) -> &ColumnSet {
        &self.catalog
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// One snapshot per version; `history()[0]` is the initial active set.
    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Render `CREATE TABLE IF NOT EXISTS` for the active columns, in catalog order.
    #[must_use]
    pub fn render_create_ddl(&self) -> String {
        self.create_statement().sql().to_owned()
    }

    fn create_statement(&self) -> Statement {
        Statement::create_table(
            &self.target,
            self.catalog.iter().filter(|c| self.active.contains(c.name())),
        )
    }

    /// Create the table if it does not exist yet.
    pub fn materialize<C: Connection + ?Sized>(&self, connection: &mut C) -> Result<()> {
        tracing::info!(table = %self.target, "ensuring table exists");
        execute_and_commit(connection, &self.create_statement())?;
        Ok(())
    }

    /// Drop the table if it exists.
    pub fn unmaterialize<C: Connection + ?Sized>(&self, connection: &mut C) -> Result<()> {
        tracing::info!(table = %self.target, "dropping table if it exists");
        execute_and_commit(connection, &Statement::drop_table(&self.target))?;
        Ok(())
    }

    /// Add the first reserved, not yet active column (catalog order) to the table.
    ///
    /// Returns `None` without touching anything when no such column exists.
    pub fn promote_reserved<C: Connection + ?Sized>(
        &mut self,
        connection: &mut C,
    ) -> Result<Option<String>> {
        let Some(spec) = self
            .catalog
            .iter()
            .find(|c| c.is_reserved() && !self.active.contains(c.name()))
            .cloned()
        else {
            return Ok(None);
        };

        tracing::info!(column = spec.name(), table = %self.target, "adding reserved column");
        execute_and_commit(connection, &Statement::add_column(&self.target, &spec))?;

        let name = spec.name().to_owned();
        self.active.insert(spec);
        self.bump_version();
        Ok(Some(name))
    }

    /// Drop the first non-protected active column (active order) from the table.
    ///
    /// Returns `None` without touching anything when every active column is
    /// protected.
    pub fn demote_active<C: Connection + ?Sized>(
        &mut self,
        connection: &mut C,
    ) -> Result<Option<String>> {
        let Some(name) = self
            .active
            .iter()
            .find(|c| !c.is_protected())
            .map(|c| c.name().to_owned())
        else {
            return Ok(None);
        };

        tracing::warn!(column = %name, table = %self.target, "dropping column");
        execute_and_commit(connection, &Statement::drop_column(&self.target, &name))?;

        self.active.remove(&name);
        self.bump_version();
        Ok(Some(name))
    }

    /// Add a brand-new specification to the catalog.
    ///
    /// Returns `false` if the name is already known. A non-reserved column also
    /// joins the active set and bumps the version, but no `ALTER TABLE` is
    /// issued: callers that need the physical column must add it themselves.
    pub fn declare_column(&mut self, spec: ColumnSpec) -> bool {
        if self.catalog.contains(spec.name()) {
            return false;
        }
        let activate = !spec.is_reserved();
        if activate {
            self.active.insert(spec.clone());
        }
        self.catalog.insert(spec);
        if activate {
            self.bump_version();
        }
        true
    }

    fn bump_version(&mut self) {
        self.version += 1;
        self.history.push(names_of(&self.active));
        debug_assert_eq!(self.history.len() as u64, self.version);
    }
}

fn names_of(columns: &ColumnSet) -> HistoryEntry {
    columns.names().map(str::to_owned).collect()
}
