//! SQL statement rendering.
//!
//! Identifiers are always double-quoted and values are always bound as
//! positional parameters (`$1`, `$2`, ...), never interpolated.
//!
//! Every [`Statement`] also carries a [`StatementKind`] describing the logical
//! operation, so in-memory backends can apply it without parsing SQL.

use std::fmt::Write as _;

use crate::column::{ColumnSpec, Value};

/// Most bind parameters one statement may carry on the wire.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Quote an identifier, doubling any embedded double quotes.
#[must_use]
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Array cast needed for a `= ANY($1)` predicate against a key of this type.
///
/// Without the cast a UUID key compared to a text array never matches.
#[must_use]
pub fn array_cast_for(declared_type: &str) -> Option<&'static str> {
    if declared_type.trim().eq_ignore_ascii_case("UUID") {
        Some("::uuid[]")
    } else {
        None
    }
}

/// The `schema.table` pair every statement targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    schema: String,
    table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// `"schema"."table"`
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Value(Value),
    Array(Vec<Value>),
}

/// The logical operation a statement performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    CreateTable { columns: Vec<String> },
    DropTable,
    AddColumn { column: String },
    DropColumn { column: String },
    /// Parameters are the row values flattened row-major over `columns`.
    Insert { columns: Vec<String> },
    /// Parameters are `[value, key]`. `touch` is refreshed to `now()`.
    Update {
        column: String,
        touch: Option<String>,
        key_column: String,
    },
    /// The single parameter is the array of keys to delete.
    Delete { key_column: String },
}

/// A rendered, parameterized statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Param>,
    kind: StatementKind,
}

impl Statement {
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    #[must_use]
    pub const fn kind(&self) -> &StatementKind {
        &self.kind
    }

    /// `CREATE TABLE IF NOT EXISTS` over the given column definitions.
    pub fn create_table<'a>(
        target: &TableRef,
        columns: impl IntoIterator<Item = &'a ColumnSpec>,
    ) -> Self {
        let columns: Vec<&ColumnSpec> = columns.into_iter().collect();
        let body = columns
            .iter()
            .map(|c| c.definition())
            .collect::<Vec<_>>()
            .join(",\n  ");
        Self {
            sql: format!(
                "CREATE TABLE IF NOT EXISTS {} (\n  {body}\n);",
                target.qualified()
            ),
            params: Vec::new(),
            kind: StatementKind::CreateTable {
                columns: columns.iter().map(|c| c.name().to_owned()).collect(),
            },
        }
    }

    #[must_use]
    pub fn drop_table(target: &TableRef) -> Self {
        Self {
            sql: format!("DROP TABLE IF EXISTS {};", target.qualified()),
            params: Vec::new(),
            kind: StatementKind::DropTable,
        }
    }

    #[must_use]
    pub fn add_column(target: &TableRef, spec: &ColumnSpec) -> Self {
        Self {
            sql: format!(
                "ALTER TABLE {} ADD COLUMN {};",
                target.qualified(),
                spec.definition()
            ),
            params: Vec::new(),
            kind: StatementKind::AddColumn {
                column: spec.name().to_owned(),
            },
        }
    }

    #[must_use]
    pub fn drop_column(target: &TableRef, column: &str) -> Self {
        Self {
            sql: format!(
                "ALTER TABLE {} DROP COLUMN {};",
                target.qualified(),
                quote_ident(column)
            ),
            params: Vec::new(),
            kind: StatementKind::DropColumn {
                column: column.to_owned(),
            },
        }
    }

    /// One multi-row `INSERT` for a fixed column list.
    ///
    /// Each row must hold one value per column, in column order.
    #[must_use]
    pub fn insert(target: &TableRef, columns: &[String], rows: Vec<Vec<Value>>) -> Self {
        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("INSERT INTO {} ({column_list}) VALUES ", target.qualified());
        let mut params = Vec::with_capacity(rows.len() * columns.len());
        let mut placeholder = 1;
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row_idx > 0 {
                sql.push_str(", ");
            }
            sql.push('(');
            for (col_idx, value) in row.into_iter().enumerate() {
                if col_idx > 0 {
                    sql.push_str(", ");
                }
                let _ = write!(sql, "${placeholder}");
                placeholder += 1;
                params.push(Param::Value(value));
            }
            sql.push(')');
        }
        sql.push(';');

        Self {
            sql,
            params,
            kind: StatementKind::Insert {
                columns: columns.to_vec(),
            },
        }
    }

    /// Single-row `UPDATE`, optionally refreshing `touch` to the server's `now()`.
    #[must_use]
    pub fn update(
        target: &TableRef,
        column: &str,
        value: Value,
        touch: Option<&str>,
        key_column: &str,
        key: Value,
    ) -> Self {
        let touch_clause = touch
            .map(|t| format!(", {} = now()", quote_ident(t)))
            .unwrap_or_default();
        Self {
            sql: format!(
                "UPDATE {} SET {} = $1{touch_clause} WHERE {} = $2;",
                target.qualified(),
                quote_ident(column),
                quote_ident(key_column)
            ),
            params: vec![Param::Value(value), Param::Value(key)],
            kind: StatementKind::Update {
                column: column.to_owned(),
                touch: touch.map(str::to_owned),
                key_column: key_column.to_owned(),
            },
        }
    }

    /// Set-membership `DELETE` with an optional array cast on the parameter.
    #[must_use]
    pub fn delete(
        target: &TableRef,
        key_column: &str,
        keys: Vec<Value>,
        cast: Option<&str>,
    ) -> Self {
        Self {
            sql: format!(
                "DELETE FROM {} WHERE {} = ANY($1{});",
                target.qualified(),
                quote_ident(key_column),
                cast.unwrap_or_default()
            ),
            params: vec![Param::Array(keys)],
            kind: StatementKind::Delete {
                key_column: key_column.to_owned(),
            },
        }
    }
}
