//! Column specifications and the values they generate.
//!
//! A [`ColumnSpec`] is created once at configuration time and never mutated.
//! Cloning one is cheap: the generator is shared behind an `Arc`.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::sql::quote_ident;

/// A single SQL-bindable value produced by a column generator.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(uuid::Uuid),
    Timestamp(SystemTime),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Self::Uuid(v)
    }
}

/// Zero-argument producer of one value of a column's declared type.
pub type Generator = Arc<dyn Fn() -> Value + Send + Sync>;

/// Immutable description of one column.
#[derive(Clone)]
pub struct ColumnSpec {
    name: String,
    declared_type: String,
    generator: Generator,
    constraint: Option<String>,
    reserved: bool,
    protected: bool,
}

impl ColumnSpec {
    /// Create a plain column: active from the start and droppable.
    pub fn new<F>(name: impl Into<String>, declared_type: impl Into<String>, generator: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::with_shared_generator(name, declared_type, Arc::new(generator))
    }

    /// Create a column around an already shared generator.
    pub fn with_shared_generator(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        generator: Generator,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            generator,
            constraint: None,
            reserved: false,
            protected: false,
        }
    }

    /// Append a constraint fragment (`PRIMARY KEY`, `DEFAULT now()`, ...) to the DDL.
    #[must_use]
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    /// Keep the column out of the initial active set; it enters only by promotion.
    #[must_use]
    pub const fn reserved(mut self) -> Self {
        self.reserved = true;
        self
    }

    /// Forbid schema evolution from ever dropping this column.
    #[must_use]
    pub const fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn declared_type(&self) -> &str {
        &self.declared_type
    }

    #[must_use]
    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }

    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        self.reserved
    }

    #[must_use]
    pub const fn is_protected(&self) -> bool {
        self.protected
    }

    /// Produce a fresh value for this column.
    #[must_use]
    pub fn generate(&self) -> Value {
        (self.generator)()
    }

    /// Render `"name" TYPE [constraint]` for CREATE/ALTER TABLE statements.
    #[must_use]
    pub fn definition(&self) -> String {
        let mut parts = vec![quote_ident(&self.name), self.declared_type.trim().to_owned()];
        if let Some(constraint) = self
            .constraint
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            parts.push(constraint.to_owned());
        }
        parts.join(" ")
    }
}

impl fmt::Debug for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnSpec")
            .field("name", &self.name)
            .field("declared_type", &self.declared_type)
            .field("constraint", &self.constraint)
            .field("reserved", &self.reserved)
            .field("protected", &self.protected)
            .finish_non_exhaustive()
    }
}

/// Insertion-ordered set of column specifications keyed by name.
///
/// Used both for the full catalog and for active-column snapshots handed to
/// the batch generator.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    columns: Vec<ColumnSpec>,
}

impl ColumnSet {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Add a column at the end. Returns `false` if the name is already taken.
    pub fn insert(&mut self, spec: ColumnSpec) -> bool {
        if self.contains(spec.name()) {
            return false;
        }
        self.columns.push(spec);
        true
    }

    /// Add a column, replacing any existing entry with the same name in place.
    pub fn upsert(&mut self, spec: ColumnSpec) {
        match self.columns.iter_mut().find(|c| c.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.columns.push(spec),
        }
    }

    /// Remove a column by name, preserving the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<ColumnSpec> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColumnSpec> {
        self.columns.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(ColumnSpec::name)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn clear(&mut self) {
        self.columns.clear();
    }
}

impl<'a> IntoIterator for &'a ColumnSet {
    type Item = &'a ColumnSpec;
    type IntoIter = std::slice::Iter<'a, ColumnSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

impl FromIterator<ColumnSpec> for ColumnSet {
    /// Later duplicates of a name are ignored.
    fn from_iter<I: IntoIterator<Item = ColumnSpec>>(iter: I) -> Self {
        let mut set = Self::new();
        for spec in iter {
            set.insert(spec);
        }
        set
    }
}
