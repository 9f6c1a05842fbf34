//! Reusable column catalog shared across simulation runs.
//!
//! The registry is an explicit object, not a process-wide singleton. Setup
//! code registers column generators at their declaration site, and each run
//! seeds its schema from [`ColumnRegistry::snapshot`], an independent copy.
//! Later registrations or a [`clear`](ColumnRegistry::clear) never reach back
//! into a schema that was already built.
//!
//! ```
//! use kraft::{ColumnDecl, ColumnRegistry, Value};
//!
//! let mut registry = ColumnRegistry::new();
//! let sku = registry.register(ColumnDecl::new("sku", "TEXT"), || Value::from("A-1"));
//! assert_eq!(sku(), Value::from("A-1"));
//! assert_eq!(registry.snapshot().len(), 1);
//! ```

use std::sync::Arc;

use crate::column::{ColumnSet, ColumnSpec, Generator, Value};

/// Everything about a column except its generator.
#[derive(Debug, Clone)]
pub struct ColumnDecl {
    name: String,
    declared_type: String,
    constraint: Option<String>,
    reserved: bool,
    protected: bool,
}

impl ColumnDecl {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            constraint: None,
            reserved: false,
            protected: false,
        }
    }

    #[must_use]
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    #[must_use]
    pub const fn reserved(mut self) -> Self {
        self.reserved = true;
        self
    }

    #[must_use]
    pub const fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind a generator, producing the full specification.
    #[must_use]
    pub fn into_spec(self, generator: Generator) -> ColumnSpec {
        let mut spec = ColumnSpec::with_shared_generator(self.name, self.declared_type, generator);
        if let Some(constraint) = self.constraint {
            spec = spec.with_constraint(constraint);
        }
        if self.reserved {
            spec = spec.reserved();
        }
        if self.protected {
            spec = spec.protected();
        }
        spec
    }
}

/// Name -> specification mapping used to pre-declare reusable columns.
#[derive(Debug, Default)]
pub struct ColumnRegistry {
    columns: ColumnSet,
}

impl ColumnRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generator under `decl`, returning the generator for reuse.
    ///
    /// Registering a name again replaces the earlier entry.
    pub fn register<F>(&mut self, decl: ColumnDecl, generator: F) -> Generator
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        let generator: Generator = Arc::new(generator);
        tracing::debug!(column = decl.name(), "registering column");
        self.columns.upsert(decl.into_spec(Arc::clone(&generator)));
        generator
    }

    /// An independent copy of every registered column, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> ColumnSet {
        self.columns.clone()
    }

    /// Remove every registered column.
    pub fn clear(&mut self) {
        self.columns.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
