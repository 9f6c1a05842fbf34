//! Decision engine for schema evolution.
//!
//! Every `interval` batches the policy rolls against `probability`. On a hit
//! it adds a reserved column or drops a droppable one, within the configured
//! budgets, and delegates the structural change to [`SchemaState`].

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::connection::Connection;
use crate::error::{KraftError, Result};
use crate::random::RandomSource;
use crate::schema::SchemaState;

/// Knobs for [`EvolutionPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionConfig {
    /// Number of batches between evolution attempts.
    pub interval: u64,
    /// Chance that an attempt runs when the interval elapses.
    pub probability: f64,
    /// Chance of ADD vs. DROP when both are possible.
    pub add_probability: f64,
    /// Upper bound on promoted columns.
    pub max_additions: u32,
    /// Upper bound on dropped columns.
    pub max_drops: u32,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            interval: 25,
            probability: 0.2,
            add_probability: 0.7,
            max_additions: 10,
            max_drops: 5,
        }
    }
}

impl EvolutionConfig {
    /// Reject a zero interval and probabilities outside `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(KraftError::Configuration(
                "evolution interval must be at least 1".to_string(),
            ));
        }
        for (name, p) in [
            ("evolution probability", self.probability),
            ("add probability", self.add_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(KraftError::Configuration(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvolutionAction {
    Add,
    Drop,
}

impl fmt::Display for EvolutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

/// One structural change that went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvolutionEvent {
    pub version: u64,
    pub action: EvolutionAction,
    pub column: String,
}

/// Result of one [`EvolutionPolicy::evolve`] call.
///
/// "Didn't roll" and "rolled but nothing was eligible" are distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvolutionOutcome {
    /// Not an evolution batch, or the roll missed.
    NotAttempted,
    /// Attempted, but no column could be added or dropped.
    NoEvolutionPossible,
    Added { version: u64, column: String },
    Dropped { version: u64, column: String },
    /// Eligibility predicted a change but the schema made none.
    Inconsistent(EvolutionAction),
}

impl EvolutionOutcome {
    /// Human-readable description, `None` when nothing was attempted.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::NotAttempted | Self::Inconsistent(_) => None,
            Self::NoEvolutionPossible => Some("No evolution possible".to_string()),
            Self::Added { version, column } => Some(format!("[v{version}] Added column: {column}")),
            Self::Dropped { version, column } => {
                Some(format!("[v{version}] Dropped column: {column}"))
            }
        }
    }

    #[must_use]
    pub const fn is_drop(&self) -> bool {
        matches!(self, Self::Dropped { .. })
    }

    /// Whether the active column set changed.
    #[must_use]
    pub const fn changed_schema(&self) -> bool {
        matches!(self, Self::Added { .. } | Self::Dropped { .. })
    }
}

/// Snapshot of the policy's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvolutionSummary {
    pub version: u64,
    pub additions_made: u32,
    pub drops_made: u32,
    pub max_additions: u32,
    pub max_drops: u32,
    pub event_log: Vec<EvolutionEvent>,
    /// Sorted.
    pub dropped_names: Vec<String>,
}

pub struct EvolutionPolicy<R> {
    config: EvolutionConfig,
    rng: R,
    additions_made: u32,
    drops_made: u32,
    dropped_names: BTreeSet<String>,
    event_log: Vec<EvolutionEvent>,
}

impl<R: RandomSource> EvolutionPolicy<R> {
    pub fn new(config: EvolutionConfig, rng: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rng,
            additions_made: 0,
            drops_made: 0,
            dropped_names: BTreeSet::new(),
            event_log: Vec::new(),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Change the add-vs-drop bias between batches.
    pub fn set_add_probability(&mut self, add_probability: f64) -> Result<()> {
        let mut config = self.config.clone();
        config.add_probability = add_probability;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    #[must_use]
    pub const fn additions_made(&self) -> u32 {
        self.additions_made
    }

    #[must_use]
    pub const fn drops_made(&self) -> u32 {
        self.drops_made
    }

    #[must_use]
    pub fn event_log(&self) -> &[EvolutionEvent] {
        &self.event_log
    }

    /// True on evolution batches when the roll lands under `probability`.
    ///
    /// Off-interval batches draw nothing.
    pub fn should_attempt(&mut self, batch_number: u64) -> bool {
        if !batch_number.is_multiple_of(self.config.interval) {
            return false;
        }
        self.rng.unit() < self.config.probability
    }

    /// Maybe add or drop one column.
    pub fn evolve<C: Connection + ?Sized>(
        &mut self,
        batch_number: u64,
        schema: &mut SchemaState,
        connection: &mut C,
    ) -> Result<EvolutionOutcome> {
        if !self.should_attempt(batch_number) {
            return Ok(EvolutionOutcome::NotAttempted);
        }

        let outcome = match self.choose_action(schema) {
            None => EvolutionOutcome::NoEvolutionPossible,
            Some(EvolutionAction::Add) => match schema.promote_reserved(connection)? {
                Some(column) => {
                    self.additions_made += 1;
                    self.record(schema.version(), EvolutionAction::Add, &column);
                    EvolutionOutcome::Added {
                        version: schema.version(),
                        column,
                    }
                }
                None => EvolutionOutcome::Inconsistent(EvolutionAction::Add),
            },
            Some(EvolutionAction::Drop) => match schema.demote_active(connection)? {
                Some(column) => {
                    self.drops_made += 1;
                    self.dropped_names.insert(column.clone());
                    self.record(schema.version(), EvolutionAction::Drop, &column);
                    EvolutionOutcome::Dropped {
                        version: schema.version(),
                        column,
                    }
                }
                None => EvolutionOutcome::Inconsistent(EvolutionAction::Drop),
            },
        };

        match &outcome {
            EvolutionOutcome::Inconsistent(action) => {
                tracing::error!(batch_number, %action, "eligible column vanished before {action}");
            }
            other => {
                if let Some(message) = other.message() {
                    tracing::info!(batch_number, "{message}");
                }
            }
        }
        Ok(outcome)
    }

    fn choose_action(&mut self, schema: &SchemaState) -> Option<EvolutionAction> {
        let can_add = self.additions_made < self.config.max_additions && self.has_available(schema);
        let can_drop = self.drops_made < self.config.max_drops && has_droppable(schema);

        match (can_add, can_drop) {
            (true, false) => Some(EvolutionAction::Add),
            (false, true) => Some(EvolutionAction::Drop),
            (false, false) => None,
            (true, true) => {
                if self.rng.unit() < self.config.add_probability {
                    Some(EvolutionAction::Add)
                } else {
                    Some(EvolutionAction::Drop)
                }
            }
        }
    }

    /// Some reserved column is neither active nor previously dropped.
    fn has_available(&self, schema: &SchemaState) -> bool {
        schema.catalog().iter().any(|c| {
            c.is_reserved()
                && !schema.active_columns().contains(c.name())
                && !self.dropped_names.contains(c.name())
        })
    }

    fn record(&mut self, version: u64, action: EvolutionAction, column: &str) {
        self.event_log.push(EvolutionEvent {
            version,
            action,
            column: column.to_owned(),
        });
    }

    #[must_use]
    pub fn summary(&self, schema: &SchemaState) -> EvolutionSummary {
        EvolutionSummary {
            version: schema.version(),
            additions_made: self.additions_made,
            drops_made: self.drops_made,
            max_additions: self.config.max_additions,
            max_drops: self.config.max_drops,
            event_log: self.event_log.clone(),
            dropped_names: self.dropped_names.iter().cloned().collect(),
        }
    }
}

fn has_droppable(schema: &SchemaState) -> bool {
    schema.active_columns().iter().any(|c| !c.is_protected())
}
