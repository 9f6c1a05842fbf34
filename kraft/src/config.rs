//! Binary configuration module.
//!
//! Loads the simulation setup from environment variables.
//!
//! # Environment Variables
//!
//! - `KRAFT_DSN`: `postgres` connection string (default: unset, dry run)
//! - `KRAFT_SCHEMA`: Target schema (default: `public`)
//! - `KRAFT_TABLE`: Target table (default: `kraft_sales`)
//! - `KRAFT_TOTAL_RECORDS`: Rows to generate (default: `1000`)
//! - `KRAFT_BATCH_SIZE`: Rows per batch (default: `50`)
//! - `KRAFT_EVOLUTION_INTERVAL`: Batches between evolution attempts (default: `3`)
//! - `KRAFT_EVOLUTION_PROBABILITY`: Chance an attempt runs (default: `0.8`)
//! - `KRAFT_ADD_PROBABILITY`: Chance of ADD over DROP (default: `0.7`)
//! - `KRAFT_MAX_ADDITIONS`: Column addition budget (default: `2`)
//! - `KRAFT_MAX_DROPS`: Column drop budget (default: `1`)
//! - `KRAFT_SEED`: RNG seed (default: random)
//!
//! # Invariants
//!
//! - `evolution.interval` is at least 1
//! - Both probabilities are within `[0, 1]`
//! - `batch_size` fits one statement's bind-parameter limit

use std::str::FromStr;

use crate::evolution::EvolutionConfig;
use crate::sql::{MAX_BIND_PARAMS, TableRef};

/// Everything the binary needs to run one simulation.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// `None` runs against the in-memory connection.
    pub dsn: Option<String>,
    pub target: TableRef,
    pub total_records: u64,
    pub batch_size: usize,
    pub evolution: EvolutionConfig,
    /// `None` means pick one at startup.
    pub seed: Option<u64>,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl SimulationConfig {
    pub const DEFAULT_SCHEMA: &'static str = "public";
    pub const DEFAULT_TABLE: &'static str = "kraft_sales";
    pub const DEFAULT_TOTAL_RECORDS: u64 = 1000;
    pub const DEFAULT_BATCH_SIZE: usize = 50;
    pub const DEFAULT_EVOLUTION_INTERVAL: u64 = 3;
    pub const DEFAULT_EVOLUTION_PROBABILITY: f64 = 0.8;
    pub const DEFAULT_ADD_PROBABILITY: f64 = 0.7;
    pub const DEFAULT_MAX_ADDITIONS: u32 = 2;
    pub const DEFAULT_MAX_DROPS: u32 = 1;

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is set but unparsable, a probability
    /// falls outside `[0, 1]`, or the evolution interval is 0.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dsn = lookup("KRAFT_DSN").filter(|v| !v.trim().is_empty());
        let schema = lookup("KRAFT_SCHEMA").unwrap_or_else(|| Self::DEFAULT_SCHEMA.to_string());
        let table = lookup("KRAFT_TABLE").unwrap_or_else(|| Self::DEFAULT_TABLE.to_string());
        for (name, value) in [("KRAFT_SCHEMA", &schema), ("KRAFT_TABLE", &table)] {
            if value.trim().is_empty() {
                return Err(invalid(name, "must not be empty".to_string()));
            }
        }

        let total_records = parse(&lookup, "KRAFT_TOTAL_RECORDS", Self::DEFAULT_TOTAL_RECORDS)?;
        let batch_size = parse(&lookup, "KRAFT_BATCH_SIZE", Self::DEFAULT_BATCH_SIZE)?;
        if batch_size > MAX_BIND_PARAMS {
            return Err(invalid(
                "KRAFT_BATCH_SIZE",
                format!("{batch_size} exceeds the {MAX_BIND_PARAMS} bind-parameter limit"),
            ));
        }

        let interval = parse(&lookup, "KRAFT_EVOLUTION_INTERVAL", Self::DEFAULT_EVOLUTION_INTERVAL)?;
        if interval == 0 {
            return Err(invalid("KRAFT_EVOLUTION_INTERVAL", "must be at least 1".to_string()));
        }
        let probability = parse_probability(
            &lookup,
            "KRAFT_EVOLUTION_PROBABILITY",
            Self::DEFAULT_EVOLUTION_PROBABILITY,
        )?;
        let add_probability =
            parse_probability(&lookup, "KRAFT_ADD_PROBABILITY", Self::DEFAULT_ADD_PROBABILITY)?;
        let max_additions = parse(&lookup, "KRAFT_MAX_ADDITIONS", Self::DEFAULT_MAX_ADDITIONS)?;
        let max_drops = parse(&lookup, "KRAFT_MAX_DROPS", Self::DEFAULT_MAX_DROPS)?;

        let seed = lookup("KRAFT_SEED")
            .map(|value| parse_value("KRAFT_SEED", &value))
            .transpose()?;

        Ok(Self {
            dsn,
            target: TableRef::new(schema, table),
            total_records,
            batch_size,
            evolution: EvolutionConfig {
                interval,
                probability,
                add_probability,
                max_additions,
                max_drops,
            },
            seed,
        })
    }
}

fn invalid(name: &str, message: String) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message,
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| invalid(name, format!("'{value}' is not a valid {}", std::any::type_name::<T>())))
}

fn parse<T, F>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).map_or(Ok(default), |value| parse_value(name, &value))
}

fn parse_probability<F>(lookup: &F, name: &str, default: f64) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let p = parse(lookup, name, default)?;
    if !(0.0..=1.0).contains(&p) {
        return Err(invalid(name, format!("{p} is outside [0, 1]")));
    }
    Ok(p)
}
