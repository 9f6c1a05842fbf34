#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::time::SystemTime;

use kraft::config::SimulationConfig;
use kraft::simulation::SimulatedConnection;
use kraft::{
    ColumnDecl, ColumnRegistry, Connection, EvolutionPolicy, KraftError, MutationExecutor,
    SchemaState, SimulationRunner, Value, generators, random,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PRIMARY_KEY: &str = "id";
const MODIFIED_COLUMN: &str = "updated_at";

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kraft=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match SimulationConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    let seed = config.seed.unwrap_or_else(rand::random);

    tracing::info!(
        "Loaded configuration: table={}, total_records={}, batch_size={}, seed={seed}, dry_run={}",
        config.target,
        config.total_records,
        config.batch_size,
        config.dsn.is_none()
    );

    let result = match config.dsn.as_deref() {
        None => simulate(SimulatedConnection::new(PRIMARY_KEY), &config, seed),
        Some(dsn) => connect(dsn).and_then(|conn| simulate(conn, &config, seed)),
    };

    if let Err(e) = result {
        tracing::error!("Simulation failed: {e}");
        std::process::exit(1);
    }
}

#[cfg(feature = "postgres")]
fn connect(dsn: &str) -> Result<kraft::connection::PostgresConnection, KraftError> {
    Ok(kraft::connection::PostgresConnection::connect(dsn)?)
}

#[cfg(not(feature = "postgres"))]
fn connect(_dsn: &str) -> Result<SimulatedConnection, KraftError> {
    Err(KraftError::Configuration(
        "KRAFT_DSN is set but kraft was built without the `postgres` feature".to_string(),
    ))
}

/// The demo sales table: two protected bookkeeping columns, four plain ones
/// and two held in reserve for evolution.
fn demo_catalog(seed: u64) -> ColumnRegistry {
    let mut registry = ColumnRegistry::new();

    let id = generators::uuid_v4(seed);
    registry.register(
        ColumnDecl::new(PRIMARY_KEY, "UUID")
            .with_constraint("PRIMARY KEY")
            .protected(),
        move || id(),
    );
    registry.register(
        ColumnDecl::new(MODIFIED_COLUMN, "TIMESTAMPTZ")
            .with_constraint("NOT NULL DEFAULT now()")
            .protected(),
        || Value::Timestamp(SystemTime::now()),
    );

    let product = generators::choice(
        seed.wrapping_add(1),
        &["keyboard", "monitor", "mouse", "headset", "webcam"],
    );
    registry.register(ColumnDecl::new("product", "TEXT"), move || product());
    let region = generators::choice(seed.wrapping_add(2), &["north", "south", "east", "west"]);
    registry.register(ColumnDecl::new("region", "TEXT"), move || region());
    let quantity = generators::int_range(seed.wrapping_add(3), 1..=20);
    registry.register(ColumnDecl::new("quantity", "INT"), move || quantity());
    let unit_price = generators::float_range(seed.wrapping_add(4), 5.0, 500.0);
    registry.register(ColumnDecl::new("unit_price", "DOUBLE PRECISION"), move || unit_price());

    let discount = generators::float_range(seed.wrapping_add(5), 0.0, 0.3);
    registry.register(
        ColumnDecl::new("discount_rate", "DOUBLE PRECISION").reserved(),
        move || discount(),
    );
    let coupon = generators::choice(seed.wrapping_add(6), &["SPRING10", "VIP20", "WELCOME5"]);
    registry.register(ColumnDecl::new("coupon_code", "TEXT").reserved(), move || coupon());

    registry
}

fn simulate<C: Connection>(
    connection: C,
    config: &SimulationConfig,
    seed: u64,
) -> Result<(), KraftError> {
    let registry = demo_catalog(seed);
    let schema = SchemaState::new(config.target.clone(), registry.snapshot());
    let executor = MutationExecutor::new(
        config.target.clone(),
        PRIMARY_KEY,
        random::seeded(seed.wrapping_add(100)),
    )
    .with_modified_column(MODIFIED_COLUMN);
    let policy = EvolutionPolicy::new(
        config.evolution.clone(),
        random::seeded(seed.wrapping_add(200)),
    )?;

    let mut runner = SimulationRunner::new(connection, schema, executor)?.with_evolution(policy);
    runner.reset_table()?;
    let report = runner.run(config.total_records, config.batch_size)?;

    let summary = runner
        .evolution()
        .map(|policy| policy.summary(runner.schema()));
    let output = serde_json::json!({
        "seed": seed,
        "table": runner.schema().qualified_name(),
        "batches": report.batches_run,
        "counters": runner.executor().counters(),
        "evolution": summary,
    });
    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::warn!("Failed to render summary: {e}"),
    }
    Ok(())
}
