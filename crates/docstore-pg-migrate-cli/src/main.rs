//! docstore-pg-migrate CLI - document store to PostgreSQL migration.

use clap::{Args, Parser, Subcommand};
use docstore_pg_migrate::health;
use docstore_pg_migrate::schema::{ddl, Catalog, Phase};
use docstore_pg_migrate::{
    CollectionMapper, CollectionStatus, Config, LoadProgress, MigrateError, Orchestrator, PhaseResult,
    PostgresTarget, Provisioner,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "docstore-pg-migrate")]
#[command(about = "Document store to PostgreSQL migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    /// Write the JSON run report here (overrides migration.report_file)
    #[arg(long)]
    report_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, inspect or verify the destination schema
    #[command(subcommand)]
    Schema(SchemaCommand),

    /// Move collections into the destination tables
    #[command(subcommand)]
    Migrate(MigrateCommand),

    /// Test the export directory and the PostgreSQL connection
    HealthCheck {
        /// Check only the export directory, against an in-memory target
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum SchemaCommand {
    /// Create tables phase by phase, then triggers, indexes and policies
    Provision {
        /// Provision only this phase
        #[arg(long)]
        phase: Option<u32>,

        /// Do not require earlier phases to exist when using --phase
        #[arg(long)]
        skip_dependency_check: bool,

        /// Skip triggers, indexes, row security and policies
        #[arg(long)]
        no_extras: bool,
    },

    /// Print the DDL without connecting
    Show {
        /// Print only this phase
        #[arg(long)]
        phase: Option<u32>,

        /// Schema to qualify names with
        #[arg(long, default_value = "public")]
        schema: String,
    },

    /// Report catalog tables, foreign keys, indexes and triggers missing
    /// from the target
    Verify,
}

#[derive(Subcommand)]
enum MigrateCommand {
    /// Run the migration
    Run(RunArgs),

    /// List collection to table mappings
    List,
}

#[derive(Args)]
struct RunArgs {
    /// Migrate only this collection
    #[arg(long)]
    collection: Option<String>,

    /// Load into an in-memory target instead of PostgreSQL. It checks
    /// columns, NOT NULL and unique keys, but not foreign key values or
    /// CHECK constraints
    #[arg(long)]
    dry_run: bool,

    /// Records per bulk insert
    #[arg(long, env = "BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Pause between batches in milliseconds
    #[arg(long, env = "DELAY_BETWEEN_BATCHES")]
    batch_delay_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    match &cli.command {
        Commands::Schema(SchemaCommand::Show { phase, schema }) => show_schema(*phase, schema, cli.output_json),
        Commands::Schema(SchemaCommand::Provision {
            phase,
            skip_dependency_check,
            no_extras,
        }) => {
            let config = load_config(&cli.config)?;
            let cancel = setup_signal_handler();
            provision(&cli, &config, *phase, *skip_dependency_check, *no_extras, cancel).await
        }
        Commands::Schema(SchemaCommand::Verify) => {
            let config = load_config(&cli.config)?;
            verify(&cli, &config).await
        }
        Commands::Migrate(MigrateCommand::List) => list_mappings(&cli),
        Commands::HealthCheck { dry_run } => {
            let config = load_config(&cli.config)?;
            health_check(&cli, &config, *dry_run).await
        }
        Commands::Migrate(MigrateCommand::Run(args)) => {
            let config = load_config(&cli.config)?;
            let cancel = setup_signal_handler();
            migrate(&cli, config, args, cancel).await
        }
    }
}

/// Load the config file; a missing file is a configuration error.
fn load_config(path: &Path) -> Result<Config, MigrateError> {
    let config = Config::load(path).map_err(|e| match e {
        MigrateError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            MigrateError::Config(format!("Configuration file not found: {}", path.display()))
        }
        other => other,
    })?;
    info!("Loaded configuration from {:?}", path);
    Ok(config)
}

fn selected_phases(catalog: &Catalog, phase: Option<u32>) -> Result<Vec<Phase>, MigrateError> {
    match phase {
        None => Ok(catalog.phases()),
        Some(n) => catalog
            .phase(n)
            .map(|p| vec![p])
            .ok_or_else(|| MigrateError::Config(format!("Unknown phase {}", n))),
    }
}

fn show_schema(phase: Option<u32>, schema: &str, output_json: bool) -> Result<(), MigrateError> {
    let catalog = Catalog::builtin();
    let phases = selected_phases(&catalog, phase)?;

    let mut statements: Vec<(String, String)> = Vec::new();
    for p in &phases {
        for table in &p.tables {
            statements.push((
                format!("Phase {}: {}", p.number, table.name),
                ddl::create_table(table, schema)?,
            ));
        }
    }

    if phase.is_none() {
        statements.push(("Trigger function".into(), ddl::updated_at_function(schema)?));
        for table in catalog.tables {
            statements.push((
                format!("Trigger: {}", table.name),
                ddl::updated_at_trigger(table, schema)?,
            ));
        }
        for index in catalog.indexes {
            statements.push((format!("Index: {}", index.name), ddl::create_index(index, schema)?));
        }
        for table in catalog.tables.iter().filter(|t| t.row_security) {
            statements.push((
                format!("Row security: {}", table.name),
                ddl::enable_row_security(table.name, schema)?,
            ));
        }
        for def in catalog.policies {
            statements.push((
                format!("Policy: {} ({})", def.policy.name, def.table),
                ddl::create_policy(def.table, &def.policy, schema)?,
            ));
        }
    }

    if output_json {
        let items: Vec<_> = statements
            .iter()
            .map(|(label, sql)| json!({"label": label, "sql": sql}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        for (label, sql) in &statements {
            println!("-- {}\n{};\n", label, sql);
        }
    }
    Ok(())
}

fn phase_json(result: &PhaseResult) -> serde_json::Value {
    json!({
        "phase": result.phase,
        "succeeded": result.succeeded,
        "created_tables": result.created_tables,
        "error": result.error.as_ref().map(|e| e.to_string()),
    })
}

async fn provision(
    cli: &Cli,
    config: &Config,
    phase: Option<u32>,
    skip_dependency_check: bool,
    no_extras: bool,
    cancel: CancellationToken,
) -> Result<(), MigrateError> {
    let target = Arc::new(PostgresTarget::connect(&config.target).await?);
    let provisioner = Provisioner::new(target, Catalog::builtin(), &config.target.schema)
        .with_retry(config.migration.retry_policy())
        .with_cancel(cancel);

    let results = match phase {
        Some(n) => vec![provisioner.provision_phase_checked(n, skip_dependency_check).await?],
        None => provisioner.provision_all().await,
    };
    let failed = results.iter().any(|r| !r.succeeded);

    let extras = if phase.is_none() && !no_extras && !failed {
        Some(provisioner.provision_extras().await)
    } else {
        None
    };

    if cli.output_json {
        let phases: Vec<_> = results.iter().map(phase_json).collect();
        let doc = json!({"phases": phases, "extras": extras});
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        for r in &results {
            match &r.error {
                None => println!("  Phase {}: {}", r.phase, r.created_tables.join(", ")),
                Some(e) => println!("  Phase {} FAILED: {}", r.phase, e),
            }
        }
        if let Some(extras) = &extras {
            println!(
                "  Extras: {} succeeded, {} failed",
                extras.succeeded, extras.failed
            );
            for e in &extras.errors {
                println!("    {}", e);
            }
        }
    }

    if let Some(err) = results.into_iter().find_map(|r| r.error) {
        return Err(err);
    }
    match extras {
        Some(extras) => extras.outcome(),
        None => Ok(()),
    }
}

async fn verify(cli: &Cli, config: &Config) -> Result<(), MigrateError> {
    let target = Arc::new(PostgresTarget::connect(&config.target).await?);
    let provisioner = Provisioner::new(target, Catalog::builtin(), &config.target.schema)
        .with_retry(config.migration.retry_policy());
    let report = provisioner.verify().await?;

    if cli.output_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if report.is_complete() {
        println!("All catalog tables, foreign keys, indexes and triggers exist");
    } else {
        if !report.missing_tables.is_empty() {
            println!("Missing tables:");
            for table in &report.missing_tables {
                println!("  {}", table);
            }
        }
        for gaps in &report.incomplete_tables {
            println!("{}:", gaps.table);
            for fk in &gaps.missing_foreign_keys {
                println!("  missing foreign key {}", fk);
            }
            for index in &gaps.missing_indexes {
                println!("  missing index {}", index);
            }
            for trigger in &gaps.missing_triggers {
                println!("  missing trigger {}", trigger);
            }
        }
    }

    if report.is_complete() {
        Ok(())
    } else {
        Err(MigrateError::Incomplete(format!(
            "schema incomplete: {} missing tables or objects",
            report.problem_count()
        )))
    }
}

async fn health_check(cli: &Cli, config: &Config, dry_run: bool) -> Result<(), MigrateError> {
    let result = health::check_config(config, dry_run).await;

    if cli.output_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Health Check Results:");
        println!(
            "  Source (JSON export): {} ({}ms, {} collections)",
            if result.source_connected { "OK" } else { "FAILED" },
            result.source_latency_ms,
            result.source_collections
        );
        if let Some(ref err) = result.source_error {
            println!("    Error: {}", err);
        }
        println!(
            "  Target ({}): {} ({}ms)",
            if dry_run { "in-memory" } else { "PostgreSQL" },
            if result.target_connected { "OK" } else { "FAILED" },
            result.target_latency_ms
        );
        if let Some(ref err) = result.target_error {
            println!("    Error: {}", err);
        }
        println!(
            "\n  Overall: {}",
            if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
        );
    }

    if !result.healthy {
        return Err(MigrateError::Config("Health check failed".to_string()));
    }
    Ok(())
}

fn list_mappings(cli: &Cli) -> Result<(), MigrateError> {
    // Extra mappings come from the config when there is one.
    let mapper = if cli.config.exists() {
        CollectionMapper::builtin().with_extra(&load_config(&cli.config)?.migration.extra_mappings)
    } else {
        CollectionMapper::builtin()
    };

    if cli.output_json {
        let entries: Vec<_> = mapper
            .entries()
            .iter()
            .map(|m| json!({"collection": m.collection, "table": m.table}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for m in mapper.entries() {
            println!("{:<26} -> {}", m.collection, m.table);
        }
    }
    Ok(())
}

async fn migrate(
    cli: &Cli,
    mut config: Config,
    args: &RunArgs,
    cancel: CancellationToken,
) -> Result<(), MigrateError> {
    if let Some(size) = args.batch_size {
        config.migration.batch_size = Some(size);
    }
    if let Some(delay) = args.batch_delay_ms {
        config.migration.batch_delay_ms = Some(delay);
    }
    config.validate()?;

    if let Some(collection) = &args.collection {
        let mapper = CollectionMapper::builtin().with_extra(&config.migration.extra_mappings);
        if !mapper.contains(collection) {
            let available: Vec<&str> = mapper.collections().collect();
            eprintln!("Available collections: {}", available.join(", "));
            return Err(MigrateError::Mapping {
                collection: collection.clone(),
            });
        }
        config.migration.collections = vec![collection.clone()];
    }

    let mut orchestrator = Orchestrator::from_config(&config, args.dry_run, cancel).await?;
    if cli.progress {
        orchestrator = orchestrator.with_progress(Arc::new(|p: &LoadProgress| {
            if let Ok(line) = serde_json::to_string(p) {
                eprintln!("{}", line);
            }
        }));
    }

    let summary = orchestrator.run_all().await;

    if let Some(path) = cli.report_file.as_ref().or(config.migration.report_file.as_ref()) {
        summary.save(path)?;
        info!("Wrote run report to {:?}", path);
    }

    if cli.output_json {
        println!("{}", summary.to_json()?);
    } else {
        print!("{}", summary.render_text());
    }

    if let Some(collection) = &args.collection {
        if let Some(failed) = summary
            .collections
            .iter()
            .find(|r| r.status == CollectionStatus::Failed)
        {
            return Err(MigrateError::extraction(
                collection.clone(),
                failed.errors.join("; "),
            ));
        }
    }
    summary.outcome()
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Cancel the returned token on SIGINT or SIGTERM. The current batch
/// finishes; nothing after it starts.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current batch...", name);
                    token.cancel();
                });
            }
            Err(e) => eprintln!("Could not install {} handler: {}", name, e),
        }
    }

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current batch...");
            token.cancel();
        }
    });

    cancel_token
}
