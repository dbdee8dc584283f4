//! reqsolve CLI: complete the requirements of a generic signature.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use reqsolve::engine::{CompletionStats, Engine, EngineConfig};
use reqsolve::error::EngineError;
use reqsolve::scenario::Scenario;
use reqsolve::trace::DebugFlags;
use reqsolve::types::TermRoot;
use reqsolve::{Symbol, Term};

#[derive(Parser)]
#[command(name = "reqsolve", version, about = "Generic-requirement completion engine")]
struct Cli {
    /// Engine configuration (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug trace categories, comma-separated, or `all`.
    #[arg(long, global = true)]
    debug: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run completion and print the resulting rules.
    Complete {
        /// Scenario file.
        scenario: PathBuf,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Run completion, then reduce a type to its normal form.
    Reduce {
        /// Scenario file.
        scenario: PathBuf,

        /// Type written against the scenario's parameters, e.g. `T.A`.
        ty: String,
    },

    /// Check a scenario file without running completion.
    Check {
        /// Scenario file.
        scenario: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Serialize)]
struct Report {
    params: Vec<String>,
    stats: CompletionStats,
    rules: Vec<String>,
    conflicting: Vec<String>,
    errors: Vec<String>,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(list) = &cli.debug {
        config.debug = DebugFlags::parse_list(list)
            .map_err(|message| EngineError::InvalidConfig { message })?;
    }

    match cli.command {
        Commands::Complete { scenario, format } => {
            let scenario = Scenario::load(&scenario)?;
            let built = scenario.build(config)?;
            let mut engine = built.engine;
            let stats = engine.complete()?;
            let report = report(&engine, built.param_names, stats);
            match format {
                Format::Json => {
                    let json = serde_json::to_string_pretty(&report).into_diagnostic()?;
                    println!("{json}");
                }
                Format::Text => print_report(&report),
            }
        }

        Commands::Reduce { scenario, ty } => {
            let scenario = Scenario::load(&scenario)?;
            let ty = scenario.parse_type(&ty)?;
            let built = scenario.build(config)?;
            let mut engine = built.engine;
            engine.complete()?;
            let params: Vec<Term> = (0..built.param_names.len())
                .map(|i| Term::from(vec![Symbol::GenericParam(i as u32)]))
                .collect();
            let term = TermRoot::Substitutions(&params)
                .term_for_type(&ty)
                .map_err(reqsolve::ReqError::from)?;
            println!("{term} => {}", engine.reduce(&term));
        }

        Commands::Check { scenario } => {
            let scenario = Scenario::load(&scenario)?;
            let built = scenario.build(config)?;
            println!(
                "ok: {} parameter(s), {} interface(s), {} rule(s)",
                built.param_names.len(),
                built.engine.interfaces().len(),
                built.engine.rules().len()
            );
            for error in &built.errors {
                println!("  unsatisfied: {error}");
            }
        }
    }

    Ok(())
}

fn report(engine: &Engine, params: Vec<String>, stats: CompletionStats) -> Report {
    Report {
        params,
        stats,
        rules: engine.live_rules().map(|r| r.to_string()).collect(),
        conflicting: engine
            .conflicting_rules()
            .iter()
            .map(|r| r.to_string())
            .collect(),
        errors: engine
            .requirement_errors()
            .iter()
            .map(|e| e.to_string())
            .collect(),
    }
}

fn print_report(report: &Report) {
    println!("Parameters:");
    for (i, name) in report.params.iter().enumerate() {
        println!("  τ_0_{i} = {name}");
    }
    println!(
        "Completed in {} round(s): {} rule(s), {} live, {} conflicting, {} relation(s)",
        report.stats.rounds,
        report.stats.rules,
        report.stats.live_rules,
        report.stats.conflicting,
        report.stats.relations
    );
    println!("\nRules:");
    for rule in &report.rules {
        println!("  {rule}");
    }
    if !report.conflicting.is_empty() {
        println!("\nConflicting:");
        for rule in &report.conflicting {
            println!("  {rule}");
        }
    }
    if !report.errors.is_empty() {
        println!("\nUnsatisfied requirements:");
        for error in &report.errors {
            println!("  {error}");
        }
    }
}
