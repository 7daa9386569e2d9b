//! unflag CLI - remove retired feature flags from a codebase.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use unflag::error::exit_code;
use unflag::transform::{FlagRemover, TransformationResult};
use unflag::walk::{build_exclude_set, discover_files};
use unflag::FlagConfig;

/// Remove retired feature flags from TypeScript/JavaScript sources.
///
/// Reads a flag configuration, rewrites every file under the target path,
/// and reports what was removed. Dry-run shows the changes without
/// touching any file.
#[derive(Parser, Debug)]
#[command(
    name = "unflag",
    version,
    about = "Remove retired feature flags from TypeScript/JavaScript sources",
    long_about = r#"
Remove retired feature flags from TypeScript/JavaScript sources.

Examples:
    unflag -c flags.yaml -t src/            Rewrite everything under src/
    unflag -c flags.yaml -t src/ --dry-run  Show changes without writing
    unflag -c flags.json -t app.ts          Transform a single file
    unflag -c flags.yaml -e 'vendor/**,**/*.spec.ts'
                                            Skip vendored code and specs
"#
)]
struct Cli {
    /// Path to the flag configuration (YAML or JSON).
    #[arg(short, long)]
    config: PathBuf,

    /// File or directory to transform.
    #[arg(short, long, default_value = ".")]
    target: PathBuf,

    /// Report changes without writing any file.
    #[arg(short = 'd', long)]
    dry_run: bool,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Comma-separated glob patterns to exclude.
    #[arg(short, long, value_delimiter = ',')]
    exclude: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(&cli) {
        Ok(()) => std::process::exit(exit_code::SUCCESS),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(exit_code::FAILURE);
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let (config, config_warnings) = FlagConfig::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    let excludes = build_exclude_set(&cli.exclude)?;
    let files = discover_files(&cli.target, &excludes)
        .with_context(|| format!("failed to scan target {}", cli.target.display()))?;

    if files.is_empty() {
        println!("no matching source files under {}", cli.target.display());
        return Ok(());
    }
    tracing::info!(files = files.len(), "starting flag removal");

    let remover = FlagRemover::new(&config);

    // Per-file state is shared-nothing; the file loop parallelizes freely.
    let mut outcomes: Vec<(PathBuf, unflag::Result<TransformationResult>)> = files
        .par_iter()
        .map(|path| (path.clone(), remover.transform_file(path)))
        .collect();
    outcomes.sort_by(|a, b| a.0.cmp(&b.0));

    let mut changed = 0usize;
    let mut failed = 0usize;
    let mut warnings: Vec<(PathBuf, String)> = Vec::new();
    for (path, warning) in config_warnings
        .iter()
        .map(|w| (cli.config.clone(), w.clone()))
    {
        warnings.push((path, warning));
    }

    for (path, outcome) in &outcomes {
        match outcome {
            Ok(result) => {
                for warning in &result.warnings {
                    warnings.push((path.clone(), warning.clone()));
                }
                if !result.has_changes {
                    continue;
                }
                changed += 1;
                let prefix = if cli.dry_run { "Would modify " } else { "" };
                println!("{prefix}{}: {}", path.display(), result.summary());

                if !cli.dry_run {
                    std::fs::write(path, &result.transformed_source)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                }
            }
            Err(err) => {
                failed += 1;
                eprintln!("{}: {err}", path.display());
            }
        }
    }

    println!(
        "{} file(s) processed, {} modified{}",
        outcomes.len(),
        changed,
        if cli.dry_run { " (dry-run)" } else { "" }
    );
    if failed > 0 {
        println!("{failed} file(s) failed");
    }

    if !warnings.is_empty() {
        println!("\nwarnings:");
        for (path, warning) in &warnings {
            println!("  {}: {}", path.display(), warning);
        }
    }

    Ok(())
}
