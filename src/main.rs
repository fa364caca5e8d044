//! umbrella-review - Umbrella review research-data pipeline
//!
//! Turns the coding workbook of an umbrella review (a directory of CSV
//! sheets) into summary tables, legend tables and SVG charts.
//!
//! ## Usage
//!
//! ```bash
//! umbrella-review run --data ./workbook --bib savedrecs.txt
//! umbrella-review reference taxon --data ./workbook
//! umbrella-review config > pipeline.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};
use umbrella_review::{
    config::PipelineConfig,
    join::UnmatchedPolicy,
    pipeline::{self, RunSummary},
    reference::reference_table,
    table::Workbook,
};

// ============================================================================
// CLI Definition
// ============================================================================

/// Umbrella review research-data pipeline
#[derive(Parser)]
#[command(name = "umbrella-review")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit log lines as JSON objects
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every element, the appraisal and the networks
    Run {
        /// Directory holding one CSV file per workbook sheet
        #[arg(long)]
        data: PathBuf,

        /// Bibliographic export (flat CSV or Web of Science plain text)
        #[arg(long)]
        bib: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Pipeline configuration (JSON); built-in defaults otherwise
        #[arg(long)]
        config: Option<PathBuf>,

        /// Fail on codes missing from their vocabulary
        #[arg(long)]
        strict: bool,
    },

    /// Print the reference table of one element
    Reference {
        /// Element name, e.g. "taxon"
        element: String,

        #[arg(long)]
        data: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the default configuration as JSON
    Config,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Run {
            data,
            bib,
            output,
            config,
            strict,
        } => run_pipeline(data, bib, output, config, strict),
        Commands::Reference {
            element,
            data,
            config,
        } => print_reference(&element, &data, config.as_deref()),
        Commands::Config => {
            println!("{}", PipelineConfig::default().to_json()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::load(p)
            .with_context(|| format!("Failed to load configuration {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

// ============================================================================
// Pipeline
// ============================================================================

fn run_pipeline(
    data: PathBuf,
    bib: Option<PathBuf>,
    output_dir: PathBuf,
    config_path: Option<PathBuf>,
    strict: bool,
) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    if strict {
        config.unmatched = UnmatchedPolicy::Fail;
    }

    println!("\n--- Stage 1: Loading Workbook ---");
    let workbook = Workbook::load_dir(&data)
        .with_context(|| format!("Failed to load workbook from {}", data.display()))?;
    println!("Loaded {} sheets: {}", workbook.len(), workbook.names().collect::<Vec<_>>().join(", "));

    let output_folder =
        pipeline::create_output_folder(&output_dir).context("Failed to create output directory")?;
    println!("Output folder: {}", output_folder.display());

    println!("\n--- Stage 2: Data Elements, Appraisal and Networks ---");
    let summary = pipeline::run(&workbook, bib.as_deref(), &config, &output_folder)
        .context("Pipeline failed")?;

    print_summary(&summary);
    info!(folder = %output_folder.display(), "Pipeline complete");
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("\n--- Summary ---");
    for element in &summary.elements {
        println!(
            "{:<24} {:>5} rows  {:>3} groups  {:>3} codes  -> {:?}",
            element.name,
            element.rows,
            element.summary.rows.len(),
            element.reference.len(),
            element.chart
        );
    }
    if let Some(appraisal) = &summary.appraisal {
        println!(
            "{:<24} {:>5} reviews {:>3} scores       -> {:?}",
            "appraisal",
            appraisal.reviews,
            appraisal.long.len(),
            appraisal.heatmap
        );
    }
    for network in &summary.networks {
        println!(
            "{:<24} {:>5} nodes {:>5} edges {:>3} drawn -> {:?}",
            network.name, network.nodes, network.edges, network.drawn, network.chart
        );
    }
}

// ============================================================================
// Reference
// ============================================================================

fn print_reference(element: &str, data: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let workbook = Workbook::load_dir(data)
        .with_context(|| format!("Failed to load workbook from {}", data.display()))?;

    let entries = pipeline::element_reference(&workbook, &config, element)?;
    let table = reference_table(element, &entries)?;

    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    wtr.write_record(table.columns())
        .context("Failed to write CSV header")?;
    for row in table.rows() {
        wtr.write_record(row.iter().map(|c| c.as_deref().unwrap_or("")))
            .context("Failed to write CSV record")?;
    }
    wtr.flush().context("Failed to flush CSV")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_json_flag_is_global() -> Result<()> {
        let cli = Cli::try_parse_from(["umbrella-review", "config", "--log-json"])?;
        assert!(cli.log_json);
        assert!(matches!(cli.command, Commands::Config));

        let cli = Cli::try_parse_from(["umbrella-review", "--debug", "config"])?;
        assert!(!cli.log_json);
        assert!(cli.debug);
        Ok(())
    }

    #[test]
    fn test_run_strict_arguments() -> Result<()> {
        let cli = Cli::try_parse_from(["umbrella-review", "run", "--data", "sheets", "--strict"])?;
        match cli.command {
            Commands::Run { data, strict, output, bib, .. } => {
                assert_eq!(data, PathBuf::from("sheets"));
                assert!(strict);
                assert_eq!(output, PathBuf::from("./output"));
                assert!(bib.is_none());
            }
            _ => panic!("expected run"),
        }
        Ok(())
    }
}
