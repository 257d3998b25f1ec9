//! PileCore - grouping and max-bearing envelope CLI
//!
//! The `pilecore` command post-processes bearing capacity results fetched
//! from the PileCore service.
//!
//! ## Commands
//!
//! - `group`: Group CPTs locally and list clusters and per-level candidates
//! - `envelope`: Build the max-bearing envelope, optionally over server-side
//!   sub-groups, and write it as a JSON artifact

mod config;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, Level};

use pilecore_api::{decode_inputs, resolve_document, DecodedInputs};
use pilecore_core::{
    write_envelope_json, Analysis, AnalysisOutcome, EnvelopeArtifact, Grouper, Grouping,
    TiePolicy,
};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "pilecore")]
#[command(author = "PileCore SDK Developers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Grouping and max-bearing envelopes for PileCore results", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Response documents shared by every command.
#[derive(Args, Debug, Clone)]
struct InputArgs {
    /// Bearing results response (JSON, plain or task document)
    #[arg(short, long)]
    bearing: PathBuf,

    /// CPT input metadata keyed by test id (JSON)
    #[arg(long)]
    cpt_input: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ULS pile load in kN, overrides the config file
    #[arg(long)]
    pile_load: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Group CPTs and list clusters and per-level candidates
    Group {
        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Build the max-bearing envelope
    Envelope {
        #[command(flatten)]
        inputs: InputArgs,

        /// Grouper response with server-side sub-groups (JSON)
        #[arg(short, long)]
        groups: Option<PathBuf>,

        /// Tie policy between equal single and group maxima
        #[arg(long)]
        tie_policy: Option<TiePolicy>,

        /// Envelope column to print
        #[arg(long, default_value = "value")]
        column: String,

        /// Write the envelope artifact to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    pilecore_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Group { inputs } => {
            print!("{}", cmd_group(&inputs)?);
            Ok(())
        }
        Commands::Envelope {
            inputs,
            groups,
            tie_policy,
            column,
            output,
        } => {
            print!(
                "{}",
                cmd_envelope(
                    &inputs,
                    groups.as_deref(),
                    tie_policy,
                    &column,
                    output.as_deref()
                )?
            );
            Ok(())
        }
    }
}

fn read_json_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

/// Read a response file, unwrapping a task-status document.
fn read_response(path: &Path) -> Result<Value> {
    let document = read_json_file(path)?;
    resolve_document(document)
        .and_then(|outcome| outcome.into_result())
        .with_context(|| format!("No usable result in {:?}", path))
}

fn load_inputs(inputs: &InputArgs, groups: Option<&Path>) -> Result<DecodedInputs> {
    let bearing = read_response(&inputs.bearing)?;
    let cpt_input = inputs.cpt_input.as_deref().map(read_json_file).transpose()?;
    let grouper = groups.map(read_response).transpose()?;
    decode_inputs(&bearing, cpt_input.as_ref(), grouper.as_ref())
        .context("Failed to decode service responses")
}

fn cmd_group(inputs: &InputArgs) -> Result<String> {
    let config = AppConfig::load(inputs.config.as_deref())?.with_overrides(inputs.pile_load, None);
    let decoded = load_inputs(inputs, None)?;
    let grouping = Grouper::new(config.grouper)
        .context("Invalid grouper configuration")?
        .group(&decoded.store)
        .context("Grouping failed")?;
    info!(
        clusters = grouping.clusters().len(),
        selected = grouping.selected_ids().len(),
        "grouping complete"
    );
    Ok(render_grouping(&grouping))
}

fn cmd_envelope(
    inputs: &InputArgs,
    groups: Option<&Path>,
    tie_policy: Option<TiePolicy>,
    column: &str,
    output: Option<&Path>,
) -> Result<String> {
    let config =
        AppConfig::load(inputs.config.as_deref())?.with_overrides(inputs.pile_load, tie_policy);
    let decoded = load_inputs(inputs, groups)?;
    let analysis = Analysis::new(&decoded.store);

    let outcome: AnalysisOutcome = match decoded.clusters() {
        Some(clusters) => {
            let load = config
                .grouper
                .required_load()
                .context("A pile load is required")?;
            analysis.run_with_clusters(clusters, load, &config.envelope)
        }
        None => analysis.run_local(&config.grouper, &config.envelope),
    }
    .context("Envelope analysis failed")?;

    let pivot = outcome
        .envelope
        .results_per_cpt(column)
        .with_context(|| format!("Cannot print column '{}'", column))?;
    let mut out = pivot.to_string();

    let mismatches = decoded.cross_check(&outcome.cluster_results);
    if !mismatches.is_empty() {
        let _ = writeln!(
            out,
            "{} sub-group value(s) differ from the local aggregation",
            mismatches.len()
        );
    }

    if let Some(path) = output {
        let artifact = EnvelopeArtifact::new(&decoded.store, &outcome.envelope);
        write_envelope_json(path, &artifact)
            .with_context(|| format!("Failed to write envelope artifact to {:?}", path))?;
        let _ = writeln!(out, "Envelope written to {:?}", path);
    }
    Ok(out)
}

fn render_grouping(grouping: &Grouping) -> String {
    let mut out = String::new();
    for excluded in grouping.excluded() {
        let _ = writeln!(out, "Excluded {}: {}", excluded.cpt, excluded.reason);
    }
    for summary in grouping.summaries() {
        let members: Vec<&str> = summary.members.iter().map(|m| m.as_str()).collect();
        let _ = writeln!(
            out,
            "Group {}{} [{}] valid {} .. {} ({} consecutive)",
            summary.id,
            if summary.selected { " *" } else { "" },
            members.join(", "),
            summary
                .shallowest_valid_level
                .map_or_else(|| "-".to_string(), |l| l.to_string()),
            summary
                .deepest_valid_level
                .map_or_else(|| "-".to_string(), |l| l.to_string()),
            summary.consecutive_valid_levels,
        );
    }
    for level in grouping.levels() {
        let valid: Vec<String> = level.valid().map(|c| c.cluster.to_string()).collect();
        let selected: Vec<String> = level.selected.iter().map(|c| c.to_string()).collect();
        let _ = writeln!(
            out,
            "{}: valid [{}] selected [{}]",
            level.pile_tip_level,
            valid.join(", "),
            selected.join(", "),
        );
    }
    out
}
