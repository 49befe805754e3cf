//! Command-line interface definitions and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{separator_byte, ClusterParams, PipelineConfig};

/// Company lifecycle segmentation, transaction network analysis and receipt projection
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline and write both output tables
    Run(RunArgs),
    /// Show insights and peer benchmark for one company
    Inspect {
        #[command(flatten)]
        run: RunArgs,

        /// Company identifier (case and surrounding whitespace are ignored)
        #[arg(long)]
        id: String,
    },
    /// Score a new company against the fitted segments
    Classify {
        #[command(flatten)]
        run: RunArgs,

        /// Comma-separated raw features
        /// Example: --values "250000,12000,6.5,80000,95000" for
        /// revenue, balance, age in years, payments, receipts
        #[arg(long)]
        values: String,
    },
}

/// Inputs, outputs and clustering settings shared by every subcommand
#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Company snapshot table
    #[arg(short, long, default_value = "entities.csv")]
    pub entities: PathBuf,

    /// Transaction log
    #[arg(short, long, default_value = "transactions.csv")]
    pub transactions: PathBuf,

    /// Output path for the merged company table
    #[arg(long, default_value = "entities_enriched.csv")]
    pub entity_output: PathBuf,

    /// Output path for the augmented transaction table
    #[arg(long, default_value = "transactions_enriched.csv")]
    pub transaction_output: PathBuf,

    /// Field delimiter of both input files
    #[arg(long, default_value = ";")]
    pub input_separator: char,

    /// Field delimiter of both output files
    #[arg(long, default_value = ",")]
    pub output_separator: char,

    /// Seed for K-Means initialisation
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Number of K-Means initialisations
    #[arg(long, default_value = "10")]
    pub n_runs: usize,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,
}

impl RunArgs {
    /// Build the pipeline configuration
    pub fn to_config(&self) -> crate::Result<PipelineConfig> {
        Ok(PipelineConfig {
            entities_path: self.entities.clone(),
            transactions_path: self.transactions.clone(),
            entity_output: self.entity_output.clone(),
            transaction_output: self.transaction_output.clone(),
            input_separator: separator_byte(self.input_separator)?,
            output_separator: separator_byte(self.output_separator)?,
            clustering: ClusterParams {
                seed: self.seed,
                n_runs: self.n_runs,
                max_iters: self.max_iters,
                tolerance: self.tolerance,
            },
        })
    }
}

/// Parse raw feature values for scoring
/// Expected format: "revenue,balance,age,payments,receipts"
pub fn parse_feature_values(values: &str) -> crate::Result<[f64; 5]> {
    const NAMES: [&str; 5] = ["revenue", "balance", "age", "payments", "receipts"];

    let parts: Vec<&str> = values.split(',').collect();
    if parts.len() != NAMES.len() {
        anyhow::bail!("Values must be in format 'revenue,balance,age,payments,receipts'");
    }

    let mut parsed = [0.0; 5];
    for ((slot, part), name) in parsed.iter_mut().zip(&parts).zip(NAMES) {
        *slot = part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid {} value: {}", name, part))?;
    }
    Ok(parsed)
}
