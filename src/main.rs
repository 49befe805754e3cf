//! SegmentForge: company lifecycle segmentation CLI
//!
//! This is the main entrypoint that wires argument parsing and logging to
//! the pipeline, and prints run summaries, insights and classifications.

use anyhow::Result;
use clap::Parser;
use segmentforge::cli::{parse_feature_values, Command, RunArgs};
use segmentforge::data::normalize_id;
use segmentforge::insights::{
    benchmark_against_peers, entity_history, generate_insights, hub_cutoff,
};
use segmentforge::model::FEATURE_NAMES;
use segmentforge::pipeline::{analyze, load_inputs, run_pipeline, Analysis};
use segmentforge::Args;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match &args.command {
        Command::Run(run) => run_full_pipeline(run),
        Command::Inspect { run, id } => run_inspect_mode(run, id),
        Command::Classify { run, values } => run_classify_mode(run, values),
    }
}

/// Run full pipeline and write both tables
fn run_full_pipeline(run: &RunArgs) -> Result<()> {
    println!("=== Lifecycle Segmentation Pipeline ===\n");

    let config = run.to_config()?;
    let analysis = run_pipeline(&config)?;

    print_cluster_statistics(&analysis);

    println!("\n=== Pipeline Complete ===");
    println!("Companies table saved to: {}", config.entity_output.display());
    println!(
        "Transactions table saved to: {}",
        config.transaction_output.display()
    );

    Ok(())
}

/// Print insights and peer comparison for one company
fn run_inspect_mode(run: &RunArgs, id: &str) -> Result<()> {
    let config = run.to_config()?;
    let (entities, transactions) = load_inputs(&config)?;
    let analysis = analyze(entities, transactions, &config.clustering)?;

    let id = normalize_id(id);
    let history = entity_history(&analysis.entities, &id);
    let Some(latest) = history.last() else {
        anyhow::bail!("Company {} not found in the snapshot table", id);
    };

    println!("=== Company {} ===", id);
    println!("  Industry code:    {}", latest.record.industry_code);
    println!("  Lifecycle stage:  {}", latest.stage);
    println!("  Snapshots:        {}", history.len());
    println!("  Annual revenue:   {:.2}", latest.record.revenue);
    println!("  Next receipts:    {:.2}", latest.projection);
    println!("  Centrality:       {:.4}", latest.centrality);
    println!("  Dependency:       {:.1}%", latest.dependency * 100.0);

    println!("\nInsights:");
    for insight in generate_insights(&history, hub_cutoff(&analysis.entities)) {
        println!("  - {}", insight);
    }

    println!("\nPeer benchmark:");
    match benchmark_against_peers(&analysis.entities, &history) {
        Some(benchmark) => {
            let pct = |v: Option<f64>| {
                v.map_or_else(|| "N/A".to_string(), |v| format!("{:+.1}%", v))
            };
            println!(
                "  {} peers in '{}' classified as {}",
                benchmark.peer_count, benchmark.industry_code, benchmark.stage
            );
            println!("  Revenue vs peers: {}", pct(benchmark.revenue_delta_pct));
            println!("  Balance vs peers: {}", pct(benchmark.balance_delta_pct));
        }
        None => println!("  No peers share this industry code and lifecycle stage"),
    }

    Ok(())
}

/// Score a new company using the segments fitted on the configured inputs
fn run_classify_mode(run: &RunArgs, values: &str) -> Result<()> {
    let features = parse_feature_values(values)?;
    println!("=== Classification Mode ===");
    for (name, value) in FEATURE_NAMES.iter().zip(features.iter()) {
        println!("  {:<12} {}", name, value);
    }

    let config = run.to_config()?;
    let (entities, transactions) = load_inputs(&config)?;
    let analysis = analyze(entities, transactions, &config.clustering)?;

    let (cluster, stage) = analysis.model.classify(&features)?;
    let sizes = analysis.model.cluster_sizes();
    let total = analysis.entities.len();

    println!("\n✓ Predicted stage: {} (cluster {})", stage, cluster);
    println!(
        "  Cluster size: {} rows ({:.1}% of total)",
        sizes[cluster],
        sizes[cluster] as f64 / total as f64 * 100.0
    );

    Ok(())
}

fn print_cluster_statistics(analysis: &Analysis) {
    let total = analysis.entities.len();

    println!("\n=== Cluster Statistics ===");
    println!("Snapshot rows: {}", total);
    println!("Transactions:  {}", analysis.transactions.len());
    println!(
        "Network:       {} nodes, {} edges",
        analysis.graph_nodes, analysis.graph_edges
    );
    println!("Within-cluster sum of squares: {:.2}", analysis.model.inertia);

    println!(
        "\n  {:<11} | {:>7} | {:>6} | {:>12} | {:>12} | {:>5} | {:>12} | {:>12}",
        "Stage", "Cluster", "Rows", "Revenue", "Balance", "Age", "Payments", "Receipts"
    );
    println!("  {}", "-".repeat(100));
    for profile in analysis.model.cluster_profiles(&analysis.raw_features) {
        let [revenue, balance, age, payments, receipts] = profile.means;
        println!(
            "  {:<11} | {:7} | {:6} | {:12.2} | {:12.2} | {:5.1} | {:12.2} | {:12.2}",
            profile.stage.as_str(),
            profile.cluster,
            profile.size,
            revenue,
            balance,
            age,
            payments,
            receipts
        );
    }
}
