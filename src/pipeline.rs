//! Batch pipeline: ingestion, aggregation, lifecycle, network, projection, merge and output

use log::{debug, info};
use ndarray::Array2;
use std::time::Instant;

use crate::aggregate::{FlowAggregates, MonthlyReceipts};
use crate::config::{ClusterParams, PipelineConfig};
use crate::data::{load_entities, load_transactions, EntityRecord, Transaction};
use crate::merge::{merge_results, EnrichedEntity};
use crate::model::{build_features, fit_lifecycle, LifecycleModel, FEATURE_NAMES};
use crate::network::TransactionGraph;
use crate::output::write_outputs;
use crate::projection::project_receipts;

/// Everything one run produces
#[derive(Debug)]
pub struct Analysis {
    /// Merged table, one row per input snapshot row
    pub entities: Vec<EnrichedEntity>,
    /// Cleaned transaction log, one row per input transaction
    pub transactions: Vec<Transaction>,
    /// Fitted lifecycle classifier
    pub model: LifecycleModel,
    /// Unscaled clustering features, row-aligned with `entities`
    pub raw_features: Array2<f64>,
    pub graph_nodes: usize,
    pub graph_edges: usize,
}

/// Load both input tables
pub fn load_inputs(
    config: &PipelineConfig,
) -> crate::Result<(Vec<EntityRecord>, Vec<Transaction>)> {
    let step_start = Instant::now();

    let entities = load_entities(&config.entities_path, config.input_separator)?;
    let transactions = load_transactions(&config.transactions_path, config.input_separator)?;

    info!(
        "Loaded {} snapshot rows and {} transactions in {:.2}s",
        entities.len(),
        transactions.len(),
        step_start.elapsed().as_secs_f64()
    );
    Ok((entities, transactions))
}

/// Run every derivation in memory
///
/// # Arguments
/// * `entities` - Normalized snapshot rows
/// * `transactions` - Normalized transaction log
/// * `params` - Clustering settings
///
/// # Returns
/// * `Analysis` with the merged table and the fitted model
pub fn analyze(
    entities: Vec<EntityRecord>,
    transactions: Vec<Transaction>,
    params: &ClusterParams,
) -> crate::Result<Analysis> {
    // Step 1: aggregate flows
    let step_start = Instant::now();
    let flows = FlowAggregates::from_transactions(&transactions);
    let receipts = MonthlyReceipts::from_transactions(&transactions);
    info!(
        "Aggregated flows for {} identifiers in {:.2}s",
        flows.len(),
        step_start.elapsed().as_secs_f64()
    );

    // Step 2: lifecycle clusters
    let step_start = Instant::now();
    let raw_features = build_features(&entities, &flows);
    debug!("Clustering features {:?}, shape {:?}", FEATURE_NAMES, raw_features.shape());
    let model = fit_lifecycle(&raw_features, params)?;
    for profile in model.cluster_profiles(&raw_features) {
        debug!(
            "Cluster {} ({}): {} rows, means {:?}",
            profile.cluster, profile.stage, profile.size, profile.means
        );
    }
    info!(
        "Classified {} rows into {} clusters in {:.2}s",
        entities.len(),
        model.n_clusters,
        step_start.elapsed().as_secs_f64()
    );

    // Step 3: network
    let step_start = Instant::now();
    let graph = TransactionGraph::from_transactions(&transactions);
    info!(
        "Built transaction network ({} nodes, {} edges) in {:.2}s",
        graph.node_count(),
        graph.edge_count(),
        step_start.elapsed().as_secs_f64()
    );

    // Step 4: projections
    let step_start = Instant::now();
    let projections = project_receipts(&receipts);
    info!(
        "Projected receipts for {} identifiers in {:.2}s",
        projections.len(),
        step_start.elapsed().as_secs_f64()
    );

    // Step 5: merge
    let merged = merge_results(&entities, &flows, &model, &graph, &projections)?;

    Ok(Analysis {
        entities: merged,
        transactions,
        model,
        raw_features,
        graph_nodes: graph.node_count(),
        graph_edges: graph.edge_count(),
    })
}

/// Load, analyze, and write both output tables
pub fn run_pipeline(config: &PipelineConfig) -> crate::Result<Analysis> {
    let start_time = Instant::now();

    let (entities, transactions) = load_inputs(config)?;
    let analysis = analyze(entities, transactions, &config.clustering)?;

    let step_start = Instant::now();
    write_outputs(
        &config.entity_output,
        &config.transaction_output,
        config.output_separator,
        &analysis.entities,
        &analysis.transactions,
    )?;
    info!(
        "Wrote {} and {} in {:.2}s",
        config.entity_output.display(),
        config.transaction_output.display(),
        step_start.elapsed().as_secs_f64()
    );

    info!(
        "Pipeline complete in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(analysis)
}
