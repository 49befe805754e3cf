//! Left-join of every derived column onto the snapshot table

use std::collections::HashMap;

use crate::aggregate::{FlowAggregates, FlowTotals};
use crate::data::EntityRecord;
use crate::model::{LifecycleModel, LifecycleStage};
use crate::network::TransactionGraph;

/// A snapshot row with all derived metrics attached. No field is ever missing.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedEntity {
    pub record: EntityRecord,
    /// Age in years, 0 when it could not be computed
    pub age_years: f64,
    pub flows: FlowTotals,
    pub cluster: usize,
    pub stage: LifecycleStage,
    pub centrality: f64,
    pub dependency: f64,
    pub projection: f64,
}

impl EnrichedEntity {
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// Attach aggregates, lifecycle, network metrics and projection to every snapshot row
///
/// # Arguments
/// * `entities` - Snapshot rows, in the order the model was fitted on
/// * `flows` - Payment/receipt totals
/// * `model` - Fitted lifecycle model (one label per snapshot row)
/// * `network` - Graph over the full transaction log
/// * `projections` - Receipt projection per identifier
///
/// # Returns
/// * Exactly one `EnrichedEntity` per input row, in input order
pub fn merge_results(
    entities: &[EntityRecord],
    flows: &FlowAggregates,
    model: &LifecycleModel,
    network: &TransactionGraph,
    projections: &HashMap<String, f64>,
) -> crate::Result<Vec<EnrichedEntity>> {
    if model.labels.len() != entities.len() {
        anyhow::bail!(
            "lifecycle model has {} assignments for {} snapshot rows",
            model.labels.len(),
            entities.len()
        );
    }

    let merged = entities
        .iter()
        .enumerate()
        .map(|(row, entity)| {
            let (cluster, stage) = model.assignment(row);
            let metrics = network.metrics(&entity.id);
            EnrichedEntity {
                record: entity.clone(),
                age_years: entity.age_years.unwrap_or(0.0),
                flows: flows.get(&entity.id),
                cluster,
                stage,
                centrality: metrics.centrality,
                dependency: metrics.dependency(),
                projection: projections.get(&entity.id).copied().unwrap_or(0.0),
            }
        })
        .collect();

    Ok(merged)
}
