//! Transaction network: degree centrality and partner concentration
//!
//! The graph is built once over the whole transaction log, so the values
//! are properties of the relationship graph and do not vary between
//! snapshots of the same company.
//!
//! - Vertices are identifiers seen as payer or payee, indexed in lexicographic order
//! - Repeated transfers between the same ordered pair collapse into one weighted edge
//! - Self-transfers are not edges
//! - Transactions missing the payer or payee are ignored

use std::collections::{BTreeMap, BTreeSet};

use crate::data::Transaction;

/// Network-derived metrics for one entity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkMetrics {
    /// Distinct partners / (N - 1)
    pub centrality: f64,
    /// Largest single-partner share of outgoing volume
    pub outgoing_dependency: f64,
    /// Largest single-partner share of incoming volume
    pub incoming_dependency: f64,
}

impl NetworkMetrics {
    /// Worst-case concentration across both roles
    pub fn dependency(&self) -> f64 {
        self.outgoing_dependency.max(self.incoming_dependency)
    }
}

/// Directed weighted payment graph
#[derive(Debug, Clone, Default)]
pub struct TransactionGraph {
    /// Identifier → vertex index (stable, sorted)
    id_to_index: BTreeMap<String, usize>,

    /// Vertex index → identifier
    index_to_id: Vec<String>,

    /// payer_idx → payee_idx → cumulative amount
    outgoing: Vec<BTreeMap<usize, f64>>,

    /// payee_idx → payer_idx → cumulative amount
    incoming: Vec<BTreeMap<usize, f64>>,
}

impl TransactionGraph {
    /// Build the graph from the full transaction log
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let ids: BTreeSet<&str> = transactions
            .iter()
            .filter(|tx| tx.has_parties())
            .flat_map(|tx| [tx.payer.as_str(), tx.payee.as_str()])
            .collect();

        let index_to_id: Vec<String> = ids.into_iter().map(str::to_owned).collect();
        let id_to_index: BTreeMap<String, usize> = index_to_id
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();

        let mut outgoing = vec![BTreeMap::new(); index_to_id.len()];
        let mut incoming = vec![BTreeMap::new(); index_to_id.len()];

        for tx in transactions.iter().filter(|tx| tx.has_parties()) {
            if tx.payer == tx.payee {
                continue;
            }
            let from = id_to_index[&tx.payer];
            let to = id_to_index[&tx.payee];
            *outgoing[from].entry(to).or_insert(0.0) += tx.amount;
            *incoming[to].entry(from).or_insert(0.0) += tx.amount;
        }

        Self {
            id_to_index,
            index_to_id,
            outgoing,
            incoming,
        }
    }

    pub fn node_count(&self) -> usize {
        self.index_to_id.len()
    }

    /// Number of distinct directed payer → payee pairs
    pub fn edge_count(&self) -> usize {
        self.outgoing.iter().map(BTreeMap::len).sum()
    }

    /// Metrics for one identifier; all zero when it is not in the graph
    pub fn metrics(&self, id: &str) -> NetworkMetrics {
        match self.id_to_index.get(id) {
            Some(&idx) => self.metrics_at(idx),
            None => NetworkMetrics::default(),
        }
    }

    fn metrics_at(&self, idx: usize) -> NetworkMetrics {
        NetworkMetrics {
            centrality: self.degree_centrality(idx),
            outgoing_dependency: concentration(&self.outgoing[idx]),
            incoming_dependency: concentration(&self.incoming[idx]),
        }
    }

    fn degree_centrality(&self, idx: usize) -> f64 {
        let n = self.node_count();
        if n < 2 {
            return 0.0;
        }
        // A partner seen in both directions counts once
        let partners: BTreeSet<usize> = self.outgoing[idx]
            .keys()
            .chain(self.incoming[idx].keys())
            .copied()
            .collect();
        partners.len() as f64 / (n - 1) as f64
    }
}

/// Largest partner amount over the total; zero when there is no flow
fn concentration(partners: &BTreeMap<usize, f64>) -> f64 {
    let total: f64 = partners.values().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let largest = partners.values().copied().fold(0.0, f64::max);
    (largest / total).clamp(0.0, 1.0)
}
