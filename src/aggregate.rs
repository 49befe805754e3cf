//! Per-entity payment/receipt totals and monthly receipt series

use std::collections::{BTreeMap, HashMap};

use crate::data::{MonthBucket, Transaction};

/// Outgoing and incoming flow totals for one entity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlowTotals {
    pub payment_sum: f64,
    pub payment_count: u64,
    pub receipt_sum: f64,
    pub receipt_count: u64,
}

/// Flow totals keyed by entity identifier
#[derive(Debug, Default)]
pub struct FlowAggregates {
    by_entity: HashMap<String, FlowTotals>,
}

impl FlowAggregates {
    /// Reduce the transaction log in a single pass, by payer and by payee.
    /// Transactions missing either party are skipped.
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut by_entity: HashMap<String, FlowTotals> = HashMap::new();

        for tx in transactions.iter().filter(|tx| tx.has_parties()) {
            let payer = by_entity.entry(tx.payer.clone()).or_default();
            payer.payment_sum += tx.amount;
            payer.payment_count += 1;

            let payee = by_entity.entry(tx.payee.clone()).or_default();
            payee.receipt_sum += tx.amount;
            payee.receipt_count += 1;
        }

        Self { by_entity }
    }

    /// Totals for an entity; zero when it never appears in the log
    pub fn get(&self, id: &str) -> FlowTotals {
        self.by_entity.get(id).copied().unwrap_or_default()
    }

    /// Number of distinct identifiers seen as payer or payee
    pub fn len(&self) -> usize {
        self.by_entity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }
}

/// Chronological monthly receipt totals per payee
#[derive(Debug, Default)]
pub struct MonthlyReceipts {
    by_entity: HashMap<String, BTreeMap<MonthBucket, f64>>,
}

impl MonthlyReceipts {
    /// Group dated transactions by (payee, month). Undated transactions are skipped.
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut by_entity: HashMap<String, BTreeMap<MonthBucket, f64>> = HashMap::new();

        for tx in transactions.iter().filter(|tx| tx.has_parties()) {
            let Some(month) = tx.month() else {
                continue;
            };
            *by_entity
                .entry(tx.payee.clone())
                .or_default()
                .entry(month)
                .or_insert(0.0) += tx.amount;
        }

        Self { by_entity }
    }

    /// Iterate over every entity with at least one dated receipt
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeMap<MonthBucket, f64>)> {
        self.by_entity
            .iter()
            .map(|(id, months)| (id.as_str(), months))
    }

    pub fn len(&self) -> usize {
        self.by_entity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }
}
