//! Commercial insights and peer benchmarking over the merged table

use std::collections::HashSet;
use std::fmt;

use crate::merge::EnrichedEntity;
use crate::model::LifecycleStage;

/// Dependency above which a company is flagged as concentrated on one partner
pub const CONCENTRATION_THRESHOLD: f64 = 0.4;
/// Population quantile of centrality above which a company counts as a hub
pub const HUB_QUANTILE: f64 = 0.85;
/// Share of monthly revenue below which the average balance is considered low
pub const LOW_BALANCE_MONTHLY_SHARE: f64 = 0.5;

/// Rule-based observation about one company
#[derive(Debug, Clone, PartialEq)]
pub enum Insight {
    /// Average balance over all snapshots is negative
    NegativeCashFlow { average_balance: f64 },
    /// Average balance is low relative to revenue
    CashOptimization { average_balance: f64 },
    /// Too much volume goes through a single partner
    ConcentrationRisk { dependency: f64 },
    /// Centrality is in the top tail of the population
    NetworkHub { centrality: f64, cutoff: f64 },
    /// Company sits in the growing segment
    GrowthSupport,
    /// Nothing else applied
    StableProfile,
}

impl fmt::Display for Insight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insight::NegativeCashFlow { average_balance } => write!(
                f,
                "Negative cash flow: average balance {:.2}; working capital credit",
                average_balance
            ),
            Insight::CashOptimization { average_balance } => write!(
                f,
                "Cash optimisation: average balance {:.2} is low for its revenue; \
                 cash management and short-term investments",
                average_balance
            ),
            Insight::ConcentrationRisk { dependency } => write!(
                f,
                "Concentration risk: {:.1}% of volume with a single partner; \
                 credit insurance or receivables diversification",
                dependency * 100.0
            ),
            Insight::NetworkHub { centrality, cutoff } => write!(
                f,
                "Network hub: centrality {:.4} above the population cutoff {:.4}; \
                 payment and collection platform",
                centrality, cutoff
            ),
            Insight::GrowthSupport => {
                write!(f, "Growth support: expanding company; asset investment credit lines")
            }
            Insight::StableProfile => {
                write!(f, "Stable profile: focus on relationship and competitive offers")
            }
        }
    }
}

/// Comparison against companies with the same industry code and lifecycle stage
#[derive(Debug, Clone, PartialEq)]
pub struct PeerBenchmark {
    pub industry_code: String,
    pub stage: LifecycleStage,
    /// Distinct peer identifiers
    pub peer_count: usize,
    /// Relative revenue difference in percent, `None` when peers have no positive mean revenue
    pub revenue_delta_pct: Option<f64>,
    /// Relative balance difference in percent, `None` when the peer mean balance is zero
    pub balance_delta_pct: Option<f64>,
}

/// All snapshot rows of `id`, oldest reference date first (undated rows first)
pub fn entity_history<'a>(rows: &'a [EnrichedEntity], id: &str) -> Vec<&'a EnrichedEntity> {
    let mut history: Vec<&EnrichedEntity> = rows.iter().filter(|r| r.id() == id).collect();
    history.sort_by_key(|r| r.record.reference_date);
    history
}

/// Linearly interpolated quantile, `q` in [0, 1]
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Centrality above which a company is considered a hub
pub fn hub_cutoff(rows: &[EnrichedEntity]) -> f64 {
    let centralities: Vec<f64> = rows.iter().map(|r| r.centrality).collect();
    quantile(&centralities, HUB_QUANTILE).unwrap_or(0.0)
}

/// Insights for one company
///
/// # Arguments
/// * `history` - The company's snapshot rows, oldest first (see `entity_history`)
/// * `hub_cutoff` - Population centrality cutoff (see `hub_cutoff`)
pub fn generate_insights(history: &[&EnrichedEntity], hub_cutoff: f64) -> Vec<Insight> {
    let Some(latest) = history.last() else {
        return Vec::new();
    };

    let mut insights = Vec::new();
    let average_balance = mean(history.iter().map(|r| r.record.balance));

    if average_balance < 0.0 {
        insights.push(Insight::NegativeCashFlow { average_balance });
    } else if average_balance < latest.record.revenue / 12.0 * LOW_BALANCE_MONTHLY_SHARE {
        insights.push(Insight::CashOptimization { average_balance });
    }

    if latest.dependency > CONCENTRATION_THRESHOLD {
        insights.push(Insight::ConcentrationRisk {
            dependency: latest.dependency,
        });
    }

    if latest.centrality > hub_cutoff {
        insights.push(Insight::NetworkHub {
            centrality: latest.centrality,
            cutoff: hub_cutoff,
        });
    }

    if latest.stage == LifecycleStage::Growing {
        insights.push(Insight::GrowthSupport);
    }

    if insights.is_empty() {
        insights.push(Insight::StableProfile);
    }
    insights
}

/// Benchmark a company against its industry/stage peers
///
/// Peers are all rows sharing the latest snapshot's industry code and stage,
/// excluding the company itself. `None` when there are no peers.
pub fn benchmark_against_peers(
    rows: &[EnrichedEntity],
    history: &[&EnrichedEntity],
) -> Option<PeerBenchmark> {
    let latest = history.last()?;
    let peers: Vec<&EnrichedEntity> = rows
        .iter()
        .filter(|r| {
            r.record.industry_code == latest.record.industry_code
                && r.stage == latest.stage
                && r.id() != latest.id()
        })
        .collect();

    if peers.is_empty() {
        return None;
    }

    let peer_revenue = mean(peers.iter().map(|r| r.record.revenue));
    let peer_balance = mean(peers.iter().map(|r| r.record.balance));
    let own_balance = mean(history.iter().map(|r| r.record.balance));

    let revenue_delta_pct = (peer_revenue > 0.0)
        .then(|| (latest.record.revenue - peer_revenue) / peer_revenue * 100.0);
    let balance_delta_pct = (peer_balance != 0.0)
        .then(|| (own_balance - peer_balance) / peer_balance.abs() * 100.0);

    let peer_count = peers.iter().map(|r| r.id()).collect::<HashSet<_>>().len();

    Some(PeerBenchmark {
        industry_code: latest.record.industry_code.clone(),
        stage: latest.stage,
        peer_count,
        revenue_delta_pct,
        balance_delta_pct,
    })
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
