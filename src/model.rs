//! Lifecycle classification: K-Means over standardized features, labelled by revenue rank

use linfa::traits::{Fit, Predict};
use linfa::Dataset;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use std::collections::HashSet;
use std::fmt;

use crate::aggregate::FlowAggregates;
use crate::config::ClusterParams;
use crate::data::EntityRecord;
use crate::scaler::StandardScaler;

/// Number of lifecycle segments
pub const LIFECYCLE_CLUSTERS: usize = 4;

/// Clustering features, in column order
pub const FEATURE_NAMES: [&str; 5] = [
    "revenue",
    "balance",
    "age_years",
    "payment_sum",
    "receipt_sum",
];

const REVENUE_COLUMN: usize = 0;

/// Business lifecycle segment, ordered by increasing revenue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleStage {
    Small,
    Growing,
    Established,
    Large,
}

impl LifecycleStage {
    pub const ALL: [LifecycleStage; 4] = [
        LifecycleStage::Small,
        LifecycleStage::Growing,
        LifecycleStage::Established,
        LifecycleStage::Large,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Small => "Small",
            LifecycleStage::Growing => "Growing",
            LifecycleStage::Established => "Established",
            LifecycleStage::Large => "Large",
        }
    }

    /// Stage for the cluster at position `rank` among `ranked` clusters sorted by mean revenue.
    ///
    /// With four clusters this is the identity on the ordinal scale. With fewer,
    /// ranks are spread so the lowest stays `Small` and the highest becomes `Large`.
    pub fn from_rank(rank: usize, ranked: usize) -> Self {
        if ranked <= 1 {
            return LifecycleStage::Small;
        }
        let last = Self::ALL.len() - 1;
        let idx = (rank.min(ranked - 1) * last) / (ranked - 1);
        Self::ALL[idx]
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mean raw feature values of one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub stage: LifecycleStage,
    pub size: usize,
    pub means: [f64; 5],
}

/// Fitted lifecycle classifier
#[derive(Debug)]
pub struct LifecycleModel {
    /// Number of clusters actually fitted (at most `LIFECYCLE_CLUSTERS`)
    pub n_clusters: usize,
    /// Cluster assignment per input row
    pub labels: Array1<usize>,
    /// Cluster centroids in standardized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares
    pub inertia: f64,
    /// Stage per cluster id; `None` for clusters that ended up empty
    pub stages: Vec<Option<LifecycleStage>>,
    /// Scaling fitted on the training population
    pub scaler: StandardScaler,
}

impl LifecycleModel {
    /// Cluster id and stage of training row `row`
    pub fn assignment(&self, row: usize) -> (usize, LifecycleStage) {
        let cluster = self.labels[row];
        let stage = self.stage_for_cluster(cluster).unwrap_or(LifecycleStage::Small);
        (cluster, stage)
    }

    pub fn stage_for_cluster(&self, cluster: usize) -> Option<LifecycleStage> {
        self.stages.get(cluster).copied().flatten()
    }

    /// Nearest non-empty centroid to an already standardized point
    pub fn predict(&self, features: ArrayView1<f64>) -> crate::Result<usize> {
        if features.len() != self.centroids.ncols() {
            anyhow::bail!(
                "Feature vector must have exactly {} dimensions",
                self.centroids.ncols()
            );
        }

        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = None;

        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            if self.stage_for_cluster(cluster_idx).is_none() {
                continue;
            }
            let distance = squared_distance(features, centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = Some(cluster_idx);
            }
        }

        closest_cluster.ok_or_else(|| anyhow::anyhow!("model has no populated clusters"))
    }

    /// Score a new entity from raw feature values using the stored scaling
    ///
    /// # Arguments
    /// * `raw` - [revenue, balance, age_years, payment_sum, receipt_sum]
    pub fn classify(&self, raw: &[f64; 5]) -> crate::Result<(usize, LifecycleStage)> {
        let raw = Array1::from(raw.to_vec());
        let scaled = self.scaler.transform_row(raw.view())?;
        let cluster = self.predict(scaled.view())?;
        let stage = self
            .stage_for_cluster(cluster)
            .ok_or_else(|| anyhow::anyhow!("cluster {} has no stage", cluster))?;
        Ok((cluster, stage))
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Per-cluster feature means over the raw (unscaled) training matrix, lowest revenue first
    pub fn cluster_profiles(&self, raw: &Array2<f64>) -> Vec<ClusterProfile> {
        let sizes = self.cluster_sizes();
        let mut sums = vec![[0.0f64; 5]; self.n_clusters];

        for (row, &cluster) in raw.outer_iter().zip(self.labels.iter()) {
            for (sum, value) in sums[cluster].iter_mut().zip(row.iter()) {
                *sum += value;
            }
        }

        let mut profiles: Vec<ClusterProfile> = (0..self.n_clusters)
            .filter_map(|cluster| {
                let stage = self.stage_for_cluster(cluster)?;
                let size = sizes[cluster];
                let means = sums[cluster].map(|sum| sum / size as f64);
                Some(ClusterProfile {
                    cluster,
                    stage,
                    size,
                    means,
                })
            })
            .collect();

        profiles.sort_by(|a, b| {
            a.means[REVENUE_COLUMN]
                .total_cmp(&b.means[REVENUE_COLUMN])
                .then(a.cluster.cmp(&b.cluster))
        });
        profiles
    }
}

/// Assemble the raw feature matrix, one row per entity record
///
/// Missing ages are zero-filled here; nothing else in the pipeline imputes them.
pub fn build_features(entities: &[EntityRecord], flows: &FlowAggregates) -> Array2<f64> {
    let mut raw_data = Vec::with_capacity(entities.len() * FEATURE_NAMES.len());
    for entity in entities {
        let totals = flows.get(&entity.id);
        raw_data.extend_from_slice(&[
            entity.revenue,
            entity.balance,
            entity.age_years.unwrap_or(0.0),
            totals.payment_sum,
            totals.receipt_sum,
        ]);
    }

    Array2::from_shape_vec((entities.len(), FEATURE_NAMES.len()), raw_data)
        .unwrap_or_else(|_| Array2::zeros((0, FEATURE_NAMES.len())))
}

/// Fit the lifecycle classifier
///
/// # Arguments
/// * `raw_features` - Unscaled feature matrix from `build_features`
/// * `params` - Seed, restart count and convergence settings
///
/// # Returns
/// * Fitted `LifecycleModel` with per-row assignments and per-cluster stages
///
/// When fewer than four distinct feature rows exist, only as many clusters
/// as there are distinct rows are fitted.
pub fn fit_lifecycle(
    raw_features: &Array2<f64>,
    params: &ClusterParams,
) -> crate::Result<LifecycleModel> {
    if raw_features.nrows() == 0 {
        anyhow::bail!("Cannot fit lifecycle clusters on an empty feature matrix");
    }

    let scaler = StandardScaler::fit(raw_features)?;
    let features = scaler.transform(raw_features)?;

    let distinct = count_distinct_rows(raw_features);
    let n_clusters = LIFECYCLE_CLUSTERS.min(distinct);
    if n_clusters < LIFECYCLE_CLUSTERS {
        warn!(
            "Only {} distinct feature rows; fitting {} clusters instead of {}",
            distinct, n_clusters, LIFECYCLE_CLUSTERS
        );
    }

    let n_samples = features.nrows();
    // Dummy targets for unsupervised learning
    let targets: Array1<usize> = Array1::zeros(n_samples);
    let dataset = Dataset::new(features.clone(), targets);

    let rng = Pcg64Mcg::seed_from_u64(params.seed);
    let model = KMeans::params_with(n_clusters, rng, L2Dist)
        .n_runs(params.n_runs.max(1))
        .max_n_iterations(params.max_iters)
        .tolerance(params.tolerance)
        .fit(&dataset)
        .map_err(|e| anyhow::anyhow!("K-Means fit failed: {}", e))?;

    let labels: Array1<usize> = model.predict(&features);
    let centroids = model.centroids().clone();
    let inertia = compute_inertia(&features, &labels, &centroids);
    let stages = rank_stages(raw_features, &labels, n_clusters);

    debug!(
        "Fitted {} clusters on {} rows (inertia {:.4})",
        n_clusters, n_samples, inertia
    );

    Ok(LifecycleModel {
        n_clusters,
        labels,
        centroids,
        inertia,
        stages,
        scaler,
    })
}

/// Rank non-empty clusters by mean raw revenue and map rank to stage
fn rank_stages(
    raw_features: &Array2<f64>,
    labels: &Array1<usize>,
    n_clusters: usize,
) -> Vec<Option<LifecycleStage>> {
    let mut sums = vec![0.0; n_clusters];
    let mut counts = vec![0usize; n_clusters];

    for (row, &cluster) in raw_features.outer_iter().zip(labels.iter()) {
        if cluster < n_clusters {
            sums[cluster] += row[REVENUE_COLUMN];
            counts[cluster] += 1;
        }
    }

    let mut populated: Vec<(usize, f64)> = (0..n_clusters)
        .filter(|&cluster| counts[cluster] > 0)
        .map(|cluster| (cluster, sums[cluster] / counts[cluster] as f64))
        .collect();
    populated.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut stages = vec![None; n_clusters];
    let ranked = populated.len();
    for (rank, (cluster, _)) in populated.into_iter().enumerate() {
        stages[cluster] = Some(LifecycleStage::from_rank(rank, ranked));
    }
    stages
}

fn count_distinct_rows(data: &Array2<f64>) -> usize {
    data.outer_iter()
        .map(|row| {
            row.iter()
                // -0.0 and 0.0 are the same point
                .map(|v| if *v == 0.0 { 0u64 } else { v.to_bits() })
                .collect::<Vec<u64>>()
        })
        .collect::<HashSet<_>>()
        .len()
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    features
        .outer_iter()
        .zip(labels.iter())
        .filter(|(_, cluster)| **cluster < centroids.nrows())
        .map(|(point, &cluster)| squared_distance(point, centroids.row(cluster)))
        .sum()
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Transaction;
    use chrono::NaiveDate;

    /// Four tight groups spaced along every feature; rows interleaved so group order
    /// does not line up with row order.
    fn create_grouped_features() -> (Array2<f64>, Vec<usize>) {
        let group_order = [2usize, 0, 3, 1];
        let mut raw = Vec::new();
        let mut groups = Vec::new();

        for i in 0..5 {
            for &g in &group_order {
                let level = (g + 1) as f64;
                let jitter = i as f64;
                raw.extend_from_slice(&[
                    100_000.0 * level + 100.0 * jitter,
                    10_000.0 * level + 10.0 * jitter,
                    5.0 * level + 0.01 * jitter,
                    20_000.0 * level,
                    25_000.0 * level + 5.0 * jitter,
                ]);
                groups.push(g);
            }
        }

        let n = groups.len();
        (Array2::from_shape_vec((n, 5), raw).unwrap(), groups)
    }

    #[test]
    fn test_stages_follow_revenue_rank() {
        let (raw, groups) = create_grouped_features();
        let model = fit_lifecycle(&raw, &ClusterParams::default()).unwrap();

        assert_eq!(model.n_clusters, 4);
        for (row, &group) in groups.iter().enumerate() {
            let (_, stage) = model.assignment(row);
            assert_eq!(stage, LifecycleStage::ALL[group], "row {}", row);
        }
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (raw, _) = create_grouped_features();
        let first = fit_lifecycle(&raw, &ClusterParams::default()).unwrap();
        let second = fit_lifecycle(&raw, &ClusterParams::default()).unwrap();

        assert_eq!(first.labels, second.labels);
        assert_eq!(first.stages, second.stages);
        assert_eq!(first.inertia, second.inertia);
    }

    #[test]
    fn test_degenerate_input_fits_fewer_clusters() {
        let raw = Array2::from_shape_vec(
            (6, 5),
            vec![
                10.0, 1.0, 1.0, 0.0, 0.0, //
                10.0, 1.0, 1.0, 0.0, 0.0, //
                10.0, 1.0, 1.0, 0.0, 0.0, //
                90.0, 9.0, 3.0, 0.0, 0.0, //
                90.0, 9.0, 3.0, 0.0, 0.0, //
                90.0, 9.0, 3.0, 0.0, 0.0,
            ],
        )
        .unwrap();

        let model = fit_lifecycle(&raw, &ClusterParams::default()).unwrap();
        assert_eq!(model.n_clusters, 2);
        assert_eq!(model.assignment(0).1, LifecycleStage::Small);
        assert_eq!(model.assignment(5).1, LifecycleStage::Large);
    }

    #[test]
    fn test_identical_rows_are_all_small() {
        let raw = Array2::from_elem((3, 5), 7.0);
        let model = fit_lifecycle(&raw, &ClusterParams::default()).unwrap();

        assert_eq!(model.n_clusters, 1);
        for row in 0..3 {
            assert_eq!(model.assignment(row).1, LifecycleStage::Small);
        }
    }

    #[test]
    fn test_empty_matrix_is_rejected() {
        let raw = Array2::<f64>::zeros((0, 5));
        assert!(fit_lifecycle(&raw, &ClusterParams::default()).is_err());
    }

    #[test]
    fn test_classify_new_entity() {
        let (raw, _) = create_grouped_features();
        let model = fit_lifecycle(&raw, &ClusterParams::default()).unwrap();

        let (_, stage) = model
            .classify(&[400_100.0, 40_010.0, 20.0, 80_000.0, 100_000.0])
            .unwrap();
        assert_eq!(stage, LifecycleStage::Large);

        let (_, stage) = model
            .classify(&[100_050.0, 10_000.0, 5.0, 20_000.0, 25_000.0])
            .unwrap();
        assert_eq!(stage, LifecycleStage::Small);
    }

    #[test]
    fn test_cluster_profiles_sorted_by_revenue() {
        let (raw, _) = create_grouped_features();
        let model = fit_lifecycle(&raw, &ClusterParams::default()).unwrap();
        let profiles = model.cluster_profiles(&raw);

        assert_eq!(profiles.len(), 4);
        assert_eq!(profiles.iter().map(|p| p.size).sum::<usize>(), 20);
        let stages: Vec<LifecycleStage> = profiles.iter().map(|p| p.stage).collect();
        assert_eq!(stages, LifecycleStage::ALL.to_vec());
        assert!(profiles.windows(2).all(|w| w[0].means[0] <= w[1].means[0]));
    }

    #[test]
    fn test_from_rank() {
        assert_eq!(LifecycleStage::from_rank(0, 4), LifecycleStage::Small);
        assert_eq!(LifecycleStage::from_rank(2, 4), LifecycleStage::Established);
        assert_eq!(LifecycleStage::from_rank(3, 4), LifecycleStage::Large);
        assert_eq!(LifecycleStage::from_rank(1, 2), LifecycleStage::Large);
        assert_eq!(LifecycleStage::from_rank(1, 3), LifecycleStage::Growing);
        assert_eq!(LifecycleStage::from_rank(0, 1), LifecycleStage::Small);
    }

    #[test]
    fn test_build_features_zero_fills_age() {
        let entities = vec![
            EntityRecord::new("a", None, None, 10.0, -2.0, "X"),
            EntityRecord::new(
                "b",
                NaiveDate::from_ymd_opt(2024, 1, 1),
                NaiveDate::from_ymd_opt(2023, 1, 1),
                20.0,
                3.0,
                "Y",
            ),
        ];
        let flows = FlowAggregates::from_transactions(&[Transaction::new("A", "B", 5.0, None)]);
        let raw = build_features(&entities, &flows);

        assert_eq!(raw.shape(), &[2, 5]);
        assert_eq!(raw[[0, 2]], 0.0);
        assert_eq!(raw[[0, 3]], 5.0);
        assert_eq!(raw[[1, 4]], 5.0);
        assert!(raw[[1, 2]] > 0.99);
    }
}
