//! Customer segmentation: feature vectors, scaling and K-Means clustering

use std::collections::{BTreeMap, HashSet};

use linfa::traits::Fit;
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use polars::prelude::{col, IntoLazy, SortMultipleOptions};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::AnalysisError;
use crate::frame::{
    f64_values, i64_values, str_values, to_frame, PRODUCT_ID, TOTAL_AMOUNT, TRANSACTION_ID,
    TRANSACTION_QTY,
};
use crate::records::CanonicalRecord;

/// Upper bound on Lloyd iterations per K-Means run.
pub const MAX_ITERATIONS: u64 = 300;
/// Centroid movement below which a run is considered converged.
pub const TOLERANCE: f64 = 1e-4;
/// Number of seeded restarts; the run with the lowest inertia wins.
pub const N_RUNS: usize = 10;
/// Columns whose standard deviation falls below this are centered only.
pub const MIN_SCALE: f64 = 1e-10;

/// Features per transaction: total amount, total quantity, distinct products.
pub const N_FEATURES: usize = 3;

const PRODUCT_COUNT: &str = "product_count";

/// Column-wise standardization to zero mean and unit variance.
///
/// Uses the population standard deviation. Zero-variance columns keep a scale
/// of 1.0 so they are centered but never divided by zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(data: &Array2<f64>) -> crate::Result<Self> {
        let mean = data
            .mean_axis(Axis(0))
            .ok_or(AnalysisError::EmptyInput("cannot fit a scaler on zero rows"))?;
        let scale = data
            .std_axis(Axis(0), 0.0)
            .mapv(|std| if std > MIN_SCALE { std } else { 1.0 });

        Ok(StandardScaler { mean, scale })
    }

    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        (data - &self.mean) / &self.scale
    }

    pub fn transform_row(&self, row: &[f64]) -> crate::Result<Array1<f64>> {
        if row.len() != self.mean.len() {
            return Err(AnalysisError::Clustering(format!(
                "expected {} features, got {}",
                self.mean.len(),
                row.len()
            )));
        }
        Ok((&ArrayView1::from(row) - &self.mean) / &self.scale)
    }
}

/// Output of a clustering strategy: one label per row and one centroid per cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterFit {
    pub labels: Array1<usize>,
    pub centroids: Array2<f64>,
}

/// A partitioning algorithm that can be swapped without touching the analyzer.
pub trait ClusterStrategy {
    /// Number of clusters this strategy partitions into.
    fn n_clusters(&self) -> usize;

    fn fit(&self, features: &Array2<f64>) -> crate::Result<ClusterFit>;
}

/// Seeded K-Means (k-means++ initialization, Lloyd iterations) backed by linfa.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansStrategy {
    pub n_clusters: usize,
    pub seed: u64,
}

impl KMeansStrategy {
    pub fn new(n_clusters: usize, seed: u64) -> Self {
        KMeansStrategy { n_clusters, seed }
    }
}

impl ClusterStrategy for KMeansStrategy {
    fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    fn fit(&self, features: &Array2<f64>) -> crate::Result<ClusterFit> {
        let dataset = DatasetBase::from(features.clone());
        let rng = StdRng::seed_from_u64(self.seed);

        let model = KMeans::params_with(self.n_clusters, rng, L2Dist)
            .max_n_iterations(MAX_ITERATIONS)
            .tolerance(TOLERANCE)
            .n_runs(N_RUNS)
            .fit(&dataset)
            .map_err(|err| AnalysisError::Clustering(err.to_string()))?;

        let centroids = model.centroids().clone();
        let labels = features
            .outer_iter()
            .map(|row| nearest_centroid(&row, &centroids))
            .collect::<Array1<usize>>();

        Ok(ClusterFit { labels, centroids })
    }
}

/// Index of the closest centroid; ties go to the lowest index.
fn nearest_centroid(point: &ArrayView1<f64>, centroids: &Array2<f64>) -> usize {
    let mut closest = 0;
    let mut min_distance = f64::INFINITY;

    for (idx, centroid) in centroids.outer_iter().enumerate() {
        let distance = squared_distance(point, &centroid);
        if distance < min_distance {
            min_distance = distance;
            closest = idx;
        }
    }

    closest
}

fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// A fitted segmentation: scaler, centroids and training assignments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterModel {
    pub n_clusters: usize,
    /// Centroids in standardized feature space.
    pub centroids: Array2<f64>,
    pub scaler: StandardScaler,
    pub labels: Array1<usize>,
    /// Standardized training vectors, row-aligned with `labels`.
    #[serde(skip)]
    pub training: Array2<f64>,
    /// Within-cluster sum of squared distances.
    pub inertia: f64,
}

impl ClusterModel {
    /// Classify a raw `[total_amount, transaction_qty, product_count]` vector.
    pub fn predict(&self, raw: &[f64]) -> crate::Result<usize> {
        let scaled = self.scaler.transform_row(raw)?;
        Ok(nearest_centroid(&scaled.view(), &self.centroids))
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter().filter(|&&label| label < self.n_clusters) {
            sizes[label] += 1;
        }
        sizes
    }

    /// Silhouette coefficient of the training vectors, sampled like
    /// [`ClusterModel::compute_silhouette_sample`].
    pub fn training_silhouette(&self, sample_size: usize) -> f64 {
        self.compute_silhouette_sample(&self.training, sample_size)
    }

    /// Mean silhouette coefficient over the first `sample_size` rows.
    pub fn compute_silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let n_samples = features.nrows().min(sample_size).min(self.labels.len());
        if n_samples < 2 {
            return 0.0;
        }

        let total: f64 = (0..n_samples)
            .map(|i| {
                let point = features.row(i);
                let mut by_cluster: Vec<(f64, usize)> = vec![(0.0, 0); self.n_clusters];

                for j in (0..n_samples).filter(|&j| j != i) {
                    let label = self.labels[j];
                    if label < self.n_clusters {
                        let distance = squared_distance(&point, &features.row(j)).sqrt();
                        by_cluster[label].0 += distance;
                        by_cluster[label].1 += 1;
                    }
                }

                let own = self.labels[i];
                let a_i = match by_cluster.get(own) {
                    Some(&(sum, count)) if count > 0 => sum / count as f64,
                    _ => 0.0,
                };
                let b_i = by_cluster
                    .iter()
                    .enumerate()
                    .filter(|&(label, &(_, count))| label != own && count > 0)
                    .map(|(_, &(sum, count))| sum / count as f64)
                    .fold(f64::INFINITY, f64::min);

                if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
                    0.0
                } else {
                    (b_i - a_i) / a_i.max(b_i)
                }
            })
            .sum();

        total / n_samples as f64
    }
}

fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|&(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| squared_distance(&features.row(i), &centroids.row(cluster)))
        .sum()
}

/// Purchase-behavior vectors, one per transaction id, ordered by id.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerFeatures {
    pub transaction_ids: Vec<String>,
    /// Raw `(n, 3)` matrix: total amount, total quantity, distinct products.
    pub raw: Array2<f64>,
}

impl CustomerFeatures {
    pub fn from_records<R: AsRef<CanonicalRecord>>(rows: &[R]) -> crate::Result<Self> {
        if rows.is_empty() {
            return Err(AnalysisError::EmptyInput("segmentation needs at least one transaction"));
        }

        let grouped = to_frame(rows)?
            .lazy()
            .group_by([col(TRANSACTION_ID)])
            .agg([
                col(TOTAL_AMOUNT).sum(),
                col(TRANSACTION_QTY).sum(),
                col(PRODUCT_ID).n_unique().alias(PRODUCT_COUNT),
            ])
            .sort([TRANSACTION_ID], SortMultipleOptions::default())
            .collect()?;

        let transaction_ids = str_values(&grouped, TRANSACTION_ID)?;
        let amounts = f64_values(&grouped, TOTAL_AMOUNT)?;
        let quantities = i64_values(&grouped, TRANSACTION_QTY)?;
        let product_counts = i64_values(&grouped, PRODUCT_COUNT)?;

        let mut data = Vec::with_capacity(transaction_ids.len() * N_FEATURES);
        for i in 0..transaction_ids.len() {
            data.extend_from_slice(&[amounts[i], quantities[i] as f64, product_counts[i] as f64]);
        }
        let raw = Array2::from_shape_vec((transaction_ids.len(), N_FEATURES), data)?;

        Ok(CustomerFeatures { transaction_ids, raw })
    }

    fn distinct_rows(&self) -> usize {
        self.raw
            .outer_iter()
            .map(|row| row.iter().map(|v| v.to_bits()).collect::<Vec<u64>>())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Segment assignment for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerSegment {
    pub transaction_id: String,
    pub total_amount: f64,
    pub transaction_qty: i64,
    pub product_count: usize,
    pub segment: usize,
}

/// Per-segment averages, as printed by the driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub segment: usize,
    pub transactions: usize,
    pub mean_amount: f64,
    pub mean_qty: f64,
    pub mean_product_count: f64,
}

/// Cluster transactions with seeded K-Means.
pub fn segment_customers<R: AsRef<CanonicalRecord>>(
    rows: &[R],
    n_clusters: usize,
    seed: u64,
) -> crate::Result<(Vec<CustomerSegment>, ClusterModel)> {
    segment_customers_with(rows, &KMeansStrategy::new(n_clusters, seed))
}

/// Cluster transactions with any [`ClusterStrategy`].
///
/// Requires at least as many distinct feature vectors as clusters.
pub fn segment_customers_with<R, S>(
    rows: &[R],
    strategy: &S,
) -> crate::Result<(Vec<CustomerSegment>, ClusterModel)>
where
    R: AsRef<CanonicalRecord>,
    S: ClusterStrategy + ?Sized,
{
    let n_clusters = strategy.n_clusters();
    if n_clusters == 0 {
        return Err(AnalysisError::Clustering("number of clusters must be at least 1".to_string()));
    }

    let features = CustomerFeatures::from_records(rows)?;
    let distinct = features.distinct_rows();
    if distinct < n_clusters {
        return Err(AnalysisError::Clustering(format!(
            "{} distinct feature vectors cannot fill {} clusters",
            distinct, n_clusters
        )));
    }

    let scaler = StandardScaler::fit(&features.raw)?;
    let scaled = scaler.transform(&features.raw);
    debug!(vectors = scaled.nrows(), n_clusters, "Standardized segmentation features");

    let ClusterFit { labels, centroids } = strategy.fit(&scaled)?;
    if labels.len() != scaled.nrows() || labels.iter().any(|&label| label >= centroids.nrows()) {
        return Err(AnalysisError::Clustering(
            "strategy returned labels inconsistent with its centroids".to_string(),
        ));
    }

    let inertia = compute_inertia(&scaled, &labels, &centroids);
    let segments = features
        .transaction_ids
        .iter()
        .zip(features.raw.outer_iter())
        .zip(labels.iter())
        .map(|((transaction_id, row), &segment)| CustomerSegment {
            transaction_id: transaction_id.clone(),
            total_amount: row[0],
            transaction_qty: row[1] as i64,
            product_count: row[2] as usize,
            segment,
        })
        .collect::<Vec<_>>();

    info!(transactions = segments.len(), n_clusters, inertia, "Segmented customers");

    let model = ClusterModel {
        n_clusters: centroids.nrows(),
        centroids,
        scaler,
        labels,
        training: scaled,
        inertia,
    };
    Ok((segments, model))
}

/// Average amount, quantity and product count per segment, ordered by segment.
pub fn summarize_segments(segments: &[CustomerSegment]) -> Vec<SegmentSummary> {
    let mut groups: BTreeMap<usize, Vec<&CustomerSegment>> = BTreeMap::new();
    for segment in segments {
        groups.entry(segment.segment).or_default().push(segment);
    }

    groups
        .into_iter()
        .map(|(segment, members)| {
            let n = members.len() as f64;
            SegmentSummary {
                segment,
                transactions: members.len(),
                mean_amount: members.iter().map(|m| m.total_amount).sum::<f64>() / n,
                mean_qty: members.iter().map(|m| m.transaction_qty as f64).sum::<f64>() / n,
                mean_product_count: members.iter().map(|m| m.product_count as f64).sum::<f64>() / n,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::preprocess;
    use crate::records::TransactionRecord;
    use ndarray::array;

    fn raw(id: &str, product: &str, qty: i64, price: f64) -> TransactionRecord {
        TransactionRecord {
            transaction_id: Some(id.to_string()),
            transaction_date: Some("2024-01-01".to_string()),
            transaction_time: Some("08:00:00".to_string()),
            transaction_qty: Some(qty.to_string()),
            unit_price: Some(price.to_string()),
            product_id: Some(product.to_string()),
            product_category: Some("Coffee".to_string()),
            product_type: Some("Drip".to_string()),
            store_id: Some("1".to_string()),
            store_location: Some("Astoria".to_string()),
        }
    }

    fn sample() -> Vec<CanonicalRecord> {
        preprocess(&[
            raw("1", "a", 1, 2.0),
            raw("2", "a", 1, 2.5),
            raw("3", "a", 2, 2.0),
            raw("4", "a", 8, 4.0),
            raw("4", "b", 6, 4.5),
            raw("5", "a", 9, 4.0),
            raw("5", "c", 7, 5.0),
            raw("6", "a", 3, 10.0),
            raw("6", "b", 1, 30.0),
            raw("6", "c", 1, 40.0),
        ])
        .unwrap()
    }

    /// Puts every even row in cluster 0 and every odd row in cluster 1.
    struct Alternating;

    impl ClusterStrategy for Alternating {
        fn n_clusters(&self) -> usize {
            2
        }

        fn fit(&self, features: &Array2<f64>) -> crate::Result<ClusterFit> {
            let labels = (0..features.nrows()).map(|i| i % 2).collect::<Array1<usize>>();
            Ok(ClusterFit {
                labels,
                centroids: Array2::zeros((2, features.ncols())),
            })
        }
    }

    #[test]
    fn test_scaler_standardizes_and_guards_constant_columns() {
        let data = array![[1.0, 5.0], [3.0, 5.0]];
        let scaler = StandardScaler::fit(&data).unwrap();
        let scaled = scaler.transform(&data);

        assert_eq!(scaler.mean, array![2.0, 5.0]);
        assert_eq!(scaler.scale, array![1.0, 1.0]);
        assert_eq!(scaled, array![[-1.0, 0.0], [1.0, 0.0]]);
        assert!(scaled.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_scaler_population_std() {
        let data = array![[0.0], [4.0], [8.0]];
        let scaler = StandardScaler::fit(&data).unwrap();
        let expected = (32.0f64 / 3.0).sqrt();
        assert!((scaler.scale[0] - expected).abs() < 1e-12);

        let scaled = scaler.transform(&data);
        let mean = scaled.mean_axis(Axis(0)).unwrap();
        assert!(mean[0].abs() < 1e-12);
        assert!((scaled.std_axis(Axis(0), 0.0)[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_customer_features() {
        let features = CustomerFeatures::from_records(&sample()).unwrap();

        assert_eq!(features.transaction_ids, vec!["1", "2", "3", "4", "5", "6"]);
        assert_eq!(features.raw.shape(), &[6, 3]);
        assert_eq!(features.raw.row(3).to_vec(), vec![32.0 + 27.0, 14.0, 2.0]);
        assert_eq!(features.raw.row(5).to_vec(), vec![30.0 + 30.0 + 40.0, 5.0, 3.0]);
    }

    #[test]
    fn test_segmentation_is_deterministic() {
        let rows = sample();
        let (first, first_model) = segment_customers(&rows, 3, 42).unwrap();
        let (second, second_model) = segment_customers(&rows, 3, 42).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_model.labels, second_model.labels);
        assert_eq!(first_model.centroids, second_model.centroids);

        let distinct: HashSet<usize> = first.iter().map(|s| s.segment).collect();
        assert!(distinct.len() <= 3);
        assert!(first.iter().all(|s| s.segment < 3));
        assert_eq!(first_model.cluster_sizes().iter().sum::<usize>(), 6);
        assert!(first_model.inertia.is_finite() && first_model.inertia >= 0.0);
    }

    #[test]
    fn test_model_predicts_training_vectors_consistently() {
        let rows = sample();
        let (segments, model) = segment_customers(&rows, 3, 7).unwrap();

        for segment in &segments {
            let raw = [
                segment.total_amount,
                segment.transaction_qty as f64,
                segment.product_count as f64,
            ];
            assert_eq!(model.predict(&raw).unwrap(), segment.segment);
        }

        assert!(model.predict(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_custom_strategy_is_pluggable() {
        let (segments, model) = segment_customers_with(&sample(), &Alternating).unwrap();

        let labels: Vec<usize> = segments.iter().map(|s| s.segment).collect();
        assert_eq!(labels, vec![0, 1, 0, 1, 0, 1]);
        assert_eq!(model.n_clusters, 2);
        assert_eq!(model.cluster_sizes(), vec![3, 3]);
    }

    #[test]
    fn test_too_few_distinct_vectors() {
        let rows = preprocess(&[raw("1", "a", 1, 2.0), raw("2", "a", 1, 2.0)]).unwrap();
        assert!(matches!(
            segment_customers(&rows, 3, 42),
            Err(AnalysisError::Clustering(_))
        ));
        assert!(matches!(
            segment_customers(&rows, 0, 42),
            Err(AnalysisError::Clustering(_))
        ));
    }

    #[test]
    fn test_summarize_segments() {
        let segments = vec![
            CustomerSegment {
                transaction_id: "1".to_string(),
                total_amount: 4.0,
                transaction_qty: 2,
                product_count: 1,
                segment: 1,
            },
            CustomerSegment {
                transaction_id: "2".to_string(),
                total_amount: 8.0,
                transaction_qty: 4,
                product_count: 3,
                segment: 1,
            },
            CustomerSegment {
                transaction_id: "3".to_string(),
                total_amount: 1.0,
                transaction_qty: 1,
                product_count: 1,
                segment: 0,
            },
        ];

        let summary = summarize_segments(&segments);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].segment, 0);
        assert_eq!(summary[1].transactions, 2);
        assert_eq!(summary[1].mean_amount, 6.0);
        assert_eq!(summary[1].mean_qty, 3.0);
        assert_eq!(summary[1].mean_product_count, 2.0);
    }

    #[test]
    fn test_silhouette_in_range() {
        let (_, model) = segment_customers(&sample(), 2, 42).unwrap();
        let features = CustomerFeatures::from_records(&sample()).unwrap();
        let scaled = model.scaler.transform(&features.raw);

        let score = model.compute_silhouette_sample(&scaled, 100);
        assert!((-1.0..=1.0).contains(&score));
        assert_eq!(model.training, scaled);
        assert_eq!(model.training_silhouette(100), score);
    }
}
