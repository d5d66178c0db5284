//! Isolation forest outlier model
//!
//! Each tree isolates points with random axis-aligned splits; outliers sit
//! on short paths. The raw score `s(x) = 2^(-E[h(x)] / c(psi))` is shifted
//! by the `(1 - contamination)` quantile of the training scores, so a
//! positive score means "more isolated than the baseline allows".

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

/// Upper bound on the per-tree subsample
const MAX_SUBSAMPLE: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn build<P: AsRef<[f64]>, R: Rng>(
        samples: &[P],
        indices: Vec<usize>,
        max_depth: usize,
        rng: &mut R,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(samples, indices, 0, max_depth, rng);
        tree
    }

    /// Append the subtree for `indices`, returning its root index
    fn grow<P: AsRef<[f64]>, R: Rng>(
        &mut self,
        samples: &[P],
        indices: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            size: indices.len(),
        });

        if depth >= max_depth || indices.len() <= 1 {
            return id;
        }

        let Some((feature, lo, hi)) = pick_split_feature(samples, &indices, rng) else {
            return id;
        };
        let threshold = rng.random_range(lo..hi);

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| samples[i].as_ref()[feature] <= threshold);

        let left = self.grow(samples, left_idx, depth + 1, max_depth, rng);
        let right = self.grow(samples, right_idx, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, x: &[f64]) -> f64 {
        let mut id = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if x.get(*feature).copied().unwrap_or(0.0) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Choose a random feature that is not constant over `indices`
fn pick_split_feature<P: AsRef<[f64]>, R: Rng>(
    samples: &[P],
    indices: &[usize],
    rng: &mut R,
) -> Option<(usize, f64, f64)> {
    let dims = samples[indices[0]].as_ref().len();
    if dims == 0 {
        return None;
    }
    let start = rng.random_range(0..dims);
    (0..dims).map(|k| (start + k) % dims).find_map(|feature| {
        let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
            let v = samples[i].as_ref()[feature];
            (lo.min(v), hi.max(v))
        });
        (hi > lo).then_some((feature, lo, hi))
    })
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated quantile, `q` in [0, 1]
fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Unsupervised outlier model fitted once on a baseline
#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_estimators: usize,
    contamination: f64,
    seed: u64,
    trees: Vec<IsolationTree>,
    subsample: usize,
    threshold: f64,
}

impl IsolationForest {
    pub fn new(n_estimators: usize, contamination: f64, seed: u64) -> Self {
        Self {
            n_estimators: n_estimators.max(1),
            contamination: contamination.clamp(0.0, 0.5),
            seed,
            trees: Vec::new(),
            subsample: 0,
            threshold: 0.0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Grow the forest on `samples` and calibrate the threshold
    pub fn fit<P: AsRef<[f64]>>(&mut self, samples: &[P]) {
        self.trees.clear();
        if samples.is_empty() {
            return;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        self.subsample = samples.len().min(MAX_SUBSAMPLE);
        let max_depth = (self.subsample.max(2) as f64).log2().ceil() as usize;

        for _ in 0..self.n_estimators {
            let indices = index::sample(&mut rng, samples.len(), self.subsample).into_vec();
            self.trees
                .push(IsolationTree::build(samples, indices, max_depth, &mut rng));
        }

        let raw: Vec<f64> = samples.iter().map(|x| self.raw_score(x.as_ref())).collect();
        self.threshold = quantile(&raw, 1.0 - self.contamination);
    }

    /// `2^(-E[h(x)] / c(psi))`, in (0, 1]; near 1 means easily isolated
    pub fn raw_score(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let mean_path = self.trees.iter().map(|t| t.path_length(x)).sum::<f64>()
            / self.trees.len() as f64;
        let norm = average_path_length(self.subsample).max(f64::EPSILON);
        2f64.powf(-mean_path / norm)
    }

    /// Anomaly score relative to the baseline; higher is more anomalous
    pub fn score(&self, x: &[f64]) -> f64 {
        if !self.is_fitted() {
            return 0.0;
        }
        self.raw_score(x) - self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(n: usize) -> Vec<[f64; 2]> {
        (0..n)
            .map(|i| {
                let t = i as f64;
                [10.0 + (t * 0.7).sin(), 0.5 + 0.05 * (t * 1.3).cos()]
            })
            .collect()
    }

    #[test]
    fn test_outlier_scores_higher_than_inlier() {
        let data = baseline(60);
        let mut forest = IsolationForest::new(200, 0.06, 0);
        forest.fit(&data);

        let inlier = forest.score(&[10.0, 0.5]);
        let outlier = forest.score(&[25.0, 0.95]);
        assert!(outlier > inlier);
        assert!(outlier > 0.0);
    }

    #[test]
    fn test_training_points_mostly_below_threshold() {
        let data = baseline(60);
        let mut forest = IsolationForest::new(100, 0.06, 1);
        forest.fit(&data);
        let flagged = data.iter().filter(|x| forest.score(&x[..]) > 0.0).count();
        assert!(flagged <= 6, "flagged {} of 60 baseline points", flagged);
    }

    #[test]
    fn test_injected_outliers_rank_first() {
        let mut data = baseline(58);
        data.push([30.0, 0.5]);
        data.push([10.0, 3.0]);
        let mut forest = IsolationForest::new(200, 0.06, 2);
        forest.fit(&data);

        let mut scored: Vec<(usize, f64)> = data
            .iter()
            .enumerate()
            .map(|(i, x)| (i, forest.score(&x[..])))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        let top: Vec<usize> = scored.iter().take(2).map(|(i, _)| *i).collect();
        assert!(top.contains(&58));
        assert!(top.contains(&59));
    }

    #[test]
    fn test_fit_is_deterministic_per_seed() {
        let data = baseline(40);
        let mut a = IsolationForest::new(50, 0.06, 9);
        let mut b = IsolationForest::new(50, 0.06, 9);
        a.fit(&data);
        b.fit(&data);
        assert_eq!(a.score(&[12.0, 0.6]), b.score(&[12.0, 0.6]));
    }

    #[test]
    fn test_constant_data_does_not_split() {
        let data = vec![[1.0, 1.0]; 20];
        let mut forest = IsolationForest::new(10, 0.06, 0);
        forest.fit(&data);
        assert!(forest.is_fitted());
        let s = forest.score(&[1.0, 1.0]);
        assert!(s.abs() < 1e-12);
    }

    #[test]
    fn test_unfitted_scores_zero() {
        let forest = IsolationForest::new(10, 0.06, 0);
        assert_eq!(forest.score(&[1.0]), 0.0);
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(64));
    }

    #[test]
    fn test_quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&v, 0.5), 3.0);
        assert!((quantile(&v, 0.9) - 4.6).abs() < 1e-12);
        assert_eq!(quantile(&v, 1.0), 5.0);
    }
}
