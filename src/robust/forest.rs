//! Isolation forest over a single scaled feature.
//!
//! Each tree is grown on a random subsample by picking uniform split points
//! between the node's min and max until every point is isolated or the
//! height limit `ceil(log2(ψ))` is reached. Outliers are isolated in fewer
//! splits, so their average path length is short. The anomaly score
//!
//! ```text
//! s(x) = 2^(−E[h(x)] / c(ψ))
//! ```
//!
//! is ~0.5 for a typical point and approaches 1 for an outlier.
//!
//! Every tree gets its own seed drawn from one `StdRng` seeded by the
//! configured seed, so training is reproducible even though trees are
//! built in parallel.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Euler–Mascheroni constant, used by the harmonic-number approximation.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful BST search over `n` points.
///
/// Normalises path lengths and accounts for the unexpanded subtree below a
/// leaf that still holds `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

// ============================================================================
// Tree
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        /// Values `<= threshold` go left
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn grow(sample: &[f64], height_limit: usize, rng: &mut StdRng) -> Self {
        Self {
            root: Self::grow_node(sample, 0, height_limit, rng),
        }
    }

    fn grow_node(data: &[f64], depth: usize, height_limit: usize, rng: &mut StdRng) -> Node {
        if depth >= height_limit || data.len() <= 1 {
            return Node::Leaf { size: data.len() };
        }

        let (min, max) = data
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        if min >= max {
            // All points identical: cannot be separated further.
            return Node::Leaf { size: data.len() };
        }

        // threshold in [min, max): min always goes left, max always right.
        let threshold = rng.gen_range(min..max);
        let (left, right): (Vec<f64>, Vec<f64>) = data.iter().partition(|&&x| x <= threshold);

        Node::Split {
            threshold,
            left: Box::new(Self::grow_node(&left, depth + 1, height_limit, rng)),
            right: Box::new(Self::grow_node(&right, depth + 1, height_limit, rng)),
        }
    }

    /// Path length of `x`, including the expected remainder below the leaf.
    pub fn path_length(&self, x: f64) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Split {
                    threshold,
                    left,
                    right,
                } => {
                    node = if x <= *threshold { left } else { right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }
}

// ============================================================================
// Forest
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    /// Subsample size ψ used for every tree
    sample_size: usize,
}

impl IsolationForest {
    /// Grow `n_trees` trees over `data`.
    ///
    /// `data` must be non-empty; the caller enforces the minimum history.
    pub fn fit(data: &[f64], n_trees: usize, max_samples: usize, seed: u64) -> Self {
        let sample_size = max_samples.min(data.len()).max(1);
        let height_limit = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let mut master = StdRng::seed_from_u64(seed);
        let tree_seeds: Vec<u64> = (0..n_trees).map(|_| master.gen()).collect();

        let trees = tree_seeds
            .par_iter()
            .map(|&tree_seed| {
                let mut rng = StdRng::seed_from_u64(tree_seed);
                let sample: Vec<f64> = index::sample(&mut rng, data.len(), sample_size)
                    .into_iter()
                    .map(|i| data[i])
                    .collect();
                IsolationTree::grow(&sample, height_limit, &mut rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// Anomaly score in (0, 1].
    pub fn score(&self, x: f64) -> f64 {
        let normaliser = average_path_length(self.sample_size);
        if self.trees.is_empty() || normaliser <= 0.0 {
            return 0.5;
        }
        let mean_path =
            self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        2.0_f64.powf(-mean_path / normaliser)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic roughly-normal sample around `center` (Box–Muller).
    fn normal_sample(n: usize, center: f64, spread: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                let u2: f64 = rng.gen();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                center + spread * z
            })
            .collect()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) is about 10.24
        assert!((average_path_length(256) - 10.24).abs() < 0.05);
    }

    #[test]
    fn test_outlier_scores_higher_than_inlier() {
        let data = normal_sample(300, 0.0, 1.0, 7);
        let forest = IsolationForest::fit(&data, 100, 256, 42);

        let inlier = forest.score(0.0);
        let outlier = forest.score(8.0);

        assert!(inlier < 0.5, "inlier score {inlier}");
        assert!(outlier > 0.5, "outlier score {outlier}");
        assert!(outlier > inlier + 0.1);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let data = normal_sample(120, 0.0, 1.0, 3);
        let a = IsolationForest::fit(&data, 50, 64, 99);
        let b = IsolationForest::fit(&data, 50, 64, 99);
        assert_eq!(a, b);
        assert_eq!(a.score(2.5), b.score(2.5));
    }

    #[test]
    fn test_constant_data_is_neutral() {
        let forest = IsolationForest::fit(&[0.0; 40], 20, 256, 1);
        assert_eq!(forest.sample_size(), 40);
        // No split possible: every point lands in the root leaf.
        assert!((forest.score(0.0) - 0.5).abs() < 1e-12);
        assert!((forest.score(100.0) - 0.5).abs() < 1e-12);
    }
}
