use std::{fmt, sync::Arc};

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::Deserialize;

use super::{check_vector, scaler::check_width, InferenceError};
use crate::features::FEATURE_COUNT;

/// Fitted binary classifier over scaled feature rows.
pub trait BinaryClassifier: Send + Sync + fmt::Debug {
    /// Artifact kind, as written in the document.
    fn kind(&self) -> &'static str;

    /// Number of columns the classifier was fitted on.
    fn n_features(&self) -> usize;

    /// Predicted class label (0 or 1) per row.
    fn predict(&self, rows: &Array2<f64>) -> Result<Array1<u8>, InferenceError>;

    /// `[p0, p1]` per row, shape `(n, 2)`.
    fn predict_proba(&self, rows: &Array2<f64>) -> Result<Array2<f64>, InferenceError>;
}

/// Serialized classifier document.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierArtifact {
    /// Linear model with a logistic link.
    LogisticRegression {
        /// Fitted column order, if recorded.
        #[serde(default)]
        feature_names: Option<Vec<String>>,
        /// One weight per feature.
        coef: Vec<f64>,
        /// Bias term.
        intercept: f64,
    },
    /// Bagged decision trees averaged by class probability.
    RandomForest {
        /// Fitted column order, if recorded.
        #[serde(default)]
        feature_names: Option<Vec<String>>,
        /// Width of the rows the trees split on.
        #[serde(default = "default_n_features")]
        n_features: usize,
        /// Trees in flattened node-array form.
        trees: Vec<TreeArtifact>,
    },
}

/// One decision tree as parallel node arrays; `-1` children mark a leaf.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeArtifact {
    /// Left child index per node.
    pub children_left: Vec<i64>,
    /// Right child index per node.
    pub children_right: Vec<i64>,
    /// Split feature per node (ignored on leaves).
    pub feature: Vec<i64>,
    /// Split threshold per node; `x <= threshold` goes left.
    pub threshold: Vec<f64>,
    /// Class weights `[w0, w1]` per node.
    pub value: Vec<[f64; 2]>,
}

const fn default_n_features() -> usize {
    FEATURE_COUNT
}

impl ClassifierArtifact {
    /// Column names recorded alongside the fitted values.
    #[must_use]
    pub fn feature_names(&self) -> Option<&[String]> {
        match self {
            Self::LogisticRegression { feature_names, .. }
            | Self::RandomForest { feature_names, .. } => feature_names.as_deref(),
        }
    }

    /// Validates the document and builds the backend.
    pub fn build(self) -> Result<Arc<dyn BinaryClassifier>, String> {
        match self {
            Self::LogisticRegression {
                coef, intercept, ..
            } => Ok(Arc::new(LogisticRegression::new(coef, intercept)?)),
            Self::RandomForest {
                n_features, trees, ..
            } => {
                if n_features != FEATURE_COUNT {
                    return Err(format!(
                        "n_features is {n_features}, expected {FEATURE_COUNT}"
                    ));
                }
                let trees = trees
                    .into_iter()
                    .enumerate()
                    .map(|(idx, tree)| {
                        DecisionTree::from_artifact(tree, n_features)
                            .map_err(|reason| format!("tree {idx}: {reason}"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arc::new(RandomForest::new(trees, n_features)?))
            }
        }
    }
}

/// Logistic regression: `p1 = sigmoid(coef . x + intercept)`.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    coef: Array1<f64>,
    intercept: f64,
}

impl LogisticRegression {
    /// Builds the model from fitted weights.
    pub fn new(coef: Vec<f64>, intercept: f64) -> Result<Self, String> {
        check_vector("coef", &coef)?;
        if !intercept.is_finite() {
            return Err("intercept is not finite".into());
        }
        Ok(Self {
            coef: Array1::from(coef),
            intercept,
        })
    }

    fn decision_function(&self, rows: &Array2<f64>) -> Result<Array1<f64>, InferenceError> {
        check_width(self.n_features(), rows)?;
        Ok(rows.dot(&self.coef) + self.intercept)
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl BinaryClassifier for LogisticRegression {
    fn kind(&self) -> &'static str {
        "logistic_regression"
    }

    fn n_features(&self) -> usize {
        self.coef.len()
    }

    fn predict(&self, rows: &Array2<f64>) -> Result<Array1<u8>, InferenceError> {
        Ok(self
            .decision_function(rows)?
            .mapv(|z| u8::from(z > 0.0)))
    }

    fn predict_proba(&self, rows: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
        let decision = self.decision_function(rows)?;
        let mut proba = Array2::zeros((decision.len(), 2));
        for (mut out, z) in proba.axis_iter_mut(Axis(0)).zip(decision.iter()) {
            let p1 = sigmoid(*z);
            out[0] = 1.0 - p1;
            out[1] = p1;
        }
        Ok(proba)
    }
}

#[derive(Debug, Clone)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        proba: [f64; 2],
    },
}

/// Validated decision tree.
#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Checks the node arrays and converts them into typed nodes.
    ///
    /// Children must point strictly forward, which rules out cycles.
    pub fn from_artifact(tree: TreeArtifact, n_features: usize) -> Result<Self, String> {
        let len = tree.children_left.len();
        if len == 0 {
            return Err("tree has no nodes".into());
        }
        if [
            tree.children_right.len(),
            tree.feature.len(),
            tree.threshold.len(),
            tree.value.len(),
        ]
        .iter()
        .any(|other| *other != len)
        {
            return Err("node arrays differ in length".into());
        }
        let mut nodes = Vec::with_capacity(len);
        for idx in 0..len {
            let (left, right) = (tree.children_left[idx], tree.children_right[idx]);
            if left == -1 && right == -1 {
                let [w0, w1] = tree.value[idx];
                let total = w0 + w1;
                if !(total.is_finite() && total > 0.0 && w0 >= 0.0 && w1 >= 0.0) {
                    return Err(format!("leaf {idx} has invalid class weights"));
                }
                nodes.push(TreeNode::Leaf {
                    proba: [w0 / total, w1 / total],
                });
                continue;
            }
            let child = |raw: i64| -> Result<usize, String> {
                usize::try_from(raw)
                    .ok()
                    .filter(|child| *child > idx && *child < len)
                    .ok_or_else(|| format!("node {idx} has invalid child {raw}"))
            };
            let feature = usize::try_from(tree.feature[idx])
                .ok()
                .filter(|feature| *feature < n_features)
                .ok_or_else(|| format!("node {idx} splits on feature {}", tree.feature[idx]))?;
            let threshold = tree.threshold[idx];
            if threshold.is_nan() {
                return Err(format!("node {idx} has a NaN threshold"));
            }
            nodes.push(TreeNode::Split {
                feature,
                threshold,
                left: child(left)?,
                right: child(right)?,
            });
        }
        Ok(Self { nodes })
    }

    fn leaf_proba(&self, row: ArrayView1<'_, f64>) -> [f64; 2] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { proba } => return *proba,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Forest averaging per-tree leaf distributions.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    /// Builds the forest; at least one tree is required.
    pub fn new(trees: Vec<DecisionTree>, n_features: usize) -> Result<Self, String> {
        if trees.is_empty() {
            return Err("forest has no trees".into());
        }
        Ok(Self { trees, n_features })
    }
}

impl BinaryClassifier for RandomForest {
    fn kind(&self) -> &'static str {
        "random_forest"
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, rows: &Array2<f64>) -> Result<Array1<u8>, InferenceError> {
        let proba = self.predict_proba(rows)?;
        // ties go to class 0, matching argmax
        Ok(proba
            .axis_iter(Axis(0))
            .map(|row| u8::from(row[1] > row[0]))
            .collect())
    }

    fn predict_proba(&self, rows: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
        check_width(self.n_features, rows)?;
        let mut proba = Array2::zeros((rows.nrows(), 2));
        let count = self.trees.len() as f64;
        for (row, mut out) in rows.axis_iter(Axis(0)).zip(proba.axis_iter_mut(Axis(0))) {
            let [mut p0, mut p1] = [0.0, 0.0];
            for tree in &self.trees {
                let [t0, t1] = tree.leaf_proba(row);
                p0 += t0;
                p1 += t1;
            }
            out[0] = p0 / count;
            out[1] = p1 / count;
        }
        Ok(proba)
    }
}
