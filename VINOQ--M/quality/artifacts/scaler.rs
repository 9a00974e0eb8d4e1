use std::{fmt, sync::Arc};

use ndarray::{Array1, Array2};
use serde::Deserialize;

use super::{check_vector, InferenceError};

/// Fitted transform normalizing raw features to the classifier's training distribution.
pub trait FeatureScaler: Send + Sync + fmt::Debug {
    /// Artifact kind, as written in the document.
    fn kind(&self) -> &'static str;

    /// Number of columns the scaler was fitted on.
    fn n_features(&self) -> usize;

    /// Transforms a batch of rows.
    fn transform(&self, rows: &Array2<f64>) -> Result<Array2<f64>, InferenceError>;
}

/// Serialized scaler document.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerArtifact {
    /// Standardization: `(x - mean) / scale`.
    Standard {
        /// Fitted column order, if recorded.
        #[serde(default)]
        feature_names: Option<Vec<String>>,
        /// Per-column mean.
        mean: Vec<f64>,
        /// Per-column standard deviation.
        scale: Vec<f64>,
    },
    /// Range scaling: `x * scale + min`.
    MinMax {
        /// Fitted column order, if recorded.
        #[serde(default)]
        feature_names: Option<Vec<String>>,
        /// Per-column offset applied after scaling.
        min: Vec<f64>,
        /// Per-column multiplier.
        scale: Vec<f64>,
    },
}

impl ScalerArtifact {
    /// Column names recorded alongside the fitted values.
    #[must_use]
    pub fn feature_names(&self) -> Option<&[String]> {
        match self {
            Self::Standard { feature_names, .. } | Self::MinMax { feature_names, .. } => {
                feature_names.as_deref()
            }
        }
    }

    /// Validates the fitted vectors and builds the backend.
    pub fn build(self) -> Result<Arc<dyn FeatureScaler>, String> {
        match self {
            Self::Standard { mean, scale, .. } => {
                Ok(Arc::new(StandardScaler::new(mean, scale)?))
            }
            Self::MinMax { min, scale, .. } => Ok(Arc::new(MinMaxScaler::new(min, scale)?)),
        }
    }
}

/// Standardizing scaler.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Builds the scaler; zero scale entries (constant columns) become 1.0.
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, String> {
        check_vector("mean", &mean)?;
        check_vector("scale", &scale)?;
        let scale = scale
            .into_iter()
            .map(|value| if value == 0.0 { 1.0 } else { value })
            .collect::<Array1<f64>>();
        Ok(Self {
            mean: Array1::from(mean),
            scale,
        })
    }
}

impl FeatureScaler for StandardScaler {
    fn kind(&self) -> &'static str {
        "standard"
    }

    fn n_features(&self) -> usize {
        self.mean.len()
    }

    fn transform(&self, rows: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
        check_width(self.n_features(), rows)?;
        let mut scaled = rows.to_owned();
        for mut row in scaled.rows_mut() {
            row -= &self.mean;
            row /= &self.scale;
        }
        Ok(scaled)
    }
}

/// Min-max range scaler.
#[derive(Debug, Clone)]
pub struct MinMaxScaler {
    min: Array1<f64>,
    scale: Array1<f64>,
}

impl MinMaxScaler {
    /// Builds the scaler from the fitted offset and multiplier.
    pub fn new(min: Vec<f64>, scale: Vec<f64>) -> Result<Self, String> {
        check_vector("min", &min)?;
        check_vector("scale", &scale)?;
        Ok(Self {
            min: Array1::from(min),
            scale: Array1::from(scale),
        })
    }
}

impl FeatureScaler for MinMaxScaler {
    fn kind(&self) -> &'static str {
        "min_max"
    }

    fn n_features(&self) -> usize {
        self.min.len()
    }

    fn transform(&self, rows: &Array2<f64>) -> Result<Array2<f64>, InferenceError> {
        check_width(self.n_features(), rows)?;
        let mut scaled = rows.to_owned();
        for mut row in scaled.rows_mut() {
            row *= &self.scale;
            row += &self.min;
        }
        Ok(scaled)
    }
}

pub(crate) fn check_width(expected: usize, rows: &Array2<f64>) -> Result<(), InferenceError> {
    if rows.ncols() == expected {
        Ok(())
    } else {
        Err(InferenceError::ShapeMismatch {
            expected,
            found: rows.ncols(),
        })
    }
}
