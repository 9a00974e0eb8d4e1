use std::fmt;

use serde::Serialize;

use crate::artifacts::InferenceError;

/// Predicted quality class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Class label 1.
    Good,
    /// Class label 0.
    Low,
}

impl Quality {
    /// Maps a binary class label; anything but 0 or 1 is not a binary label.
    #[must_use]
    pub const fn from_label(label: u8) -> Option<Self> {
        match label {
            1 => Some(Self::Good),
            0 => Some(Self::Low),
            _ => None,
        }
    }

    /// Headline shown to the user.
    #[must_use]
    pub const fn headline(self) -> &'static str {
        match self {
            Self::Good => "Good Quality",
            Self::Low => "Low Quality",
        }
    }

    /// Secondary line shown under the headline.
    #[must_use]
    pub const fn remark(self) -> &'static str {
        match self {
            Self::Good => "Cheers! This is a high-quality wine",
            Self::Low => "May need some improvement in composition",
        }
    }

    /// Probability of this class given the positive-class probability, as a percentage.
    #[must_use]
    pub fn confidence(self, positive_probability: f64) -> f64 {
        match self {
            Self::Good => positive_probability * 100.0,
            Self::Low => (1.0 - positive_probability) * 100.0,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.headline())
    }
}

/// Outcome of one prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    /// Predicted class.
    pub quality: Quality,
    /// Raw class label returned by the classifier.
    pub label: u8,
    /// Raw class-1 probability returned by the classifier.
    pub positive_probability: f64,
    /// Probability of the predicted class, in percent.
    pub confidence: f64,
}

impl Verdict {
    /// Applies the decision rule to a classifier output.
    ///
    /// Label 1 reports `p1 * 100`, label 0 reports `(1 - p1) * 100`.
    pub fn from_prediction(label: u8, positive_probability: f64) -> Result<Self, InferenceError> {
        let quality = Quality::from_label(label)
            .ok_or_else(|| InferenceError::InvalidOutput(format!("label {label} is not binary")))?;
        if !(0.0..=1.0).contains(&positive_probability) {
            return Err(InferenceError::InvalidOutput(format!(
                "class-1 probability {positive_probability} is outside [0, 1]"
            )));
        }
        Ok(Self {
            quality,
            label,
            positive_probability,
            confidence: quality.confidence(positive_probability),
        })
    }

    /// Whether the wine was classified as good.
    #[must_use]
    pub fn is_good(&self) -> bool {
        self.quality == Quality::Good
    }

    /// Confidence with two decimals and a percent sign, e.g. `86.39%`.
    #[must_use]
    pub fn confidence_text(&self) -> String {
        format!("{:.2}%", self.confidence)
    }

    /// Headline shown to the user.
    #[must_use]
    pub const fn headline(&self) -> &'static str {
        self.quality.headline()
    }

    /// Secondary line shown under the headline.
    #[must_use]
    pub const fn remark(&self) -> &'static str {
        self.quality.remark()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Confidence: {})",
            self.quality.headline(),
            self.confidence_text()
        )
    }
}
