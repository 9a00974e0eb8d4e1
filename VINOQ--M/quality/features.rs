use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of measurements in a wine sample.
pub const FEATURE_COUNT: usize = 11;

/// Input field descriptor: identifier, display label and the widget bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureField {
    /// Identifier, also used as form field name and CLI flag.
    pub name: &'static str,
    /// Label rendered next to the input.
    pub label: &'static str,
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
    /// Value the form starts with.
    pub default: f64,
    /// Granularity of the form input; every two-decimal value in range is a valid step.
    pub step: f64,
}

impl FeatureField {
    /// Returns whether `value` lies inside the bounds.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Accepts `value` if finite and within bounds.
    pub fn check(&self, value: f64) -> Result<f64, InputError> {
        if !value.is_finite() {
            return Err(InputError::NotFinite { field: self.name });
        }
        if !self.contains(value) {
            return Err(InputError::OutOfRange {
                field: self.name,
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(value)
    }

    /// Parses a raw textual value (form or CLI) and checks it.
    pub fn parse(&self, raw: &str) -> Result<f64, InputError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InputError::Missing { field: self.name });
        }
        let value = trimmed
            .parse::<f64>()
            .map_err(|_| InputError::Unparseable {
                field: self.name,
                raw: trimmed.to_string(),
            })?;
        self.check(value)
    }
}

/// Field table in the order the scaler and classifier were fitted with.
pub const FEATURE_FIELDS: [FeatureField; FEATURE_COUNT] = [
    FeatureField {
        name: "fixed_acidity",
        label: "Fixed Acidity",
        min: 4.0,
        max: 15.0,
        default: 7.4,
        step: 0.01,
    },
    FeatureField {
        name: "volatile_acidity",
        label: "Volatile Acidity",
        min: 0.1,
        max: 1.5,
        default: 0.7,
        step: 0.01,
    },
    FeatureField {
        name: "citric_acid",
        label: "Citric Acid",
        min: 0.0,
        max: 1.0,
        default: 0.0,
        step: 0.01,
    },
    FeatureField {
        name: "residual_sugar",
        label: "Residual Sugar",
        min: 0.5,
        max: 15.0,
        default: 1.9,
        step: 0.01,
    },
    FeatureField {
        name: "chlorides",
        label: "Chlorides",
        min: 0.01,
        max: 0.20,
        default: 0.076,
        step: 0.001,
    },
    FeatureField {
        name: "free_sulfur_dioxide",
        label: "Free Sulfur Dioxide",
        min: 1.0,
        max: 70.0,
        default: 11.0,
        step: 0.01,
    },
    FeatureField {
        name: "total_sulfur_dioxide",
        label: "Total Sulfur Dioxide",
        min: 6.0,
        max: 300.0,
        default: 34.0,
        step: 0.01,
    },
    FeatureField {
        name: "density",
        label: "Density",
        min: 0.9900,
        max: 1.0040,
        default: 0.9978,
        step: 0.0001,
    },
    FeatureField {
        name: "ph",
        label: "pH",
        min: 2.5,
        max: 4.5,
        default: 3.51,
        step: 0.01,
    },
    FeatureField {
        name: "sulphates",
        label: "Sulphates",
        min: 0.3,
        max: 2.0,
        default: 0.56,
        step: 0.01,
    },
    FeatureField {
        name: "alcohol",
        label: "Alcohol",
        min: 8.0,
        max: 15.0,
        default: 9.4,
        step: 0.01,
    },
];

/// Looks up a field by identifier.
#[must_use]
pub fn field(name: &str) -> Option<&'static FeatureField> {
    FEATURE_FIELDS.iter().find(|field| field.name == name)
}

/// Field identifiers in vector order.
#[must_use]
pub fn feature_names() -> [&'static str; FEATURE_COUNT] {
    FEATURE_FIELDS.map(|field| field.name)
}

/// Rejected input value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    /// Value outside the widget bounds.
    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        /// Field identifier.
        field: &'static str,
        /// Offending value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// NaN or infinite value.
    #[error("{field} must be a finite number")]
    NotFinite {
        /// Field identifier.
        field: &'static str,
    },
    /// Empty value.
    #[error("{field} is required")]
    Missing {
        /// Field identifier.
        field: &'static str,
    },
    /// Text that is not a number.
    #[error("{field}: {raw:?} is not a number")]
    Unparseable {
        /// Field identifier.
        field: &'static str,
        /// Raw submitted text.
        raw: String,
    },
    /// Name that is not part of the field table.
    #[error("unknown field {0:?}")]
    UnknownField(String),
}

impl InputError {
    /// Identifier of the field the error refers to.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::OutOfRange { field, .. }
            | Self::NotFinite { field }
            | Self::Missing { field }
            | Self::Unparseable { field, .. } => field,
            Self::UnknownField(name) => name,
        }
    }
}

/// One wine sample's chemical profile.
///
/// Field order here is documentation only; [`WineSample::to_vector`] is the single
/// place that fixes the order fed to the scaler and classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WineSample {
    /// g(tartaric acid)/dm³.
    pub fixed_acidity: f64,
    /// g(acetic acid)/dm³.
    pub volatile_acidity: f64,
    /// g/dm³.
    pub citric_acid: f64,
    /// g/dm³.
    pub residual_sugar: f64,
    /// g(sodium chloride)/dm³.
    pub chlorides: f64,
    /// mg/dm³.
    pub free_sulfur_dioxide: f64,
    /// mg/dm³.
    pub total_sulfur_dioxide: f64,
    /// g/cm³.
    pub density: f64,
    /// pH.
    pub ph: f64,
    /// g(potassium sulphate)/dm³.
    pub sulphates: f64,
    /// % vol.
    pub alcohol: f64,
}

impl Default for WineSample {
    fn default() -> Self {
        Self::from_vector(FEATURE_FIELDS.map(|field| field.default))
    }
}

impl WineSample {
    /// Ordered feature vector.
    #[must_use]
    pub const fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.fixed_acidity,
            self.volatile_acidity,
            self.citric_acid,
            self.residual_sugar,
            self.chlorides,
            self.free_sulfur_dioxide,
            self.total_sulfur_dioxide,
            self.density,
            self.ph,
            self.sulphates,
            self.alcohol,
        ]
    }

    /// Inverse of [`WineSample::to_vector`].
    #[must_use]
    pub const fn from_vector(values: [f64; FEATURE_COUNT]) -> Self {
        let [
            fixed_acidity,
            volatile_acidity,
            citric_acid,
            residual_sugar,
            chlorides,
            free_sulfur_dioxide,
            total_sulfur_dioxide,
            density,
            ph,
            sulphates,
            alcohol,
        ] = values;
        Self {
            fixed_acidity,
            volatile_acidity,
            citric_acid,
            residual_sugar,
            chlorides,
            free_sulfur_dioxide,
            total_sulfur_dioxide,
            density,
            ph,
            sulphates,
            alcohol,
        }
    }

    /// Single-row `1 x 11` matrix, the batch shape the fitted models consume.
    #[must_use]
    pub fn to_row(&self) -> Array2<f64> {
        let values = self.to_vector();
        Array2::from_shape_fn((1, FEATURE_COUNT), |(_, col)| values[col])
    }

    /// Value of the named field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        let idx = FEATURE_FIELDS.iter().position(|field| field.name == name)?;
        Some(self.to_vector()[idx])
    }

    /// Overwrites the named field after checking it against its bounds.
    pub fn set(&mut self, name: &str, value: f64) -> Result<(), InputError> {
        let idx = FEATURE_FIELDS
            .iter()
            .position(|field| field.name == name)
            .ok_or_else(|| InputError::UnknownField(name.to_string()))?;
        let mut values = self.to_vector();
        values[idx] = FEATURE_FIELDS[idx].check(value)?;
        *self = Self::from_vector(values);
        Ok(())
    }

    /// Checks every field against the widget bounds, reporting the first violation.
    pub fn validate(&self) -> Result<(), InputError> {
        FEATURE_FIELDS
            .iter()
            .zip(self.to_vector())
            .try_for_each(|(field, value)| field.check(value).map(|_| ()))
    }

    /// Builds a sample from raw `(name, value)` pairs such as a submitted form.
    ///
    /// Every field must be present exactly as the form posts it; unknown names are
    /// ignored so that extra form controls (the submit button) do not fail parsing.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, InputError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut raw: [Option<&str>; FEATURE_COUNT] = [None; FEATURE_COUNT];
        for (name, value) in pairs {
            if let Some(idx) = FEATURE_FIELDS.iter().position(|field| field.name == name) {
                raw[idx] = Some(value);
            }
        }
        let mut values = [0.0; FEATURE_COUNT];
        for (idx, field) in FEATURE_FIELDS.iter().enumerate() {
            let text = raw[idx].ok_or(InputError::Missing { field: field.name })?;
            values[idx] = field.parse(text)?;
        }
        Ok(Self::from_vector(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_with(pick: impl Fn(&FeatureField) -> f64) -> WineSample {
        WineSample {
            fixed_acidity: pick(&FEATURE_FIELDS[0]),
            volatile_acidity: pick(&FEATURE_FIELDS[1]),
            citric_acid: pick(&FEATURE_FIELDS[2]),
            residual_sugar: pick(&FEATURE_FIELDS[3]),
            chlorides: pick(&FEATURE_FIELDS[4]),
            free_sulfur_dioxide: pick(&FEATURE_FIELDS[5]),
            total_sulfur_dioxide: pick(&FEATURE_FIELDS[6]),
            density: pick(&FEATURE_FIELDS[7]),
            ph: pick(&FEATURE_FIELDS[8]),
            sulphates: pick(&FEATURE_FIELDS[9]),
            alcohol: pick(&FEATURE_FIELDS[10]),
        }
    }

    #[test]
    fn vector_order_matches_field_table() {
        assert_eq!(
            feature_names(),
            [
                "fixed_acidity",
                "volatile_acidity",
                "citric_acid",
                "residual_sugar",
                "chlorides",
                "free_sulfur_dioxide",
                "total_sulfur_dioxide",
                "density",
                "ph",
                "sulphates",
                "alcohol",
            ]
        );
        for pick in [
            (|f: &FeatureField| f.min) as fn(&FeatureField) -> f64,
            |f: &FeatureField| f.max,
            |f: &FeatureField| f.default,
        ] {
            let sample = sample_with(pick);
            let vector = sample.to_vector();
            for (idx, field) in FEATURE_FIELDS.iter().enumerate() {
                assert_eq!(vector[idx], pick(field), "{} out of place", field.name);
                assert_eq!(sample.get(field.name), Some(pick(field)));
            }
            assert!(sample.validate().is_ok());
        }
    }

    #[test]
    fn defaults_match_form() {
        let sample = WineSample::default();
        assert_eq!(
            sample.to_vector(),
            [7.4, 0.7, 0.0, 1.9, 0.076, 11.0, 34.0, 0.9978, 3.51, 0.56, 9.4]
        );
        let row = sample.to_row();
        assert_eq!(row.shape(), &[1, FEATURE_COUNT]);
        assert_eq!(row[[0, 10]], 9.4);
        assert_eq!(row[[0, 7]], 0.9978);
    }

    #[test]
    fn vector_round_trips_distinct_values() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0];
        assert_eq!(WineSample::from_vector(values).to_vector(), values);
        assert_eq!(WineSample::from_vector(values).ph, 9.0);
    }

    #[test]
    fn validate_reports_first_violation() {
        let mut sample = WineSample::default();
        sample.chlorides = 0.5;
        sample.alcohol = 20.0;
        let err = sample.validate().unwrap_err();
        assert_eq!(err.field(), "chlorides");

        sample = WineSample::default();
        sample.ph = f64::NAN;
        assert_eq!(
            sample.validate().unwrap_err(),
            InputError::NotFinite { field: "ph" }
        );
    }

    #[test]
    fn set_checks_bounds_and_names() {
        let mut sample = WineSample::default();
        sample.set("alcohol", 12.5).unwrap();
        assert_eq!(sample.alcohol, 12.5);
        assert!(matches!(
            sample.set("alcohol", 7.9),
            Err(InputError::OutOfRange { field: "alcohol", .. })
        ));
        assert!(matches!(
            sample.set("colour", 1.0),
            Err(InputError::UnknownField(_))
        ));
        assert_eq!(sample.alcohol, 12.5);
    }

    #[test]
    fn parses_form_pairs() {
        let owned: Vec<(String, String)> = FEATURE_FIELDS
            .iter()
            .map(|field| (field.name.to_string(), format!(" {} ", field.max)))
            .chain(std::iter::once(("submit".to_string(), "Predict".to_string())))
            .collect();
        let sample =
            WineSample::from_pairs(owned.iter().map(|(k, v)| (k.as_str(), v.as_str()))).unwrap();
        assert_eq!(sample.total_sulfur_dioxide, 300.0);
        assert_eq!(sample.density, 1.004);

        let err = WineSample::from_pairs([("fixed_acidity", "7.4")]).unwrap_err();
        assert_eq!(err, InputError::Missing { field: "volatile_acidity" });
    }

    #[test]
    fn parse_rejects_garbage_and_empty() {
        let alcohol = field("alcohol").unwrap();
        assert!(matches!(
            alcohol.parse("twelve"),
            Err(InputError::Unparseable { .. })
        ));
        assert_eq!(
            alcohol.parse("  "),
            Err(InputError::Missing { field: "alcohol" })
        );
        assert_eq!(alcohol.parse("inf"), Err(InputError::NotFinite { field: "alcohol" }));
        assert_eq!(alcohol.parse("15"), Ok(15.0));
    }
}
