// Feature vectors - Fixed-order classifier input
use serde::{Deserialize, Serialize};

use super::errors::CacheContractError;
use super::vitals::VitalsRecord;

const STANDARD_FEATURES: [&str; 7] = [
    "respiratoryRate",
    "heartRate",
    "meanArterialPressure",
    "diastolicBP",
    "systolicBP",
    "spo2",
    "pulsePressure",
];

const WITH_AGE_FEATURES: [&str; 8] = [
    "respiratoryRate",
    "heartRate",
    "meanArterialPressure",
    "diastolicBP",
    "systolicBP",
    "spo2",
    "age",
    "pulsePressure",
];

/// Positional layout the loaded model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureLayout {
    #[default]
    Standard,
    WithAge,
}

impl FeatureLayout {
    pub fn names(self) -> &'static [&'static str] {
        match self {
            FeatureLayout::Standard => &STANDARD_FEATURES,
            FeatureLayout::WithAge => &WITH_AGE_FEATURES,
        }
    }

    pub fn width(self) -> usize {
        self.names().len()
    }
}

/// Validated, fixed-width feature tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(layout: FeatureLayout, values: Vec<f64>) -> Result<Self, CacheContractError> {
        if values.len() != layout.width() {
            return Err(CacheContractError::WidthMismatch {
                expected: layout.width(),
                got: values.len(),
            });
        }
        Ok(Self(values))
    }

    /// Missing measurements become 0.0, the value the models were trained with for absent readings.
    pub fn from_record(record: &VitalsRecord, layout: FeatureLayout, age: Option<f64>) -> Self {
        VitalsFeatures {
            respiratory_rate: record.respiratory_rate,
            heart_rate: record.heart_rate,
            mean_arterial_pressure: record.mean_arterial_pressure,
            diastolic_bp: record.diastolic_bp,
            systolic_bp: record.systolic_bp,
            spo2: record.spo2,
            age,
            pulse_pressure: record.pulse_pressure(),
        }
        .to_vector(layout)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Named-field source for a feature vector, e.g. a JSON request body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VitalsFeatures {
    pub respiratory_rate: Option<f64>,
    pub heart_rate: Option<f64>,
    pub mean_arterial_pressure: Option<f64>,
    #[serde(rename = "diastolicBP")]
    pub diastolic_bp: Option<f64>,
    #[serde(rename = "systolicBP")]
    pub systolic_bp: Option<f64>,
    pub spo2: Option<f64>,
    pub age: Option<f64>,
    pub pulse_pressure: Option<f64>,
}

impl VitalsFeatures {
    pub fn to_vector(&self, layout: FeatureLayout) -> FeatureVector {
        let pulse_pressure = self.pulse_pressure.or_else(|| match (self.systolic_bp, self.diastolic_bp) {
            (Some(sys), Some(dia)) => Some(sys - dia),
            _ => None,
        });

        let values = layout
            .names()
            .iter()
            .map(|name| {
                match *name {
                    "respiratoryRate" => self.respiratory_rate,
                    "heartRate" => self.heart_rate,
                    "meanArterialPressure" => self.mean_arterial_pressure,
                    "diastolicBP" => self.diastolic_bp,
                    "systolicBP" => self.systolic_bp,
                    "spo2" => self.spo2,
                    "age" => self.age,
                    "pulsePressure" => pulse_pressure,
                    _ => None,
                }
                .unwrap_or(0.0)
            })
            .collect();

        FeatureVector(values)
    }
}
