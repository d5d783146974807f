// Vitals domain model - Observation table, wire frame and decoded record
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::errors::DecodeError;

/// Physiological quantities a device may report.
///
/// Declaration order matches [`VITAL_SIGNS`] and the wire field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VitalSign {
    #[serde(rename = "heartRate")]
    HeartRate,
    #[serde(rename = "meanArterialPressure")]
    MeanArterialPressure,
    #[serde(rename = "spo2")]
    Spo2,
    #[serde(rename = "respiratoryRate")]
    RespiratoryRate,
    #[serde(rename = "systolicBP")]
    SystolicBp,
    #[serde(rename = "diastolicBP")]
    DiastolicBp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VitalSignSpec {
    pub sign: VitalSign,
    pub field_tag: u8,
    pub name: &'static str,
    pub mdc_code: i64,
    pub unit_code: i64,
}

/// Field tag and MDC/unit codes shared by agent and manager.
pub const VITAL_SIGNS: [VitalSignSpec; 6] = [
    VitalSignSpec {
        sign: VitalSign::HeartRate,
        field_tag: 1,
        name: "heartRate",
        mdc_code: 18402,
        unit_code: 264864,
    },
    VitalSignSpec {
        sign: VitalSign::MeanArterialPressure,
        field_tag: 2,
        name: "meanArterialPressure",
        mdc_code: 18949,
        unit_code: 266016,
    },
    VitalSignSpec {
        sign: VitalSign::Spo2,
        field_tag: 3,
        name: "spo2",
        mdc_code: 150456,
        unit_code: 262144,
    },
    VitalSignSpec {
        sign: VitalSign::RespiratoryRate,
        field_tag: 4,
        name: "respiratoryRate",
        mdc_code: 18945,
        unit_code: 266016,
    },
    VitalSignSpec {
        sign: VitalSign::SystolicBp,
        field_tag: 5,
        name: "systolicBP",
        mdc_code: 18947,
        unit_code: 266016,
    },
    VitalSignSpec {
        sign: VitalSign::DiastolicBp,
        field_tag: 6,
        name: "diastolicBP",
        mdc_code: 18948,
        unit_code: 266016,
    },
];

impl VitalSign {
    pub fn spec(self) -> &'static VitalSignSpec {
        &VITAL_SIGNS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn field_tag(self) -> u8 {
        self.spec().field_tag
    }

    pub fn from_field_tag(tag: u8) -> Option<Self> {
        VITAL_SIGNS.iter().find(|s| s.field_tag == tag).map(|s| s.sign)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        VITAL_SIGNS.iter().find(|s| s.name == name).map(|s| s.sign)
    }

    /// Observation carrying this sign's table codes.
    pub fn observe(self, value: i64) -> NumericObservation {
        let spec = self.spec();
        NumericObservation::new(spec.mdc_code, spec.unit_code, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericObservation {
    pub mdc_code: i64,
    pub unit_code: i64,
    pub value: i64,
}

impl NumericObservation {
    pub fn new(mdc_code: i64, unit_code: i64, value: i64) -> Self {
        Self {
            mdc_code,
            unit_code,
            value,
        }
    }
}

/// One transmitted observation set. Observations iterate in wire field order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VitalsFrame {
    pub timestamp: String,
    pub observations: BTreeMap<VitalSign, NumericObservation>,
}

impl VitalsFrame {
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            observations: BTreeMap::new(),
        }
    }

    pub fn with_observation(mut self, sign: VitalSign, observation: NumericObservation) -> Self {
        self.observations.insert(sign, observation);
        self
    }

    /// Builds a frame from raw readings using the table codes.
    pub fn from_readings(
        timestamp: impl Into<String>,
        readings: impl IntoIterator<Item = (VitalSign, i64)>,
    ) -> Self {
        readings
            .into_iter()
            .fold(Self::new(timestamp), |frame, (sign, value)| {
                frame.with_observation(sign, sign.observe(value))
            })
    }

    pub fn observation(&self, sign: VitalSign) -> Option<&NumericObservation> {
        self.observations.get(&sign)
    }
}

/// Decoded observation set handed to the PPV calculator and the inference cache.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct VitalsRecord {
    pub timestamp: String,
    pub heart_rate: Option<f64>,
    pub mean_arterial_pressure: Option<f64>,
    pub respiratory_rate: Option<f64>,
    pub systolic_bp: Option<f64>,
    pub diastolic_bp: Option<f64>,
    pub spo2: Option<f64>,
}

impl VitalsRecord {
    /// Maps a decoded frame onto named fields, checking each observation's codes against the table.
    pub fn from_frame(frame: VitalsFrame) -> Result<Self, DecodeError> {
        let mut record = Self {
            timestamp: frame.timestamp,
            ..Self::default()
        };

        for (sign, observation) in frame.observations {
            let spec = sign.spec();
            if observation.mdc_code != spec.mdc_code || observation.unit_code != spec.unit_code {
                return Err(DecodeError::CodeMismatch {
                    field: sign,
                    mdc_code: observation.mdc_code,
                    unit_code: observation.unit_code,
                    expected_mdc: spec.mdc_code,
                    expected_unit: spec.unit_code,
                });
            }
            *record.slot(sign) = Some(observation.value as f64);
        }

        Ok(record)
    }

    pub fn get(&self, sign: VitalSign) -> Option<f64> {
        match sign {
            VitalSign::HeartRate => self.heart_rate,
            VitalSign::MeanArterialPressure => self.mean_arterial_pressure,
            VitalSign::Spo2 => self.spo2,
            VitalSign::RespiratoryRate => self.respiratory_rate,
            VitalSign::SystolicBp => self.systolic_bp,
            VitalSign::DiastolicBp => self.diastolic_bp,
        }
    }

    fn slot(&mut self, sign: VitalSign) -> &mut Option<f64> {
        match sign {
            VitalSign::HeartRate => &mut self.heart_rate,
            VitalSign::MeanArterialPressure => &mut self.mean_arterial_pressure,
            VitalSign::Spo2 => &mut self.spo2,
            VitalSign::RespiratoryRate => &mut self.respiratory_rate,
            VitalSign::SystolicBp => &mut self.systolic_bp,
            VitalSign::DiastolicBp => &mut self.diastolic_bp,
        }
    }

    /// Systolic minus diastolic, when both are present.
    pub fn pulse_pressure(&self) -> Option<f64> {
        Some(self.systolic_bp? - self.diastolic_bp?)
    }
}
