// Pulse pressure variation - Per-session derived metric
use crate::domain::vitals::VitalsRecord;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PpvState {
    #[default]
    Uninitialized,
    /// Pulse pressure range in mmHg. Kept as `f64` so any 64-bit wire value fits.
    Tracking {
        min: f64,
        max: f64,
    },
}

/// Tracks the pulse pressure range observed since the session started.
///
/// The range only widens; PPV is relative to everything seen since the last
/// [`reset`](PpvCalculator::reset), not to a sliding window.
#[derive(Debug, Clone, Default)]
pub struct PpvCalculator {
    state: PpvState,
}

impl PpvCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PpvState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = PpvState::Uninitialized;
    }

    pub fn update_from_record(&mut self, record: &VitalsRecord) -> Option<String> {
        self.update(record.systolic_bp, record.diastolic_bp)
    }

    /// Folds one reading into the range and returns PPV formatted to one decimal.
    ///
    /// Returns `None` and leaves the state untouched unless both pressures are present.
    pub fn update(&mut self, systolic: Option<f64>, diastolic: Option<f64>) -> Option<String> {
        let pp = systolic? - diastolic?;

        let (min, max) = match self.state {
            PpvState::Uninitialized => {
                self.state = PpvState::Tracking { min: pp, max: pp };
                return Some("0.0".to_string());
            }
            PpvState::Tracking { min, max } => (min.min(pp), max.max(pp)),
        };
        self.state = PpvState::Tracking { min, max };

        let denom = (max + min) / 2.0;
        if max == min || denom == 0.0 || !denom.is_finite() {
            return Some("0.0".to_string());
        }

        // `{:.1}` rounds exact ties to even
        let ppv = ((max - min) / denom) * 100.0;
        Some(format!("{:.1}", ppv))
    }
}
