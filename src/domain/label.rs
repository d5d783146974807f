// Classification labels and suggested actions
use serde::{Deserialize, Serialize};

/// Size of the model's output space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ClassCount {
    Binary,
    #[default]
    Ternary,
}

impl ClassCount {
    pub fn get(self) -> usize {
        match self {
            ClassCount::Binary => 2,
            ClassCount::Ternary => 3,
        }
    }
}

impl TryFrom<u8> for ClassCount {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(ClassCount::Binary),
            3 => Ok(ClassCount::Ternary),
            other => Err(format!("class count must be 2 or 3, got {other}")),
        }
    }
}

impl From<ClassCount> for u8 {
    fn from(value: ClassCount) -> Self {
        value.get() as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    AbnormalBloodVolume,
    Euvolemic,
    Hypervolemia,
    Hypovolemia,
    Euvolemia,
}

impl Label {
    /// Maps a model class index onto the label set for `count`.
    pub fn from_class(count: ClassCount, index: usize) -> Option<Self> {
        let labels: &[Label] = match count {
            ClassCount::Binary => &[Label::AbnormalBloodVolume, Label::Euvolemic],
            ClassCount::Ternary => &[Label::Hypervolemia, Label::Hypovolemia, Label::Euvolemia],
        };
        labels.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::AbnormalBloodVolume => "abnormal blood volume",
            Label::Euvolemic => "euvolemic",
            Label::Hypervolemia => "hypervolemia",
            Label::Hypovolemia => "hypovolemia",
            Label::Euvolemia => "euvolemia",
        }
    }

    pub fn suggested_action(self) -> &'static str {
        match self {
            Label::AbnormalBloodVolume => "evaluate and consider action",
            Label::Euvolemic | Label::Euvolemia => "maintain current status",
            Label::Hypervolemia => "consider fluid removal",
            Label::Hypovolemia => "consider fluid administration",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a majority vote over the inference cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Label(Label),
    NoData,
}
