use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use strum::{Display, EnumString};

/// One of the nine fixed lifecycle stages of a demand, in lifecycle order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum Phase {
    Ideation,
    Requirements,
    Assessment,
    Design,
    Build,
    Validation,
    Deployment,
    Implementation,
    Closing,
}

impl Phase {
    pub const ALL: [Phase; 9] = [
        Phase::Ideation,
        Phase::Requirements,
        Phase::Assessment,
        Phase::Design,
        Phase::Build,
        Phase::Validation,
        Phase::Deployment,
        Phase::Implementation,
        Phase::Closing,
    ];

    /// Display title, e.g. "Requirements".
    pub fn title(self) -> &'static str {
        match self {
            Self::Ideation => "Ideation",
            Self::Requirements => "Requirements",
            Self::Assessment => "Assessment",
            Self::Design => "Design",
            Self::Build => "Build",
            Self::Validation => "Validation",
            Self::Deployment => "Deployment",
            Self::Implementation => "Implementation",
            Self::Closing => "Closing",
        }
    }

    /// 1-based position in the lifecycle.
    pub fn ordinal(self) -> usize {
        self as usize + 1
    }
}

/// Whether a stored value counts as filled in.
///
/// Blank strings, empty collections, zero and `false` do not count.
pub fn is_occupied(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::Bool(b) => *b,
    }
}

/// Keys starting with `_` carry UI bookkeeping, not user content.
pub fn is_metadata_key(key: &str) -> bool {
    key.starts_with('_')
}

/// The open field set of one phase of one demand.
///
/// Keys are kept sorted so that serializing the same data always yields the
/// same document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseData(BTreeMap<String, Value>);

impl PhaseData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn is_occupied(&self, field: &str) -> bool {
        self.0.get(field).is_some_and(is_occupied)
    }

    /// All non-metadata fields, occupied or not.
    pub fn content_fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().filter(|(key, _)| !is_metadata_key(key))
    }

    pub fn occupied_fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.content_fields().filter(|(_, value)| is_occupied(value))
    }

    pub fn has_content(&self) -> bool {
        self.occupied_fields().next().is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for PhaseData {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The nine phase records of a demand.
///
/// Each phase is its own named field so persisted documents keep the
/// `ideation` … `closing` keys; missing keys load as empty phases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Phases {
    pub ideation: PhaseData,
    pub requirements: PhaseData,
    pub assessment: PhaseData,
    pub design: PhaseData,
    pub build: PhaseData,
    pub validation: PhaseData,
    pub deployment: PhaseData,
    pub implementation: PhaseData,
    pub closing: PhaseData,
}

impl Phases {
    pub fn get(&self, phase: Phase) -> &PhaseData {
        match phase {
            Phase::Ideation => &self.ideation,
            Phase::Requirements => &self.requirements,
            Phase::Assessment => &self.assessment,
            Phase::Design => &self.design,
            Phase::Build => &self.build,
            Phase::Validation => &self.validation,
            Phase::Deployment => &self.deployment,
            Phase::Implementation => &self.implementation,
            Phase::Closing => &self.closing,
        }
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut PhaseData {
        match phase {
            Phase::Ideation => &mut self.ideation,
            Phase::Requirements => &mut self.requirements,
            Phase::Assessment => &mut self.assessment,
            Phase::Design => &mut self.design,
            Phase::Build => &mut self.build,
            Phase::Validation => &mut self.validation,
            Phase::Deployment => &mut self.deployment,
            Phase::Implementation => &mut self.implementation,
            Phase::Closing => &mut self.closing,
        }
    }

    /// Phases in lifecycle order.
    pub fn iter(&self) -> impl Iterator<Item = (Phase, &PhaseData)> {
        Phase::ALL.into_iter().map(move |phase| (phase, self.get(phase)))
    }

    pub fn has_content(&self) -> bool {
        self.iter().any(|(_, data)| data.has_content())
    }
}
