//! The immutable, sequence-stamped measurement record that flows from an
//! adapter through a [`crate::model::data_item::DataItem`] into the
//! [`crate::buffer::CircularBuffer`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Severity level of a condition activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConditionLevel {
    Unavailable,
    Normal,
    Warning,
    Fault,
}

impl ConditionLevel {
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token.to_ascii_uppercase().as_str() {
            "UNAVAILABLE" => ConditionLevel::Unavailable,
            "NORMAL" => ConditionLevel::Normal,
            "WARNING" | "WARN" => ConditionLevel::Warning,
            "FAULT" | "FAILURE" | "HIGH" | "H" | "LOW" | "L" => ConditionLevel::Fault,
            _ => return None,
        })
    }
}

/// A single active condition alarm, keyed by native code in the owning
/// [`ConditionSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionActivation {
    pub level: ConditionLevel,
    pub native_code: String,
    pub native_severity: Option<String>,
    pub qualifier: Option<String>,
    pub message: Option<String>,
}

/// The set of currently active condition alarms for one DataItem, keyed by
/// native code. `normal`/`unavailable` clear activations rather than being
/// stored as members of the set themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet {
    pub activations: BTreeMap<String, ConditionActivation>,
}

impl ConditionSet {
    pub fn is_normal(&self) -> bool {
        self.activations.is_empty()
    }

    /// Apply one condition transition per the SHDR condition grammar.
    pub fn apply(&mut self, activation: ConditionActivation) {
        match activation.level {
            ConditionLevel::Normal => {
                if activation.native_code.is_empty() {
                    self.activations.clear();
                } else {
                    self.activations.remove(&activation.native_code);
                }
            }
            ConditionLevel::Unavailable => {
                self.activations.clear();
            }
            ConditionLevel::Warning | ConditionLevel::Fault => {
                self.activations.insert(activation.native_code.clone(), activation);
            }
        }
    }
}

/// The decoded payload of an [`Observation`], tagged by the DataItem's
/// representation.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationValue {
    /// A plain string/event/sample value already past unit conversion.
    Scalar(String),
    /// A converted numeric sample.
    Sample(f64),
    /// A converted 3-component sample (e.g. position/orientation).
    Sample3D([f64; 3]),
    /// A time-series sample: `(values, sample_rate)`.
    TimeSeries(Vec<f64>, f64),
    /// A DataSet: key to optional value (`None` means the key was removed).
    DataSet(BTreeMap<String, Option<String>>),
    /// The full active-condition set after applying a single activation.
    Condition(ConditionSet),
    /// `UNAVAILABLE` sentinel, applicable to any representation.
    Unavailable,
}

/// One immutable measurement, as stored in the circular buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub sequence: u64,
    pub data_item_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: ObservationValue,
    pub reset_trigger: Option<String>,
}

impl Observation {
    pub fn new(data_item_id: impl Into<String>, timestamp: DateTime<Utc>, value: ObservationValue) -> Self {
        Observation { sequence: 0, data_item_id: data_item_id.into(), timestamp, value, reset_trigger: None }
    }

    pub fn with_reset_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.reset_trigger = Some(trigger.into());
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }
}
