//! Typed definition of a single signal and the normalization it applies to
//! raw adapter input before it becomes an [`Observation`].
//!
//! The filter/dedup ordering and field set are grounded directly on the
//! original agent's `DataItem::isDuplicate` / `DataItem::isFiltered`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::observation::{ConditionActivation, ConditionSet, Observation, ObservationValue};
use crate::units::{parse_conversion, Conversion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Sample,
    Event,
    Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Representation {
    Value,
    TimeSeries,
    Discrete,
    DataSet,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterSpec {
    pub min_delta: Option<f64>,
    pub min_period_secs: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Constraints {
    pub minimum: Option<String>,
    pub maximum: Option<String>,
    pub values: Vec<String>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self.minimum.is_none() && self.maximum.is_none() && self.values.is_empty()
    }
}

/// Construction-time description of a DataItem, as handed to the core by
/// an external device-configuration collaborator (see
/// [`crate::model::device::DeviceCatalogBuilder`]).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataItemSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    pub category: Category,
    pub representation: Representation,
    pub data_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub native_units: Option<String>,
    #[serde(default)]
    pub native_scale: Option<f64>,
    #[serde(default)]
    pub discrete: bool,
    #[serde(default)]
    pub three_d: bool,
    #[serde(default)]
    pub filter: FilterSpec,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub reset_trigger: Option<String>,
    #[serde(default)]
    pub initial_value: Option<String>,
}

/// Private, per-DataItem dedup/filter state. Mutated only from the
/// adapter-owning thread via `apply`/`reset`.
#[derive(Debug, Default)]
struct FilterState {
    last_value: Option<String>,
    last_sample_value: Option<f64>,
    last_period_timestamp: Option<DateTime<Utc>>,
    condition: ConditionSet,
}

/// A single signal definition. Belongs to exactly one
/// [`crate::model::device::Component`].
#[derive(Debug)]
pub struct DataItem {
    pub id: String,
    pub name: Option<String>,
    pub source: Option<String>,
    pub category: Category,
    pub representation: Representation,
    pub data_type: String,
    pub sub_type: Option<String>,
    pub native_units: Option<String>,
    pub native_scale: Option<f64>,
    pub discrete: bool,
    pub three_d: bool,
    pub filter: FilterSpec,
    pub constraints: Constraints,
    pub reset_trigger: Option<String>,
    pub initial_value: Option<String>,
    pub conversion: Conversion,
    state: parking_lot::Mutex<FilterState>,
}

impl DataItem {
    pub fn from_spec(spec: DataItemSpec) -> Self {
        let conversion = match &spec.native_units {
            Some(units) => parse_conversion(units, spec.native_scale),
            None => Conversion::IDENTITY,
        };
        DataItem {
            id: spec.id,
            name: spec.name,
            source: spec.source,
            category: spec.category,
            representation: spec.representation,
            data_type: spec.data_type,
            sub_type: spec.sub_type,
            native_units: spec.native_units,
            native_scale: spec.native_scale,
            discrete: spec.discrete,
            three_d: spec.three_d,
            filter: spec.filter,
            constraints: spec.constraints,
            reset_trigger: spec.reset_trigger,
            initial_value: spec.initial_value,
            conversion,
            state: parking_lot::Mutex::new(FilterState::default()),
        }
    }

    /// The key an adapter uses to address this DataItem: source, falling
    /// back to name, falling back to id.
    pub fn source_or_name(&self) -> &str {
        self.source.as_deref().or(self.name.as_deref()).unwrap_or(&self.id)
    }

    pub fn allow_dups(&self) -> bool {
        self.discrete || self.representation == Representation::Discrete
    }

    /// Clears dedup/filter state so the next observation is always emitted,
    /// and tags it with the trigger that caused the reset.
    pub fn reset(&self, trigger: &str) {
        let mut state = self.state.lock();
        state.last_value = None;
        state.last_sample_value = None;
        state.last_period_timestamp = None;
        let _ = trigger;
    }

    /// Apply a scalar (Value/Discrete representation) raw string value.
    /// Returns `None` if the value is filtered or a non-dup-allowed repeat.
    /// `filter_duplicates` gates the repeat check; when `false` every value
    /// that survives the sample/period filters above is emitted.
    pub fn apply_scalar(&self, raw: &str, timestamp: DateTime<Utc>, filter_duplicates: bool) -> Option<Observation> {
        let mut state = self.state.lock();

        if self.category == Category::Sample {
            if let Ok(numeric) = raw.parse::<f64>() {
                if let Some(min_delta) = self.filter.min_delta {
                    if let Some(last) = state.last_sample_value {
                        if numeric >= (last - min_delta) && numeric <= (last + min_delta) {
                            return None;
                        }
                    }
                    state.last_sample_value = Some(numeric);
                }
            }
        }

        if let Some(min_period) = self.filter.min_period_secs {
            if let Some(last_ts) = state.last_period_timestamp {
                let elapsed = (timestamp - last_ts).num_milliseconds() as f64 / 1000.0;
                if elapsed <= min_period {
                    return None;
                }
            }
            state.last_period_timestamp = Some(timestamp);
        }

        if filter_duplicates && self.representation == Representation::Value && !self.allow_dups() {
            if state.last_value.as_deref() == Some(raw) {
                return None;
            }
            state.last_value = Some(raw.to_string());
        }

        let value = if self.category == Category::Sample {
            match raw.parse::<f64>() {
                Ok(numeric) => {
                    if self.three_d {
                        // Shouldn't normally reach here for scalar apply; caller should
                        // use apply_sample_3d for three-component values.
                        ObservationValue::Sample(self.conversion.apply(numeric))
                    } else {
                        ObservationValue::Sample(self.conversion.apply(numeric))
                    }
                }
                Err(_) => ObservationValue::Scalar(raw.to_string()),
            }
        } else {
            ObservationValue::Scalar(raw.to_string())
        };

        Some(Observation::new(self.id.clone(), timestamp, value))
    }

    /// Apply a 3-component sample, e.g. `X Y Z` position values.
    pub fn apply_sample_3d(&self, components: [f64; 3], timestamp: DateTime<Utc>) -> Observation {
        let converted = self.conversion.apply_3d(components);
        Observation::new(self.id.clone(), timestamp, ObservationValue::Sample3D(converted))
    }

    /// Apply a time-series sample. Never deduped (matches the original's
    /// `isDuplicate` short-circuit for non-`VALUE` representations).
    pub fn apply_time_series(&self, values: Vec<f64>, rate: f64, timestamp: DateTime<Utc>) -> Observation {
        Observation::new(self.id.clone(), timestamp, ObservationValue::TimeSeries(values, rate))
    }

    /// Apply a DataSet update. `None` values represent explicit key removal.
    pub fn apply_data_set(&self, entries: BTreeMap<String, Option<String>>, timestamp: DateTime<Utc>) -> Observation {
        Observation::new(self.id.clone(), timestamp, ObservationValue::DataSet(entries))
    }

    /// Apply one condition transition, merging into the running active set
    /// and emitting the full resulting set as the Observation value.
    pub fn apply_condition(&self, activation: ConditionActivation, timestamp: DateTime<Utc>) -> Observation {
        let mut state = self.state.lock();
        state.condition.apply(activation);
        Observation::new(self.id.clone(), timestamp, ObservationValue::Condition(state.condition.clone()))
    }

    pub fn current_condition_set(&self) -> ConditionSet {
        self.state.lock().condition.clone()
    }
}
