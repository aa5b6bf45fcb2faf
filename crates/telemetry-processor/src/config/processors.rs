// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Declarative description of the units attached to one processor.
//!
//! ```yaml
//! processors:
//!   logs:
//!     - name: mask
//!       processing_rules:
//!         - type: mask_sequences
//!           name: cards
//!           pattern: '\d{4}-\d{4}-\d{4}-\d{4}'
//!           replace_placeholder: "[CARD]"
//!     - name: row_batch
//!       schema_dir: /etc/schemas
//!       max_records_per_flush: 500
//! ```
//!
//! Any `serde` format works; unit entries keep their properties as JSON
//! values and [`UnitConfig::properties`] flattens them into the string
//! key/value pairs a plugin instance accepts.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config_map::{self, ConfigMapEntry};
use crate::event_type::TelemetryKind;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ProcessorsConfig {
    #[serde(default)]
    pub logs: Vec<UnitConfig>,
    #[serde(default)]
    pub metrics: Vec<UnitConfig>,
    #[serde(default)]
    pub traces: Vec<UnitConfig>,
}

impl ProcessorsConfig {
    /// Unit entries paired with the chain they are declared for.
    pub fn units(&self) -> impl Iterator<Item = (TelemetryKind, &UnitConfig)> {
        self.logs
            .iter()
            .map(|unit| (TelemetryKind::Logs, unit))
            .chain(self.metrics.iter().map(|unit| (TelemetryKind::Metrics, unit)))
            .chain(self.traces.iter().map(|unit| (TelemetryKind::Traces, unit)))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct UnitConfig {
    /// Plugin name looked up in the registry
    pub name: String,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl UnitConfig {
    /// Converts the settings to property pairs for a plugin with the given
    /// config map.
    ///
    /// Strings are taken verbatim and numbers and booleans are printed. A list
    /// of scalars becomes one property per item when its entry is `multiple`,
    /// otherwise a single comma-joined property. Anything structured is passed
    /// on as JSON text. Nulls are skipped.
    #[must_use]
    pub fn properties(&self, config_map: &[ConfigMapEntry]) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.settings.len());
        for (key, value) in &self.settings {
            match value {
                Value::Null => {}
                Value::Array(items) if items.iter().all(is_scalar) => {
                    let texts = items.iter().filter_map(scalar_to_string);
                    let multiple = config_map::find_entry(config_map, key)
                        .is_some_and(|(_, entry)| entry.multiple);
                    if multiple {
                        out.extend(texts.map(|text| (key.clone(), text)));
                    } else {
                        out.push((key.clone(), texts.collect::<Vec<_>>().join(",")));
                    }
                }
                Value::Array(_) | Value::Object(_) => {
                    out.push((key.clone(), value.to_string()));
                }
                scalar => {
                    if let Some(text) = scalar_to_string(scalar) {
                        out.push((key.clone(), text));
                    }
                }
            }
        }
        out
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
