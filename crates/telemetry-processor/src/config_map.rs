// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Binding of string key/value properties into a plugin's typed configuration.
//!
//! A plugin describes its accepted properties as a static slice of
//! [`ConfigMapEntry`]. [`bind`] validates the configured properties against
//! that slice, converts each value to the declared type and produces a
//! [`BoundConfig`], which deserializes into any `serde` struct whose field
//! names match the entry names.
//!
//! Rules:
//! - keys are matched case-insensitively; unknown keys are rejected
//! - for single-valued entries the last write wins
//! - `multiple` entries accumulate every write into an array
//! - defaults apply to entries that were never written

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};

use crate::errors::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigMapType {
    Str,
    Int,
    Bool,
    Double,
    /// Byte size with an optional `K`, `M` or `G` suffix.
    Size,
    /// Comma separated list of strings.
    Slist,
}

impl ConfigMapType {
    fn name(self) -> &'static str {
        match self {
            ConfigMapType::Str => "string",
            ConfigMapType::Int => "integer",
            ConfigMapType::Bool => "boolean",
            ConfigMapType::Double => "double",
            ConfigMapType::Size => "size",
            ConfigMapType::Slist => "list",
        }
    }
}

/// One accepted property of a plugin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigMapEntry {
    pub kind: ConfigMapType,
    pub name: &'static str,
    pub default: Option<&'static str>,
    pub required: bool,
    pub multiple: bool,
    pub description: &'static str,
}

impl ConfigMapEntry {
    #[must_use]
    pub const fn new(kind: ConfigMapType, name: &'static str, description: &'static str) -> Self {
        Self {
            kind,
            name,
            default: None,
            required: false,
            multiple: false,
            description,
        }
    }

    #[must_use]
    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }
}

/// Properties converted to their declared types, keyed by entry name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundConfig(Map<String, Value>);

impl BoundConfig {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Deserializes the bound values into the plugin's configuration struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| Error::invalid_argument(format!("invalid configuration: {e}")))
    }
}

pub(crate) fn find_entry<'a>(
    schema: &'a [ConfigMapEntry],
    key: &str,
) -> Option<(usize, &'a ConfigMapEntry)> {
    schema
        .iter()
        .enumerate()
        .find(|(_, entry)| entry.name.eq_ignore_ascii_case(key))
}

/// Name of the first required entry that has neither a property nor a default.
#[must_use]
pub fn first_missing_required(
    properties: &[(String, String)],
    schema: &[ConfigMapEntry],
) -> Option<&'static str> {
    schema
        .iter()
        .filter(|entry| entry.required && entry.default.is_none())
        .find(|entry| {
            !properties
                .iter()
                .any(|(key, _)| entry.name.eq_ignore_ascii_case(key))
        })
        .map(|entry| entry.name)
}

/// Validates `properties` against `schema` and converts them to typed values.
pub fn bind(
    properties: &[(String, String)],
    schema: &[ConfigMapEntry],
) -> Result<BoundConfig, Error> {
    let mut values = Map::new();
    let mut written = vec![false; schema.len()];

    for entry in schema {
        if let Some(default) = entry.default {
            let value = convert(entry, default)?;
            let value = if entry.multiple {
                Value::Array(vec![value])
            } else {
                value
            };
            values.insert(entry.name.to_string(), value);
        }
    }

    for (key, raw) in properties {
        let Some((index, entry)) = find_entry(schema, key) else {
            return Err(Error::invalid_argument(format!(
                "unknown configuration property '{key}'"
            )));
        };
        let value = convert(entry, raw)?;
        if entry.multiple {
            // the first explicit write replaces the default
            if !written[index] {
                values.insert(entry.name.to_string(), Value::Array(Vec::new()));
            }
            if let Some(Value::Array(items)) = values.get_mut(entry.name) {
                items.push(value);
            }
        } else {
            values.insert(entry.name.to_string(), value);
        }
        written[index] = true;
    }

    if let Some(missing) = first_missing_required(properties, schema) {
        return Err(Error::invalid_argument(format!(
            "missing required property '{missing}'"
        )));
    }

    Ok(BoundConfig(values))
}

fn convert(entry: &ConfigMapEntry, raw: &str) -> Result<Value, Error> {
    let invalid = || {
        Error::invalid_argument(format!(
            "property '{}' must be of type {}, got '{}'",
            entry.name,
            entry.kind.name(),
            raw
        ))
    };
    let trimmed = raw.trim();

    match entry.kind {
        ConfigMapType::Str => Ok(Value::String(raw.to_string())),
        ConfigMapType::Int => trimmed
            .parse::<i64>()
            .map(|v| Value::Number(v.into()))
            .map_err(|_| invalid()),
        ConfigMapType::Bool => parse_bool(trimmed).map(Value::Bool).ok_or_else(invalid),
        ConfigMapType::Double => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        ConfigMapType::Size => parse_size(trimmed)
            .map(|v| Value::Number(v.into()))
            .ok_or_else(invalid),
        ConfigMapType::Slist => Ok(Value::Array(
            trimmed
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        )),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Parses `1024`, `64K`, `5M`, `1G` (an optional trailing `B` is accepted).
#[must_use]
pub fn parse_size(value: &str) -> Option<u64> {
    let upper = value.trim().to_ascii_uppercase();
    let without_b = upper.strip_suffix('B').unwrap_or(&upper);
    let (digits, multiplier) = match without_b.chars().last()? {
        'K' => (&without_b[..without_b.len() - 1], 1_024),
        'M' => (&without_b[..without_b.len() - 1], 1_024 * 1_024),
        'G' => (&without_b[..without_b.len() - 1], 1_024 * 1_024 * 1_024),
        _ => (without_b, 1),
    };
    digits.trim().parse::<u64>().ok()?.checked_mul(multiplier)
}
