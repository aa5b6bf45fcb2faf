// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line-oriented filtering and masking of log batches.
//!
//! The batch is treated as newline-delimited text. Rules are evaluated in
//! order against each line:
//!
//! 1. `exclude_at_match` drops the line when the pattern matches
//! 2. `include_at_match` drops the line when the pattern does not match
//! 3. `mask_sequences` replaces every match with `replace_placeholder`
//!
//! ```yaml
//! processors:
//!   logs:
//!     - name: mask
//!       processing_rules:
//!         - type: exclude_at_match
//!           name: health_checks
//!           pattern: "GET /health"
//!         - type: mask_sequences
//!           name: cards
//!           pattern: '\d{4}-\d{4}-\d{4}-\d{4}'
//!           replace_placeholder: "[CARD]"
//! ```

use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use tracing::{debug, error};

use crate::config::log_level::LogLevel;
use crate::config_map::{ConfigMapEntry, ConfigMapType};
use crate::errors::Error;
use crate::event_type::EventTypes;
use crate::plugin::{InitContext, NativeProcessor, PluginDescriptor, ProcessContext, Transform};

pub static DESCRIPTOR: PluginDescriptor = PluginDescriptor {
    name: "mask",
    description: "filter and mask log lines with regular expressions",
    event_types: EventTypes::LOGS,
    config_map: &[ConfigMapEntry::new(
        ConfigMapType::Str,
        "processing_rules",
        "JSON list of exclude_at_match, include_at_match and mask_sequences rules",
    )
    .required()],
    init,
};

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    ExcludeAtMatch,
    IncludeAtMatch,
    MaskSequences,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ProcessingRule {
    #[serde(rename = "type")]
    pub kind: Kind,
    pub name: String,
    pub pattern: String,
    pub replace_placeholder: Option<String>,
}

/// Accepts the rules either as a JSON document in a string or as a list.
/// Rules that fail to parse are logged and skipped.
pub fn deserialize_processing_rules<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<ProcessingRule>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: JsonValue = Deserialize::deserialize(deserializer)?;

    match value {
        JsonValue::String(s) => match serde_json::from_str::<JsonValue>(&s) {
            Ok(JsonValue::Array(items)) => Ok(parse_each(items)),
            Ok(_) => {
                error!("Processing rules must be a list, ignoring");
                Ok(None)
            }
            Err(e) => {
                error!("Failed to parse processing rules: {}, ignoring", e);
                Ok(None)
            }
        },
        JsonValue::Array(items) => Ok(parse_each(items)),
        _ => Ok(None),
    }
}

fn parse_each(items: Vec<JsonValue>) -> Option<Vec<ProcessingRule>> {
    let mut rules = Vec::new();
    for item in items {
        match serde_json::from_value(item) {
            Ok(rule) => rules.push(rule),
            Err(e) => error!("Failed to parse processing rule: {}, ignoring", e),
        }
    }
    if rules.is_empty() {
        None
    } else {
        Some(rules)
    }
}

#[derive(Deserialize)]
struct MaskConfig {
    #[serde(default, deserialize_with = "deserialize_processing_rules")]
    processing_rules: Option<Vec<ProcessingRule>>,
}

/// A rule with its pattern compiled.
#[derive(Clone, Debug)]
pub struct Rule {
    pub kind: Kind,
    pub name: String,
    pub regex: regex::Regex,
    pub placeholder: String,
}

/// Compiles the configured rules, skipping patterns that are not valid
/// regular expressions.
#[must_use]
pub fn compile_rules(rules: &[ProcessingRule]) -> Vec<Rule> {
    let mut compiled = Vec::with_capacity(rules.len());
    for rule in rules {
        match regex::Regex::new(&rule.pattern) {
            Ok(regex) => compiled.push(Rule {
                kind: rule.kind,
                name: rule.name.clone(),
                regex,
                placeholder: rule.replace_placeholder.clone().unwrap_or_default(),
            }),
            Err(e) => {
                error!("Failed to compile rule '{}': {}, ignoring", rule.name, e);
            }
        }
    }
    compiled
}

/// Applies `rules` to one line. Returns `false` when the line is dropped.
pub fn apply_rules(rules: &[Rule], line: &mut String) -> bool {
    for rule in rules {
        match rule.kind {
            Kind::ExcludeAtMatch => {
                if rule.regex.is_match(line) {
                    return false;
                }
            }
            Kind::IncludeAtMatch => {
                if !rule.regex.is_match(line) {
                    return false;
                }
            }
            Kind::MaskSequences => {
                if let std::borrow::Cow::Owned(masked) =
                    rule.regex.replace_all(line, rule.placeholder.as_str())
                {
                    *line = masked;
                }
            }
        }
    }
    true
}

pub struct Mask {
    rules: Vec<Rule>,
}

fn init(ctx: &InitContext<'_>) -> Result<Box<dyn NativeProcessor>, Error> {
    let config: MaskConfig = ctx.config.deserialize()?;
    let rules = compile_rules(&config.processing_rules.unwrap_or_default());
    if rules.is_empty() {
        return Err(Error::invalid_argument(format!(
            "{}: no valid processing rules",
            ctx.instance.display_name()
        )));
    }
    Ok(Box::new(Mask { rules }))
}

impl NativeProcessor for Mask {
    fn process_logs(
        &mut self,
        records: &[u8],
        tag: &str,
        ctx: &ProcessContext<'_>,
    ) -> Result<Transform, Error> {
        let text = std::str::from_utf8(records)
            .map_err(|_| Error::backend(format!("records for '{tag}' are not valid UTF-8")))?;

        let mut out = String::with_capacity(text.len());
        let mut dropped = 0usize;
        for line in text.split_inclusive('\n') {
            let (body, newline) = match line.strip_suffix('\n') {
                Some(body) => (body, "\n"),
                None => (line, ""),
            };
            let mut body = body.to_string();
            if apply_rules(&self.rules, &mut body) {
                out.push_str(&body);
                out.push_str(newline);
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 && ctx.log_enabled(LogLevel::Debug) {
            debug!(
                "{}: dropped {} line(s) from '{}'",
                ctx.instance.display_name(),
                dropped,
                tag
            );
        }

        if out.as_bytes() == records {
            Ok(Transform::Unchanged)
        } else {
            Ok(Transform::Modified(out.into_bytes()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rule(kind: Kind, pattern: &str, placeholder: Option<&str>) -> ProcessingRule {
        ProcessingRule {
            kind,
            name: "test".to_string(),
            pattern: pattern.to_string(),
            replace_placeholder: placeholder.map(str::to_string),
        }
    }

    #[test]
    fn test_deserialize_from_string_skips_invalid_rules() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(deserialize_with = "deserialize_processing_rules")]
            rules: Option<Vec<ProcessingRule>>,
        }
        let json = r#"{"rules": "[{\"type\":\"exclude_at_match\",\"name\":\"hc\",\"pattern\":\"GET /health\"},{\"type\":\"bogus\"}]"}"#;
        let wrapper: Wrapper = serde_json::from_str(json).unwrap();
        let rules = wrapper.rules.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].kind, Kind::ExcludeAtMatch);

        let wrapper: Wrapper = serde_json::from_str(r#"{"rules": "not json"}"#).unwrap();
        assert!(wrapper.rules.is_none());
    }

    #[test]
    fn test_compile_skips_invalid_regex() {
        let compiled = compile_rules(&[
            rule(Kind::ExcludeAtMatch, "(unclosed", None),
            rule(Kind::MaskSequences, r"\d+", Some("#")),
        ]);
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].placeholder, "#");
    }

    #[test]
    fn test_apply_rules() {
        let rules = compile_rules(&[
            rule(Kind::ExcludeAtMatch, "DEBUG", None),
            rule(Kind::IncludeAtMatch, "user", None),
            rule(Kind::MaskSequences, r"\d{4}-\d{4}", Some("[CARD]")),
        ]);

        let mut line = "DEBUG user 1234-5678".to_string();
        assert!(!apply_rules(&rules, &mut line));

        let mut line = "INFO service started".to_string();
        assert!(!apply_rules(&rules, &mut line));

        let mut line = "INFO user paid with 1234-5678".to_string();
        assert!(apply_rules(&rules, &mut line));
        assert_eq!(line, "INFO user paid with [CARD]");
    }
}
