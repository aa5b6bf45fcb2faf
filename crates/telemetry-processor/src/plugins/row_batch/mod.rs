// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching of delimiter-separated rows into structured records.
//!
//! Every log batch carries rows from one source, identified by the batch tag
//! (or the owning source's name when the tag is empty). The first batch of a
//! source loads its record schema and derives the static metadata fields;
//! later batches reuse that state for the lifetime of the instance.
//!
//! Converted rows accumulate per source and are released as one
//! newline-delimited JSON buffer once either watermark is reached:
//!
//! - `max_records_per_flush` pending records (default 1000)
//! - `max_bytes_per_flush` pending bytes (default 5M)
//!
//! An empty batch flushes whatever the source has pending. While rows are
//! only being accumulated the batch is consumed and nothing continues down
//! the chain.
//!
//! A row may be split across batches. Its start is kept with the source and
//! parsed together with the next batch; an empty batch arriving while a row
//! is unfinished fails.

pub mod csv;
pub mod metadata;
pub mod schema;
pub mod state;

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use fnv::FnvBuildHasher;
use hashbrown::HashMap;
use serde::Deserialize;
use tracing::{debug, warn};
use ustr::Ustr;

use crate::config::log_level::LogLevel;
use crate::config::RuntimeConfig;
use crate::config_map::{ConfigMapEntry, ConfigMapType};
use crate::errors::{Error, ParseError};
use crate::event_type::EventTypes;
use crate::plugin::{InitContext, NativeProcessor, PluginDescriptor, ProcessContext, Transform};
use schema::RecordSchema;
use state::SourceState;

pub const DEFAULT_MAX_RECORDS_PER_FLUSH: usize = 1_000;
pub const DEFAULT_MAX_BYTES_PER_FLUSH: u64 = 5 * 1_024 * 1_024;
const SCHEMA_EXTENSION: &str = "avsc";

pub static DESCRIPTOR: PluginDescriptor = PluginDescriptor {
    name: "row_batch",
    description: "convert delimited rows to JSON records and flush them in batches",
    event_types: EventTypes::LOGS,
    config_map: &[
        ConfigMapEntry::new(
            ConfigMapType::Str,
            "schema",
            "record schema applied to every source",
        ),
        ConfigMapEntry::new(
            ConfigMapType::Str,
            "schema_dir",
            "directory holding one <source>.avsc schema per source",
        ),
        ConfigMapEntry::new(
            ConfigMapType::Int,
            "max_records_per_flush",
            "pending records that trigger a flush",
        )
        .with_default("1000"),
        ConfigMapEntry::new(
            ConfigMapType::Size,
            "max_bytes_per_flush",
            "pending encoded bytes that trigger a flush",
        )
        .with_default("5M"),
        ConfigMapEntry::new(ConfigMapType::Str, "delimiter", "column separator").with_default(","),
        ConfigMapEntry::new(
            ConfigMapType::Slist,
            "env_metadata",
            "environment variables copied into the record metadata",
        ),
    ],
    init,
};

#[derive(Debug, Deserialize)]
struct RowBatchConfig {
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    schema_dir: Option<PathBuf>,
    max_records_per_flush: i64,
    max_bytes_per_flush: u64,
    delimiter: String,
    #[serde(default)]
    env_metadata: Vec<String>,
}

enum SchemaSource {
    Inline(RecordSchema),
    Directory(PathBuf),
}

impl SchemaSource {
    fn load(&self, key: &str) -> Result<RecordSchema, Error> {
        match self {
            SchemaSource::Inline(schema) => Ok(schema.clone()),
            SchemaSource::Directory(dir) => {
                let path = schema_path(dir, key)?;
                let json = std::fs::read_to_string(&path).map_err(|e| {
                    Error::backend(format!(
                        "cannot read schema for '{key}' from {}: {e}",
                        path.display()
                    ))
                })?;
                Ok(RecordSchema::parse(&json)?)
            }
        }
    }
}

fn schema_path(dir: &Path, key: &str) -> Result<PathBuf, Error> {
    if key.is_empty() || key.contains(['/', '\\']) || key.contains("..") {
        return Err(Error::invalid_argument(format!(
            "source '{key}' cannot be used as a schema file name"
        )));
    }
    Ok(dir.join(format!("{key}.{SCHEMA_EXTENSION}")))
}

pub struct RowBatch {
    schemas: SchemaSource,
    max_records: usize,
    max_bytes: usize,
    delimiter: char,
    env_metadata: Vec<String>,
    states: HashMap<Ustr, SourceState, FnvBuildHasher>,
}

fn init(ctx: &InitContext<'_>) -> Result<Box<dyn NativeProcessor>, Error> {
    let config: RowBatchConfig = ctx.config.deserialize()?;
    let name = ctx.instance.display_name();

    let schemas = match (config.schema, config.schema_dir) {
        (Some(json), _) => SchemaSource::Inline(RecordSchema::parse(&json).map_err(|e| {
            Error::invalid_argument(format!("{name}: {e}"))
        })?),
        (None, Some(dir)) => SchemaSource::Directory(dir),
        (None, None) => {
            return Err(Error::invalid_argument(format!(
                "{name}: one of 'schema' or 'schema_dir' is required"
            )))
        }
    };

    let max_records = usize::try_from(config.max_records_per_flush)
        .ok()
        .filter(|max| *max > 0)
        .ok_or_else(|| {
            Error::invalid_argument(format!(
                "{name}: max_records_per_flush must be positive, got {}",
                config.max_records_per_flush
            ))
        })?;
    let max_bytes = usize::try_from(config.max_bytes_per_flush)
        .ok()
        .filter(|max| *max > 0)
        .ok_or_else(|| {
            Error::invalid_argument(format!("{name}: max_bytes_per_flush must be positive"))
        })?;

    let mut delimiter_chars = config.delimiter.chars();
    let delimiter = match (delimiter_chars.next(), delimiter_chars.next()) {
        (Some(c), None) if c != '"' && c != '\n' => c,
        _ => {
            return Err(Error::invalid_argument(format!(
                "{name}: delimiter must be a single character, got '{}'",
                config.delimiter
            )))
        }
    };

    debug!(
        "{}: batching up to {} records or {} bytes per source",
        name, max_records, max_bytes
    );
    Ok(Box::new(RowBatch {
        schemas,
        max_records,
        max_bytes,
        delimiter,
        env_metadata: config.env_metadata,
        states: HashMap::default(),
    }))
}

impl RowBatch {
    fn source_key(tag: &str, ctx: &ProcessContext<'_>) -> Result<Ustr, Error> {
        if !tag.is_empty() {
            return Ok(Ustr::from(tag));
        }
        match ctx.source {
            Some(source) if !source.name().is_empty() => Ok(Ustr::from(source.name())),
            _ => Err(Error::invalid_argument(
                "row batches need a tag or an owning source",
            )),
        }
    }

    fn new_state(&self, key: Ustr, runtime: &RuntimeConfig) -> Result<SourceState, Error> {
        let schema = self.schemas.load(key.as_str())?;
        let metadata = metadata::build(runtime, &self.env_metadata, &schema);
        Ok(SourceState::new(schema, metadata))
    }

    fn flush(key: Ustr, state: &mut SourceState, ctx: &ProcessContext<'_>) -> Transform {
        if ctx.log_enabled(LogLevel::Debug) {
            debug!(
                "{}: flushing {} records ({} bytes) for '{}'",
                ctx.instance.display_name(),
                state.pending_records(),
                state.pending_bytes(),
                key
            );
        }
        Transform::Modified(state.take())
    }
}

impl NativeProcessor for RowBatch {
    fn process_logs(
        &mut self,
        records: &[u8],
        tag: &str,
        ctx: &ProcessContext<'_>,
    ) -> Result<Transform, Error> {
        let key = Self::source_key(tag, ctx)?;

        if records.is_empty() {
            let Some(state) = self.states.get_mut(&key) else {
                return Ok(Transform::Unchanged);
            };
            if !state.tail().is_empty() {
                let tail = state.take_tail();
                return Err(Error::backend(format!(
                    "batch for '{key}' ended inside a row ({} bytes unparsed)",
                    tail.len()
                )));
            }
            return Ok(if state.pending_records() > 0 {
                Self::flush(key, state, ctx)
            } else {
                Transform::Unchanged
            });
        }

        if !self.states.contains_key(&key) {
            let state = self.new_state(key, ctx.runtime)?;
            if ctx.log_enabled(LogLevel::Debug) {
                debug!(
                    "{}: tracking new source '{}' with schema {}",
                    ctx.instance.display_name(),
                    key,
                    state.schema.name
                );
            }
            self.states.insert(key, state);
        }
        let Some(state) = self.states.get_mut(&key) else {
            return Err(Error::backend(format!("no state for source '{key}'")));
        };

        let text = std::str::from_utf8(records).map_err(|_| ParseError::InvalidUtf8)?;
        let text = if state.tail().is_empty() {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(format!("{}{text}", state.tail()))
        };
        let (complete, tail) = csv::split_complete(&text, self.delimiter);
        let converted = csv::parse_rows(complete, self.delimiter)?
            .iter()
            .enumerate()
            .map(|(index, columns)| state.schema.convert_row(index + 1, columns))
            .collect::<Result<Vec<_>, _>>()?;
        state.append(key.as_str(), &converted)?;
        state.set_tail(tail);

        if state.pending_records() >= self.max_records || state.pending_bytes() >= self.max_bytes {
            return Ok(Self::flush(key, state, ctx));
        }
        Ok(Transform::Consumed)
    }

    fn exit(&mut self, _runtime: &RuntimeConfig) -> Result<(), Error> {
        for (key, state) in &self.states {
            if state.pending_records() > 0 {
                warn!(
                    "Discarding {} pending records for source '{}'",
                    state.pending_records(),
                    key
                );
            }
            if !state.tail().is_empty() {
                warn!("Discarding unfinished row for source '{}'", key);
            }
        }
        self.states.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::event_type::TelemetryKind;
    use crate::plugin::{InstanceIdentity, Registry};
    use std::sync::Arc;
    use tracing_test::traced_test;

    const SCHEMA: &str =
        r#"{"type":"record","name":"r","fields":[{"name":"msg","type":"string"}]}"#;

    fn row_batch(max_records: usize) -> RowBatch {
        RowBatch {
            schemas: SchemaSource::Inline(RecordSchema::parse(SCHEMA).unwrap()),
            max_records,
            max_bytes: usize::MAX,
            delimiter: ',',
            env_metadata: Vec::new(),
            states: HashMap::default(),
        }
    }

    fn identity() -> InstanceIdentity {
        InstanceIdentity {
            id: 0,
            name: "row_batch.0".to_string(),
            alias: None,
            log_level: LogLevel::Warn,
            descriptor: &DESCRIPTOR,
        }
    }

    #[test]
    fn test_flush_resets_pending_counters() {
        let runtime = RuntimeConfig::default();
        let identity = identity();
        let ctx = ProcessContext {
            instance: &identity,
            source: None,
            runtime: &runtime,
        };
        let mut batch = row_batch(3);
        let key = Ustr::from("nginx");

        for (row, pending) in [(b"a\n", 1), (b"b\n", 2)] {
            let out = batch.process_logs(row, "nginx", &ctx).unwrap();
            assert_eq!(out, Transform::Consumed);
            assert_eq!(batch.states[&key].pending_records(), pending);
            assert!(batch.states[&key].pending_bytes() > 0);
        }

        let out = batch.process_logs(b"c\n", "nginx", &ctx).unwrap();
        assert!(matches!(out, Transform::Modified(ref buffer) if !buffer.is_empty()));
        let state = &batch.states[&key];
        assert_eq!(state.pending_records(), 0);
        assert_eq!(state.pending_bytes(), 0);
        assert_eq!(state.rows_seen(), 3);

        assert_eq!(
            batch.process_logs(b"d\n", "nginx", &ctx).unwrap(),
            Transform::Consumed
        );
        assert_eq!(batch.states[&key].pending_records(), 1);
    }

    #[test]
    fn test_unfinished_row_waits_for_the_next_batch() {
        let runtime = RuntimeConfig::default();
        let identity = identity();
        let ctx = ProcessContext {
            instance: &identity,
            source: None,
            runtime: &runtime,
        };
        let mut batch = row_batch(10);
        let key = Ustr::from("app");

        batch.process_logs(b"one\n\"tw", "app", &ctx).unwrap();
        assert_eq!(batch.states[&key].pending_records(), 1);
        assert_eq!(batch.states[&key].tail(), "\"tw");

        batch.process_logs(b"o\nlines\"\n", "app", &ctx).unwrap();
        assert_eq!(batch.states[&key].pending_records(), 2);
        assert!(batch.states[&key].tail().is_empty());

        batch.process_logs(b"thr", "app", &ctx).unwrap();
        let err = batch.process_logs(b"", "app", &ctx).unwrap_err();
        assert!(matches!(err, Error::Backend(msg) if msg.contains("ended inside a row")));
        assert!(batch.states[&key].tail().is_empty());

        let Transform::Modified(out) = batch.process_logs(b"", "app", &ctx).unwrap() else {
            panic!("pending rows were not flushed");
        };
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains(r#""msg":"two\nlines""#));
    }

    #[test]
    #[traced_test]
    fn test_exit_reports_discarded_rows() {
        let registry = Registry::with_builtins();
        let mut instance = registry
            .new_instance("row_batch", Arc::new(RuntimeConfig::default()))
            .unwrap();
        instance.set_property("schema", SCHEMA).unwrap();
        instance.init().unwrap();
        let out = instance
            .process(TelemetryKind::Logs, "nginx", b"hello\n", None)
            .unwrap();
        assert_eq!(out, Transform::Consumed);
        instance.exit().unwrap();
        assert!(logs_contain("Discarding 1 pending records for source 'nginx'"));
    }

    #[test]
    fn test_schema_path_rejects_traversal() {
        let dir = Path::new("/etc/schemas");
        assert_eq!(
            schema_path(dir, "nginx").unwrap(),
            PathBuf::from("/etc/schemas/nginx.avsc")
        );
        assert!(schema_path(dir, "../secret").is_err());
        assert!(schema_path(dir, "a/b").is_err());
        assert!(schema_path(dir, "").is_err());
    }

    #[test]
    fn test_default_watermarks_match_config_map() {
        let records = DESCRIPTOR
            .config_map
            .iter()
            .find(|entry| entry.name == "max_records_per_flush")
            .and_then(|entry| entry.default)
            .unwrap();
        assert_eq!(records.parse::<usize>().unwrap(), DEFAULT_MAX_RECORDS_PER_FLUSH);
        let bytes = DESCRIPTOR
            .config_map
            .iter()
            .find(|entry| entry.name == "max_bytes_per_flush")
            .and_then(|entry| entry.default)
            .unwrap();
        assert_eq!(
            crate::config_map::parse_size(bytes).unwrap(),
            DEFAULT_MAX_BYTES_PER_FLUSH
        );
    }
}
