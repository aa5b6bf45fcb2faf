// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::Error;
use crate::plugins::row_batch::schema::RecordSchema;

#[derive(Serialize)]
struct OutputRecord<'a> {
    source: &'a str,
    metadata: &'a Map<String, Value>,
    record: &'a Map<String, Value>,
}

/// Accumulation state for one source.
#[derive(Debug)]
pub struct SourceState {
    pub schema: RecordSchema,
    pub metadata: Map<String, Value>,
    buffer: Vec<u8>,
    pending_records: usize,
    rows_seen: u64,
    /// Start of a row whose end has not arrived yet
    tail: String,
}

impl SourceState {
    #[must_use]
    pub fn new(schema: RecordSchema, metadata: Map<String, Value>) -> Self {
        Self {
            schema,
            metadata,
            buffer: Vec::new(),
            pending_records: 0,
            rows_seen: 0,
            tail: String::new(),
        }
    }

    #[must_use]
    pub fn pending_records(&self) -> usize {
        self.pending_records
    }

    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Rows accepted since the state was created, flushed or not.
    #[must_use]
    pub fn rows_seen(&self) -> u64 {
        self.rows_seen
    }

    #[must_use]
    pub fn tail(&self) -> &str {
        &self.tail
    }

    pub fn set_tail(&mut self, tail: &str) {
        self.tail.clear();
        self.tail.push_str(tail);
    }

    /// Drops the unfinished row, returning it.
    pub fn take_tail(&mut self) -> String {
        std::mem::take(&mut self.tail)
    }

    /// Serializes `records` as newline-delimited JSON and appends them.
    ///
    /// Nothing is appended unless every record serializes.
    pub fn append(&mut self, source: &str, records: &[Map<String, Value>]) -> Result<(), Error> {
        let mut encoded = Vec::new();
        for record in records {
            serde_json::to_writer(
                &mut encoded,
                &OutputRecord {
                    source,
                    metadata: &self.metadata,
                    record,
                },
            )
            .map_err(|e| Error::backend(format!("failed to encode record for '{source}': {e}")))?;
            encoded.push(b'\n');
        }

        self.buffer.extend_from_slice(&encoded);
        self.pending_records += records.len();
        self.rows_seen += records.len() as u64;
        Ok(())
    }

    /// Hands out the accumulated buffer and resets the pending counters. The
    /// unfinished row, if any, is kept.
    pub fn take(&mut self) -> Vec<u8> {
        self.pending_records = 0;
        std::mem::take(&mut self.buffer)
    }
}
