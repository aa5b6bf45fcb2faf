// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types surfaced by the processor engine and its plugins.

/// Errors reported by processors, units and plugin instances.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A plugin callback or filter delegate reported a failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// The operation is not valid in the current lifecycle phase.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed or missing configuration, unknown telemetry kind or unit.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

/// Failures while turning raw rows into structured records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("row data is not valid UTF-8")]
    InvalidUtf8,

    #[error("unterminated quoted field in row {row}")]
    UnterminatedQuote { row: usize },

    #[error("row {row} has {found} columns, schema expects {expected}")]
    ColumnCount {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row}, field '{field}': cannot convert '{value}' to {expected}")]
    FieldValue {
        row: usize,
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error("invalid record schema: {0}")]
    Schema(String),
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Backend(err.to_string())
    }
}
