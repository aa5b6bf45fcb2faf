// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Native processor plugin protocol.
//!
//! A plugin is described once by a static [`PluginDescriptor`]: its name, the
//! telemetry kinds it accepts, the properties it understands and an `init`
//! callback. The callback receives the instance identity together with the
//! bound configuration and returns the per-instance state as a boxed
//! [`NativeProcessor`]. From then on the engine dispatches every record batch
//! to that state through the trait method matching the batch's kind, and calls
//! [`NativeProcessor::exit`] exactly once when the owning unit is destroyed.
//!
//! ```text
//!   Registry ──lookup──> &'static PluginDescriptor
//!                              │ new_instance
//!                              v
//!                        PluginInstance ──init──> Box<dyn NativeProcessor>
//!                              │
//!                  process_logs / process_metrics / process_traces
//! ```

mod instance;
mod registry;

pub use instance::{InstanceIdentity, InstanceMetrics, InstanceState, PluginInstance};
pub use registry::Registry;

use crate::config::log_level::LogLevel;
use crate::config::RuntimeConfig;
use crate::config_map::{BoundConfig, ConfigMapEntry};
use crate::errors::Error;
use crate::event_type::EventTypes;

/// Outcome of a successful unit invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transform {
    /// The input continues to the next unit as is.
    Unchanged,
    /// The returned buffer replaces the input for the rest of the chain.
    Modified(Vec<u8>),
    /// The unit kept the input for later; nothing continues down the chain.
    Consumed,
}

/// The ingestion source that owns a processor.
pub trait Source: Send + Sync {
    fn name(&self) -> &str;
}

/// Arguments available to a plugin's `init` callback.
pub struct InitContext<'a> {
    pub instance: &'a InstanceIdentity,
    pub config: &'a BoundConfig,
    pub runtime: &'a RuntimeConfig,
}

/// Arguments passed with every record batch.
pub struct ProcessContext<'a> {
    pub instance: &'a InstanceIdentity,
    pub source: Option<&'a dyn Source>,
    pub runtime: &'a RuntimeConfig,
}

impl ProcessContext<'_> {
    /// Whether the instance's log level lets through messages at `level`.
    #[must_use]
    pub fn log_enabled(&self, level: LogLevel) -> bool {
        self.instance.log_level.enables(level)
    }
}

/// Per-instance plugin state.
///
/// Only the callbacks for kinds listed in the descriptor are ever invoked;
/// the others default to leaving the data untouched.
pub trait NativeProcessor: Send {
    fn process_logs(
        &mut self,
        _records: &[u8],
        _tag: &str,
        _ctx: &ProcessContext<'_>,
    ) -> Result<Transform, Error> {
        Ok(Transform::Unchanged)
    }

    fn process_metrics(
        &mut self,
        _snapshot: &[u8],
        _tag: &str,
        _ctx: &ProcessContext<'_>,
    ) -> Result<Transform, Error> {
        Ok(Transform::Unchanged)
    }

    fn process_traces(
        &mut self,
        _traces: &[u8],
        _tag: &str,
        _ctx: &ProcessContext<'_>,
    ) -> Result<Transform, Error> {
        Ok(Transform::Unchanged)
    }

    fn exit(&mut self, _runtime: &RuntimeConfig) -> Result<(), Error> {
        Ok(())
    }
}

pub type InitCallback = fn(&InitContext<'_>) -> Result<Box<dyn NativeProcessor>, Error>;

/// Immutable description of one kind of native processing unit.
pub struct PluginDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub event_types: EventTypes,
    pub config_map: &'static [ConfigMapEntry],
    pub init: InitCallback,
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("event_types", &self.event_types)
            .field("config_map", &self.config_map.len())
            .finish_non_exhaustive()
    }
}
