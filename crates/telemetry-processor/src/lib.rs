// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Telemetry Processor
//!
//! Processing core for a telemetry pipeline. An ingestion source owns a
//! [`Processor`], attaches units to the logs, metrics or traces chain and
//! runs every incoming batch through the chain for its kind before handing
//! the result to the outputs.
//!
//! - [`processor`]: chains of units, lifecycle and dispatch
//! - [`plugin`]: descriptors, instances and the [`Registry`]
//! - [`plugins`]: built-in `mask` and `row_batch` plugins
//! - [`config`], [`config_map`]: runtime settings and property binding
//! - [`logger`]: log formatting
//!
//! ```rust,ignore
//! let registry = Registry::with_builtins();
//! let mut processor = Processor::create(Arc::new(RuntimeConfig::from_env()?), "tail.0", None);
//! let unit = processor.create_unit(&registry, EventTypes::LOGS, "row_batch")?;
//! processor.unit_set_property(unit, "schema_dir", "/etc/schemas")?;
//! processor.init()?;
//!
//! let out = processor.run(TelemetryKind::Logs, "nginx", rows)?;
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod config_map;
pub mod errors;
pub mod event_type;
pub mod logger;
pub mod plugin;
pub mod plugins;
pub mod processor;

pub use config::RuntimeConfig;
pub use errors::Error;
pub use event_type::{EventTypes, TelemetryKind};
pub use plugin::{NativeProcessor, PluginDescriptor, PluginInstance, Registry, Transform};
pub use processor::{FilterDelegate, Processor, ProcessorUnit, UnitId};
