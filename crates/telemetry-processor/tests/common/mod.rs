// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities and plugins for integration tests

#![allow(dead_code)]

pub mod plugins;

use std::sync::{Arc, Weak};

use telemetry_processor::plugin::Source;
use telemetry_processor::{EventTypes, Processor, Registry, RuntimeConfig, UnitId};

pub struct TestSource {
    pub name: String,
}

impl Source for TestSource {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Built-in plugins plus the test plugins.
pub fn registry() -> Registry {
    let mut registry = Registry::with_builtins();
    for descriptor in [&plugins::COUNT, &plugins::LIFECYCLE_PLUGIN, &plugins::TALLY] {
        registry
            .register(descriptor)
            .expect("test plugin registered twice");
    }
    registry
}

pub fn runtime() -> Arc<RuntimeConfig> {
    Arc::new(RuntimeConfig {
        hostname: "test-host".to_string(),
        ..Default::default()
    })
}

pub fn processor(name: &str) -> Processor {
    Processor::create(runtime(), name, None)
}

pub fn processor_with_source(name: &str, source: &Arc<TestSource>) -> Processor {
    let source: Arc<dyn Source> = source.clone();
    let weak: Weak<dyn Source> = Arc::downgrade(&source);
    Processor::create(runtime(), name, Some(weak))
}

/// Adds a unit and applies `properties` to it.
pub fn add_unit(
    processor: &mut Processor,
    registry: &Registry,
    event_types: EventTypes,
    plugin: &str,
    properties: &[(&str, &str)],
) -> UnitId {
    let id = processor
        .create_unit(registry, event_types, plugin)
        .expect("failed to create unit");
    for (key, value) in properties {
        processor
            .unit_set_property(id, key, value)
            .expect("failed to set property");
    }
    id
}

pub fn lines(data: &[u8]) -> Vec<String> {
    std::str::from_utf8(data)
        .expect("output is not UTF-8")
        .lines()
        .map(str::to_string)
        .collect()
}
