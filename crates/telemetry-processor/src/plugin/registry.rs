// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use fnv::FnvBuildHasher;
use hashbrown::HashMap;
use tracing::debug;
use ustr::Ustr;

use crate::config::RuntimeConfig;
use crate::errors::Error;
use crate::plugin::{PluginDescriptor, PluginInstance};
use crate::plugins;

/// Known plugin descriptors, addressed by name.
///
/// Instance ids are allocated from the registry so that every instance it
/// creates gets a distinct `<plugin>.<id>` name.
#[derive(Debug, Default)]
pub struct Registry {
    descriptors: HashMap<Ustr, &'static PluginDescriptor, FnvBuildHasher>,
    next_instance_id: AtomicU32,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every plugin shipped with this crate.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for descriptor in plugins::BUILTINS {
            registry.descriptors.insert(Ustr::from(descriptor.name), *descriptor);
        }
        registry
    }

    pub fn register(&mut self, descriptor: &'static PluginDescriptor) -> Result<(), Error> {
        let key = Ustr::from(descriptor.name);
        if self.descriptors.contains_key(&key) {
            return Err(Error::invalid_argument(format!(
                "plugin '{}' is already registered",
                descriptor.name
            )));
        }
        debug!("Registered processor plugin {}", descriptor.name);
        self.descriptors.insert(key, descriptor);
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&'static PluginDescriptor> {
        self.descriptors.get(&Ustr::from(name)).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(|key| key.as_str())
    }

    /// Creates a fresh instance of the plugin named `name`.
    pub fn new_instance(
        &self,
        name: &str,
        runtime: Arc<RuntimeConfig>,
    ) -> Result<PluginInstance, Error> {
        let descriptor = self
            .lookup(name)
            .ok_or_else(|| Error::invalid_argument(format!("unknown processor plugin '{name}'")))?;
        let id = self.next_instance_id.fetch_add(1, Ordering::Relaxed);
        Ok(PluginInstance::new(descriptor, id, runtime))
    }
}
