// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::log_level::LogLevel;
use crate::config::RuntimeConfig;
use crate::config_map;
use crate::errors::Error;
use crate::event_type::TelemetryKind;
use crate::plugin::{
    InitContext, NativeProcessor, PluginDescriptor, ProcessContext, Source, Transform,
};

const ALIAS_PROPERTY: &str = "alias";
const LOG_LEVEL_PROPERTY: &str = "log_level";

/// Identity of a plugin instance, visible to the plugin's callbacks.
#[derive(Debug, Clone)]
pub struct InstanceIdentity {
    pub id: u32,
    /// Generated `<plugin>.<id>` name
    pub name: String,
    pub alias: Option<String>,
    pub log_level: LogLevel,
    pub descriptor: &'static PluginDescriptor,
}

impl InstanceIdentity {
    /// The alias when one was configured, otherwise the generated name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Counters kept for every instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstanceMetrics {
    pub invocations: u64,
    pub modified: u64,
    pub errors: u64,
    pub bytes_out: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    Created,
    Initialized,
    /// `init` ran and failed; `exit` is skipped for this instance.
    Failed,
    Exited,
}

/// A configured, stateful instantiation of a [`PluginDescriptor`].
pub struct PluginInstance {
    identity: InstanceIdentity,
    properties: Vec<(String, String)>,
    context: Option<Box<dyn NativeProcessor>>,
    metrics: InstanceMetrics,
    state: InstanceState,
    runtime: Arc<RuntimeConfig>,
}

impl PluginInstance {
    #[must_use]
    pub fn new(
        descriptor: &'static PluginDescriptor,
        id: u32,
        runtime: Arc<RuntimeConfig>,
    ) -> Self {
        Self {
            identity: InstanceIdentity {
                id,
                name: format!("{}.{}", descriptor.name, id),
                alias: None,
                log_level: runtime.log_level,
                descriptor,
            },
            properties: Vec::new(),
            context: None,
            metrics: InstanceMetrics::default(),
            state: InstanceState::Created,
            runtime,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.identity.display_name()
    }

    #[must_use]
    pub fn descriptor(&self) -> &'static PluginDescriptor {
        self.identity.descriptor
    }

    #[must_use]
    pub fn state(&self) -> InstanceState {
        self.state
    }

    #[must_use]
    pub fn metrics(&self) -> InstanceMetrics {
        self.metrics
    }

    #[must_use]
    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    /// Records a property. `alias` and `log_level` configure the instance
    /// itself; everything else is kept for binding at init time.
    pub fn set_property(&mut self, key: &str, value: &str) -> Result<(), Error> {
        if self.state == InstanceState::Exited {
            return Err(Error::invalid_state(format!(
                "cannot set property '{key}' on exited instance {}",
                self.identity.name
            )));
        }

        if key.eq_ignore_ascii_case(ALIAS_PROPERTY) {
            self.identity.alias = Some(value.to_string());
        } else if key.eq_ignore_ascii_case(LOG_LEVEL_PROPERTY) {
            self.identity.log_level = LogLevel::from_str(value).map_err(Error::InvalidArgument)?;
        } else {
            self.properties.push((key.to_string(), value.to_string()));
        }
        Ok(())
    }

    /// Last value written for `key`, matched case-insensitively.
    #[must_use]
    pub fn get_property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Validates and binds the properties, then hands them to the plugin's
    /// `init` callback, which builds the instance state.
    pub fn init(&mut self) -> Result<(), Error> {
        if self.state != InstanceState::Created {
            return Err(Error::invalid_state(format!(
                "instance {} cannot be initialized from state {:?}",
                self.identity.name, self.state
            )));
        }

        match self.bind_and_init() {
            Ok(context) => {
                self.context = Some(context);
                self.state = InstanceState::Initialized;
                debug!("Initialized processor instance {}", self.display_name());
                Ok(())
            }
            Err(e) => {
                self.state = InstanceState::Failed;
                error!(
                    "Failed to initialize processor instance {}: {}",
                    self.display_name(),
                    e
                );
                Err(e)
            }
        }
    }

    fn bind_and_init(&self) -> Result<Box<dyn NativeProcessor>, Error> {
        let descriptor = self.identity.descriptor;
        let missing = config_map::first_missing_required(&self.properties, descriptor.config_map);
        if let Some(missing) = missing {
            return Err(Error::invalid_argument(format!(
                "{}: missing required property '{missing}'",
                self.identity.name
            )));
        }
        let bound = config_map::bind(&self.properties, descriptor.config_map)?;
        (descriptor.init)(&InitContext {
            instance: &self.identity,
            config: &bound,
            runtime: &self.runtime,
        })
    }

    /// Runs the plugin's `exit` callback if `init` succeeded and releases the
    /// instance state and properties. Valid once.
    pub fn exit(&mut self) -> Result<(), Error> {
        if self.state == InstanceState::Exited {
            return Err(Error::invalid_state(format!(
                "instance {} already exited",
                self.identity.name
            )));
        }

        let result = match self.context.take() {
            Some(mut context) => context.exit(&self.runtime),
            None => Ok(()),
        };
        self.properties.clear();
        self.state = InstanceState::Exited;
        debug!("Exited processor instance {}", self.display_name());
        result
    }

    /// Dispatches one batch to the callback matching `kind`.
    pub fn process(
        &mut self,
        kind: TelemetryKind,
        tag: &str,
        data: &[u8],
        source: Option<&dyn Source>,
    ) -> Result<Transform, Error> {
        if !self.identity.descriptor.event_types.contains(kind) {
            return Err(Error::invalid_argument(format!(
                "{} does not accept {kind}",
                self.identity.name
            )));
        }
        let Some(context) = self.context.as_mut() else {
            return Err(Error::invalid_state(format!(
                "instance {} is not initialized",
                self.identity.name
            )));
        };

        let ctx = ProcessContext {
            instance: &self.identity,
            source,
            runtime: &self.runtime,
        };
        self.metrics.invocations += 1;
        let result = match kind {
            TelemetryKind::Logs => context.process_logs(data, tag, &ctx),
            TelemetryKind::Metrics => context.process_metrics(data, tag, &ctx),
            TelemetryKind::Traces => context.process_traces(data, tag, &ctx),
        };

        match &result {
            Ok(Transform::Modified(out)) => {
                self.metrics.modified += 1;
                self.metrics.bytes_out += out.len() as u64;
            }
            Ok(Transform::Unchanged | Transform::Consumed) => {}
            Err(_) => self.metrics.errors += 1,
        }
        result
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        if self.state == InstanceState::Initialized {
            if let Err(e) = self.exit() {
                warn!("Processor instance exit failed during drop: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("identity", &self.identity)
            .field("properties", &self.properties)
            .field("state", &self.state)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}
