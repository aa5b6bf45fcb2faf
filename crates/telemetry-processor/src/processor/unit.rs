// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Weak;

use crate::config::RuntimeConfig;
use crate::errors::Error;
use crate::event_type::{EventTypes, TelemetryKind};
use crate::plugin::{PluginInstance, Source, Transform};
use crate::processor::{ProcessorId, UnitId};

/// A filter owned outside the processor that a unit forwards batches to.
///
/// Units only keep a weak reference; once the owner drops the filter every
/// invocation of the unit fails.
pub trait FilterDelegate: Send + Sync {
    fn name(&self) -> &str;

    fn filter(
        &self,
        kind: TelemetryKind,
        tag: &str,
        data: &[u8],
        runtime: &RuntimeConfig,
    ) -> Result<Transform, Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum UnitKind {
    #[display("native")]
    Native,
    #[display("filter")]
    FilterDelegate,
}

pub(crate) enum UnitContext {
    Native(PluginInstance),
    Filter(Weak<dyn FilterDelegate>),
}

/// One stage of a processor chain.
pub struct ProcessorUnit {
    id: UnitId,
    name: String,
    event_types: EventTypes,
    parent: ProcessorId,
    context: UnitContext,
}

impl ProcessorUnit {
    pub(crate) fn new(
        id: UnitId,
        name: String,
        event_types: EventTypes,
        parent: ProcessorId,
        context: UnitContext,
    ) -> Self {
        Self {
            id,
            name,
            event_types,
            parent,
            context,
        }
    }

    #[must_use]
    pub fn id(&self) -> UnitId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn event_types(&self) -> EventTypes {
        self.event_types
    }

    /// The processor this unit was created by.
    #[must_use]
    pub fn parent(&self) -> ProcessorId {
        self.parent
    }

    #[must_use]
    pub fn kind(&self) -> UnitKind {
        match self.context {
            UnitContext::Native(_) => UnitKind::Native,
            UnitContext::Filter(_) => UnitKind::FilterDelegate,
        }
    }

    /// The owned plugin instance of a native unit.
    #[must_use]
    pub fn instance(&self) -> Option<&PluginInstance> {
        match &self.context {
            UnitContext::Native(instance) => Some(instance),
            UnitContext::Filter(_) => None,
        }
    }

    pub(crate) fn set_property(&mut self, key: &str, value: &str) -> Result<(), Error> {
        match &mut self.context {
            UnitContext::Native(instance) => instance.set_property(key, value),
            UnitContext::Filter(_) => Err(Error::invalid_state(format!(
                "unit '{}' delegates to a filter and takes no properties",
                self.name
            ))),
        }
    }

    pub(crate) fn init(&mut self) -> Result<(), Error> {
        match &mut self.context {
            UnitContext::Native(instance) => instance.init(),
            UnitContext::Filter(_) => Ok(()),
        }
    }

    pub(crate) fn exit(&mut self) -> Result<(), Error> {
        match &mut self.context {
            UnitContext::Native(instance) => instance.exit(),
            UnitContext::Filter(_) => Ok(()),
        }
    }

    pub(crate) fn invoke(
        &mut self,
        kind: TelemetryKind,
        tag: &str,
        data: &[u8],
        source: Option<&dyn Source>,
        runtime: &RuntimeConfig,
    ) -> Result<Transform, Error> {
        match &mut self.context {
            UnitContext::Native(instance) => instance.process(kind, tag, data, source),
            UnitContext::Filter(delegate) => match delegate.upgrade() {
                Some(delegate) => delegate.filter(kind, tag, data, runtime),
                None => Err(Error::backend(format!(
                    "filter behind unit '{}' is no longer available",
                    self.name
                ))),
            },
        }
    }
}

impl std::fmt::Debug for ProcessorUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorUnit")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("event_types", &self.event_types)
            .field("parent", &self.parent)
            .finish()
    }
}
