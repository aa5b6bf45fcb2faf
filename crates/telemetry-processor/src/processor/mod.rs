// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Processor: three ordered unit chains, one per telemetry kind.
//!
//! The processor owns its units. A unit declared for several kinds is stored
//! once and linked into each matching chain, so every chain drives the same
//! plugin state. [`Processor::run`] threads a batch through the chain for its
//! kind; an empty chain hands the input back without copying it.

mod unit;

pub use unit::{FilterDelegate, ProcessorUnit, UnitKind};

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use fnv::FnvBuildHasher;
use hashbrown::{HashMap, HashSet};
use tracing::{debug, error, warn};

use crate::config::processors::ProcessorsConfig;
use crate::config::RuntimeConfig;
use crate::errors::Error;
use crate::event_type::{EventTypes, TelemetryKind};
use crate::plugin::{Registry, Source, Transform};
use unit::UnitContext;

static NEXT_PROCESSOR_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("processor-{_0}")]
pub struct ProcessorId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("unit-{_0}")]
pub struct UnitId(u64);

pub struct Processor {
    id: ProcessorId,
    name: String,
    active: bool,
    source: Option<Weak<dyn Source>>,
    runtime: Arc<RuntimeConfig>,
    units: HashMap<UnitId, ProcessorUnit, FnvBuildHasher>,
    chains: [Vec<UnitId>; 3],
    next_unit_id: u64,
}

impl Processor {
    /// Creates an inactive processor with empty chains.
    ///
    /// `source` is the ingestion source the processor is attached to; it is
    /// handed to native plugins on every invocation while it is alive.
    #[must_use]
    pub fn create(
        runtime: Arc<RuntimeConfig>,
        name: impl Into<String>,
        source: Option<Weak<dyn Source>>,
    ) -> Self {
        let processor = Self {
            id: ProcessorId(NEXT_PROCESSOR_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            active: false,
            source,
            runtime,
            units: HashMap::default(),
            chains: [Vec::new(), Vec::new(), Vec::new()],
            next_unit_id: 1,
        };
        debug!("Created processor {} ({})", processor.name, processor.id);
        processor
    }

    #[must_use]
    pub fn id(&self) -> ProcessorId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn source(&self) -> Option<Arc<dyn Source>> {
        self.source.as_ref().and_then(Weak::upgrade)
    }

    #[must_use]
    pub fn runtime(&self) -> &Arc<RuntimeConfig> {
        &self.runtime
    }

    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&ProcessorUnit> {
        self.units.get(&id)
    }

    /// Units of the chain for `kind`, in execution order.
    pub fn chain(&self, kind: TelemetryKind) -> impl Iterator<Item = &ProcessorUnit> {
        self.chains[kind.index()]
            .iter()
            .filter_map(|id| self.units.get(id))
    }

    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Creates a native unit backed by a new instance of the plugin
    /// `unit_name` and appends it to every chain in `event_types`.
    pub fn create_unit(
        &mut self,
        registry: &Registry,
        event_types: EventTypes,
        unit_name: &str,
    ) -> Result<UnitId, Error> {
        self.check_unit_types(event_types, unit_name)?;
        let descriptor = registry.lookup(unit_name).ok_or_else(|| {
            Error::invalid_argument(format!("unknown processor plugin '{unit_name}'"))
        })?;
        if !event_types.is_subset_of(descriptor.event_types) {
            return Err(Error::invalid_argument(format!(
                "plugin '{unit_name}' supports {}, requested {event_types}",
                descriptor.event_types
            )));
        }

        let instance = registry.new_instance(unit_name, self.runtime.clone())?;
        Ok(self.attach(unit_name, event_types, UnitContext::Native(instance)))
    }

    /// Creates a unit forwarding to an externally owned filter.
    pub fn create_filter_unit(
        &mut self,
        event_types: EventTypes,
        unit_name: &str,
        delegate: &Arc<dyn FilterDelegate>,
    ) -> Result<UnitId, Error> {
        self.check_unit_types(event_types, unit_name)?;
        Ok(self.attach(
            unit_name,
            event_types,
            UnitContext::Filter(Arc::downgrade(delegate)),
        ))
    }

    fn check_unit_types(&self, event_types: EventTypes, unit_name: &str) -> Result<(), Error> {
        if self.active {
            return Err(Error::invalid_state(format!(
                "cannot add unit '{unit_name}' to initialized processor {}",
                self.name
            )));
        }
        if event_types.is_empty() {
            return Err(Error::invalid_argument(format!(
                "unit '{unit_name}' must act on at least one telemetry kind"
            )));
        }
        Ok(())
    }

    fn attach(&mut self, name: &str, event_types: EventTypes, context: UnitContext) -> UnitId {
        let id = UnitId(self.next_unit_id);
        self.next_unit_id += 1;

        for kind in event_types.iter() {
            self.chains[kind.index()].push(id);
        }
        self.units.insert(
            id,
            ProcessorUnit::new(id, name.to_string(), event_types, self.id, context),
        );
        debug!(
            "Attached unit {} ({}) to processor {} for {}",
            name, id, self.name, event_types
        );
        id
    }

    pub fn unit_set_property(&mut self, id: UnitId, key: &str, value: &str) -> Result<(), Error> {
        self.units
            .get_mut(&id)
            .ok_or_else(|| Error::invalid_argument(format!("unknown unit {id}")))?
            .set_property(key, value)
    }

    /// Unlinks a unit from every chain and releases it, running the plugin's
    /// `exit` if it was initialized.
    pub fn destroy_unit(&mut self, id: UnitId) -> Result<(), Error> {
        let mut unit = self
            .units
            .remove(&id)
            .ok_or_else(|| Error::invalid_argument(format!("unknown unit {id}")))?;
        for chain in &mut self.chains {
            chain.retain(|linked| *linked != id);
        }
        debug!("Destroying unit {} ({})", unit.name(), id);
        unit.exit()
    }

    /// Builds units from a processors configuration group, chain by chain.
    pub fn load_units(
        &mut self,
        registry: &Registry,
        config: &ProcessorsConfig,
    ) -> Result<Vec<UnitId>, Error> {
        let mut created = Vec::new();
        for (kind, unit) in config.units() {
            let id = self.create_unit(registry, kind.into(), &unit.name)?;
            created.push(id);
            let config_map = registry
                .lookup(&unit.name)
                .map_or(&[][..], |descriptor| descriptor.config_map);
            for (key, value) in unit.properties(config_map) {
                self.unit_set_property(id, &key, &value)?;
            }
        }
        Ok(created)
    }

    /// Initializes every unit once, walking the logs, metrics and traces
    /// chains in order. Stops at the first failure; units already
    /// initialized stay that way until [`Processor::destroy`].
    pub fn init(&mut self) -> Result<(), Error> {
        if self.active {
            return Err(Error::invalid_state(format!(
                "processor {} is already initialized",
                self.name
            )));
        }

        let mut initialized: HashSet<UnitId, FnvBuildHasher> = HashSet::default();
        for kind in TelemetryKind::ALL {
            for id in &self.chains[kind.index()] {
                if !initialized.insert(*id) {
                    continue;
                }
                let Some(unit) = self.units.get_mut(id) else {
                    continue;
                };
                if let Err(e) = unit.init() {
                    error!(
                        "Processor {}: unit {} failed to initialize: {}",
                        self.name,
                        unit.name(),
                        e
                    );
                    return Err(e);
                }
            }
        }

        self.active = true;
        debug!(
            "Initialized processor {} with {} units",
            self.name,
            self.units.len()
        );
        Ok(())
    }

    /// Runs `data` through the chain for `kind`.
    ///
    /// Returns the input itself when no unit replaced it, and an empty buffer
    /// when a unit kept the batch for later. On error the chain stops and no
    /// data is returned.
    pub fn run<'a>(
        &mut self,
        kind: TelemetryKind,
        tag: &str,
        data: &'a [u8],
    ) -> Result<Cow<'a, [u8]>, Error> {
        if !self.active {
            return Err(Error::invalid_state(format!(
                "processor {} is not initialized",
                self.name
            )));
        }

        let chain = &self.chains[kind.index()];
        if chain.is_empty() {
            return Ok(Cow::Borrowed(data));
        }

        let source = self.source.as_ref().and_then(Weak::upgrade);
        let mut current: Cow<'a, [u8]> = Cow::Borrowed(data);
        for id in chain {
            let Some(unit) = self.units.get_mut(id) else {
                continue;
            };
            match unit.invoke(kind, tag, &current, source.as_deref(), &self.runtime) {
                Ok(Transform::Unchanged) => {}
                Ok(Transform::Modified(buffer)) => current = Cow::Owned(buffer),
                Ok(Transform::Consumed) => return Ok(Cow::Owned(Vec::new())),
                Err(e) => {
                    debug!(
                        "Processor {}: unit {} failed on {} batch '{}': {}",
                        self.name,
                        unit.name(),
                        kind,
                        tag,
                        e
                    );
                    return Err(e);
                }
            }
        }
        Ok(current)
    }

    /// Tears down every unit and the processor itself.
    ///
    /// All units are released even when some fail to exit; the failures are
    /// reported together.
    pub fn destroy(mut self) -> Result<(), Error> {
        let failures = self.teardown();
        if failures.is_empty() {
            return Ok(());
        }
        Err(Error::backend(format!(
            "processor {}: {} unit(s) failed to exit: {}",
            self.name,
            failures.len(),
            failures.join("; ")
        )))
    }

    fn teardown(&mut self) -> Vec<String> {
        let mut order: Vec<UnitId> = Vec::with_capacity(self.units.len());
        for chain in &self.chains {
            for id in chain {
                if !order.contains(id) {
                    order.push(*id);
                }
            }
        }
        for chain in &mut self.chains {
            chain.clear();
        }

        let mut failures = Vec::new();
        for id in order {
            let Some(mut unit) = self.units.remove(&id) else {
                continue;
            };
            if let Err(e) = unit.exit() {
                warn!(
                    "Processor {}: unit {} failed to exit: {}",
                    self.name,
                    unit.name(),
                    e
                );
                failures.push(format!("{}: {}", unit.name(), e));
            }
        }
        self.active = false;
        self.units.clear();
        failures
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        if !self.units.is_empty() {
            self.teardown();
        }
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.active)
            .field("units", &self.units.len())
            .finish_non_exhaustive()
    }
}
