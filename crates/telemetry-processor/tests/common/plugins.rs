// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Small plugins used to observe chain behavior

use std::sync::Mutex;

use serde::Deserialize;
use telemetry_processor::config::RuntimeConfig;
use telemetry_processor::config_map::{ConfigMapEntry, ConfigMapType};
use telemetry_processor::plugin::{InitContext, ProcessContext};
use telemetry_processor::{Error, EventTypes, NativeProcessor, PluginDescriptor, Transform};

/// Lifecycle calls seen by the `lifecycle` plugin, as `init:<label>` or
/// `exit:<label>`.
pub static LIFECYCLE: Mutex<Vec<String>> = Mutex::new(Vec::new());

pub fn lifecycle_events(prefix: &str) -> Vec<String> {
    LIFECYCLE
        .lock()
        .unwrap()
        .iter()
        .filter(|event| event.split(':').nth(1).is_some_and(|l| l.starts_with(prefix)))
        .cloned()
        .collect()
}

/// Appends `count=<lines>` with the number of lines in the batch.
pub static COUNT: PluginDescriptor = PluginDescriptor {
    name: "count",
    description: "append the line count",
    event_types: EventTypes::LOGS,
    config_map: &[],
    init: count_init,
};

struct Count;

fn count_init(_ctx: &InitContext<'_>) -> Result<Box<dyn NativeProcessor>, Error> {
    Ok(Box::new(Count))
}

impl NativeProcessor for Count {
    fn process_logs(
        &mut self,
        records: &[u8],
        _tag: &str,
        _ctx: &ProcessContext<'_>,
    ) -> Result<Transform, Error> {
        let lines = records.split(|b| *b == b'\n').filter(|l| !l.is_empty()).count();
        let mut out = records.to_vec();
        out.extend_from_slice(format!("count={lines}\n").as_bytes());
        Ok(Transform::Modified(out))
    }
}

/// Records its lifecycle under `label`; fails `init` when `fail` is set and
/// fails `process` on batches containing `boom`.
pub static LIFECYCLE_PLUGIN: PluginDescriptor = PluginDescriptor {
    name: "lifecycle",
    description: "record init and exit calls",
    event_types: EventTypes::ALL,
    config_map: &[
        ConfigMapEntry::new(ConfigMapType::Str, "label", "name recorded in events").required(),
        ConfigMapEntry::new(ConfigMapType::Bool, "fail", "fail init").with_default("false"),
    ],
    init: lifecycle_init,
};

#[derive(Deserialize)]
struct LifecycleConfig {
    label: String,
    fail: bool,
}

struct Lifecycle {
    label: String,
}

fn lifecycle_init(ctx: &InitContext<'_>) -> Result<Box<dyn NativeProcessor>, Error> {
    let config: LifecycleConfig = ctx.config.deserialize()?;
    LIFECYCLE
        .lock()
        .unwrap()
        .push(format!("init:{}", config.label));
    if config.fail {
        return Err(Error::backend(format!("{} refused to start", config.label)));
    }
    Ok(Box::new(Lifecycle {
        label: config.label,
    }))
}

impl Lifecycle {
    fn check(&self, data: &[u8]) -> Result<Transform, Error> {
        if data.windows(4).any(|w| w == b"boom") {
            return Err(Error::backend(format!("{} hit a bad batch", self.label)));
        }
        Ok(Transform::Unchanged)
    }
}

impl NativeProcessor for Lifecycle {
    fn process_logs(
        &mut self,
        records: &[u8],
        _tag: &str,
        _ctx: &ProcessContext<'_>,
    ) -> Result<Transform, Error> {
        self.check(records)
    }

    fn process_metrics(
        &mut self,
        snapshot: &[u8],
        _tag: &str,
        _ctx: &ProcessContext<'_>,
    ) -> Result<Transform, Error> {
        self.check(snapshot)
    }

    fn process_traces(
        &mut self,
        traces: &[u8],
        _tag: &str,
        _ctx: &ProcessContext<'_>,
    ) -> Result<Transform, Error> {
        self.check(traces)
    }

    fn exit(&mut self, _runtime: &RuntimeConfig) -> Result<(), Error> {
        LIFECYCLE
            .lock()
            .unwrap()
            .push(format!("exit:{}", self.label));
        Ok(())
    }
}

/// Replaces every batch with the number of batches seen so far, across all
/// kinds.
pub static TALLY: PluginDescriptor = PluginDescriptor {
    name: "tally",
    description: "count invocations across kinds",
    event_types: EventTypes::ALL,
    config_map: &[],
    init: tally_init,
};

struct Tally {
    seen: u64,
}

fn tally_init(_ctx: &InitContext<'_>) -> Result<Box<dyn NativeProcessor>, Error> {
    Ok(Box::new(Tally { seen: 0 }))
}

impl Tally {
    fn bump(&mut self) -> Result<Transform, Error> {
        self.seen += 1;
        Ok(Transform::Modified(self.seen.to_string().into_bytes()))
    }
}

impl NativeProcessor for Tally {
    fn process_logs(
        &mut self,
        _records: &[u8],
        _tag: &str,
        _ctx: &ProcessContext<'_>,
    ) -> Result<Transform, Error> {
        self.bump()
    }

    fn process_metrics(
        &mut self,
        _snapshot: &[u8],
        _tag: &str,
        _ctx: &ProcessContext<'_>,
    ) -> Result<Transform, Error> {
        self.bump()
    }

    fn process_traces(
        &mut self,
        _traces: &[u8],
        _tag: &str,
        _ctx: &ProcessContext<'_>,
    ) -> Result<Transform, Error> {
        self.bump()
    }
}
