// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::plugins::row_batch::schema::RecordSchema;

const HOST_KEY: &str = "host";

/// Static fields attached to every record of a source.
///
/// Starts with the host name, then the configured environment variables
/// (keys lowercased, unset variables skipped), then the schema's own
/// `metadata`, each layer overriding the previous one.
pub fn build(
    runtime: &RuntimeConfig,
    env_names: &[String],
    schema: &RecordSchema,
) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert(HOST_KEY.to_string(), Value::String(runtime.hostname.clone()));

    for name in env_names {
        match env::var(name) {
            Ok(value) => {
                metadata.insert(name.to_ascii_lowercase(), Value::String(value));
            }
            Err(_) => debug!("Metadata variable {} is not set, skipping", name),
        }
    }

    for (key, value) in &schema.metadata {
        metadata.insert(key.clone(), value.clone());
    }
    metadata
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_build_layers_metadata() {
        env::set_var("TP_TEST_PLATFORM", "k8s");
        env::remove_var("TP_TEST_UNSET");
        let schema = RecordSchema::parse(
            r#"{"type":"record","name":"r","fields":[{"name":"a","type":"string"}],
                "metadata":{"service":"billing","tp_test_platform":"override"}}"#,
        )
        .unwrap();
        let runtime = RuntimeConfig {
            hostname: "node-1".to_string(),
            ..Default::default()
        };

        let metadata = build(
            &runtime,
            &["TP_TEST_PLATFORM".to_string(), "TP_TEST_UNSET".to_string()],
            &schema,
        );
        assert_eq!(
            Value::Object(metadata),
            json!({"host": "node-1", "tp_test_platform": "override", "service": "billing"})
        );

        let schema = RecordSchema::parse(
            r#"{"type":"record","name":"r","fields":[{"name":"a","type":"string"}]}"#,
        )
        .unwrap();
        let metadata = build(&runtime, &["TP_TEST_PLATFORM".to_string()], &schema);
        assert_eq!(metadata.get("tp_test_platform"), Some(&json!("k8s")));
        env::remove_var("TP_TEST_PLATFORM");
    }
}
