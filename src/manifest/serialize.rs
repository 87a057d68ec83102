//! Canonical serialization to the cluster's wire format
//!
//! The target format treats unquoted numeric and boolean scalars specially,
//! so config/secret payloads and container environment values are stringified
//! before emission. Secret payloads are base64-encoded here, one-way: the
//! rest of the pipeline only ever handles plain values.

use std::collections::BTreeMap;

use base64::Engine;
use serde_json::Value;

use super::Manifest;
use crate::Result;

/// Merge label maps; later sources override earlier ones
pub fn merge_labels(layers: &[&BTreeMap<String, String>]) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();
    for layer in layers {
        for (key, value) in layer.iter() {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Serialize a batch of manifests into one multi-document text blob.
///
/// Every document is validated first; an illegal name fails the whole batch
/// before anything is emitted. Documents are separated by the standard
/// document-boundary marker so the blob can be piped to `apply -f -` in a
/// single invocation.
pub fn serialize_manifests(manifests: &[Manifest]) -> Result<String> {
    let mut documents = Vec::with_capacity(manifests.len());
    for manifest in manifests {
        manifest.validate()?;
        let mut doc = manifest.to_value()?;
        canonicalize(&mut doc);
        documents.push(
            serde_yaml::to_string(&doc).map_err(|e| crate::Error::serialization(e.to_string()))?,
        );
    }
    Ok(documents.join("---\n"))
}

/// The stringify/encode pre-pass applied to every document before emission
pub(crate) fn canonicalize(doc: &mut Value) {
    if let Some(data) = doc.get_mut("data").and_then(Value::as_object_mut) {
        stringify_values(data);
    }
    if let Some(Value::Object(mut plain)) = doc.as_object_mut().and_then(|m| m.remove("stringData"))
    {
        stringify_values(&mut plain);
        let encoded: serde_json::Map<String, Value> = plain
            .into_iter()
            .map(|(key, value)| {
                let raw = value.as_str().unwrap_or_default();
                let b64 = base64::engine::general_purpose::STANDARD.encode(raw);
                (key, Value::String(b64))
            })
            .collect();
        doc["data"] = Value::Object(encoded);
    }
    if let Some(containers) = doc
        .pointer_mut("/spec/template/spec/containers")
        .and_then(Value::as_array_mut)
    {
        for container in containers {
            if let Some(env) = container.get_mut("env").and_then(Value::as_array_mut) {
                for var in env {
                    if let Some(value) = var.get_mut("value") {
                        stringify(value);
                    }
                }
            }
        }
    }
}

fn stringify_values(map: &mut serde_json::Map<String, Value>) {
    for value in map.values_mut() {
        stringify(value);
    }
}

fn stringify(value: &mut Value) {
    match value {
        Value::Number(n) => *value = Value::String(n.to_string()),
        Value::Bool(b) => *value = Value::String(b.to_string()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::{ConfigMap, ObjectMeta, Secret};
    use serde_json::json;

    #[test]
    fn later_label_layers_win() {
        let mut base = BTreeMap::new();
        base.insert("app".to_string(), "old".to_string());
        base.insert("team".to_string(), "infra".to_string());
        let mut overlay = BTreeMap::new();
        overlay.insert("app".to_string(), "new".to_string());

        let merged = merge_labels(&[&base, &overlay]);
        assert_eq!(merged["app"], "new");
        assert_eq!(merged["team"], "infra");
    }

    #[test]
    fn secret_payload_is_encoded_once() {
        let mut data = BTreeMap::new();
        data.insert("PASSWORD".to_string(), "hunter2".to_string());
        let secret = Secret::opaque(ObjectMeta::new("db-secrets", "core"), data);

        let blob = serialize_manifests(&[Manifest::Secret(secret)]).unwrap();
        assert!(blob.contains("data:"));
        assert!(!blob.contains("stringData"));
        assert!(blob.contains("aHVudGVyMg=="));
        assert!(!blob.contains("hunter2"));
    }

    #[test]
    fn scalar_values_are_stringified() {
        let mut doc = json!({
            "kind": "ConfigMap",
            "data": {"PORT": 8080, "DEBUG": true, "NAME": "api"},
        });
        canonicalize(&mut doc);
        assert_eq!(doc["data"]["PORT"], "8080");
        assert_eq!(doc["data"]["DEBUG"], "true");
        assert_eq!(doc["data"]["NAME"], "api");
    }

    #[test]
    fn container_env_values_are_stringified() {
        let mut doc = json!({
            "spec": {"template": {"spec": {"containers": [
                {"env": [{"name": "PORT", "value": 9090}]}
            ]}}}
        });
        canonicalize(&mut doc);
        assert_eq!(
            doc["spec"]["template"]["spec"]["containers"][0]["env"][0]["value"],
            "9090"
        );
    }

    #[test]
    fn documents_join_with_boundary_marker() {
        let one = ConfigMap::new(ObjectMeta::new("one", "application"), BTreeMap::new());
        let two = ConfigMap::new(ObjectMeta::new("two", "application"), BTreeMap::new());
        let blob =
            serialize_manifests(&[Manifest::ConfigMap(one), Manifest::ConfigMap(two)]).unwrap();
        assert_eq!(blob.matches("---\n").count(), 1);
        assert!(blob.contains("name: one"));
        assert!(blob.contains("name: two"));
    }

    #[test]
    fn illegal_name_fails_before_emission() {
        let bad = ConfigMap::new(ObjectMeta::new("UPPER", "application"), BTreeMap::new());
        assert!(serialize_manifests(&[Manifest::ConfigMap(bad)]).is_err());
    }
}
