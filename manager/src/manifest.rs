//! Structured cluster manifests parsed from rendered template text.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ManagerError, ManagerResult};

/// A ready-to-submit cluster object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(Value);

impl Manifest {
    /// Parse one rendered YAML document.
    pub fn parse(text: &str) -> ManagerResult<Self> {
        if text.trim().is_empty() {
            return Err(ManagerError::Manifest("rendered section is empty".to_string()));
        }

        let yaml: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| ManagerError::Manifest(e.to_string()))?;
        let value =
            serde_json::to_value(yaml).map_err(|e| ManagerError::Manifest(e.to_string()))?;

        Self::from_value(value)
    }

    /// Parse every rendered section, failing on the first bad one.
    pub fn parse_all<S: AsRef<str>>(texts: &[S]) -> ManagerResult<Vec<Self>> {
        texts.iter().map(|text| Self::parse(text.as_ref())).collect()
    }

    pub fn from_value(value: Value) -> ManagerResult<Self> {
        if !value.is_object() {
            return Err(ManagerError::Manifest(
                "manifest is not a mapping".to_string(),
            ));
        }

        let manifest = Manifest(value);
        if manifest.kind().is_empty() {
            return Err(ManagerError::Manifest("manifest has no kind".to_string()));
        }
        if manifest.name().is_empty() {
            return Err(ManagerError::Manifest(format!(
                "{} manifest has no metadata.name",
                manifest.kind()
            )));
        }

        Ok(manifest)
    }

    pub fn kind(&self) -> &str {
        self.0.get("kind").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn api_version(&self) -> &str {
        self.0
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.metadata_str("name")
    }

    pub fn namespace(&self) -> &str {
        self.metadata_str("namespace")
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        self.0
            .pointer("/metadata/labels")
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up a nested field by JSON pointer, e.g. `/spec/dataSource/kind`.
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.0.pointer(pointer)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn metadata_str(&self, field: &str) -> &str {
        self.0
            .get("metadata")
            .and_then(|m| m.get(field))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accessors() {
        let text = r#"
apiVersion: v1
kind: Service
metadata:
  name: zcashd-svc-z1
  namespace: p1
  labels:
    zbi.io/instance: z1
spec:
  ports:
    - port: 8232
"#;
        let manifest = Manifest::parse(text).unwrap();
        assert_eq!(manifest.kind(), "Service");
        assert_eq!(manifest.api_version(), "v1");
        assert_eq!(manifest.name(), "zcashd-svc-z1");
        assert_eq!(manifest.namespace(), "p1");
        assert_eq!(manifest.labels().get("zbi.io/instance").unwrap(), "z1");
        assert_eq!(
            manifest.pointer("/spec/ports/0/port").and_then(Value::as_u64),
            Some(8232)
        );
    }

    #[test]
    fn test_parse_rejects_blank_and_scalars() {
        assert!(matches!(
            Manifest::parse("  \n "),
            Err(ManagerError::Manifest(_))
        ));
        assert!(matches!(
            Manifest::parse("just a string"),
            Err(ManagerError::Manifest(_))
        ));
    }

    #[test]
    fn test_parse_requires_kind_and_name() {
        let no_name = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  namespace: p1\n";
        assert!(matches!(
            Manifest::parse(no_name),
            Err(ManagerError::Manifest(msg)) if msg.contains("ConfigMap")
        ));

        let no_kind = "apiVersion: v1\nmetadata:\n  name: x\n";
        assert!(Manifest::parse(no_kind).is_err());
    }

    #[test]
    fn test_parse_all_is_all_or_nothing() {
        let good = "kind: Secret\nmetadata:\n  name: s\n";
        let bad = "kind: Secret\n";
        assert_eq!(Manifest::parse_all(&[good, good]).unwrap().len(), 2);
        assert!(Manifest::parse_all(&[good, bad]).is_err());
    }
}
