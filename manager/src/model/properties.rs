//! Typed per-instance-type property sets.
//!
//! The repository stores instance properties as a free-form JSON object.
//! The core never works with that object directly: it is resolved into an
//! [`InstanceProperties`] variant when an [`Instance`](super::Instance) is
//! deserialized, and written back under the same keys when serialized.
//!
//! Schema (version 1):
//!
//! | type  | key             | value                                   |
//! |-------|-----------------|-----------------------------------------|
//! | zcash | `peers`         | list of zcash peer names                |
//! | zcash | `lwdInstance`   | list of lightwalletd gateways bound here |
//! | zcash | `miner`         | bool                                    |
//! | lwd   | `zcashInstance` | the upstream zcash node (at most one)   |
//! | both  | `logLevel`      | passed through to the node config       |
//! | both  | `schemaVersion` | defaults to 1                           |
//!
//! Keys outside the schema are carried through unchanged.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::InstanceType;
use crate::error::{ManagerError, ManagerResult};

pub const PROPERTIES_SCHEMA_VERSION: u32 = 1;

fn current_schema_version() -> u32 {
    PROPERTIES_SCHEMA_VERSION
}

/// Ordered list of instance names without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PeerSet(Vec<String>);

impl PeerSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for name in names {
            set.insert(name.into());
        }
        set
    }

    /// Add a name. Returns false if it was already present.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.0.push(name);
        true
    }

    /// Remove a name. Returns false if it was not present.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.0.iter().position(|n| n == name) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PeerSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Older records hold a single name instead of a list.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Option::<Repr>::deserialize(deserializer)? {
            Some(Repr::One(name)) if !name.is_empty() => PeerSet::from_names([name]),
            Some(Repr::Many(names)) => PeerSet::from_names(names),
            _ => PeerSet::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ZcashProperties {
    #[serde(default = "current_schema_version")]
    pub schema_version: u32,
    pub peers: PeerSet,
    pub lwd_instance: PeerSet,
    pub miner: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ZcashProperties {
    fn default() -> Self {
        Self {
            schema_version: PROPERTIES_SCHEMA_VERSION,
            peers: PeerSet::new(),
            lwd_instance: PeerSet::new(),
            miner: false,
            log_level: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LwdProperties {
    #[serde(default = "current_schema_version")]
    pub schema_version: u32,
    pub zcash_instance: PeerSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for LwdProperties {
    fn default() -> Self {
        Self {
            schema_version: PROPERTIES_SCHEMA_VERSION,
            zcash_instance: PeerSet::new(),
            log_level: None,
            extra: Map::new(),
        }
    }
}

/// Property set of an instance, tagged by its instance type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceProperties {
    Zcash(ZcashProperties),
    Lwd(LwdProperties),
}

impl InstanceProperties {
    pub fn default_for(instance_type: InstanceType) -> Self {
        match instance_type {
            InstanceType::Zcash => InstanceProperties::Zcash(ZcashProperties::default()),
            InstanceType::Lwd => InstanceProperties::Lwd(LwdProperties::default()),
        }
    }

    /// Resolve the wire property map for the given instance type.
    pub fn resolve(instance_type: InstanceType, map: &Map<String, Value>) -> ManagerResult<Self> {
        let value = Value::Object(map.clone());
        let invalid =
            |e: serde_json::Error| ManagerError::InvalidProperties(format!("{}: {}", instance_type, e));

        let properties = match instance_type {
            InstanceType::Zcash => {
                InstanceProperties::Zcash(serde_json::from_value(value).map_err(invalid)?)
            }
            InstanceType::Lwd => {
                let lwd: LwdProperties = serde_json::from_value(value).map_err(invalid)?;
                if lwd.zcash_instance.len() > 1 {
                    return Err(ManagerError::InvalidProperties(format!(
                        "lwd: zcashInstance names {} upstreams, at most one is allowed",
                        lwd.zcash_instance.len()
                    )));
                }
                InstanceProperties::Lwd(lwd)
            }
        };

        let version = properties.schema_version();
        if version == 0 || version > PROPERTIES_SCHEMA_VERSION {
            return Err(ManagerError::InvalidProperties(format!(
                "unsupported properties schema version {} (max {})",
                version, PROPERTIES_SCHEMA_VERSION
            )));
        }

        Ok(properties)
    }

    /// Write the property set back into its wire map.
    pub fn to_map(&self) -> Map<String, Value> {
        let value = match self {
            InstanceProperties::Zcash(p) => serde_json::to_value(p),
            InstanceProperties::Lwd(p) => serde_json::to_value(p),
        };

        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn instance_type(&self) -> InstanceType {
        match self {
            InstanceProperties::Zcash(_) => InstanceType::Zcash,
            InstanceProperties::Lwd(_) => InstanceType::Lwd,
        }
    }

    pub fn schema_version(&self) -> u32 {
        match self {
            InstanceProperties::Zcash(p) => p.schema_version,
            InstanceProperties::Lwd(p) => p.schema_version,
        }
    }

    pub fn log_level(&self) -> Option<&str> {
        match self {
            InstanceProperties::Zcash(p) => p.log_level.as_deref(),
            InstanceProperties::Lwd(p) => p.log_level.as_deref(),
        }
    }

    pub fn as_zcash(&self) -> Option<&ZcashProperties> {
        match self {
            InstanceProperties::Zcash(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_zcash_mut(&mut self) -> Option<&mut ZcashProperties> {
        match self {
            InstanceProperties::Zcash(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_lwd(&self) -> Option<&LwdProperties> {
        match self {
            InstanceProperties::Lwd(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_lwd_mut(&mut self) -> Option<&mut LwdProperties> {
        match self {
            InstanceProperties::Lwd(p) => Some(p),
            _ => None,
        }
    }
}

impl Serialize for InstanceProperties {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            InstanceProperties::Zcash(p) => p.serialize(serializer),
            InstanceProperties::Lwd(p) => p.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_resolve_zcash_properties() {
        let map = as_map(json!({
            "peers": ["z2", "z3", "z2"],
            "lwdInstance": ["l1"],
            "miner": true,
            "logLevel": "debug"
        }));

        let props = InstanceProperties::resolve(InstanceType::Zcash, &map).unwrap();
        let zcash = props.as_zcash().unwrap();
        assert_eq!(zcash.peers.as_slice(), ["z2", "z3"]);
        assert_eq!(zcash.lwd_instance.as_slice(), ["l1"]);
        assert!(zcash.miner);
        assert_eq!(props.log_level(), Some("debug"));
        assert_eq!(props.schema_version(), PROPERTIES_SCHEMA_VERSION);
    }

    #[test]
    fn test_resolve_lwd_single_name() {
        let map = as_map(json!({ "zcashInstance": "z1" }));
        let props = InstanceProperties::resolve(InstanceType::Lwd, &map).unwrap();
        assert_eq!(props.as_lwd().unwrap().zcash_instance.first(), Some("z1"));
    }

    #[test]
    fn test_resolve_rejects_future_schema() {
        let map = as_map(json!({ "schemaVersion": 7 }));
        let err = InstanceProperties::resolve(InstanceType::Zcash, &map).unwrap_err();
        assert!(matches!(err, ManagerError::InvalidProperties(_)));
    }

    #[test]
    fn test_resolve_rejects_bad_shape() {
        let map = as_map(json!({ "miner": "sometimes" }));
        let err = InstanceProperties::resolve(InstanceType::Zcash, &map).unwrap_err();
        assert!(matches!(err, ManagerError::InvalidProperties(_)));
    }

    #[test]
    fn test_to_map_uses_wire_keys() {
        let mut props = InstanceProperties::default_for(InstanceType::Lwd);
        props.as_lwd_mut().unwrap().zcash_instance.insert("z1");

        let map = props.to_map();
        assert_eq!(map.get("zcashInstance"), Some(&json!(["z1"])));
        assert_eq!(map.get("schemaVersion"), Some(&json!(1)));
        assert!(map.get("logLevel").is_none());
    }

    #[test]
    fn test_unknown_keys_survive_resolve_and_write_back() {
        let map = as_map(json!({
            "peers": ["z2"],
            "rpcThreads": 8,
            "tags": { "team": "infra" }
        }));

        let props = InstanceProperties::resolve(InstanceType::Zcash, &map).unwrap();
        assert_eq!(props.as_zcash().unwrap().extra.len(), 2);

        let written = props.to_map();
        assert_eq!(written.get("rpcThreads"), Some(&json!(8)));
        assert_eq!(written.get("tags"), Some(&json!({ "team": "infra" })));
        assert_eq!(written.get("peers"), Some(&json!(["z2"])));
    }

    #[test]
    fn test_resolve_rejects_several_upstreams() {
        let map = as_map(json!({ "zcashInstance": ["z1", "z2"] }));
        let err = InstanceProperties::resolve(InstanceType::Lwd, &map).unwrap_err();
        assert!(matches!(err, ManagerError::InvalidProperties(_)));

        // Duplicates collapse to a single upstream
        let map = as_map(json!({ "zcashInstance": ["z1", "z1"] }));
        let props = InstanceProperties::resolve(InstanceType::Lwd, &map).unwrap();
        assert_eq!(props.as_lwd().unwrap().zcash_instance.as_slice(), ["z1"]);
    }
}
