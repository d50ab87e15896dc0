// src/node_id.rs - Node identifiers for the address space
//
// A NodeId is a (namespace, identifier) pair. Branch node ids are minted as
// random GUID identifiers; the distinguished null id marks the current
// branch of a condition.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier part of a [`NodeId`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Numeric identifier (`i=`)
    Numeric(u32),
    /// String identifier (`s=`)
    String(String),
    /// GUID identifier (`g=`)
    Guid(Uuid),
    /// Opaque byte identifier (`b=`, hex-encoded in text form)
    Opaque(Vec<u8>),
}

/// Address-space node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// Namespace index
    pub namespace: u16,
    /// Identifier within the namespace
    pub identifier: Identifier,
}

impl NodeId {
    /// Numeric node id
    pub fn numeric(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    /// String node id
    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    /// Fresh pseudo-random GUID node id.
    ///
    /// Used for branch ids; collision probability is negligible by
    /// construction and is not explicitly checked.
    pub fn new_guid(namespace: u16) -> Self {
        Self {
            namespace,
            identifier: Identifier::Guid(Uuid::new_v4()),
        }
    }

    /// The distinguished null identifier (`ns=0;i=0`), used as the branch
    /// id of a condition's current branch.
    pub fn null() -> Self {
        Self::numeric(0, 0)
    }

    /// True for the distinguished null identifier
    pub fn is_null(&self) -> bool {
        self.namespace == 0 && self.identifier == Identifier::Numeric(0)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        NodeId::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Identifier::Numeric(v) => write!(f, "ns={};i={}", self.namespace, v),
            Identifier::String(s) => write!(f, "ns={};s={}", self.namespace, s),
            Identifier::Guid(g) => write!(f, "ns={};g={}", self.namespace, g),
            Identifier::Opaque(b) => {
                write!(f, "ns={};b=", self.namespace)?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ns_part, id_part) = match s.split_once(';') {
            Some(parts) => parts,
            None => ("ns=0", s),
        };
        let namespace = ns_part
            .strip_prefix("ns=")
            .ok_or_else(|| format!("invalid node id '{}': missing ns=", s))?
            .parse::<u16>()
            .map_err(|e| format!("invalid namespace in '{}': {}", s, e))?;

        let identifier = if let Some(v) = id_part.strip_prefix("i=") {
            Identifier::Numeric(
                v.parse::<u32>()
                    .map_err(|e| format!("invalid numeric id in '{}': {}", s, e))?,
            )
        } else if let Some(v) = id_part.strip_prefix("s=") {
            Identifier::String(v.to_string())
        } else if let Some(v) = id_part.strip_prefix("g=") {
            Identifier::Guid(
                Uuid::parse_str(v).map_err(|e| format!("invalid guid in '{}': {}", s, e))?,
            )
        } else {
            return Err(format!("invalid node id '{}': unknown identifier form", s));
        };

        Ok(NodeId {
            namespace,
            identifier,
        })
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Well-known node ids from the standard OPC-UA namespace
pub mod well_known {
    use super::NodeId;

    /// The Server object, root of the notifier hierarchy
    pub fn server() -> NodeId {
        NodeId::numeric(0, 2253)
    }

    /// ConditionType
    pub fn condition_type() -> NodeId {
        NodeId::numeric(0, 2782)
    }

    /// AcknowledgeableConditionType
    pub fn acknowledgeable_condition_type() -> NodeId {
        NodeId::numeric(0, 2881)
    }

    /// AlarmConditionType
    pub fn alarm_condition_type() -> NodeId {
        NodeId::numeric(0, 2915)
    }

    /// LimitAlarmType
    pub fn limit_alarm_type() -> NodeId {
        NodeId::numeric(0, 2955)
    }

    /// ExclusiveLimitAlarmType
    pub fn exclusive_limit_alarm_type() -> NodeId {
        NodeId::numeric(0, 9341)
    }

    /// NonExclusiveLimitAlarmType
    pub fn non_exclusive_limit_alarm_type() -> NodeId {
        NodeId::numeric(0, 9906)
    }

    /// ExclusiveDeviationAlarmType
    pub fn exclusive_deviation_alarm_type() -> NodeId {
        NodeId::numeric(0, 9764)
    }

    /// NonExclusiveDeviationAlarmType
    pub fn non_exclusive_deviation_alarm_type() -> NodeId {
        NodeId::numeric(0, 10368)
    }

    /// DiscreteAlarmType
    pub fn discrete_alarm_type() -> NodeId {
        NodeId::numeric(0, 10523)
    }

    /// OffNormalAlarmType
    pub fn off_normal_alarm_type() -> NodeId {
        NodeId::numeric(0, 10637)
    }

    /// BaseConditionClassType, the default condition class
    pub fn base_condition_class_type() -> NodeId {
        NodeId::numeric(0, 11163)
    }

    /// ConditionType.ConditionRefresh method
    pub fn condition_refresh_method() -> NodeId {
        NodeId::numeric(0, 3875)
    }

    /// ConditionType.ConditionRefresh2 method
    pub fn condition_refresh2_method() -> NodeId {
        NodeId::numeric(0, 12984)
    }

    /// RefreshStartEventType
    pub fn refresh_start_event_type() -> NodeId {
        NodeId::numeric(0, 2787)
    }

    /// RefreshEndEventType
    pub fn refresh_end_event_type() -> NodeId {
        NodeId::numeric(0, 2788)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_id() {
        assert!(NodeId::null().is_null());
        assert!(!NodeId::numeric(1, 0).is_null());
        assert!(!NodeId::numeric(0, 1).is_null());
    }

    #[test]
    fn test_guid_ids_are_distinct() {
        let a = NodeId::new_guid(1);
        let b = NodeId::new_guid(1);
        assert_ne!(a, b);
        assert!(!a.is_null());
    }

    #[test]
    fn test_parse_roundtrip() {
        for text in ["ns=0;i=2253", "ns=1;s=TankLevel", "ns=2;i=42"] {
            let id: NodeId = text.parse().unwrap();
            assert_eq!(id.to_string(), text);
        }
        let guid = NodeId::new_guid(3);
        let parsed: NodeId = guid.to_string().parse().unwrap();
        assert_eq!(parsed, guid);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<NodeId>().is_err());
        assert!("ns=1;x=7".parse::<NodeId>().is_err());
        assert!("ns=bad;i=1".parse::<NodeId>().is_err());
    }
}
