//! Mount points and mount links.
//!
//! A use case declares abstract requirement slots; mounting resolves each
//! slot to a concrete device/resource path. A mount link records where a
//! daughter slot is fed from, in the textual form `@A:X->U[M/N/P]`:
//! daughter `A`, slot `X`, bound to the parent mount `U`, optionally
//! descending the relative path `M/N/P` below it.

use crate::error::{TychoError, TychoResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

fn valid_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Identifies a requirement slot, either local (`X`) or on a named
/// daughter (`@A:X`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId {
    daughter: Option<String>,
    key: String,
}

impl PortId {
    /// Slot on the use case itself.
    pub fn local(key: impl Into<String>) -> TychoResult<Self> {
        let key = key.into();
        if !valid_identifier(&key) {
            return Err(TychoError::invalid_input(format!(
                "Invalid port key '{}'",
                key
            )));
        }
        Ok(PortId {
            daughter: None,
            key,
        })
    }

    /// Slot on a named daughter.
    pub fn daughter(name: impl Into<String>, key: impl Into<String>) -> TychoResult<Self> {
        let name = name.into();
        let key = key.into();
        if !valid_identifier(&name) {
            return Err(TychoError::invalid_input(format!(
                "Invalid daughter name '{}'",
                name
            )));
        }
        if !valid_identifier(&key) {
            return Err(TychoError::invalid_input(format!(
                "Invalid port key '{}'",
                key
            )));
        }
        Ok(PortId {
            daughter: Some(name),
            key,
        })
    }

    pub fn daughter_name(&self) -> Option<&str> {
        self.daughter.as_deref()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_local(&self) -> bool {
        self.daughter.is_none()
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.daughter {
            Some(name) => write!(f, "@{}:{}", name, self.key),
            None => write!(f, "{}", self.key),
        }
    }
}

impl FromStr for PortId {
    type Err = TychoError;

    fn from_str(s: &str) -> TychoResult<Self> {
        if let Some(rest) = s.strip_prefix('@') {
            let (name, key) = rest.split_once(':').ok_or_else(|| {
                TychoError::invalid_input(format!("Cannot parse port ID from '{}'", s))
            })?;
            PortId::daughter(name, key)
        } else {
            PortId::local(s)
        }
    }
}

/// Validated slash-separated path below a mount point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativePath {
    segments: Vec<String>,
}

impl RelativePath {
    pub fn new(segments: Vec<String>) -> TychoResult<Self> {
        if segments.is_empty() || segments.iter().any(|s| !valid_identifier(s)) {
            return Err(TychoError::invalid_input(format!(
                "Invalid relative path segments {:?}",
                segments
            )));
        }
        Ok(RelativePath { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl FromStr for RelativePath {
    type Err = TychoError;

    fn from_str(s: &str) -> TychoResult<Self> {
        RelativePath::new(s.split('/').map(String::from).collect())
    }
}

/// One resolved binding: a slot fed from a parent mount point, optionally
/// descending a relative path below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountLink {
    pub from: PortId,
    pub to_key: String,
    pub relative_path: Option<RelativePath>,
}

impl MountLink {
    pub fn new(
        from: PortId,
        to_key: impl Into<String>,
        relative_path: Option<RelativePath>,
    ) -> TychoResult<Self> {
        let to_key = to_key.into();
        if !valid_identifier(&to_key) {
            return Err(TychoError::invalid_input(format!(
                "Invalid mount target key '{}'",
                to_key
            )));
        }
        Ok(MountLink {
            from,
            to_key,
            relative_path,
        })
    }
}

impl fmt::Display for MountLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to_key)?;
        if let Some(path) = &self.relative_path {
            write!(f, "[{}]", path)?;
        }
        Ok(())
    }
}

impl FromStr for MountLink {
    type Err = TychoError;

    fn from_str(s: &str) -> TychoResult<Self> {
        let (from, target) = s.split_once("->").ok_or_else(|| {
            TychoError::invalid_input(format!("Cannot parse mount link from '{}'", s))
        })?;
        let from: PortId = from.parse()?;
        let (to_key, relative_path) = match target.split_once('[') {
            Some((key, rest)) => {
                let path = rest.strip_suffix(']').ok_or_else(|| {
                    TychoError::invalid_input(format!("Cannot parse mount link from '{}'", s))
                })?;
                (key, Some(path.parse()?))
            }
            None => (target, None),
        };
        MountLink::new(from, to_key, relative_path)
    }
}

/// Resolved bindings of a use case, keyed by the textual port id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountingTable {
    links: BTreeMap<String, MountLink>,
}

impl MountingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, link: MountLink) -> TychoResult<()> {
        let key = link.from.to_string();
        if self.links.contains_key(&key) {
            return Err(TychoError::invalid_input(format!(
                "Port '{}' is already mounted",
                key
            )));
        }
        self.links.insert(key, link);
        Ok(())
    }

    pub fn get(&self, port: &PortId) -> Option<&MountLink> {
        self.links.get(&port.to_string())
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.links.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MountLink)> {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_id_forms() {
        let local: PortId = "PS".parse().unwrap();
        assert!(local.is_local());
        assert_eq!(local.to_string(), "PS");

        let remote: PortId = "@Foo:PS".parse().unwrap();
        assert_eq!(remote.daughter_name(), Some("Foo"));
        assert_eq!(remote.key(), "PS");
        assert_eq!(remote.to_string(), "@Foo:PS");

        assert!("@Foo".parse::<PortId>().is_err());
        assert!("@:PS".parse::<PortId>().is_err());
        assert!("bad-key".parse::<PortId>().is_err());
    }

    #[test]
    fn test_mount_link_round_trip() {
        let plain: MountLink = "@Foo:PS->HVPS".parse().unwrap();
        assert_eq!(plain.to_key, "HVPS");
        assert!(plain.relative_path.is_none());
        assert_eq!(plain.to_string(), "@Foo:PS->HVPS");

        let pathed: MountLink = "@Foo:T1->Dev1[Monitoring/Temperature]".parse().unwrap();
        let path = pathed.relative_path.as_ref().unwrap();
        assert_eq!(path.segments(), ["Monitoring", "Temperature"]);
        assert_eq!(pathed.to_string(), "@Foo:T1->Dev1[Monitoring/Temperature]");

        assert!("@Foo:T1->Dev1[Broken".parse::<MountLink>().is_err());
        assert!("@Foo:T1=Dev1".parse::<MountLink>().is_err());
    }

    #[test]
    fn test_mounting_table_rejects_duplicates() {
        let mut table = MountingTable::new();
        table.add("@Foo:PS->HVPS".parse().unwrap()).unwrap();
        assert!(table.add("@Foo:PS->OtherPS".parse::<MountLink>().unwrap()).is_err());
        assert_eq!(table.len(), 1);

        let port = PortId::daughter("Foo", "PS").unwrap();
        assert_eq!(table.get(&port).unwrap().to_key, "HVPS");
    }
}
