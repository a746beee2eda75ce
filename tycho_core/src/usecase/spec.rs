//! Parametrised device/resource requirement specifications and the
//! structural compatibility check used when binding declared slots to
//! concrete mount points.

use crate::error::{TychoError, TychoResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Functional device classes known to the matching algorithm.
/// `Generic` is the wildcard type: it is compatible with every other type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Generic,
    Crate,
    Board,
    PowerSupply,
    Sensor,
    Actuator,
    Controller,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeviceType::Generic => "generic",
            DeviceType::Crate => "crate",
            DeviceType::Board => "board",
            DeviceType::PowerSupply => "power_supply",
            DeviceType::Sensor => "sensor",
            DeviceType::Actuator => "actuator",
            DeviceType::Controller => "controller",
        };
        write!(f, "{}", label)
    }
}

/// Functional category of a resource endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceCategory {
    Datapoint,
    Method,
}

/// Access mode of a resource endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Data type carried by a resource endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Integer,
    Real,
    String,
}

impl DataType {
    /// Unit dimensions are only meaningful for real-valued data.
    pub fn is_real(&self) -> bool {
        matches!(self, DataType::Real)
    }
}

/// A partially-specified requirement on a device or a resource.
///
/// Absent fields are wildcards: they constrain nothing when matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceSpecEntry {
    Device {
        model_id: Option<String>,
        device_type: Option<DeviceType>,
    },
    Resource {
        name: Option<String>,
        category: Option<ResourceCategory>,
        access: Option<AccessMode>,
        datatype: Option<DataType>,
        unit_dimension: Option<String>,
    },
}

impl ResourceSpecEntry {
    pub fn is_device(&self) -> bool {
        matches!(self, ResourceSpecEntry::Device { .. })
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, ResourceSpecEntry::Resource { .. })
    }

    /// Structural compatibility check between two partially-specified
    /// entries.
    ///
    /// A field left unspecified on either side never causes a mismatch;
    /// the check fails only when both sides specify a field and the
    /// values disagree. Device types tolerate [`DeviceType::Generic`] on
    /// either side. Returns the mismatch reason on failure.
    pub fn matches(&self, other: &ResourceSpecEntry) -> Result<(), String> {
        match (self, other) {
            (
                ResourceSpecEntry::Device {
                    model_id: m1,
                    device_type: t1,
                },
                ResourceSpecEntry::Device {
                    model_id: m2,
                    device_type: t2,
                },
            ) => {
                if let (Some(m1), Some(m2)) = (m1, m2) {
                    if m1 != m2 {
                        return Err(format!(
                            "Entries are not devices of the same model ('{}' vs '{}')",
                            m1, m2
                        ));
                    }
                }
                if let (Some(t1), Some(t2)) = (t1, t2) {
                    if *t1 != DeviceType::Generic
                        && *t2 != DeviceType::Generic
                        && t1 != t2
                    {
                        return Err(format!(
                            "Entries are not devices of the same type ('{}' vs '{}')",
                            t1, t2
                        ));
                    }
                }
                Ok(())
            }
            (
                ResourceSpecEntry::Resource {
                    name: n1,
                    category: c1,
                    access: a1,
                    datatype: d1,
                    unit_dimension: u1,
                },
                ResourceSpecEntry::Resource {
                    name: n2,
                    category: c2,
                    access: a2,
                    datatype: d2,
                    unit_dimension: u2,
                },
            ) => {
                if let (Some(n1), Some(n2)) = (n1, n2) {
                    if n1 != n2 {
                        return Err(format!(
                            "Entries are not resources of the same name ('{}' vs '{}')",
                            n1, n2
                        ));
                    }
                }
                if let (Some(c1), Some(c2)) = (c1, c2) {
                    if c1 != c2 {
                        return Err(format!(
                            "Entries are not resources of the same category ({:?} vs {:?})",
                            c1, c2
                        ));
                    }
                }
                if let (Some(a1), Some(a2)) = (a1, a2) {
                    if a1 != a2 {
                        return Err(format!(
                            "Entries are not resources of the same access ({:?} vs {:?})",
                            a1, a2
                        ));
                    }
                }
                if let (Some(d1), Some(d2)) = (d1, d2) {
                    if d1 != d2 {
                        return Err(format!(
                            "Entries are not resources with the same data type ({:?} vs {:?})",
                            d1, d2
                        ));
                    }
                    if d1.is_real() {
                        if let (Some(u1), Some(u2)) = (u1, u2) {
                            if u1 != u2 {
                                return Err(format!(
                                    "Entries are not resources with the same unit dimension ('{}' vs '{}')",
                                    u1, u2
                                ));
                            }
                        }
                    }
                }
                Ok(())
            }
            (ResourceSpecEntry::Device { .. }, _) => {
                Err("Device cannot match to a non-device".to_string())
            }
            (ResourceSpecEntry::Resource { .. }, _) => {
                Err("Resource cannot match to a non-resource".to_string())
            }
        }
    }
}

/// Validate a local specification key: non-empty, ASCII alphanumerics and
/// underscores only (no colon, dot or hyphen).
pub fn validate_spec_key(key: &str) -> TychoResult<()> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(TychoError::invalid_input(format!(
            "Resource specification local key '{}' is not valid",
            key
        )));
    }
    Ok(())
}

/// Keyed, lockable container of requirement specifications.
///
/// Keys are local to the owning use case. The container is write-once:
/// after [`ParametrisedResourceSpecifications::lock`] every mutation
/// fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParametrisedResourceSpecifications {
    specs: BTreeMap<String, ResourceSpecEntry>,
    locked: bool,
}

impl ParametrisedResourceSpecifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn has(&self, key: &str) -> bool {
        self.specs.contains_key(key)
    }

    pub fn keys(&self) -> BTreeSet<String> {
        self.specs.keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> TychoResult<&ResourceSpecEntry> {
        self.specs.get(key).ok_or_else(|| {
            TychoError::invalid_input(format!("No specification entry with local key '{}'", key))
        })
    }

    pub fn is_device(&self, key: &str) -> TychoResult<bool> {
        Ok(self.get(key)?.is_device())
    }

    pub fn is_resource(&self, key: &str) -> TychoResult<bool> {
        Ok(self.get(key)?.is_resource())
    }

    fn add(&mut self, key: &str, entry: ResourceSpecEntry) -> TychoResult<()> {
        if self.locked {
            return Err(TychoError::precondition("Specifications are locked"));
        }
        validate_spec_key(key)?;
        if self.has(key) {
            return Err(TychoError::invalid_input(format!(
                "Specification entry with local key '{}' already exists",
                key
            )));
        }
        self.specs.insert(key.to_string(), entry);
        Ok(())
    }

    /// Declare a device slot.
    pub fn add_device(
        &mut self,
        key: &str,
        model_id: Option<String>,
        device_type: Option<DeviceType>,
    ) -> TychoResult<()> {
        self.add(
            key,
            ResourceSpecEntry::Device {
                model_id,
                device_type,
            },
        )
    }

    /// Declare a resource slot. A unit dimension is only accepted for
    /// real-valued data types.
    pub fn add_resource(
        &mut self,
        key: &str,
        category: Option<ResourceCategory>,
        access: Option<AccessMode>,
        datatype: Option<DataType>,
        unit_dimension: Option<String>,
    ) -> TychoResult<()> {
        self.add_entry(
            key,
            ResourceSpecEntry::Resource {
                name: None,
                category,
                access,
                datatype,
                unit_dimension,
            },
        )
    }

    /// Declare a fully-specified slot, including name-constrained
    /// resource entries.
    pub fn add_entry(&mut self, key: &str, entry: ResourceSpecEntry) -> TychoResult<()> {
        if let ResourceSpecEntry::Resource {
            datatype,
            unit_dimension: Some(dim),
            ..
        } = &entry
        {
            if datatype.map(|d| d.is_real()) != Some(true) {
                return Err(TychoError::invalid_input(format!(
                    "Explicit unit dimension '{}' is only supported for real data types in resource requirement '{}'",
                    dim, key
                )));
            }
        }
        self.add(key, entry)
    }

    pub fn remove(&mut self, key: &str) -> TychoResult<()> {
        if self.locked {
            return Err(TychoError::precondition("Specifications are locked"));
        }
        if self.specs.remove(key).is_none() {
            return Err(TychoError::invalid_input(format!(
                "Specification entry with local key '{}' does not exist",
                key
            )));
        }
        Ok(())
    }

    pub fn clear(&mut self) -> TychoResult<()> {
        if self.locked {
            return Err(TychoError::precondition("Specifications are locked"));
        }
        self.specs.clear();
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResourceSpecEntry)> {
        self.specs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(model: Option<&str>, dtype: Option<DeviceType>) -> ResourceSpecEntry {
        ResourceSpecEntry::Device {
            model_id: model.map(String::from),
            device_type: dtype,
        }
    }

    fn datapoint(datatype: Option<DataType>, dim: Option<&str>) -> ResourceSpecEntry {
        ResourceSpecEntry::Resource {
            name: None,
            category: Some(ResourceCategory::Datapoint),
            access: Some(AccessMode::ReadOnly),
            datatype,
            unit_dimension: dim.map(String::from),
        }
    }

    #[test]
    fn test_category_mismatch() {
        let d = device(None, None);
        let r = datapoint(None, None);
        assert!(d.matches(&r).is_err());
        assert!(r.matches(&d).is_err());
    }

    #[test]
    fn test_device_model_and_type() {
        let a = device(Some("caen/sy4527"), Some(DeviceType::PowerSupply));
        let b = device(Some("caen/sy4527"), None);
        let c = device(Some("iseg/ehs"), Some(DeviceType::PowerSupply));
        assert!(a.matches(&b).is_ok());
        assert!(a.matches(&c).is_err());

        let board = device(None, Some(DeviceType::Board));
        let generic = device(None, Some(DeviceType::Generic));
        assert!(a.matches(&board).is_err());
        // Generic is a wildcard on either side
        assert!(a.matches(&generic).is_ok());
        assert!(generic.matches(&board).is_ok());
    }

    #[test]
    fn test_wildcards_are_symmetric() {
        let full = datapoint(Some(DataType::Real), Some("temperature"));
        let open = datapoint(None, None);
        assert!(full.matches(&open).is_ok());
        assert!(open.matches(&full).is_ok());
    }

    #[test]
    fn test_resource_field_disagreement() {
        let a = datapoint(Some(DataType::Real), Some("temperature"));
        let b = datapoint(Some(DataType::Real), Some("pressure"));
        let c = datapoint(Some(DataType::Integer), None);
        assert!(a.matches(&b).is_err());
        assert!(a.matches(&c).is_err());

        let ro = datapoint(Some(DataType::Real), None);
        let rw = ResourceSpecEntry::Resource {
            name: None,
            category: Some(ResourceCategory::Datapoint),
            access: Some(AccessMode::ReadWrite),
            datatype: Some(DataType::Real),
            unit_dimension: None,
        };
        assert!(ro.matches(&rw).is_err());
    }

    #[test]
    fn test_specs_container_lock_and_keys() {
        let mut specs = ParametrisedResourceSpecifications::new();
        specs
            .add_device("hv_supply", Some("caen/sy4527".into()), None)
            .unwrap();
        specs
            .add_resource(
                "temp_probe",
                Some(ResourceCategory::Datapoint),
                Some(AccessMode::ReadOnly),
                Some(DataType::Real),
                Some("temperature".into()),
            )
            .unwrap();

        assert!(specs.add_device("hv_supply", None, None).is_err());
        assert!(specs.add_device("bad-key", None, None).is_err());
        assert!(specs.add_device("bad.key", None, None).is_err());
        assert!(specs.is_device("hv_supply").unwrap());
        assert!(specs.is_resource("temp_probe").unwrap());

        specs.lock();
        assert!(specs.add_device("late", None, None).is_err());
        assert!(specs.remove("hv_supply").is_err());
        assert_eq!(specs.len(), 2);
    }

    #[test]
    fn test_named_resource_entry() {
        let mut specs = ParametrisedResourceSpecifications::new();
        specs
            .add_entry(
                "ps_current",
                ResourceSpecEntry::Resource {
                    name: Some("Current".into()),
                    category: Some(ResourceCategory::Datapoint),
                    access: Some(AccessMode::ReadOnly),
                    datatype: Some(DataType::Real),
                    unit_dimension: Some("electric_current".into()),
                },
            )
            .unwrap();

        let entry = specs.get("ps_current").unwrap();
        let same_name = ResourceSpecEntry::Resource {
            name: Some("Current".into()),
            category: None,
            access: None,
            datatype: None,
            unit_dimension: None,
        };
        let other_name = ResourceSpecEntry::Resource {
            name: Some("Voltage".into()),
            category: None,
            access: None,
            datatype: None,
            unit_dimension: None,
        };
        assert!(entry.matches(&same_name).is_ok());
        assert!(entry.matches(&other_name).is_err());

        // the unit dimension rule also holds for full entries
        let res = specs.add_entry(
            "bad",
            ResourceSpecEntry::Resource {
                name: None,
                category: None,
                access: None,
                datatype: Some(DataType::Integer),
                unit_dimension: Some("time".into()),
            },
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_unit_dimension_requires_real_datatype() {
        let mut specs = ParametrisedResourceSpecifications::new();
        let res = specs.add_resource(
            "counter",
            Some(ResourceCategory::Datapoint),
            None,
            Some(DataType::Integer),
            Some("time".into()),
        );
        assert!(res.is_err());
    }
}
