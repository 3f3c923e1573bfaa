use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque managed-object reference assigned by the server (e.g. `"vm-42"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Kind of inventory object, attached to every entity at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    VirtualMachine,
    Host,
    Datacenter,
    Datastore,
    Cluster,
    ComputeResource,
    Folder,
}

impl EntityClass {
    /// Classes collected at the 20 second realtime interval.
    pub const REALTIME: [EntityClass; 2] = [EntityClass::VirtualMachine, EntityClass::Host];

    /// Classes only available through historical rollups.
    pub const HISTORICAL: [EntityClass; 3] = [
        EntityClass::Datacenter,
        EntityClass::Datastore,
        EntityClass::Cluster,
    ];

    /// Short name used in tags and configuration (`vm`, `host`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityClass::VirtualMachine => "vm",
            EntityClass::Host => "host",
            EntityClass::Datacenter => "datacenter",
            EntityClass::Datastore => "datastore",
            EntityClass::Cluster => "cluster",
            EntityClass::ComputeResource => "compute",
            EntityClass::Folder => "folder",
        }
    }

    pub fn is_realtime(&self) -> bool {
        Self::REALTIME.contains(self)
    }

    pub fn is_historical(&self) -> bool {
        Self::HISTORICAL.contains(self)
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vm" => Ok(EntityClass::VirtualMachine),
            "host" => Ok(EntityClass::Host),
            "datacenter" => Ok(EntityClass::Datacenter),
            "datastore" => Ok(EntityClass::Datastore),
            "cluster" => Ok(EntityClass::Cluster),
            "compute" => Ok(EntityClass::ComputeResource),
            "folder" => Ok(EntityClass::Folder),
            _ => Err(format!("unknown resource type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

/// Properties fetched for one entity in an inventory snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProperties {
    pub class: EntityClass,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent: Option<EntityId>,
    /// VM only.
    #[serde(default)]
    pub power_state: Option<PowerState>,
    /// VM only: the host currently running it.
    #[serde(default)]
    pub runtime_host: Option<EntityId>,
    /// VM only: hostname reported by the guest tools.
    #[serde(default)]
    pub guest_hostname: Option<String>,
}

impl EntityProperties {
    pub fn new(class: EntityClass, name: &str) -> Self {
        Self {
            class,
            name: Some(name.to_string()),
            parent: None,
            power_state: None,
            runtime_host: None,
            guest_hostname: None,
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(EntityId::from(parent));
        self
    }

    pub fn name_or_unknown(&self) -> &str {
        self.name.as_deref().unwrap_or("unknown")
    }
}

/// Full inventory snapshot, ordered by entity id.
pub type Infrastructure = BTreeMap<EntityId, EntityProperties>;
