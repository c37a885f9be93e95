use std::net::Ipv4Addr;

use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::document::NodeId;

use super::{HostId, SiteId, VlanId};

/// Project identity, used to build default names.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectInfo {
    pub prefix: String,
    pub code: String,
    pub short_name: String,
    pub long_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Revision {
    pub major: u32,
    pub minor: u32,
    pub date: String,
    pub author_initials: String,
    pub remark: String,
    pub reviewer: Option<String>,
    pub review_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SiteRole {
    Primary,
    Secondary,
}

impl SiteRole {
    pub fn opposite(self) -> SiteRole {
        match self {
            SiteRole::Primary => SiteRole::Secondary,
            SiteRole::Secondary => SiteRole::Primary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Site {
    pub name: String,
    pub role: SiteRole,
    pub location: Option<String>,
    pub name_servers: Vec<String>,
    pub wins_servers: Vec<String>,
    pub hosts: Vec<HostId>,
    pub controllers: Vec<super::ControllerId>,
    pub vlans: Vec<VlanId>,
    #[serde(skip)]
    pub(crate) node: NodeId,
}

/// One address block inside a VLAN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Network {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub prefix_len: u8,
    pub gateway: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Vlan {
    pub number: u32,
    pub site: SiteId,
    pub vlan_type: String,
    pub mtu: u32,
    pub description: Option<String>,
    pub networks: Vec<Network>,
}

impl Vlan {
    pub fn is_project(&self) -> bool {
        self.vlan_type == "project"
    }

    pub fn is_services(&self) -> bool {
        self.vlan_type == "services"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InterfaceMode {
    Active,
    Passive,
    Trunk,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Interface {
    pub interface_type: String,
    pub mode: InterfaceMode,
    pub switch_name: Option<String>,
    pub switch_port: Option<String>,
    pub host_port: Option<String>,
    pub address: Option<Ipv4Addr>,
    pub mtu: u32,
    pub vlans: Vec<VlanId>,
}

impl Interface {
    pub fn is_storage(&self) -> bool {
        self.interface_type == "storage"
    }
}

/// Operating system family, derived from the declared operating system name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OsFamily {
    Solaris,
    Linux,
    Windows,
    Other,
}

impl OsFamily {
    pub fn from_operating_system(name: &str) -> OsFamily {
        let name = name.to_ascii_lowercase();
        if name.starts_with("solaris") {
            OsFamily::Solaris
        } else if name.starts_with("linux") {
            OsFamily::Linux
        } else if name.starts_with("windows") {
            OsFamily::Windows
        } else {
            OsFamily::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Host {
    pub name: String,
    pub site: SiteId,
    pub platform: String,
    pub operating_system: String,
    pub location: String,
    pub description: Option<String>,
    pub iscsi_initiator: Option<String>,
    pub is_virtual: bool,
    pub interfaces: Vec<Interface>,
    pub dr_hosts: Vec<HostId>,
}

impl Host {
    pub fn os_family(&self) -> OsFamily {
        OsFamily::from_operating_system(&self.operating_system)
    }

    /// Addresses of the active storage interfaces.
    pub fn storage_addresses(&self) -> Vec<Ipv4Addr> {
        self.interfaces
            .iter()
            .filter(|iface| iface.is_storage() && iface.mode == InterfaceMode::Active)
            .filter_map(|iface| iface.address)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SwitchType {
    Core,
    Edge,
}

/// Known switch, as listed in the switch registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Switch {
    pub name: String,
    pub switch_type: SwitchType,
    pub site_name: String,
    pub location: String,
    pub uplinks: Vec<String>,
}

/// A switch used by the project, and the site it serves.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ActiveSwitch {
    #[serde(flatten)]
    pub switch: Switch,
    pub site: SiteId,
}
