use std::{collections::BTreeMap, net::Ipv4Addr};

use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::{document::NodeId, primitives::Gigabytes};

use super::{
    ControllerId, HostId, IgroupId, LunId, MirrorId, PartitionId, QtreeId, SiteId, SnapshotId,
    VaultId, VlanId, VolumeId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ControllerType {
    Primary,
    Secondary,
    Nearstore,
}

/// A storage appliance node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Controller {
    pub name: String,
    pub controller_type: ControllerType,
    pub site: SiteId,
    /// Set on a secondary controller: the controller it backs.
    pub secondary_for: Option<ControllerId>,
    /// Set on a backed controller: its secondary.
    pub secondary: Option<ControllerId>,
    pub partitions: Vec<PartitionId>,
    /// Volumes in creation order. Root volumes always come first.
    pub volumes: Vec<VolumeId>,
    pub igroups: Vec<IgroupId>,
    #[serde(skip)]
    pub(crate) node: NodeId,
}

impl Controller {
    pub fn is_nearstore(&self) -> bool {
        self.controller_type == ControllerType::Nearstore
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Protocol {
    Nfs,
    Cifs,
    Iscsi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AliasAddress {
    pub address: Ipv4Addr,
    pub netmask: Option<Ipv4Addr>,
}

/// Address of a partition on a services VLAN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceAddress {
    pub vlan: VlanId,
    pub address: Ipv4Addr,
}

/// An isolated storage-serving identity (vfiler) hosted on a controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct VirtualPartition {
    pub name: String,
    pub controller: ControllerId,
    pub root_pool: String,
    pub vlan: VlanId,
    pub primary_address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub aliases: Vec<AliasAddress>,
    pub service_addresses: Vec<ServiceAddress>,
    pub protocols: Vec<Protocol>,
    pub dns_domain: Option<String>,
    pub ad_account_location: Option<String>,
    pub netbios_name: String,
    pub fqdn: Option<String>,
    #[serde(skip)]
    pub(crate) node: NodeId,
}

impl VirtualPartition {
    /// The primary address followed by all alias addresses.
    pub fn addresses(&self) -> Vec<Ipv4Addr> {
        std::iter::once(self.primary_address)
            .chain(self.aliases.iter().map(|alias| alias.address))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum VolumeKind {
    Declared,
    Root,
    SnapvaultTarget,
    SnapmirrorTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WorkloadType {
    Fs,
    OraConfig,
    OraCm,
    OraData,
    OraIndx,
    OraRedo,
    OraUndo,
    OraArch,
}

impl WorkloadType {
    pub fn is_database(self) -> bool {
        self != WorkloadType::Fs
    }

    /// Workloads whose hosts need database mount options.
    pub fn needs_database_mount_options(self) -> bool {
        matches!(
            self,
            WorkloadType::OraCm
                | WorkloadType::OraData
                | WorkloadType::OraIndx
                | WorkloadType::OraUndo
                | WorkloadType::OraArch
                | WorkloadType::OraRedo
        )
    }
}

/// Names of the protection policy sets a volume references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProtectionRefs {
    pub snapshot: Vec<String>,
    pub vault: Vec<String>,
    pub mirror: Vec<String>,
    pub vault_mirror: Vec<String>,
}

impl ProtectionRefs {
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
            && self.vault.is_empty()
            && self.mirror.is_empty()
            && self.vault_mirror.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AutoSize {
    pub max: String,
    pub increment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AutoDelete {
    pub commitment: String,
    pub trigger: String,
    pub target_free_space: String,
    pub delete_order: String,
    pub defer_delete: String,
}

impl Default for AutoDelete {
    fn default() -> Self {
        Self {
            commitment: "try".into(),
            trigger: "volume".into(),
            target_free_space: "80".into(),
            delete_order: "oldest_first".into(),
            defer_delete: "none".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Volume {
    pub name: String,
    pub controller: ControllerId,
    pub pool: String,
    pub kind: VolumeKind,
    pub workload: WorkloadType,
    /// Database identifier for database workloads.
    pub workload_id: Option<String>,
    pub protocol: Option<Protocol>,
    pub usable: Gigabytes,
    /// Usable size before snapshot headroom was added, used to size LUNs.
    pub iscsi_usable: Gigabytes,
    pub raw: Gigabytes,
    pub snap_reserve: u32,
    pub iscsi_snapspace: f64,
    pub space_guarantee: String,
    pub options: Vec<String>,
    pub protection: ProtectionRefs,
    pub autosize: Option<AutoSize>,
    pub autodelete: Option<AutoDelete>,
    pub qtrees: Vec<QtreeId>,
    pub snapshots: Vec<SnapshotId>,
    pub vaults: Vec<VaultId>,
    pub mirrors: Vec<MirrorId>,
    #[serde(skip)]
    pub(crate) node: Option<NodeId>,
}

impl Volume {
    pub fn short_path(&self) -> String {
        format!("/vol/{}", self.name)
    }

    pub fn is_target(&self) -> bool {
        matches!(
            self.kind,
            VolumeKind::SnapvaultTarget | VolumeKind::SnapmirrorTarget
        )
    }

    pub fn has_snaps(&self) -> bool {
        !self.snapshots.is_empty()
    }

    pub fn create_size(&self) -> Result<String, crate::error::SanplanError> {
        self.raw.to_create_size()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SecurityStyle {
    Unix,
    Ntfs,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AccessMode {
    Rw,
    Ro,
}

/// A grant of access from a storage-side address to a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Export {
    pub host: HostId,
    pub from: Ipv4Addr,
    pub mode: AccessMode,
    /// Host-side address override.
    pub to: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Qtree {
    pub name: String,
    pub volume: VolumeId,
    pub security: SecurityStyle,
    pub oplocks: bool,
    pub comment: Option<String>,
    pub rw_exports: Vec<Export>,
    pub ro_exports: Vec<Export>,
    /// Mount options for each exported host.
    pub mount_options: BTreeMap<HostId, Vec<String>>,
    pub luns: Vec<LunId>,
    /// Source qtree when this qtree is a disaster-recovery mirror.
    pub mirror_of: Option<QtreeId>,
    #[serde(skip)]
    pub(crate) node: Option<NodeId>,
}

impl Qtree {
    pub fn exports(&self) -> impl Iterator<Item = &Export> {
        self.rw_exports.iter().chain(self.ro_exports.iter())
    }

    pub fn cifs_share_name(&self, volume: &Volume, hidden: bool) -> String {
        let hidden = if hidden { "$" } else { "" };
        format!("{}_{}{hidden}", volume.name, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OsType {
    Solaris,
    Windows,
    Linux,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Lun {
    pub name: String,
    pub lun_id: u32,
    pub size: Gigabytes,
    pub os_type: OsType,
    pub qtree: QtreeId,
    pub exports: Vec<Export>,
    pub igroup: Option<IgroupId>,
    /// Source LUN when this LUN is a disaster-recovery mirror.
    pub mirror_of: Option<LunId>,
    #[serde(skip)]
    pub(crate) node: Option<NodeId>,
}

impl Lun {
    pub fn create_size(&self) -> Result<String, crate::error::SanplanError> {
        self.size.to_create_size()
    }
}

/// LUNs sharing one ordered export list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Igroup {
    pub name: String,
    pub controller: ControllerId,
    pub site: SiteId,
    pub os_type: Option<OsType>,
    pub exports: Vec<Export>,
    pub luns: Vec<LunId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!("iSCSI".parse::<Protocol>().unwrap(), Protocol::Iscsi);
        assert_eq!("NFS".parse::<Protocol>().unwrap(), Protocol::Nfs);
        assert!("smb".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_workload_parse() {
        assert_eq!("oraarch".parse::<WorkloadType>().unwrap(), WorkloadType::OraArch);
        assert_eq!(WorkloadType::OraConfig.to_string(), "oraconfig");
        assert!(!WorkloadType::OraConfig.needs_database_mount_options());
        assert!(WorkloadType::OraRedo.needs_database_mount_options());
        assert!("backup".parse::<WorkloadType>().is_err());
    }

    #[test]
    fn test_volume_kind_names() {
        assert_eq!(VolumeKind::SnapvaultTarget.to_string(), "snapvault-target");
        assert_eq!(VolumeKind::SnapmirrorTarget.to_string(), "snapmirror-target");
    }

    #[test]
    fn test_export_equality() {
        let export = Export {
            host: HostId(0),
            from: Ipv4Addr::new(10, 0, 0, 1),
            mode: AccessMode::Ro,
            to: None,
        };
        assert_eq!(export, export.clone());
        assert_ne!(
            export,
            Export {
                mode: AccessMode::Rw,
                ..export.clone()
            }
        );
        assert_ne!(
            export,
            Export {
                to: Some(Ipv4Addr::new(10, 0, 0, 9)),
                ..export.clone()
            }
        );
    }
}
