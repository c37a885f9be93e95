//! Resolved project graph.
//!
//! Every entity lives in an arena owned by [`ProjectGraph`] and is addressed by
//! a typed index. Back-references between entities are stored as indices, so
//! the graph can be serialized as-is.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::primitives::Gigabytes;

mod protection;
mod storage;
mod topology;

pub use protection::{MirrorCopy, Snapshot, VaultCopy};
pub use storage::{
    AccessMode, AliasAddress, AutoDelete, AutoSize, Controller, ControllerType, Export, Igroup,
    Lun, OsType, ProtectionRefs, Protocol, Qtree, SecurityStyle, ServiceAddress,
    VirtualPartition, Volume, VolumeKind, WorkloadType,
};
pub use topology::{
    ActiveSwitch, Host, Interface, InterfaceMode, Network, OsFamily, ProjectInfo, Revision, Site,
    SiteRole, Switch, SwitchType, Vlan,
};

macro_rules! arena_id {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
            #[serde(transparent)]
            pub struct $name(pub(crate) usize);

            impl $name {
                pub fn index(self) -> usize {
                    self.0
                }
            }
        )+
    };
}

arena_id!(
    SiteId,
    HostId,
    VlanId,
    ControllerId,
    /// Index of a virtual partition (vfiler).
    PartitionId,
    VolumeId,
    QtreeId,
    LunId,
    /// Index of an initiator group.
    IgroupId,
    SnapshotId,
    VaultId,
    MirrorId,
);

/// The fully resolved project.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectGraph {
    pub project: ProjectInfo,
    pub revisions: Vec<Revision>,
    /// Set when any controller lives at a secondary site.
    pub has_dr: bool,
    pub chap_prefix: String,
    pub(crate) sites: Vec<Site>,
    pub(crate) hosts: Vec<Host>,
    pub(crate) vlans: Vec<Vlan>,
    pub(crate) active_switches: BTreeMap<String, ActiveSwitch>,
    pub(crate) controllers: Vec<Controller>,
    pub(crate) partitions: Vec<VirtualPartition>,
    pub(crate) volumes: Vec<Volume>,
    pub(crate) qtrees: Vec<Qtree>,
    pub(crate) luns: Vec<Lun>,
    pub(crate) igroups: Vec<Igroup>,
    pub(crate) snapshots: Vec<Snapshot>,
    pub(crate) vaults: Vec<VaultCopy>,
    pub(crate) mirrors: Vec<MirrorCopy>,
}

impl ProjectGraph {
    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn vlans(&self) -> &[Vlan] {
        &self.vlans
    }

    pub fn active_switches(&self) -> &BTreeMap<String, ActiveSwitch> {
        &self.active_switches
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    pub fn partitions(&self) -> &[VirtualPartition] {
        &self.partitions
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn qtrees(&self) -> &[Qtree] {
        &self.qtrees
    }

    pub fn luns(&self) -> &[Lun] {
        &self.luns
    }

    pub fn igroups(&self) -> &[Igroup] {
        &self.igroups
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn vaults(&self) -> &[VaultCopy] {
        &self.vaults
    }

    pub fn mirrors(&self) -> &[MirrorCopy] {
        &self.mirrors
    }

    pub fn site(&self, id: SiteId) -> &Site {
        &self.sites[id.0]
    }

    pub fn host(&self, id: HostId) -> &Host {
        &self.hosts[id.0]
    }

    pub fn vlan(&self, id: VlanId) -> &Vlan {
        &self.vlans[id.0]
    }

    pub fn controller(&self, id: ControllerId) -> &Controller {
        &self.controllers[id.0]
    }

    pub fn partition(&self, id: PartitionId) -> &VirtualPartition {
        &self.partitions[id.0]
    }

    pub fn volume(&self, id: VolumeId) -> &Volume {
        &self.volumes[id.0]
    }

    pub fn qtree(&self, id: QtreeId) -> &Qtree {
        &self.qtrees[id.0]
    }

    pub fn lun(&self, id: LunId) -> &Lun {
        &self.luns[id.0]
    }

    pub fn igroup(&self, id: IgroupId) -> &Igroup {
        &self.igroups[id.0]
    }

    pub fn site_ids(&self) -> impl Iterator<Item = SiteId> {
        (0..self.sites.len()).map(SiteId)
    }

    pub fn volume_ids(&self) -> impl Iterator<Item = VolumeId> {
        (0..self.volumes.len()).map(VolumeId)
    }

    pub fn site_by_name(&self, name: &str) -> Option<SiteId> {
        self.sites.iter().position(|s| s.name == name).map(SiteId)
    }

    pub fn host_by_name(&self, name: &str) -> Option<HostId> {
        self.hosts.iter().position(|h| h.name == name).map(HostId)
    }

    pub fn controller_by_name(&self, name: &str) -> Option<ControllerId> {
        self.controllers
            .iter()
            .position(|c| c.name == name)
            .map(ControllerId)
    }

    pub fn volume_by_name(&self, controller: ControllerId, name: &str) -> Option<VolumeId> {
        self.controller(controller)
            .volumes
            .iter()
            .copied()
            .find(|v| self.volume(*v).name == name)
    }

    /// Site a volume lives at, through its controller.
    pub fn volume_site(&self, volume: VolumeId) -> SiteId {
        self.controller(self.volume(volume).controller).site
    }

    /// First partition of a controller, whose addresses serve exports by
    /// default.
    pub fn first_partition(&self, controller: ControllerId) -> Option<&VirtualPartition> {
        self.controller(controller)
            .partitions
            .first()
            .map(|p| self.partition(*p))
    }

    /// Primary and alias addresses of a partition.
    pub fn partition_addresses(&self, partition: PartitionId) -> Vec<std::net::Ipv4Addr> {
        self.partition(partition).addresses()
    }

    /// The first project VLAN declared at a site.
    pub fn project_vlan(&self, site: SiteId) -> Option<VlanId> {
        self.site(site)
            .vlans
            .iter()
            .copied()
            .find(|v| self.vlan(*v).is_project())
    }

    pub fn services_vlans(&self, site: SiteId) -> Vec<VlanId> {
        self.site(site)
            .vlans
            .iter()
            .copied()
            .filter(|v| self.vlan(*v).is_services())
            .collect()
    }

    /// Volumes of controllers of one type at sites of one role, in project
    /// order.
    pub fn volumes_at(&self, role: SiteRole, controller_type: ControllerType) -> Vec<VolumeId> {
        self.volume_ids()
            .filter(|v| {
                let controller = self.controller(self.volume(*v).controller);
                controller.controller_type == controller_type
                    && self.site(controller.site).role == role
            })
            .collect()
    }

    /// Total usable and raw size of a set of volumes.
    pub fn volume_totals(&self, volumes: &[VolumeId]) -> (Gigabytes, Gigabytes) {
        let usable = volumes.iter().map(|v| self.volume(*v).usable).sum();
        let raw = volumes.iter().map(|v| self.volume(*v).raw).sum();
        (usable, raw)
    }

    /// `<controller>:/vol/<volume>`
    pub fn volume_name_path(&self, volume: VolumeId) -> String {
        let volume = self.volume(volume);
        format!(
            "{}:{}",
            self.controller(volume.controller).name,
            volume.short_path()
        )
    }

    /// `/vol/<volume>/<qtree>`
    pub fn qtree_full_path(&self, qtree: QtreeId) -> String {
        let qtree = self.qtree(qtree);
        format!("{}/{}", self.volume(qtree.volume).short_path(), qtree.name)
    }

    pub fn lun_full_path(&self, lun: LunId) -> String {
        let lun = self.lun(lun);
        format!("{}/{}", self.qtree_full_path(lun.qtree), lun.name)
    }

    pub fn lun_volume(&self, lun: LunId) -> VolumeId {
        self.qtree(self.lun(lun).qtree).volume
    }

    pub fn lun_controller(&self, lun: LunId) -> ControllerId {
        self.volume(self.lun_volume(lun)).controller
    }

    /// Qtrees on volumes served over CIFS.
    pub fn cifs_qtrees(&self) -> Vec<QtreeId> {
        (0..self.qtrees.len())
            .map(QtreeId)
            .filter(|q| self.volume(self.qtree(*q).volume).protocol == Some(Protocol::Cifs))
            .collect()
    }

    pub fn site_qtrees(&self, site: SiteId) -> Vec<QtreeId> {
        (0..self.qtrees.len())
            .map(QtreeId)
            .filter(|q| self.volume_site(self.qtree(*q).volume) == site)
            .collect()
    }

    pub fn controller_luns(&self, controller: ControllerId) -> Vec<LunId> {
        (0..self.luns.len())
            .map(LunId)
            .filter(|l| self.lun_controller(*l) == controller)
            .collect()
    }

    pub fn controller_igroups(&self, controller: ControllerId) -> Vec<IgroupId> {
        self.controller(controller).igroups.clone()
    }

    /// Mount options a host should use for a qtree: access mode first, then
    /// either the declared overrides or the workload/OS defaults.
    pub fn host_qtree_mount_options(&self, host: HostId, qtree: QtreeId) -> Vec<String> {
        self.qtree(qtree)
            .mount_options
            .get(&host)
            .cloned()
            .unwrap_or_default()
    }

    /// Every protocol some volume is served over.
    pub fn allowed_protocols(&self) -> BTreeSet<Protocol> {
        self.volumes.iter().filter_map(|v| v.protocol).collect()
    }

    pub fn latest_revision(&self) -> Option<&Revision> {
        self.revisions.iter().max_by_key(|r| (r.major, r.minor))
    }

    /// CHAP password: prefix, short name and `123`, zero padded to 12
    /// characters and cut at 16.
    pub fn iscsi_chap_password(&self, prefix: &str) -> String {
        let password = format!("{prefix}{}123", self.project.short_name);
        let mut password = format!("{password:0>12}");
        password.truncate(16);
        password
    }

    pub fn default_iscsi_chap_password(&self) -> String {
        self.iscsi_chap_password(&self.chap_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn revision(major: u32, minor: u32) -> Revision {
        Revision {
            major,
            minor,
            date: "2010-01-01".into(),
            author_initials: "JD".into(),
            remark: "draft".into(),
            reviewer: None,
            review_date: None,
        }
    }

    #[test]
    fn test_chap_password() {
        let mut graph = ProjectGraph::default();
        graph.project.short_name = "abc".into();
        assert_eq!(graph.iscsi_chap_password("x"), "00000xabc123");
        assert_eq!(graph.iscsi_chap_password("docgen"), "docgenabc123");

        graph.project.short_name = "verylongname".into();
        assert_eq!(graph.iscsi_chap_password("docgen"), "docgenverylongna");

        graph.chap_prefix = "p".into();
        graph.project.short_name = "abc".into();
        assert_eq!(graph.default_iscsi_chap_password(), "00000pabc123");
    }

    #[test]
    fn test_latest_revision() {
        let mut graph = ProjectGraph::default();
        assert!(graph.latest_revision().is_none());
        graph.revisions = vec![revision(1, 2), revision(2, 0), revision(1, 10)];
        let latest = graph.latest_revision().unwrap();
        assert_eq!((latest.major, latest.minor), (2, 0));
    }
}
