use std::str::FromStr;

use log::{debug, trace};

use crate::{
    config::{
        AutoDelete, AutoSize, ControllerId, ControllerType, ProtectionRefs, Protocol,
        Volume, VolumeId, VolumeKind, WorkloadType,
    },
    constants::{
        ARCHIVE_RESERVE, DEFAULT_ISCSI_SNAPSPACE, DEFAULT_RESERVE, DEFAULT_USABLE_GB,
        DEFAULT_VOLUME_OPTIONS, ROOT_VAULT_SET_PREFIX, ROOT_VOLUME_RESERVE, ROOT_VOLUME_SIZE_GB,
        ROOT_VOLUME_SUFFIX, VOLUME_SET_DATA_SHARE,
    },
    document::{NodeId, NodeKind},
    error::{
        ConfigurationInvalidError, DuplicateDefinitionError, EntityKind, MalformedInputError,
        ReportError, SanplanError,
    },
    primitives::Gigabytes,
};

use super::{parse_field, required_attr, Resolver};

/// Members of an expanded volume set: workload, share of the declared total
/// and snapshot reserve.
const VOLUME_SET_LAYOUT: [(WorkloadType, f64, f64); 5] = [
    (WorkloadType::OraData, VOLUME_SET_DATA_SHARE, 20.0),
    (WorkloadType::OraIndx, 0.2, 20.0),
    (WorkloadType::OraRedo, 0.05, 0.0),
    (WorkloadType::OraUndo, 0.2, 0.0),
    (WorkloadType::OraArch, 0.35, 50.0),
];

/// Everything needed to size and register a new volume.
pub(super) struct VolumeSpec {
    pub name: String,
    pub controller: ControllerId,
    pub pool: String,
    pub kind: VolumeKind,
    pub workload: WorkloadType,
    pub workload_id: Option<String>,
    pub protocol: Option<Protocol>,
    pub usable: Gigabytes,
    /// Explicit raw size; derived from the reserve when absent.
    pub raw: Option<Gigabytes>,
    pub reserve: f64,
    pub iscsi_snapspace: f64,
    pub options: Vec<String>,
    pub protection: ProtectionRefs,
    pub node: Option<NodeId>,
}

impl VolumeSpec {
    pub fn new(name: String, controller: ControllerId, pool: String, usable: Gigabytes) -> Self {
        Self {
            name,
            controller,
            pool,
            kind: VolumeKind::Declared,
            workload: WorkloadType::Fs,
            workload_id: None,
            protocol: Some(Protocol::Nfs),
            usable,
            raw: None,
            reserve: DEFAULT_RESERVE,
            iscsi_snapspace: 0.0,
            options: Vec::new(),
            protection: ProtectionRefs::default(),
            node: None,
        }
    }
}

impl Resolver<'_> {
    /// Creates root volumes, then every declared volume and volume set in
    /// document order.
    pub(super) fn resolve_volumes(&mut self) -> Result<(), SanplanError> {
        debug!("Resolving root volumes");
        self.resolve_root_volumes()?;

        let doc = self.doc;
        let mut nodes = Vec::new();
        for site in doc.children_of_kind(self.root, NodeKind::Site) {
            for filer in doc.children_of_kind(site, NodeKind::Filer) {
                for vfiler in doc.children_of_kind(filer, NodeKind::Vfiler) {
                    for aggregate in doc.children_of_kind(vfiler, NodeKind::Aggregate) {
                        nodes.extend(doc.children(aggregate).filter(|node| {
                            matches!(doc.kind(*node), NodeKind::Volume | NodeKind::VolumeSet)
                        }));
                    }
                }
            }
        }

        debug!("Resolving {} volume declarations", nodes.len());
        for node in nodes {
            match doc.kind(node) {
                NodeKind::VolumeSet => self.resolve_volume_set(node)?,
                _ => self.resolve_declared_volume(node)?,
            }
        }
        Ok(())
    }

    fn resolve_root_volumes(&mut self) -> Result<(), SanplanError> {
        for controller_type in [ControllerType::Primary, ControllerType::Nearstore] {
            let controllers: Vec<ControllerId> = (0..self.graph.controllers.len())
                .map(ControllerId)
                .filter(|c| self.graph.controller(*c).controller_type == controller_type)
                .collect();

            for controller in controllers {
                let role = self.graph.site(self.graph.controller(controller).site).role;
                for partition in self.graph.controller(controller).partitions.clone() {
                    let partition = self.graph.partition(partition);
                    let mut spec = VolumeSpec::new(
                        format!("{}{ROOT_VOLUME_SUFFIX}", partition.name),
                        controller,
                        partition.root_pool.clone(),
                        Gigabytes(ROOT_VOLUME_SIZE_GB),
                    );
                    spec.kind = VolumeKind::Root;
                    spec.raw = Some(Gigabytes(ROOT_VOLUME_SIZE_GB));
                    spec.reserve = ROOT_VOLUME_RESERVE;
                    if controller_type == ControllerType::Primary {
                        spec.protection.vault = vec![format!("{ROOT_VAULT_SET_PREFIX}{role}")];
                    }
                    self.add_volume(spec)?;
                }
            }
        }
        Ok(())
    }

    fn resolve_declared_volume(&mut self, node: NodeId) -> Result<(), SanplanError> {
        let doc = self.doc;
        if let Some(number) = doc.attr(node, "restartnumbering") {
            self.volume_number = parse_field(number, EntityKind::Volume, "volume", "restartnumbering")?;
        }

        let name = match doc.attr(node, "name") {
            Some(name) => name.to_owned(),
            None => format!(
                "{}_vol{:02}{}",
                doc.attr(node, "prefix").unwrap_or(self.short_name()),
                self.volume_number,
                doc.attr(node, "suffix").unwrap_or_default()
            ),
        };
        self.volume_number += 1;

        let controller = self.enclosing_controller(node, &name)?;
        let pool = self.enclosing_pool(node, EntityKind::Volume, &name)?;

        let protocol = match doc.attr(node, "proto") {
            Some(proto) => Protocol::from_str(&proto.to_ascii_lowercase()).ok().structured(
                ConfigurationInvalidError::UnsupportedValue {
                    kind: EntityKind::Volume,
                    name: name.clone(),
                    field: "proto".into(),
                    value: proto.to_owned(),
                },
            )?,
            None => self
                .enclosing_partition(node)
                .and_then(|partition| self.graph.partition(partition).protocols.first().copied())
                .unwrap_or(Protocol::Nfs),
        };

        let workload = match doc.attr(node, "type") {
            Some(workload) => WorkloadType::from_str(workload).ok().structured(
                ConfigurationInvalidError::UnsupportedValue {
                    kind: EntityKind::Volume,
                    name: name.clone(),
                    field: "type".into(),
                    value: workload.to_owned(),
                },
            )?,
            None => WorkloadType::Fs,
        };

        let usable = match doc.child_text(node, NodeKind::UsableStorage) {
            Some(usable) => parse_field(usable, EntityKind::Volume, &name, "usablestorage")?,
            None => {
                self.diagnostics.warn(format!(
                    "Volume '{name}' has no usable size, assuming {DEFAULT_USABLE_GB} GB"
                ));
                Gigabytes(DEFAULT_USABLE_GB)
            }
        };

        let mut iscsi_snapspace = 0.0;
        let mut reserve = match doc.attr(node, "snapreserve") {
            Some(reserve) => parse_field(reserve, EntityKind::Volume, &name, "snapreserve")?,
            None if protocol == Protocol::Iscsi => {
                iscsi_snapspace = match doc.attr(node, "iscsi_snapspace") {
                    Some(space) => parse_field(space, EntityKind::Volume, &name, "iscsi_snapspace")?,
                    None => DEFAULT_ISCSI_SNAPSPACE,
                };
                0.0
            }
            None if matches!(workload, WorkloadType::OraUndo | WorkloadType::OraArch) => {
                ARCHIVE_RESERVE
            }
            None => DEFAULT_RESERVE,
        };

        let mut raw = None;
        if let Some(snap) = doc.child_text(node, NodeKind::SnapStorage) {
            let snap: Gigabytes = parse_field(snap, EntityKind::Volume, &name, "snapstorage")?;
            let total = usable + snap;
            reserve = (100.0 - usable.value() / total.value() * 100.0).round();
            raw = Some(total);
        }

        let mut spec = VolumeSpec::new(name, controller, pool, usable);
        spec.workload = workload;
        spec.workload_id = doc.attr(node, "oracle").map(str::to_owned);
        spec.protocol = Some(protocol);
        spec.raw = raw;
        spec.reserve = reserve;
        spec.iscsi_snapspace = iscsi_snapspace;
        spec.options = doc
            .children_of_kind(node, NodeKind::VolumeOption)
            .map(|option| doc.text(option).to_owned())
            .collect();
        spec.protection = self.protection_refs(node, |_| true);
        spec.node = Some(node);

        let volume = self.add_volume(spec)?;
        let autosize = self.auto_size(node, volume)?;
        let autodelete = self.auto_delete(node);
        let volume = &mut self.graph.volumes[volume.0];
        volume.autosize = autosize;
        volume.autodelete = autodelete;
        Ok(())
    }

    /// Expands a database volume set into its five typed volumes.
    fn resolve_volume_set(&mut self, node: NodeId) -> Result<(), SanplanError> {
        let doc = self.doc;
        if let Some(number) = doc.attr(node, "restartnumbering") {
            self.volume_number =
                parse_field(number, EntityKind::VolumeSet, "volumeset", "restartnumbering")?;
        }
        let label = format!("{}_vol{:02}", self.short_name(), self.volume_number);

        let controller = self.enclosing_controller(node, &label)?;
        let pool = self.enclosing_pool(node, EntityKind::VolumeSet, &label)?;
        let sid = required_attr(doc, node, EntityKind::VolumeSet, &label, "oracle")?.to_owned();

        let shared = self.protection_refs(node, |reference| doc.attr(reference, "archivelogs").is_none());
        let mut archive_vaults: Vec<String> = doc
            .children_of_kind(node, NodeKind::SnapVaultSetRef)
            .filter(|reference| doc.attr(*reference, "archivelogs").is_some())
            .filter_map(|reference| doc.attr(reference, "name").map(str::to_owned))
            .collect();
        if archive_vaults.is_empty() {
            archive_vaults = shared.vault.clone();
            if !shared.vault.is_empty() {
                self.diagnostics.warn(format!(
                    "No archive log specific snapvault defined for database '{sid}'"
                ));
            }
        }

        let total: Gigabytes = match doc.child_text(node, NodeKind::DataStorage) {
            Some(data) => {
                let data: Gigabytes = parse_field(data, EntityKind::VolumeSet, &label, "datastorage")?;
                data / VOLUME_SET_DATA_SHARE
            }
            None => parse_field(
                doc.child_text(node, NodeKind::UsableStorage).structured(
                    MalformedInputError::MissingField {
                        kind: EntityKind::VolumeSet,
                        name: label.clone(),
                        field: "usablestorage".into(),
                    },
                )?,
                EntityKind::VolumeSet,
                &label,
                "usablestorage",
            )?,
        };

        trace!("Expanding volume set for database '{sid}' with {total} GB usable");
        for (workload, share, reserve) in VOLUME_SET_LAYOUT {
            let name = format!("{}_vol{:02}", self.short_name(), self.volume_number);
            self.volume_number += 1;

            let mut spec = VolumeSpec::new(name, controller, pool.clone(), total * share);
            spec.workload = workload;
            spec.workload_id = Some(sid.clone());
            spec.reserve = reserve;
            spec.protection = shared.clone();
            if workload == WorkloadType::OraArch {
                spec.protection.vault = archive_vaults.clone();
            }
            spec.node = Some(node);
            self.add_volume(spec)?;
        }
        Ok(())
    }

    /// Sizes a volume and registers it with the graph and its controller.
    pub(super) fn add_volume(&mut self, spec: VolumeSpec) -> Result<VolumeId, SanplanError> {
        let controller = self.graph.controller(spec.controller);
        if self.graph.volume_by_name(spec.controller, &spec.name).is_some() {
            return Err(SanplanError::new(DuplicateDefinitionError::Name {
                kind: EntityKind::Volume,
                name: spec.name,
                scope: format!("controller '{}'", controller.name),
            }));
        }

        let iscsi_usable = spec.usable;
        let mut usable = spec.usable;
        let mut raw = spec.raw;
        if spec.kind == VolumeKind::Declared && spec.protocol == Some(Protocol::Iscsi) {
            if spec.protection.is_empty() {
                raw = Some(usable + Gigabytes(1.0));
            } else {
                // Blocks of a LUN may all change between snapshots.
                usable = usable * 2.0 + usable * (spec.iscsi_snapspace / 100.0);
            }
        }
        let raw = match raw {
            Some(raw) => raw,
            None => usable.with_reserve(spec.reserve).structured(
                ConfigurationInvalidError::FullSnapshotReserve {
                    volume: spec.name.clone(),
                },
            )?,
        };

        let space_guarantee = spec
            .node
            .and_then(|node| self.doc.attr(node, "space_guarantee"))
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| {
                if controller.is_nearstore() { "none" } else { "volume" }.to_owned()
            });
        let options = if spec.options.is_empty() {
            DEFAULT_VOLUME_OPTIONS.iter().map(|option| option.to_string()).collect()
        } else {
            spec.options
        };

        let id = VolumeId(self.graph.volumes.len());
        trace!(
            "Adding volume '{}:/vol/{}' of {usable} GB usable, {raw} GB raw",
            controller.name,
            spec.name
        );
        self.graph.volumes.push(Volume {
            name: spec.name,
            controller: spec.controller,
            pool: spec.pool,
            kind: spec.kind,
            workload: spec.workload,
            workload_id: spec.workload_id,
            protocol: spec.protocol,
            usable,
            iscsi_usable,
            raw,
            snap_reserve: spec.reserve.round() as u32,
            iscsi_snapspace: spec.iscsi_snapspace,
            space_guarantee,
            options,
            protection: spec.protection,
            autosize: None,
            autodelete: None,
            qtrees: Vec::new(),
            snapshots: Vec::new(),
            vaults: Vec::new(),
            mirrors: Vec::new(),
            node: spec.node,
        });

        // Root volumes stay ahead of every other volume on their controller.
        let volumes = &mut self.graph.controllers[spec.controller.0].volumes;
        if spec.kind == VolumeKind::Root {
            let position = volumes
                .iter()
                .take_while(|v| self.graph.volumes[v.0].kind == VolumeKind::Root)
                .count();
            volumes.insert(position, id);
        } else {
            volumes.push(id);
        }
        Ok(id)
    }

    /// Name of the pool declaration enclosing a volume declaration.
    fn enclosing_pool(
        &self,
        node: NodeId,
        kind: EntityKind,
        name: &str,
    ) -> Result<String, SanplanError> {
        self.doc
            .nearest_ancestor(node, NodeKind::Aggregate)
            .and_then(|aggregate| self.doc.attr(aggregate, "name"))
            .map(str::to_owned)
            .structured(MalformedInputError::MissingField {
                kind,
                name: name.to_owned(),
                field: "aggregate".into(),
            })
    }

    /// Protection policy references declared directly under a node.
    fn protection_refs(&self, node: NodeId, keep: impl Fn(NodeId) -> bool) -> ProtectionRefs {
        let doc = self.doc;
        let names = |kind| -> Vec<String> {
            doc.children_of_kind(node, kind)
                .filter(|reference| keep(*reference))
                .filter_map(|reference| doc.attr(reference, "name").map(str::to_owned))
                .collect()
        };
        ProtectionRefs {
            snapshot: names(NodeKind::SnapSetRef),
            vault: names(NodeKind::SnapVaultSetRef),
            mirror: names(NodeKind::SnapMirrorSetRef),
            vault_mirror: names(NodeKind::SnapVaultMirrorSetRef),
        }
    }

    /// Auto-grow settings from the declaration itself or its pool.
    pub(super) fn auto_size(
        &self,
        node: NodeId,
        volume: VolumeId,
    ) -> Result<Option<AutoSize>, SanplanError> {
        let doc = self.doc;
        let Some(setting) = doc
            .first_child(node, NodeKind::AutoSize)
            .or_else(|| doc.parent(node).and_then(|pool| doc.first_child(pool, NodeKind::AutoSize)))
        else {
            return Ok(None);
        };

        let name = &self.graph.volume(volume).name;
        Ok(Some(AutoSize {
            max: required_attr(doc, setting, EntityKind::Volume, name, "max")?.to_owned(),
            increment: required_attr(doc, setting, EntityKind::Volume, name, "increment")?
                .to_owned(),
        }))
    }

    /// Snapshot auto-delete settings from the declaration itself or its pool.
    pub(super) fn auto_delete(&self, node: NodeId) -> Option<AutoDelete> {
        let doc = self.doc;
        let setting = doc.first_child(node, NodeKind::AutoDelete).or_else(|| {
            doc.parent(node)
                .and_then(|pool| doc.first_child(pool, NodeKind::AutoDelete))
        })?;

        let mut autodelete = AutoDelete::default();
        for (field, value) in [
            ("commitment", &mut autodelete.commitment),
            ("trigger", &mut autodelete.trigger),
            ("target_free_space", &mut autodelete.target_free_space),
            ("delete_order", &mut autodelete.delete_order),
            ("defer_delete", &mut autodelete.defer_delete),
        ] {
            if let Some(declared) = doc.attr(setting, field) {
                *value = declared.to_owned();
            }
        }
        Some(autodelete)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::{
        error::ErrorKind,
        resolver::fixtures::{resolve_project, single_site, single_site_with, volume},
    };

    use super::*;

    #[test]
    fn test_root_volumes() {
        let resolution = resolve_project(&single_site("")).unwrap();
        let graph = &resolution.graph;

        let root = volume(graph, "abc_root");
        assert_eq!(root.kind, VolumeKind::Root);
        assert_eq!(root.usable, Gigabytes(0.02));
        assert_eq!(root.raw, Gigabytes(0.02));
        assert_eq!(root.snap_reserve, 20);
        assert_eq!(root.pool, "aggr0");
        assert_eq!(root.protection.vault, vec!["default_primary"]);
        assert_eq!(root.create_size().unwrap(), "20m");

        let nearstore = graph.controller_by_name("alpha-ns1").unwrap();
        let nearstore_root = graph.volume(graph.controller(nearstore).volumes[0]);
        assert_eq!(nearstore_root.name, "abc_root");
        assert!(nearstore_root.protection.is_empty());
        assert_eq!(nearstore_root.space_guarantee, "none");
        assert_eq!(root.space_guarantee, "volume");
    }

    #[test]
    fn test_declared_volume_defaults() {
        let resolution = resolve_project(&single_site(indoc! {r#"
            <volume>
              <usablestorage>80</usablestorage>
            </volume>
            <volume name="archive" type="oraarch" oracle="PRD">
              <usablestorage>50</usablestorage>
              <option>nosnap=on</option>
            </volume>
            <volume>
              <usablestorage>10</usablestorage>
              <snapstorage>5</snapstorage>
            </volume>
            <volume restartnumbering="7" prefix="db" suffix="x" space_guarantee="NONE"/>
        "#}))
        .unwrap();
        let graph = &resolution.graph;

        let first = volume(graph, "abc_vol00");
        assert_eq!(first.protocol, Some(Protocol::Nfs));
        assert_eq!(first.snap_reserve, 20);
        assert_eq!(first.usable, Gigabytes(80.0));
        assert_eq!(first.raw, Gigabytes(100.0));
        assert_eq!(first.options, vec!["nvfail=on", "create_ucode=on", "convert_ucode=on"]);
        assert_eq!(first.pool, "aggr1");

        // Explicitly named volumes still advance the counter.
        let archive = volume(graph, "archive");
        assert_eq!(archive.workload, WorkloadType::OraArch);
        assert_eq!(archive.workload_id.as_deref(), Some("PRD"));
        assert_eq!(archive.snap_reserve, 50);
        assert_eq!(archive.raw, Gigabytes(100.0));
        assert_eq!(archive.options, vec!["nosnap=on"]);

        let snapped = volume(graph, "abc_vol02");
        assert_eq!(snapped.raw, Gigabytes(15.0));
        assert_eq!(snapped.snap_reserve, 33);

        let renumbered = volume(graph, "db_vol07x");
        assert_eq!(renumbered.usable, Gigabytes(DEFAULT_USABLE_GB));
        assert_eq!(renumbered.space_guarantee, "none");
        assert!(resolution.diagnostics.mentions("'db_vol07x' has no usable size"));
    }

    #[test]
    fn test_iscsi_sizing() {
        let resolution = resolve_project(&single_site(indoc! {r#"
            <volume name="plain" proto="iSCSI">
              <usablestorage>100</usablestorage>
            </volume>
            <volume name="snapped" proto="iscsi" iscsi_snapspace="10">
              <usablestorage>100</usablestorage>
              <snapvaultsetref name="default_primary"/>
            </volume>
        "#}))
        .unwrap();
        let graph = &resolution.graph;

        let plain = volume(graph, "plain");
        assert_eq!(plain.protocol, Some(Protocol::Iscsi));
        assert_eq!(plain.snap_reserve, 0);
        assert_eq!(plain.iscsi_snapspace, DEFAULT_ISCSI_SNAPSPACE);
        assert_eq!(plain.usable, Gigabytes(100.0));
        assert_eq!(plain.raw, Gigabytes(101.0));

        let snapped = volume(graph, "snapped");
        assert_eq!(snapped.iscsi_usable, Gigabytes(100.0));
        assert_eq!(snapped.usable, Gigabytes(210.0));
        assert_eq!(snapped.raw, Gigabytes(210.0));
    }

    #[test]
    fn test_autosize_and_autodelete() {
        let resolution = resolve_project(&single_site(indoc! {r#"
            <autosize max="200g" increment="10g"/>
            <volume name="inherits">
              <usablestorage>10</usablestorage>
            </volume>
            <volume name="own">
              <usablestorage>10</usablestorage>
              <autosize max="50g" increment="5g"/>
              <autodelete commitment="disrupt" target_free_space="20"/>
            </volume>
        "#}))
        .unwrap();
        let graph = &resolution.graph;

        let inherits = volume(graph, "inherits");
        assert_eq!(
            inherits.autosize,
            Some(AutoSize {
                max: "200g".into(),
                increment: "10g".into()
            })
        );
        assert!(inherits.autodelete.is_none());

        let own = volume(graph, "own");
        assert_eq!(own.autosize.as_ref().unwrap().max, "50g");
        let autodelete = own.autodelete.as_ref().unwrap();
        assert_eq!(autodelete.commitment, "disrupt");
        assert_eq!(autodelete.target_free_space, "20");
        assert_eq!(autodelete.trigger, "volume");
        assert_eq!(autodelete.delete_order, "oldest_first");
    }

    #[test]
    fn test_volume_set_expansion() {
        let resolution = resolve_project(&single_site(indoc! {r#"
            <volume name="first"><usablestorage>10</usablestorage></volume>
            <volumeset oracle="PRD">
              <usablestorage>100</usablestorage>
              <snapvaultsetref name="default_primary"/>
            </volumeset>
        "#}))
        .unwrap();
        let graph = &resolution.graph;

        let members: Vec<&Volume> = (1..=5)
            .map(|n| volume(graph, &format!("abc_vol{n:02}")))
            .collect();
        let workloads: Vec<WorkloadType> = members.iter().map(|v| v.workload).collect();
        assert_eq!(
            workloads,
            vec![
                WorkloadType::OraData,
                WorkloadType::OraIndx,
                WorkloadType::OraRedo,
                WorkloadType::OraUndo,
                WorkloadType::OraArch,
            ]
        );
        let reserves: Vec<u32> = members.iter().map(|v| v.snap_reserve).collect();
        assert_eq!(reserves, vec![20, 20, 0, 0, 50]);
        assert_eq!(members[0].usable, Gigabytes(40.0));
        assert_eq!(members[2].usable, Gigabytes(5.0));
        assert_eq!(members[4].raw, Gigabytes(70.0));
        assert!(members.iter().all(|v| v.workload_id.as_deref() == Some("PRD")));
        assert!(members.iter().all(|v| v.protocol == Some(Protocol::Nfs)));

        // The archive volume shares the set's vault policy, with a warning.
        assert_eq!(members[4].protection.vault, vec!["default_primary"]);
        assert!(resolution.diagnostics.mentions("No archive log specific snapvault"));
    }

    #[test]
    fn test_volume_set_archive_override() {
        let resolution = resolve_project(&single_site_with(
            indoc! {r#"
                <volumeset oracle="PRD">
                  <datastorage>20</datastorage>
                  <snapvaultsetref name="default_primary"/>
                  <snapvaultsetref name="archive_vault" archivelogs="yes"/>
                </volumeset>
            "#},
            r#"<snapvaultset id="archive_vault" targetfiler="alpha-ns1" target_suffix="a"/>"#,
        ))
        .unwrap();
        let graph = &resolution.graph;

        assert_eq!(volume(graph, "abc_vol00").usable, Gigabytes(20.0));
        assert_eq!(volume(graph, "abc_vol00").protection.vault, vec!["default_primary"]);
        assert_eq!(volume(graph, "abc_vol04").protection.vault, vec!["archive_vault"]);
        assert!(!resolution.diagnostics.mentions("No archive log specific snapvault"));
    }

    #[test]
    fn test_volume_set_requires_size() {
        let error = resolve_project(&single_site(r#"<volumeset oracle="PRD"/>"#)).unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::MalformedInput(MalformedInputError::MissingField {
                kind: EntityKind::VolumeSet,
                name: "abc_vol00".into(),
                field: "usablestorage".into(),
            })
        );
    }

    #[test]
    fn test_full_reserve() {
        let error =
            resolve_project(&single_site(r#"<volume name="full" snapreserve="100"/>"#)).unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::ConfigurationInvalid(ConfigurationInvalidError::FullSnapshotReserve {
                volume: "full".into()
            })
        );
    }

    #[test]
    fn test_duplicate_volume_name() {
        let error = resolve_project(&single_site(indoc! {r#"
            <volume name="data"/>
            <volume name="data"/>
        "#}))
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::DuplicateDefinition(DuplicateDefinitionError::Name {
                kind: EntityKind::Volume,
                name: "data".into(),
                scope: "controller 'alpha-f1'".into(),
            })
        );
    }

    #[test]
    fn test_unsupported_protocol() {
        let error = resolve_project(&single_site(r#"<volume name="data" proto="fcp"/>"#)).unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::ConfigurationInvalid(ConfigurationInvalidError::UnsupportedValue {
                kind: EntityKind::Volume,
                name: "data".into(),
                field: "proto".into(),
                value: "fcp".into(),
            })
        );
    }
}
