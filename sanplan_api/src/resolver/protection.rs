use log::{debug, trace};

use crate::{
    config::{
        ControllerId, ControllerType, MirrorCopy, MirrorId, ProtectionRefs, Protocol, SiteRole,
        Snapshot, SnapshotId, VaultCopy, VaultId, VolumeId, VolumeKind, WorkloadType,
    },
    constants::{DEFAULT_MIRROR_SUFFIX, DEFAULT_VAULT_MULTIPLIER, DEFAULT_VAULT_SUFFIX},
    document::{NodeId, NodeKind},
    error::{
        ConfigurationInvalidError, EntityKind, MissingAttributeError, ReportError, SanplanError,
        UndefinedReferenceError,
    },
    primitives::Gigabytes,
};

use super::{optional_text, parse_field, required_attr, volumes::VolumeSpec, Resolver};

impl Resolver<'_> {
    /// Derives snapshot schedules, then mirror targets, then vault targets.
    pub(super) fn resolve_protection(&mut self) -> Result<(), SanplanError> {
        debug!("Resolving snapshot schedules");
        for volume in self.graph.volume_ids().collect::<Vec<_>>() {
            self.resolve_snapshots(volume)?;
        }

        let mirrored: Vec<VolumeId> = self
            .graph
            .volume_ids()
            .filter(|v| !self.graph.volume(*v).protection.mirror.is_empty())
            .collect();
        debug!("Resolving mirrors of {} volumes", mirrored.len());
        for volume in mirrored {
            self.resolve_mirrors(volume)?;
        }

        let vaulted: Vec<VolumeId> = self
            .graph
            .volume_ids()
            .filter(|v| !self.graph.volume(*v).protection.vault.is_empty())
            .collect();
        debug!("Resolving vaults of {} volumes", vaulted.len());
        for volume in vaulted {
            self.resolve_vaults(volume)?;
        }
        Ok(())
    }

    fn resolve_snapshots(&mut self, volume: VolumeId) -> Result<(), SanplanError> {
        let source = self.graph.volume(volume);
        if let Some(set) = source.protection.snapshot.first() {
            return Err(SanplanError::new(
                ConfigurationInvalidError::SnapshotSetUnsupported {
                    volume: source.name.clone(),
                    set: set.clone(),
                },
            ));
        }
        if source.kind != VolumeKind::Root {
            return Ok(());
        }

        let snapshot = if self.graph.controller(source.controller).is_nearstore() {
            Snapshot {
                volume,
                weekly: 4,
                daily: 14,
                hourly: "6@8,12,16,20".into(),
            }
        } else {
            Snapshot {
                volume,
                weekly: 0,
                daily: 0,
                hourly: "0".into(),
            }
        };

        let id = SnapshotId(self.graph.snapshots.len());
        self.graph.snapshots.push(snapshot);
        self.graph.volumes[volume.0].snapshots.push(id);
        Ok(())
    }

    /// Creates a vault target and its relationships for every vault policy
    /// the volume references.
    fn resolve_vaults(&mut self, source: VolumeId) -> Result<(), SanplanError> {
        let volume = self.graph.volume(source);
        if matches!(volume.workload, WorkloadType::OraRedo | WorkloadType::OraCm) {
            trace!("Volume '{}' of type '{}' is not vaulted", volume.name, volume.workload);
            return Ok(());
        }

        let doc = self.doc;
        for reference in volume.protection.vault.clone() {
            let set = self.policy_set(NodeKind::SnapVaultSet, EntityKind::VaultSet, &reference, source)?;

            let (target, created) = match doc.attr(set, "targetvolume") {
                Some(volume_name) => (self.existing_vault_target(set, &reference, volume_name)?, false),
                None => (self.create_vault_target(set, &reference, source)?, true),
            };

            let target_volume = self.graph.volume(target);
            if let Some(pool) = self.pool_declaration(target_volume.controller, &target_volume.pool) {
                let autosize = self.auto_size(pool, target)?;
                let autodelete = self.auto_delete(pool);
                let target_volume = &mut self.graph.volumes[target.0];
                if autosize.is_some() {
                    target_volume.autosize = autosize;
                }
                if autodelete.is_some() {
                    target_volume.autodelete = autodelete;
                }
            }

            for vault in doc.children_of_kind(set, NodeKind::SnapVault) {
                let basename = required_attr(doc, vault, EntityKind::VaultSet, &reference, "basename")?;
                let id = VaultId(self.graph.vaults.len());
                self.graph.vaults.push(VaultCopy {
                    source,
                    target,
                    basename: basename.to_owned(),
                    snap_schedule: optional_text(doc, vault, NodeKind::SnapSchedule),
                    vault_schedule: optional_text(doc, vault, NodeKind::SnapVaultSchedule),
                });
                self.graph.volumes[source.0].vaults.push(id);
            }

            if created {
                self.resolve_mirrors(target)?;
            }
        }
        Ok(())
    }

    /// Turns a declared volume named by a vault policy into its target.
    fn existing_vault_target(
        &mut self,
        set: NodeId,
        reference: &str,
        volume_name: &str,
    ) -> Result<VolumeId, SanplanError> {
        let filer = self.doc.attr(set, "targetfiler").structured(MissingAttributeError::Field {
            kind: EntityKind::VaultSet,
            name: reference.to_owned(),
            field: "targetfiler".into(),
        })?;
        let controller = self.controller_named(filer, reference)?;
        let target = self.graph.volume_by_name(controller, volume_name).structured(
            UndefinedReferenceError::Entity {
                referrer: reference.to_owned(),
                kind: EntityKind::Volume,
                name: format!("{filer}:{volume_name}"),
            },
        )?;

        trace!("Using '{filer}:{volume_name}' as the target of vault policy '{reference}'");
        self.graph.volumes[target.0].kind = VolumeKind::SnapvaultTarget;
        Ok(target)
    }

    fn create_vault_target(
        &mut self,
        set: NodeId,
        reference: &str,
        source: VolumeId,
    ) -> Result<VolumeId, SanplanError> {
        let doc = self.doc;
        let role = self.graph.site(self.graph.volume_site(source)).role;
        let controller = match doc.attr(set, "targetfiler") {
            Some(filer) => self.controller_named(filer, reference)?,
            None => self
                .first_controller(ControllerType::Nearstore, |site_role| site_role == role)
                .structured(UndefinedReferenceError::NoCandidate {
                    referrer: reference.to_owned(),
                    kind: EntityKind::Controller,
                    criterion: format!("of type nearstore at a {role} site"),
                })?,
        };

        let multiplier = match doc.attr(set, "multiplier") {
            Some(multiplier) => parse_field(multiplier, EntityKind::VaultSet, reference, "multiplier")?,
            None => DEFAULT_VAULT_MULTIPLIER,
        };
        let target_usable: Option<Gigabytes> = doc
            .attr(set, "targetusable")
            .map(|usable| parse_field(usable, EntityKind::VaultSet, reference, "targetusable"))
            .transpose()?;
        let suffix = doc.attr(set, "target_suffix").unwrap_or(DEFAULT_VAULT_SUFFIX);

        let volume = self.graph.volume(source);
        let usable = target_usable.unwrap_or_else(|| {
            if volume.protocol == Some(Protocol::Iscsi) {
                volume.iscsi_usable * multiplier
            } else {
                volume.usable * multiplier
            }
        });

        let pool = self.target_pool(set, controller, &volume.pool);
        let mut spec = VolumeSpec::new(format!("{}{suffix}", volume.name), controller, pool, usable);
        spec.kind = VolumeKind::SnapvaultTarget;
        spec.workload = volume.workload;
        spec.workload_id = volume.workload_id.clone();
        spec.protocol = None;
        spec.reserve = 0.0;
        spec.protection = ProtectionRefs {
            mirror: volume.protection.vault_mirror.clone(),
            ..Default::default()
        };
        self.add_volume(spec)
    }

    /// Creates a mirror target and its relationships for every mirror policy
    /// the volume references.
    fn resolve_mirrors(&mut self, source: VolumeId) -> Result<(), SanplanError> {
        let doc = self.doc;
        for reference in self.graph.volume(source).protection.mirror.clone() {
            let set = self.policy_set(NodeKind::SnapMirrorSet, EntityKind::MirrorSet, &reference, source)?;

            let role = self.graph.site(self.graph.volume_site(source)).role;
            let controller = match doc.attr(set, "targetfiler") {
                Some(filer) => self.controller_named(filer, &reference)?,
                None => {
                    let controller = self
                        .first_controller(ControllerType::Primary, |site_role| site_role != role)
                        .structured(UndefinedReferenceError::NoCandidate {
                            referrer: reference.clone(),
                            kind: EntityKind::Controller,
                            criterion: format!("of type primary at a {} site", role.opposite()),
                        })?;
                    self.diagnostics.warn(format!(
                        "No target controller for mirror policy '{reference}', using '{}'",
                        self.graph.controller(controller).name
                    ));
                    controller
                }
            };
            let suffix = doc.attr(set, "target_suffix").unwrap_or(DEFAULT_MIRROR_SUFFIX);

            let volume = self.graph.volume(source);
            let pool = self.target_pool(set, controller, &volume.pool);
            let mut spec =
                VolumeSpec::new(format!("{}{suffix}", volume.name), controller, pool, volume.usable);
            spec.kind = VolumeKind::SnapmirrorTarget;
            spec.workload = volume.workload;
            spec.workload_id = volume.workload_id.clone();
            spec.protocol = volume.protocol;
            spec.raw = Some(volume.raw);
            spec.reserve = f64::from(volume.snap_reserve);
            spec.iscsi_snapspace = volume.iscsi_snapspace;
            spec.options = volume.options.clone();
            let iscsi_usable = volume.iscsi_usable;

            let target = self.add_volume(spec)?;
            self.graph.volumes[target.0].iscsi_usable = iscsi_usable;

            for mirror in doc.children_of_kind(set, NodeKind::SnapMirror) {
                let field = |kind| optional_text(doc, mirror, kind).unwrap_or_else(|| "*".into());
                let id = MirrorId(self.graph.mirrors.len());
                self.graph.mirrors.push(MirrorCopy {
                    source,
                    target,
                    minute: field(NodeKind::Minute),
                    hour: field(NodeKind::Hour),
                    day_of_month: field(NodeKind::DayOfMonth),
                    day_of_week: field(NodeKind::DayOfWeek),
                    arguments: doc.attr(mirror, "arguments").unwrap_or("-").to_owned(),
                });
                self.graph.volumes[source.0].mirrors.push(id);
            }
        }
        Ok(())
    }

    /// Project-level policy declaration with the given id.
    fn policy_set(
        &self,
        kind: NodeKind,
        entity: EntityKind,
        id: &str,
        source: VolumeId,
    ) -> Result<NodeId, SanplanError> {
        self.doc
            .children_of_kind(self.root, kind)
            .find(|set| self.doc.attr(*set, "id") == Some(id))
            .structured(UndefinedReferenceError::Entity {
                referrer: self.graph.volume(source).name.clone(),
                kind: entity,
                name: id.to_owned(),
            })
    }

    fn controller_named(&self, name: &str, referrer: &str) -> Result<ControllerId, SanplanError> {
        self.graph
            .controller_by_name(name)
            .structured(UndefinedReferenceError::Entity {
                referrer: referrer.to_owned(),
                kind: EntityKind::Controller,
                name: name.to_owned(),
            })
    }

    /// First declared controller of a type at a site whose role matches.
    fn first_controller(
        &self,
        controller_type: ControllerType,
        role_matches: impl Fn(SiteRole) -> bool,
    ) -> Option<ControllerId> {
        self.graph
            .controllers
            .iter()
            .position(|c| {
                c.controller_type == controller_type && role_matches(self.graph.site(c.site).role)
            })
            .map(ControllerId)
    }

    /// Pool of a target volume: the policy's `targetaggregate`, else the
    /// first pool declared directly under the target controller, else the
    /// source's pool.
    fn target_pool(&self, set: NodeId, controller: ControllerId, source_pool: &str) -> String {
        let doc = self.doc;
        doc.attr(set, "targetaggregate")
            .or_else(|| {
                doc.first_child(self.graph.controller(controller).node, NodeKind::Aggregate)
                    .and_then(|aggregate| doc.attr(aggregate, "name"))
            })
            .unwrap_or(source_pool)
            .to_owned()
    }

    /// Declaration of a named pool inside any partition of a controller.
    fn pool_declaration(&self, controller: ControllerId, pool: &str) -> Option<NodeId> {
        let doc = self.doc;
        doc.children_of_kind(self.graph.controller(controller).node, NodeKind::Vfiler)
            .flat_map(|vfiler| doc.children_of_kind(vfiler, NodeKind::Aggregate))
            .find(|aggregate| doc.attr(*aggregate, "name") == Some(pool))
    }
}
