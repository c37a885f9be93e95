use log::{debug, trace};

use crate::{
    config::{AccessMode, ControllerId, Export, Igroup, IgroupId, LunId},
    document::NodeKind,
    error::{
        DuplicateDefinitionError, EntityKind, ReportError, SanplanError, UndefinedReferenceError,
    },
};

use super::{required_attr, Resolver};

impl Resolver<'_> {
    /// Groups LUNs into initiator groups: the declared ones when any
    /// partition declares groups, else one group per distinct export list
    /// at each site.
    pub(super) fn resolve_igroups(&mut self) -> Result<(), SanplanError> {
        let doc = self.doc;
        let declared = self
            .graph
            .partitions
            .iter()
            .any(|partition| doc.first_child(partition.node, NodeKind::Igroup).is_some());

        if declared {
            debug!("Using declared initiator groups");
            self.declared_igroups()?;
            self.map_luns_to_igroups()
        } else {
            debug!("Consolidating {} LUNs into initiator groups", self.graph.luns.len());
            self.consolidate_igroups();
            Ok(())
        }
    }

    fn declared_igroups(&mut self) -> Result<(), SanplanError> {
        let doc = self.doc;
        for partition in 0..self.graph.partitions.len() {
            let partition = &self.graph.partitions[partition];
            let (controller, node) = (partition.controller, partition.node);
            let controller_name = self.graph.controller(controller).name.clone();
            let from = self
                .graph
                .first_partition(controller)
                .map(|first| first.primary_address)
                .unwrap_or(partition.primary_address);

            for declaration in doc.children_of_kind(node, NodeKind::Igroup) {
                let name = required_attr(doc, declaration, EntityKind::Igroup, "igroup", "name")?;
                let duplicate = self
                    .graph
                    .controller(controller)
                    .igroups
                    .iter()
                    .any(|group| self.graph.igroup(*group).name == name);
                if duplicate {
                    return Err(SanplanError::new(DuplicateDefinitionError::Name {
                        kind: EntityKind::Igroup,
                        name: name.to_owned(),
                        scope: format!("controller '{controller_name}'"),
                    }));
                }

                let mut exports = Vec::new();
                for member in doc.children_of_kind(declaration, NodeKind::Member) {
                    let host_name = required_attr(doc, member, EntityKind::Igroup, name, "name")?;
                    let host = self.graph.host_by_name(host_name).structured(
                        UndefinedReferenceError::Entity {
                            referrer: name.to_owned(),
                            kind: EntityKind::Host,
                            name: host_name.to_owned(),
                        },
                    )?;
                    exports.push(Export {
                        host,
                        from,
                        mode: AccessMode::Rw,
                        to: None,
                    });
                }

                let site = self.graph.controller(controller).site;
                self.push_igroup(Igroup {
                    name: name.to_owned(),
                    controller,
                    site,
                    os_type: None,
                    exports,
                    luns: Vec::new(),
                });
            }
        }
        Ok(())
    }

    /// Joins every declared LUN to the groups its `mapto` children name.
    fn map_luns_to_igroups(&mut self) -> Result<(), SanplanError> {
        let doc = self.doc;
        for lun in (0..self.graph.luns.len()).map(LunId) {
            let Some(node) = self.graph.lun(lun).node else {
                continue;
            };
            let lun_name = self.graph.lun(lun).name.clone();

            let mappings: Vec<_> = doc.children_of_kind(node, NodeKind::MapTo).collect();
            if mappings.is_empty() {
                self.diagnostics.warn(format!(
                    "LUN '{lun_name}' maps to no initiator group and is left unmapped"
                ));
                continue;
            }

            let controller = self.graph.lun_controller(lun);
            for mapping in mappings {
                let group_name = required_attr(doc, mapping, EntityKind::Lun, &lun_name, "igroup")?;
                let group = self.igroup_named(controller, group_name).structured(
                    UndefinedReferenceError::Entity {
                        referrer: lun_name.clone(),
                        kind: EntityKind::Igroup,
                        name: group_name.to_owned(),
                    },
                )?;
                self.join_igroup(lun, group);
            }
        }
        Ok(())
    }

    /// One group per distinct export list at each site. Lists only match
    /// when they hold the same exports in the same order.
    fn consolidate_igroups(&mut self) {
        for site in self.graph.site_ids().collect::<Vec<_>>() {
            let luns: Vec<LunId> = (0..self.graph.luns.len())
                .map(LunId)
                .filter(|lun| self.graph.controller(self.graph.lun_controller(*lun)).site == site)
                .collect();

            let mut site_groups: Vec<IgroupId> = Vec::new();
            for lun in luns {
                let exports = &self.graph.lun(lun).exports;
                if exports.is_empty() {
                    let message = format!(
                        "LUN '{}' is exported to no host and is left unmapped",
                        self.graph.lun_full_path(lun)
                    );
                    self.diagnostics.warn(message);
                    continue;
                }

                let matched = site_groups
                    .iter()
                    .copied()
                    .find(|group| self.graph.igroup(*group).exports == *exports);
                match matched {
                    Some(group) => self.join_igroup(lun, group),
                    None => {
                        let exports = exports.clone();
                        let controller = self.graph.lun_controller(lun);
                        let name = format!("{}_igroup{:02}", self.short_name(), site_groups.len());
                        trace!("Creating initiator group '{name}'");
                        let group = self.push_igroup(Igroup {
                            name,
                            controller,
                            site,
                            os_type: None,
                            exports,
                            luns: Vec::new(),
                        });
                        self.join_igroup(lun, group);
                        site_groups.push(group);
                    }
                }
            }
        }
    }

    /// The first member fixes the group's OS type. A later member of another
    /// type is reported and joins anyway.
    fn join_igroup(&mut self, lun: LunId, group: IgroupId) {
        let os_type = self.graph.luns[lun.0].os_type;
        let igroup = &mut self.graph.igroups[group.0];
        match igroup.os_type {
            None => igroup.os_type = Some(os_type),
            Some(group_type) if group_type != os_type => {
                let message = format!(
                    "LUN '{}' of type '{os_type}' is incompatible with initiator group '{}' of type '{group_type}'",
                    self.graph.luns[lun.0].name, igroup.name
                );
                self.diagnostics.error(message);
            }
            Some(_) => {}
        }
        igroup.luns.push(lun);
        self.graph.luns[lun.0].igroup = Some(group);
    }

    fn push_igroup(&mut self, igroup: Igroup) -> IgroupId {
        let id = IgroupId(self.graph.igroups.len());
        self.graph.controllers[igroup.controller.0].igroups.push(id);
        self.graph.igroups.push(igroup);
        id
    }

    /// A group declared on the controller, else anywhere in the project.
    fn igroup_named(&self, controller: ControllerId, name: &str) -> Option<IgroupId> {
        let groups = || (0..self.graph.igroups.len()).map(IgroupId);
        groups()
            .find(|group| {
                let igroup = self.graph.igroup(*group);
                igroup.controller == controller && igroup.name == name
            })
            .or_else(|| groups().find(|group| self.graph.igroup(*group).name == name))
    }
}
