use log::{debug, trace};

use crate::{
    config::{Export, Lun, LunId, OsFamily, OsType, Protocol, QtreeId, VolumeId, VolumeKind},
    document::{Document, NodeId, NodeKind},
    error::{
        ConfigurationInvalidError, EntityKind, MissingAttributeError, ReportError, SanplanError,
        UndefinedReferenceError,
    },
    primitives::Gigabytes,
};

use super::{parse_field, Resolver};

impl Resolver<'_> {
    /// Resolves the LUNs of every iSCSI volume, then their shadows on the
    /// mirror targets.
    pub(super) fn resolve_luns(&mut self) -> Result<(), SanplanError> {
        let volumes: Vec<VolumeId> = self
            .graph
            .volume_ids()
            .filter(|v| {
                let volume = self.graph.volume(*v);
                volume.protocol == Some(Protocol::Iscsi)
                    && volume.kind == VolumeKind::Declared
                    && volume.node.is_some()
            })
            .collect();
        debug!("Resolving LUNs of {} iSCSI volumes", volumes.len());

        let mut shadows = Vec::new();
        for volume in volumes {
            for lun in self.resolve_volume_luns(volume)? {
                shadows.extend(self.shadow_luns(lun));
            }
        }

        trace!("Adding {} shadow LUNs", shadows.len());
        for shadow in shadows {
            self.push_lun(shadow);
        }
        Ok(())
    }

    fn resolve_volume_luns(&mut self, volume: VolumeId) -> Result<Vec<LunId>, SanplanError> {
        let doc = self.doc;
        let source = self.graph.volume(volume);
        let Some(node) = source.node else {
            return Ok(Vec::new());
        };
        let controller = source.controller;
        let default_from = self.export_addresses(controller);

        let declared = doc.descendants_or_self(node, NodeKind::Lun);
        if declared.is_empty() {
            trace!("Inventing a LUN for volume '{}'", source.name);
            let size = source.usable / 2.0;
            let exports = self.resolve_exports(node, &default_from, true)?.into_vec();
            let qtree = self.lun_qtree(volume, None)?;
            let lun_id = self.next_lun_id(volume);
            let lun = self.build_lun(None, lun_id, size, qtree, exports, None)?;
            return Ok(vec![self.push_lun(lun)]);
        }

        // Unsized LUNs share what the sized ones leave of the volume.
        let mut sizes = Vec::with_capacity(declared.len());
        for lun in &declared {
            let size: Option<Gigabytes> = doc
                .attr(*lun, "size")
                .map(|size| parse_field(size, EntityKind::Lun, lun_label(doc, *lun), "size"))
                .transpose()?;
            sizes.push(size);
        }
        let unsized_luns = sizes.iter().filter(|size| size.is_none()).count();
        let sized_total: Gigabytes = sizes.iter().flatten().copied().sum();
        let available = self.graph.volume(volume).iscsi_usable;
        if sized_total > available {
            return Err(SanplanError::new(ConfigurationInvalidError::OverallocatedVolume {
                volume: self.graph.volume(volume).name.clone(),
                requested: sized_total.to_string(),
                available: available.to_string(),
            }));
        }
        let remaining = available - sized_total;

        let mut luns = Vec::with_capacity(declared.len());
        for (lun, size) in declared.into_iter().zip(sizes) {
            let label = lun_label(doc, lun);
            if let Some(number) = doc.attr(lun, "restartnumbering") {
                let number = parse_field(number, EntityKind::Lun, label, "restartnumbering")?;
                self.lun_numbers.insert(controller, number);
            }
            let lun_id = match doc.attr(lun, "lunid") {
                Some(lun_id) => parse_field(lun_id, EntityKind::Lun, label, "lunid")?,
                None => self.next_lun_id(volume),
            };
            let size = size.unwrap_or_else(|| remaining / unsized_luns as f64);

            let exports = self.resolve_exports(lun, &default_from, true)?.into_vec();
            let parent_qtree = doc
                .parent(lun)
                .filter(|parent| doc.kind(*parent) == NodeKind::Qtree);
            let qtree = self.lun_qtree(volume, parent_qtree)?;
            let built = self.build_lun(doc.attr(lun, "name"), lun_id, size, qtree, exports, Some(lun))?;
            luns.push(self.push_lun(built));
        }
        Ok(luns)
    }

    fn build_lun(
        &self,
        name: Option<&str>,
        lun_id: u32,
        size: Gigabytes,
        qtree: QtreeId,
        exports: Vec<Export>,
        node: Option<NodeId>,
    ) -> Result<Lun, SanplanError> {
        let name = name
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{}.lun{lun_id:02}", self.short_name()));

        let first = exports.first().structured(UndefinedReferenceError::NoCandidate {
            referrer: name.clone(),
            kind: EntityKind::Host,
            criterion: "to export to".into(),
        })?;
        let host = self.graph.host(first.host);
        if host.iscsi_initiator.is_none() {
            return Err(SanplanError::new(MissingAttributeError::InitiatorName {
                host: host.name.clone(),
                lun: name,
            }));
        }
        let os_type = match host.os_family() {
            OsFamily::Solaris => OsType::Solaris,
            OsFamily::Windows => OsType::Windows,
            OsFamily::Linux => OsType::Linux,
            OsFamily::Other => {
                return Err(SanplanError::new(ConfigurationInvalidError::UnsupportedValue {
                    kind: EntityKind::Host,
                    name: host.name.clone(),
                    field: "operatingsystem".into(),
                    value: host.operating_system.clone(),
                }))
            }
        };

        Ok(Lun {
            name,
            lun_id,
            size,
            os_type,
            qtree,
            exports,
            igroup: None,
            mirror_of: None,
            node,
        })
    }

    /// Copies of a LUN on the matching qtree of every mirror target of its
    /// volume, exported to the DR counterparts of its hosts.
    fn shadow_luns(&mut self, source: LunId) -> Vec<Lun> {
        let lun = self.graph.lun(source);
        let volume = self.graph.lun_volume(source);
        let qtree_name = &self.graph.qtree(lun.qtree).name;

        let mut exports: Vec<Export> = Vec::new();
        for export in &lun.exports {
            for dr in &self.graph.host(export.host).dr_hosts {
                if !exports.iter().any(|e| e.host == *dr) {
                    exports.push(Export {
                        host: *dr,
                        ..export.clone()
                    });
                }
            }
        }

        let mut targets: Vec<VolumeId> = Vec::new();
        for mirror in &self.graph.volume(volume).mirrors {
            let target = self.graph.mirrors[mirror.0].target;
            if !targets.contains(&target) {
                targets.push(target);
            }
        }

        let mut shadows = Vec::new();
        let mut missing = Vec::new();
        for target in targets {
            let target_volume = self.graph.volume(target);
            match target_volume
                .qtrees
                .iter()
                .find(|q| self.graph.qtree(**q).name == *qtree_name)
            {
                Some(qtree) => shadows.push(Lun {
                    name: lun.name.clone(),
                    lun_id: lun.lun_id,
                    size: lun.size,
                    os_type: lun.os_type,
                    qtree: *qtree,
                    exports: exports.clone(),
                    igroup: None,
                    mirror_of: Some(source),
                    node: None,
                }),
                None => missing.push(format!(
                    "Mirror target '{}' has no qtree '{qtree_name}', LUN '{}' is not mirrored to it",
                    target_volume.name, lun.name
                )),
            }
        }
        for message in missing {
            self.diagnostics.warn(message);
        }
        shadows
    }

    fn push_lun(&mut self, lun: Lun) -> LunId {
        let id = LunId(self.graph.luns.len());
        trace!(
            "Adding LUN '{}' with id {} of {} GB",
            lun.name,
            lun.lun_id,
            lun.size
        );
        self.graph.qtrees[lun.qtree.0].luns.push(id);
        self.graph.luns.push(lun);
        id
    }

    /// The qtree declared by the LUN's parent element, else the first qtree
    /// of the volume.
    fn lun_qtree(&self, volume: VolumeId, parent: Option<NodeId>) -> Result<QtreeId, SanplanError> {
        let qtrees = &self.graph.volume(volume).qtrees;
        parent
            .and_then(|parent| {
                qtrees
                    .iter()
                    .copied()
                    .find(|q| self.graph.qtree(*q).node == Some(parent))
            })
            .or_else(|| qtrees.first().copied())
            .ok_or_else(|| {
                SanplanError::internal(format!(
                    "Volume '{}' has no qtree to hold its LUNs",
                    self.graph.volume(volume).name
                ))
            })
    }

    /// Takes the next automatic LUN id of the volume's controller.
    fn next_lun_id(&mut self, volume: VolumeId) -> u32 {
        let counter = self
            .lun_numbers
            .entry(self.graph.volume(volume).controller)
            .or_insert(0);
        let id = *counter;
        *counter += 1;
        id
    }
}

fn lun_label(doc: &Document, lun: NodeId) -> &str {
    doc.attr(lun, "name").unwrap_or("lun")
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::{
        config::ProjectGraph,
        error::ErrorKind,
        resolver::fixtures::{resolve_project, single_site, volume},
    };

    use super::*;

    fn luns<'g>(graph: &'g ProjectGraph, volume_name: &str) -> Vec<&'g Lun> {
        volume(graph, volume_name)
            .qtrees
            .iter()
            .flat_map(|q| graph.qtree(*q).luns.iter())
            .map(|l| graph.lun(*l))
            .collect()
    }

    #[test]
    fn test_invented_lun() {
        let resolution = resolve_project(&single_site(indoc! {r#"
            <volume name="blocks" proto="iscsi">
              <usablestorage>40</usablestorage>
              <export to="db01"/>
            </volume>
        "#}))
        .unwrap();
        let graph = &resolution.graph;

        let blocks = luns(graph, "blocks");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, "abc.lun00");
        assert_eq!(blocks[0].lun_id, 0);
        assert_eq!(blocks[0].size, Gigabytes(20.0));
        assert_eq!(blocks[0].os_type, OsType::Solaris);
        assert_eq!(graph.lun_full_path(LunId(0)), "/vol/blocks/data/abc.lun00");
    }

    #[test]
    fn test_declared_luns_share_remaining_space() {
        let resolution = resolve_project(&single_site(indoc! {r#"
            <volume name="blocks" proto="iscsi">
              <usablestorage>40</usablestorage>
              <export to="db01"/>
              <qtree name="disks">
                <lun name="fixed" size="10"/>
                <lun/>
                <lun lunid="7"/>
                <lun restartnumbering="4"/>
              </qtree>
            </volume>
        "#}))
        .unwrap();
        let graph = &resolution.graph;

        let blocks = luns(graph, "blocks");
        let summary: Vec<(&str, u32, Gigabytes)> = blocks
            .iter()
            .map(|lun| (lun.name.as_str(), lun.lun_id, lun.size))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("fixed", 0, Gigabytes(10.0)),
                ("abc.lun01", 1, Gigabytes(10.0)),
                ("abc.lun07", 7, Gigabytes(10.0)),
                ("abc.lun04", 4, Gigabytes(10.0)),
            ]
        );
    }

    #[test]
    fn test_sized_luns_exceed_volume() {
        let error = resolve_project(&single_site(indoc! {r#"
            <volume name="blocks" proto="iscsi">
              <usablestorage>10</usablestorage>
              <export to="db01"/>
              <lun name="big" size="20"/>
              <lun name="rest"/>
            </volume>
        "#}))
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::ConfigurationInvalid(ConfigurationInvalidError::OverallocatedVolume {
                volume: "blocks".into(),
                requested: "20".into(),
                available: "10".into(),
            })
        );
    }

    #[test]
    fn test_sized_luns_fill_volume() {
        let resolution = resolve_project(&single_site(indoc! {r#"
            <volume name="blocks" proto="iscsi">
              <usablestorage>10</usablestorage>
              <export to="db01"/>
              <lun name="first" size="4"/>
              <lun name="second" size="6"/>
            </volume>
        "#}))
        .unwrap();
        let sizes: Vec<Gigabytes> = luns(&resolution.graph, "blocks")
            .iter()
            .map(|lun| lun.size)
            .collect();
        assert_eq!(sizes, vec![Gigabytes(4.0), Gigabytes(6.0)]);
    }

    #[test]
    fn test_lun_needs_initiator() {
        let error = resolve_project(&single_site(indoc! {r#"
            <volume name="blocks" proto="iscsi">
              <export to="web01"/>
            </volume>
        "#}))
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::MissingAttribute(MissingAttributeError::InitiatorName {
                host: "web01".into(),
                lun: "abc.lun00".into(),
            })
        );
    }

    #[test]
    fn test_lun_ids_per_controller() {
        let resolution = resolve_project(&single_site(indoc! {r#"
            <volume name="first" proto="iscsi"><export to="db01"/></volume>
            <volume name="second" proto="iscsi"><export to="db01"/></volume>
        "#}))
        .unwrap();
        let graph = &resolution.graph;
        assert_eq!(luns(graph, "first")[0].lun_id, 0);
        assert_eq!(luns(graph, "second")[0].lun_id, 1);
        assert_eq!(graph.controller_luns(volume(graph, "first").controller).len(), 2);
    }
}
