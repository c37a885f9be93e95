use std::{collections::BTreeMap, net::Ipv4Addr};

use log::{debug, trace};

use crate::{
    config::{
        AccessMode, Export, HostId, OsFamily, Protocol, Qtree, QtreeId, SecurityStyle, SiteRole,
        VolumeId, VolumeKind, WorkloadType,
    },
    document::{NodeId, NodeKind},
    error::{
        ConfigurationInvalidError, DuplicateDefinitionError, EntityKind, MalformedInputError,
        ReportError, SanplanError, UndefinedReferenceError,
    },
};

use super::{exports::ExportLists, Resolver};

/// A qtree ready to be added to a volume.
struct QtreeSpec {
    name: String,
    volume: VolumeId,
    security: SecurityStyle,
    oplocks: bool,
    comment: Option<String>,
    exports: ExportLists,
    mirror_of: Option<QtreeId>,
    node: Option<NodeId>,
}

impl Resolver<'_> {
    /// Resolves the qtrees of every declared volume, primary sites first,
    /// and mirrors them to the targets of replicated volumes.
    pub(super) fn resolve_qtrees(&mut self) -> Result<(), SanplanError> {
        for role in [SiteRole::Primary, SiteRole::Secondary] {
            let volumes: Vec<VolumeId> = self
                .graph
                .volume_ids()
                .filter(|v| {
                    let volume = self.graph.volume(*v);
                    !volume.is_target()
                        && volume.kind != VolumeKind::Root
                        && self.graph.site(self.graph.volume_site(*v)).role == role
                })
                .collect();
            debug!("Resolving qtrees of {} volumes at {role} sites", volumes.len());

            for volume in volumes {
                self.resolve_volume_qtrees(volume)?;
                if !self.graph.volume(volume).mirrors.is_empty() {
                    self.mirror_qtrees(volume)?;
                }
            }
        }
        Ok(())
    }

    fn resolve_volume_qtrees(&mut self, volume: VolumeId) -> Result<(), SanplanError> {
        let doc = self.doc;
        let Some(node) = self.graph.volume(volume).node else {
            return Ok(());
        };
        let default_from = self.export_addresses(self.graph.volume(volume).controller);

        let declared: Vec<NodeId> = doc.children_of_kind(node, NodeKind::Qtree).collect();
        if !declared.is_empty() {
            for qtree in declared {
                self.resolve_declared_qtree(volume, qtree, &default_from)?;
            }
            return Ok(());
        }

        trace!("Inventing qtrees for volume '{}'", self.graph.volume(volume).name);
        let oplocks = self.oplocks(node);
        if self.graph.volume(volume).workload.is_database() {
            return self.invent_workload_qtrees(volume, node, oplocks, &default_from);
        }

        let exports = self.resolve_exports(node, &default_from, true)?;
        self.add_qtree(QtreeSpec {
            name: "data".into(),
            volume,
            security: self.default_security(volume),
            oplocks,
            comment: None,
            exports,
            mirror_of: None,
            node: None,
        })?;
        Ok(())
    }

    fn resolve_declared_qtree(
        &mut self,
        volume: VolumeId,
        node: NodeId,
        default_from: &[Ipv4Addr],
    ) -> Result<(), SanplanError> {
        let doc = self.doc;
        let name = doc.attr(node, "name").unwrap_or("data").to_owned();

        let security = match doc.attr(node, "security") {
            Some(security) => security.parse().ok().structured(
                ConfigurationInvalidError::UnsupportedValue {
                    kind: EntityKind::Qtree,
                    name: name.clone(),
                    field: "security".into(),
                    value: security.to_owned(),
                },
            )?,
            None => self.default_security(volume),
        };

        let comment = match doc.child_text(node, NodeKind::Description) {
            Some(description) => Some(description.to_owned()),
            None if !doc.text(node).is_empty() => {
                self.diagnostics.warn(format!(
                    "Qtree '{name}' describes itself with bare text, use a description element"
                ));
                Some(doc.text(node).to_owned())
            }
            None => None,
        };

        let exports = self.resolve_exports(node, default_from, true)?;
        self.add_qtree(QtreeSpec {
            name,
            volume,
            security,
            oplocks: self.oplocks(node),
            comment,
            exports,
            mirror_of: None,
            node: Some(node),
        })?;
        Ok(())
    }

    /// Qtrees of a database workload volume, exported to the hosts the
    /// database runs on.
    fn invent_workload_qtrees(
        &mut self,
        volume: VolumeId,
        node: NodeId,
        oplocks: bool,
        default_from: &[Ipv4Addr],
    ) -> Result<(), SanplanError> {
        let source = self.graph.volume(volume);
        let workload = source.workload;
        let volume_name = source.name.clone();
        let database = source.workload_id.clone();
        let primary_address = self
            .graph
            .first_partition(source.controller)
            .map(|partition| partition.primary_address);

        let mut exports = match &database {
            Some(database) => {
                let mut exports = self.resolve_exports(node, default_from, false)?;
                let hosts = self.database_hosts(database, &volume_name)?;
                if let Some(from) = primary_address {
                    for host in hosts {
                        if !exports.rw.iter().any(|export| export.host == host) {
                            exports.rw.push(Export {
                                host,
                                from,
                                mode: AccessMode::Rw,
                                to: None,
                            });
                        }
                    }
                }
                exports
            }
            None => self.resolve_exports(node, default_from, true)?,
        };
        if exports.is_empty() {
            exports.rw = self.export_to_all(primary_address.as_slice());
        }

        let qtrees: Vec<(String, String)> = match workload {
            WorkloadType::OraConfig => vec![("ora_config".into(), "Oracle configuration qtree".into())],
            WorkloadType::OraCm => vec![("ora_cm".into(), "Oracle quorum qtree".into())],
            _ => {
                let database = database.structured(MalformedInputError::MissingField {
                    kind: EntityKind::Volume,
                    name: volume_name,
                    field: "oracle".into(),
                })?;
                let workload_name = workload.to_string();
                let area = &workload_name[3..];
                let mut qtrees = vec![(
                    format!("ora_{database}_{area}01"),
                    format!("Oracle {area} qtree"),
                )];
                if workload == WorkloadType::OraRedo {
                    qtrees.push((format!("ora_{database}_temp01"), "Oracle temp qtree".into()));
                }
                qtrees
            }
        };

        for (name, comment) in qtrees {
            self.add_qtree(QtreeSpec {
                name,
                volume,
                security: SecurityStyle::Unix,
                oplocks,
                comment: Some(comment),
                exports: exports.clone(),
                mirror_of: None,
                node: None,
            })?;
        }
        Ok(())
    }

    /// Hosts listed by a database declaration. An undeclared database leaves
    /// the volume to its explicit exports.
    fn database_hosts(&mut self, database: &str, volume: &str) -> Result<Vec<HostId>, SanplanError> {
        let doc = self.doc;
        let Some(declaration) = doc
            .children_of_kind(self.root, NodeKind::Database)
            .find(|node| doc.attr(*node, "id") == Some(database))
        else {
            self.diagnostics.warn(format!(
                "Database '{database}' is not declared, volume '{volume}' relies on its own exports"
            ));
            return Ok(Vec::new());
        };

        doc.children_of_kind(declaration, NodeKind::OnHost)
            .filter_map(|on_host| doc.attr(on_host, "name"))
            .map(|host| {
                self.graph.host_by_name(host).structured(UndefinedReferenceError::Entity {
                    referrer: database.to_owned(),
                    kind: EntityKind::Host,
                    name: host.to_owned(),
                })
            })
            .collect()
    }

    /// Creates DR copies of a replicated volume's qtrees, exported to the DR
    /// counterparts of their hosts, on every distinct mirror target.
    fn mirror_qtrees(&mut self, volume: VolumeId) -> Result<(), SanplanError> {
        let source = self.graph.volume(volume);
        let mut targets: Vec<VolumeId> = Vec::new();
        for mirror in &source.mirrors {
            let target = self.graph.mirrors[mirror.0].target;
            if !targets.contains(&target) {
                targets.push(target);
            }
        }

        for qtree_id in source.qtrees.clone() {
            let qtree = self.graph.qtree(qtree_id);
            let exports = ExportLists {
                rw: qtree.rw_exports.clone(),
                ro: qtree.ro_exports.clone(),
            }
            .for_dr_hosts(&self.graph.hosts);
            if exports.is_empty() {
                trace!("No host of qtree '{}' has a DR counterpart", qtree.name);
                continue;
            }

            let (name, security, oplocks, comment) = (
                qtree.name.clone(),
                qtree.security,
                qtree.oplocks,
                qtree.comment.clone(),
            );
            for target in &targets {
                self.add_qtree(QtreeSpec {
                    name: name.clone(),
                    volume: *target,
                    security,
                    oplocks,
                    comment: comment.clone(),
                    exports: exports.clone(),
                    mirror_of: Some(qtree_id),
                    node: None,
                })?;
            }
        }
        Ok(())
    }

    fn add_qtree(&mut self, spec: QtreeSpec) -> Result<QtreeId, SanplanError> {
        let volume = self.graph.volume(spec.volume);
        if volume.qtrees.iter().any(|q| self.graph.qtree(*q).name == spec.name) {
            return Err(SanplanError::new(DuplicateDefinitionError::Name {
                kind: EntityKind::Qtree,
                name: spec.name,
                scope: format!("volume '{}'", volume.name),
            }));
        }

        let mut hosts: Vec<HostId> = Vec::new();
        for export in spec.exports.rw.iter().chain(&spec.exports.ro) {
            if !hosts.contains(&export.host) {
                hosts.push(export.host);
            }
        }
        let mut mount_options = BTreeMap::new();
        for host in hosts {
            let options = self.qtree_mount_options(&spec, host);
            mount_options.insert(host, options);
        }

        let id = QtreeId(self.graph.qtrees.len());
        trace!(
            "Adding qtree '{}/{}' exported to {} hosts",
            self.graph.volume(spec.volume).short_path(),
            spec.name,
            mount_options.len()
        );
        self.graph.qtrees.push(Qtree {
            name: spec.name,
            volume: spec.volume,
            security: spec.security,
            oplocks: spec.oplocks,
            comment: spec.comment,
            rw_exports: spec.exports.rw,
            ro_exports: spec.exports.ro,
            mount_options,
            luns: Vec::new(),
            mirror_of: spec.mirror_of,
            node: spec.node,
        });
        self.graph.volumes[spec.volume.0].qtrees.push(id);
        Ok(id)
    }

    /// Access mode, then declared overrides, else the workload and OS
    /// defaults.
    fn qtree_mount_options(&mut self, spec: &QtreeSpec, host: HostId) -> Vec<String> {
        let mut options = Vec::new();
        if spec.exports.rw.iter().any(|export| export.host == host) {
            options.push("rw".to_owned());
        }
        if spec.exports.ro.iter().any(|export| export.host == host) {
            options.push("ro".to_owned());
        }

        let volume = self.graph.volume(spec.volume);
        let mut overrides = spec
            .node
            .map(|node| self.mount_option_overrides(node, host))
            .unwrap_or_default();
        if overrides.is_empty() {
            overrides = volume
                .node
                .map(|node| self.mount_option_overrides(node, host))
                .unwrap_or_default();
        }
        if !overrides.is_empty() {
            options.extend(overrides);
            return options;
        }

        let host = self.graph.host(host);
        let defaults: &[&str] = match (volume.workload.needs_database_mount_options(), host.os_family()) {
            (true, OsFamily::Solaris) => &["forcedirectio", "noac", "nointr"],
            (true, OsFamily::Linux) => &["actimeo=0"],
            (true, _) => {
                let message = format!(
                    "Unknown operating system '{}' of host '{}', cannot choose mount options for qtree '{}'",
                    host.operating_system, host.name, spec.name
                );
                self.diagnostics.error(message);
                &[]
            }
            (false, OsFamily::Solaris | OsFamily::Linux) => &["intr"],
            (false, _) => &[],
        };
        options.extend(defaults.iter().map(|option| option.to_string()));
        options
    }

    /// `ntfs` for volumes served over CIFS, else `unix`.
    fn default_security(&self, volume: VolumeId) -> SecurityStyle {
        if self.graph.volume(volume).protocol == Some(Protocol::Cifs) {
            SecurityStyle::Ntfs
        } else {
            SecurityStyle::Unix
        }
    }

    fn oplocks(&self, node: NodeId) -> bool {
        self.doc
            .inherited_attr(node, "oplocks")
            .map(|value| !matches!(value.to_ascii_lowercase().as_str(), "no" | "false"))
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use maplit::btreemap;

    use crate::{
        error::ErrorKind,
        resolver::fixtures::{qtrees, resolve_project, single_site, single_site_with},
    };

    use super::*;

    #[test]
    fn test_declared_qtrees() {
        let resolution = resolve_project(&single_site(indoc! {r#"
            <volume name="shared" proto="cifs" oplocks="no">
              <qtree name="home"><description>Home directories</description></qtree>
              <qtree name="apps" security="Unix" oplocks="yes">Applications</qtree>
            </volume>
        "#}))
        .unwrap();
        let graph = &resolution.graph;

        let shared = qtrees(graph, "shared");
        assert_eq!(shared.len(), 2);
        assert_eq!(shared[0].name, "home");
        assert_eq!(shared[0].security, SecurityStyle::Ntfs);
        assert!(!shared[0].oplocks);
        assert_eq!(shared[0].comment.as_deref(), Some("Home directories"));

        assert_eq!(shared[1].security, SecurityStyle::Unix);
        assert!(shared[1].oplocks);
        assert_eq!(shared[1].comment.as_deref(), Some("Applications"));
        assert!(resolution.diagnostics.mentions("bare text"));
        assert_eq!(
            shared[0].cifs_share_name(graph.volume(shared[0].volume), true),
            "shared_home$"
        );
    }

    #[test]
    fn test_root_and_targets_get_no_qtrees() {
        let resolution = resolve_project(&single_site(r#"<volume name="shared"/>"#)).unwrap();
        let graph = &resolution.graph;
        for volume in graph.volumes() {
            let expected = usize::from(volume.name == "shared");
            assert_eq!(volume.qtrees.len(), expected, "{}", volume.name);
        }
    }

    #[test]
    fn test_workload_qtrees_follow_database() {
        let resolution = resolve_project(&single_site_with(
            indoc! {r#"
                <volume name="redo" type="oraredo" oracle="PRD"/>
                <volume name="config" type="oraconfig"/>
            "#},
            indoc! {r#"
                <database id="PRD">
                  <onhost name="db01"/>
                </database>
            "#},
        ))
        .unwrap();
        let graph = &resolution.graph;
        let db01 = graph.host_by_name("db01").unwrap();

        let redo = qtrees(graph, "redo");
        let names: Vec<&str> = redo.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["ora_PRD_redo01", "ora_PRD_temp01"]);
        assert_eq!(redo[0].comment.as_deref(), Some("Oracle redo qtree"));
        assert_eq!(redo[0].rw_exports.len(), 1);
        assert_eq!(redo[0].rw_exports[0].host, db01);
        assert_eq!(
            graph.host_qtree_mount_options(db01, graph.volume(redo[0].volume).qtrees[0]),
            vec!["rw", "forcedirectio", "noac", "nointr"]
        );

        let config = qtrees(graph, "config");
        assert_eq!(config[0].name, "ora_config");
        assert_eq!(config[0].rw_exports.len(), 2);
        let web01 = graph.host_by_name("web01").unwrap();
        let intr = vec!["rw".to_string(), "intr".to_string()];
        assert_eq!(
            config[0].mount_options,
            btreemap! { db01 => intr.clone(), web01 => intr }
        );
    }

    #[test]
    fn test_workload_qtree_needs_database() {
        let error = resolve_project(&single_site(r#"<volume name="data" type="oradata"/>"#))
            .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::MalformedInput(MalformedInputError::MissingField {
                kind: EntityKind::Volume,
                name: "data".into(),
                field: "oracle".into(),
            })
        );
    }

    #[test]
    fn test_undeclared_database_exports_to_all() {
        let resolution =
            resolve_project(&single_site(r#"<volume name="idx" type="oraindx" oracle="DEV"/>"#))
                .unwrap();
        let idx = qtrees(&resolution.graph, "idx");
        assert_eq!(idx[0].name, "ora_DEV_indx01");
        assert_eq!(idx[0].rw_exports.len(), 2);
        assert!(idx[0].rw_exports.iter().all(|e| e.mode == AccessMode::Rw));
        assert!(resolution.diagnostics.mentions("Database 'DEV' is not declared"));
    }

    #[test]
    fn test_duplicate_qtree() {
        let error = resolve_project(&single_site(indoc! {r#"
            <volume name="shared">
              <qtree name="home"/>
              <qtree name="home"/>
            </volume>
        "#}))
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::DuplicateDefinition(DuplicateDefinitionError::Name {
                kind: EntityKind::Qtree,
                name: "home".into(),
                scope: "volume 'shared'".into(),
            })
        );
    }

    #[test]
    fn test_linux_database_mount_options() {
        let resolution = resolve_project(&single_site(indoc! {r#"
            <volume name="undo" type="oraundo" oracle="PRD">
              <export to="web01"/>
            </volume>
        "#}))
        .unwrap();
        let graph = &resolution.graph;
        let web01 = graph.host_by_name("web01").unwrap();
        let qtree = graph.volume(qtrees(graph, "undo")[0].volume).qtrees[0];
        assert_eq!(graph.host_qtree_mount_options(web01, qtree), vec!["rw", "actimeo=0"]);
        assert!(resolution.diagnostics.errors().next().is_none());
    }
}
