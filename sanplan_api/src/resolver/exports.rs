use std::net::Ipv4Addr;

use log::trace;

use crate::{
    config::{AccessMode, ControllerId, Export, Host, HostId},
    document::{NodeId, NodeKind},
    error::{EntityKind, ReportError, SanplanError, UndefinedReferenceError},
};

use super::{parse_field, required_attr, Resolver};

/// Read-write and read-only grants resolved for one declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub(super) struct ExportLists {
    pub rw: Vec<Export>,
    pub ro: Vec<Export>,
}

impl ExportLists {
    pub fn is_empty(&self) -> bool {
        self.rw.is_empty() && self.ro.is_empty()
    }

    /// Read-write grants followed by read-only grants.
    pub fn into_vec(self) -> Vec<Export> {
        let mut exports = self.rw;
        exports.extend(self.ro);
        exports
    }

    /// Grants of the DR counterparts of every granted host, keeping the
    /// storage-side address and mode of the original grant.
    pub fn for_dr_hosts(&self, hosts: &[Host]) -> ExportLists {
        let mirror = |exports: &[Export]| -> Vec<Export> {
            exports
                .iter()
                .flat_map(|export| {
                    hosts[export.host.0].dr_hosts.iter().map(|dr| Export {
                        host: *dr,
                        ..export.clone()
                    })
                })
                .collect()
        };
        ExportLists {
            rw: mirror(&self.rw),
            ro: mirror(&self.ro),
        }
    }
}

impl Resolver<'_> {
    /// Collects the `export` grants declared on the node and its ancestors,
    /// outermost first.
    ///
    /// Each grant yields one export per storage-side address: the grant's
    /// `fromip`, or every address of `default_from`. When nothing is granted
    /// and `default_to_all` is set, every host is granted read-write from
    /// every default address.
    pub(super) fn resolve_exports(
        &self,
        node: NodeId,
        default_from: &[Ipv4Addr],
        default_to_all: bool,
    ) -> Result<ExportLists, SanplanError> {
        let doc = self.doc;
        let referrer = doc.attr(node, "name").unwrap_or(doc.tag(node));
        let mut lists = ExportLists::default();

        for scope in doc.ancestor_or_self_chain(node) {
            for grant in doc.children_of_kind(scope, NodeKind::Export) {
                let host_name = required_attr(doc, grant, EntityKind::Export, referrer, "to")?;
                let host = self.graph.host_by_name(host_name).structured(
                    UndefinedReferenceError::Entity {
                        referrer: referrer.to_owned(),
                        kind: EntityKind::Host,
                        name: host_name.to_owned(),
                    },
                )?;

                let from = match doc.attr(grant, "fromip") {
                    Some(address) => {
                        vec![parse_field(address, EntityKind::Export, host_name, "fromip")?]
                    }
                    None => default_from.to_vec(),
                };
                let to = doc
                    .attr(grant, "toip")
                    .map(|address| parse_field(address, EntityKind::Export, host_name, "toip"))
                    .transpose()?;
                let mode = if doc.attr(grant, "ro") == Some("yes") {
                    AccessMode::Ro
                } else {
                    AccessMode::Rw
                };

                let target = match mode {
                    AccessMode::Rw => &mut lists.rw,
                    AccessMode::Ro => &mut lists.ro,
                };
                target.extend(from.into_iter().map(|from| Export { host, from, mode, to }));
            }
        }

        if default_to_all && lists.is_empty() {
            trace!("No exports declared for '{referrer}', exporting to every host");
            lists.rw = self.export_to_all(default_from);
        }
        Ok(lists)
    }

    /// Read-write grants of every host from each of the addresses.
    pub(super) fn export_to_all(&self, from: &[Ipv4Addr]) -> Vec<Export> {
        from.iter()
            .flat_map(|from| {
                (0..self.graph.hosts.len()).map(move |host| Export {
                    host: HostId(host),
                    from: *from,
                    mode: AccessMode::Rw,
                    to: None,
                })
            })
            .collect()
    }

    /// Mount options declared for a host by the `export` grants on the node
    /// and its ancestors.
    pub(super) fn mount_option_overrides(&self, node: NodeId, host: HostId) -> Vec<String> {
        let doc = self.doc;
        let host_name = self.graph.host(host).name.as_str();
        doc.ancestor_or_self_chain(node)
            .into_iter()
            .flat_map(|scope| doc.children_of_kind(scope, NodeKind::Export))
            .filter(|grant| doc.attr(*grant, "to") == Some(host_name))
            .flat_map(|grant| doc.children_of_kind(grant, NodeKind::MountOption))
            .map(|option| doc.text(option).to_owned())
            .filter(|option| !option.is_empty())
            .collect()
    }

    /// Addresses exports are served from by default: those of the first
    /// partition of the controller.
    pub(super) fn export_addresses(&self, controller: ControllerId) -> Vec<Ipv4Addr> {
        self.graph
            .first_partition(controller)
            .map(|partition| partition.addresses())
            .unwrap_or_default()
    }
}
