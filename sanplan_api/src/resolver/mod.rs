//! # Project resolver
//!
//! Turns the declarative project document into a fully elaborated
//! [`ProjectGraph`].
//!
//! Resolution is a strict pipeline. Each stage reads the document and the
//! entities produced by earlier stages, and only ever appends to the graph:
//!
//! - Project details: identity, revision history, CHAP prefix.
//! - Topology: sites, VLANs, hosts and their interfaces, active switches.
//! - Controllers: storage controllers, secondary pairing, virtual partitions.
//! - Volumes: root volumes, declared volumes and volume sets.
//! - Protection: snapshot schedules, mirror targets, vault targets.
//! - Qtrees: declared or invented qtrees, exports, disaster-recovery mirrors.
//! - LUNs: declared or invented LUNs on iSCSI volumes, shadow LUNs.
//! - Initiator groups: declared groups or consolidation by export list.
//! - Validation: cross-cutting uniqueness checks.
//!
//! Any error aborts resolution and no partial graph is returned. Soft
//! findings are collected in [`Diagnostics`] and returned with the graph.

use std::{collections::BTreeMap, str::FromStr};

use log::{debug, trace};
use serde::Serialize;

use crate::{
    config::{ControllerId, PartitionId, ProjectGraph},
    document::{Defaults, Document, NodeId, NodeKind, SwitchRegistry},
    error::{
        EntityKind, InvalidInputError, MalformedInputError, ReportError, SanplanError,
        SanplanResultExt, UndefinedReferenceError,
    },
};

mod controllers;
mod diagnostics;
mod exports;
mod igroups;
mod luns;
mod project;
mod protection;
mod qtrees;
mod topology;
mod validation;
mod volumes;


pub use diagnostics::{Diagnostic, Diagnostics, Severity};

/// Outcome of a successful resolution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Resolution {
    pub graph: ProjectGraph,
    pub diagnostics: Diagnostics,
}

/// Resolves a project document against the defaults table and the switch
/// registry.
pub fn resolve(
    document: &Document,
    defaults: &Defaults,
    switches: &SwitchRegistry,
) -> Result<Resolution, SanplanError> {
    let root = document
        .root()
        .structured(InvalidInputError::ParseProject)
        .message("Project document has no root element")?;

    let mut resolver = Resolver {
        doc: document,
        root,
        defaults,
        switches,
        graph: ProjectGraph::default(),
        diagnostics: Diagnostics::default(),
        volume_number: 0,
        lun_numbers: BTreeMap::new(),
    };
    resolver.run()?;

    Ok(Resolution {
        graph: resolver.graph,
        diagnostics: resolver.diagnostics,
    })
}

/// Resolution state shared by all stages.
struct Resolver<'a> {
    doc: &'a Document,
    root: NodeId,
    defaults: &'a Defaults,
    switches: &'a SwitchRegistry,
    graph: ProjectGraph,
    diagnostics: Diagnostics,
    /// Project-wide counter used to name volumes.
    volume_number: u32,
    /// Next automatic LUN id of each controller.
    lun_numbers: BTreeMap<ControllerId, u32>,
}

impl Resolver<'_> {
    fn run(&mut self) -> Result<(), SanplanError> {
        debug!("Resolving project graph");

        trace!("Checking for legacy topology");
        self.check_legacy_topology()?;

        trace!("Resolving project details");
        self.resolve_project()?;

        trace!("Resolving topology");
        self.resolve_topology()?;

        trace!("Resolving controllers");
        self.resolve_controllers()?;

        trace!("Resolving volumes");
        self.resolve_volumes()?;

        trace!("Resolving protection");
        self.resolve_protection()?;

        trace!("Resolving qtrees");
        self.resolve_qtrees()?;

        trace!("Resolving LUNs");
        self.resolve_luns()?;

        trace!("Resolving initiator groups");
        self.resolve_igroups()?;

        trace!("Validating project graph");
        self.validate()?;

        debug!(
            "Project graph resolved with {} controllers, {} volumes, {} qtrees, {} LUNs and {} diagnostics",
            self.graph.controllers.len(),
            self.graph.volumes.len(),
            self.graph.qtrees.len(),
            self.graph.luns.len(),
            self.diagnostics.len()
        );
        Ok(())
    }

    /// The controller declared by the nearest enclosing `filer` element.
    fn enclosing_controller(&self, node: NodeId, referrer: &str) -> Result<ControllerId, SanplanError> {
        let filer = self.doc.nearest_ancestor(node, NodeKind::Filer);
        filer
            .and_then(|filer| {
                self.graph
                    .controllers
                    .iter()
                    .position(|c| c.node == filer)
                    .map(ControllerId)
            })
            .structured(UndefinedReferenceError::NoCandidate {
                referrer: referrer.to_owned(),
                kind: EntityKind::Controller,
                criterion: "enclosing it".into(),
            })
    }

    /// The partition declared by the nearest enclosing `vfiler` element.
    fn enclosing_partition(&self, node: NodeId) -> Option<PartitionId> {
        let vfiler = self.doc.nearest_ancestor(node, NodeKind::Vfiler)?;
        self.graph
            .partitions
            .iter()
            .position(|p| p.node == vfiler)
            .map(PartitionId)
    }

    fn short_name(&self) -> &str {
        &self.graph.project.short_name
    }
}

/// Value of a required attribute.
#[track_caller]
fn required_attr<'d>(
    doc: &'d Document,
    node: NodeId,
    kind: EntityKind,
    name: &str,
    field: &str,
) -> Result<&'d str, SanplanError> {
    doc.attr(node, field)
        .filter(|value| !value.trim().is_empty())
        .structured(MalformedInputError::MissingField {
            kind,
            name: name.to_owned(),
            field: field.to_owned(),
        })
}

/// Text of a required child element.
#[track_caller]
fn required_text<'d>(
    doc: &'d Document,
    node: NodeId,
    child: NodeKind,
    kind: EntityKind,
    name: &str,
    field: &str,
) -> Result<&'d str, SanplanError> {
    doc.child_text(node, child)
        .filter(|text| !text.is_empty())
        .structured(MalformedInputError::MissingField {
            kind,
            name: name.to_owned(),
            field: field.to_owned(),
        })
}

/// Text of an optional child element, if present and not empty.
fn optional_text(doc: &Document, node: NodeId, child: NodeKind) -> Option<String> {
    doc.child_text(node, child)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

#[track_caller]
fn parse_field<T: FromStr>(
    value: &str,
    kind: EntityKind,
    name: &str,
    field: &str,
) -> Result<T, SanplanError> {
    value
        .trim()
        .parse()
        .ok()
        .structured(MalformedInputError::InvalidValue {
            kind,
            name: name.to_owned(),
            field: field.to_owned(),
            value: value.to_owned(),
        })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::{
        config::{ProjectGraph, Qtree, Volume},
        document::{Defaults, Document, SwitchRegistry},
        error::SanplanError,
    };

    use super::{resolve, Resolution};

    pub(crate) const SWITCHES: &str = "\
        core01,core,alpha,DC1\n\
        core02,core,alpha,DC1\n\
        edge01,edge,alpha,DC1,core01,core02\n";

    pub(crate) const DEFAULTS: &str = "[global]\ndns_domain_name = example.net\n";

    /// Wraps declarations in a project document with short name `abc`.
    pub(crate) fn project(body: &str) -> String {
        format!(
            "<project_definition>\
               <project>\
                 <prefix>ABC</prefix>\
                 <code>01</code>\
                 <shortname>abc</shortname>\
                 <longname>Alpha Beta Charlie</longname>\
               </project>\
               {body}\
             </project_definition>"
        )
    }

    /// A primary site with two hosts, a primary controller whose `aggr1`
    /// pool holds `volumes`, a nearstore, and the root volume vault policy.
    pub(crate) fn single_site(volumes: &str) -> String {
        single_site_with(volumes, "")
    }

    /// [`single_site`] plus project-level declarations such as policies.
    pub(crate) fn single_site_with(volumes: &str, extra: &str) -> String {
        project(&format!(
            r#"
            <site name="alpha" type="primary" location="Sydney">
              <vlan number="100" type="project"><network number="10.1.0.0/24" gateway="10.1.0.254"/></vlan>
              <host name="db01">
                <platform>sparc</platform>
                <operatingsystem>Solaris 10</operatingsystem>
                <location>rack 1</location>
                <iscsi_initiator>iqn.1986-03.com.sun:db01</iscsi_initiator>
              </host>
              <host name="web01">
                <platform>intel</platform>
                <operatingsystem>Linux</operatingsystem>
                <location>rack 2</location>
              </host>
              <filer name="alpha-f1" type="primary">
                <vfiler rootaggr="aggr0">
                  <primaryip><ipaddr>10.1.0.1</ipaddr></primaryip>
                  <protocol>nfs</protocol>
                  <aggregate name="aggr1">
                    {volumes}
                  </aggregate>
                </vfiler>
              </filer>
              <filer name="alpha-ns1" type="nearstore">
                <vfiler rootaggr="aggr0"><primaryip><ipaddr>10.1.0.2</ipaddr></primaryip></vfiler>
              </filer>
            </site>
            <snapvaultset id="default_primary" targetfiler="alpha-ns1">
              <snapvault basename="sv_daily">
                <snapschedule>1@0</snapschedule>
                <snapvaultschedule>8@0</snapvaultschedule>
              </snapvault>
            </snapvaultset>
            {extra}
            "#
        ))
    }

    pub(crate) fn resolve_with(
        xml: &str,
        defaults: &str,
        switches: &str,
    ) -> Result<Resolution, SanplanError> {
        let document = Document::from_xml(xml)?;
        resolve(
            &document,
            &Defaults::parse(defaults)?,
            &SwitchRegistry::parse(switches)?,
        )
    }

    pub(crate) fn resolve_project(xml: &str) -> Result<Resolution, SanplanError> {
        resolve_with(xml, DEFAULTS, SWITCHES)
    }

    pub(crate) fn volume<'g>(graph: &'g ProjectGraph, name: &str) -> &'g Volume {
        graph
            .volumes()
            .iter()
            .find(|volume| volume.name == name)
            .unwrap_or_else(|| panic!("no volume named '{name}'"))
    }

    /// Qtrees of the named volume, in creation order.
    pub(crate) fn qtrees<'g>(graph: &'g ProjectGraph, volume_name: &str) -> Vec<&'g Qtree> {
        volume(graph, volume_name)
            .qtrees
            .iter()
            .map(|qtree| graph.qtree(*qtree))
            .collect()
    }
}
