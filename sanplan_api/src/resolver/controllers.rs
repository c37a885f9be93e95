use std::{net::Ipv4Addr, str::FromStr};

use log::{debug, trace};

use crate::{
    config::{
        AliasAddress, Controller, ControllerId, ControllerType, PartitionId, Protocol,
        ServiceAddress, SiteId, SiteRole, VirtualPartition, VlanId,
    },
    constants::{DEFAULT_PARTITION_NETMASK, NETBIOS_NAME_MAX},
    document::{NodeId, NodeKind},
    error::{
        ConfigurationInvalidError, DuplicateDefinitionError, EntityKind, MalformedInputError,
        MissingAttributeError, ReportError, SanplanError, UndefinedReferenceError,
    },
};

use super::{optional_text, parse_field, required_attr, required_text, Resolver};

impl Resolver<'_> {
    /// Resolves storage controllers and the virtual partitions they host.
    pub(super) fn resolve_controllers(&mut self) -> Result<(), SanplanError> {
        debug!("Resolving controllers");
        let doc = self.doc;
        let nodes: Vec<NodeId> = doc
            .children_of_kind(self.root, NodeKind::Site)
            .flat_map(|site| doc.children_of_kind(site, NodeKind::Filer))
            .collect();

        for node in nodes {
            let controller = self.resolve_controller(node)?;
            trace!("Resolving partitions of '{}'", self.graph.controller(controller).name);
            for vfiler in doc.children_of_kind(node, NodeKind::Vfiler) {
                self.resolve_partition(vfiler, controller)?;
            }
        }
        Ok(())
    }

    fn resolve_controller(&mut self, node: NodeId) -> Result<ControllerId, SanplanError> {
        let doc = self.doc;
        let name = required_attr(doc, node, EntityKind::Controller, "<unnamed>", "name")?.to_owned();
        if self.graph.controller_by_name(&name).is_some() {
            return Err(SanplanError::new(DuplicateDefinitionError::Name {
                kind: EntityKind::Controller,
                name,
                scope: "project".into(),
            }));
        }

        let declared_type = required_attr(doc, node, EntityKind::Controller, &name, "type")?;
        let controller_type = ControllerType::from_str(&declared_type.to_ascii_lowercase())
            .ok()
            .structured(ConfigurationInvalidError::UnsupportedValue {
                kind: EntityKind::Controller,
                name: name.clone(),
                field: "type".into(),
                value: declared_type.to_owned(),
            })?;

        let site = self.locate_site(node, &name)?;
        if self.graph.site(site).role == SiteRole::Secondary {
            self.graph.has_dr = true;
        }

        let id = ControllerId(self.graph.controllers.len());
        let secondary_for = if controller_type == ControllerType::Secondary {
            let partner = self.preceding_primary(site).structured(
                MalformedInputError::UnpairedSecondary {
                    controller: name.clone(),
                },
            )?;
            self.graph.controllers[partner.0].secondary = Some(id);
            Some(partner)
        } else {
            None
        };

        trace!("Adding {controller_type} controller '{name}'");
        self.graph.controllers.push(Controller {
            name,
            controller_type,
            site,
            secondary_for,
            secondary: None,
            partitions: Vec::new(),
            volumes: Vec::new(),
            igroups: Vec::new(),
            node,
        });
        self.graph.sites[site.0].controllers.push(id);
        Ok(id)
    }

    /// Nearest primary controller already declared at a site.
    fn preceding_primary(&self, site: SiteId) -> Option<ControllerId> {
        self.graph
            .controllers
            .iter()
            .rposition(|c| c.site == site && c.controller_type == ControllerType::Primary)
            .map(ControllerId)
    }

    fn resolve_partition(
        &mut self,
        node: NodeId,
        controller: ControllerId,
    ) -> Result<(), SanplanError> {
        let doc = self.doc;
        let controller_name = self.graph.controller(controller).name.clone();
        let site = self.graph.controller(controller).site;

        let name = doc
            .attr(node, "name")
            .map(str::to_owned)
            .unwrap_or_else(|| self.short_name().to_owned());
        if self
            .graph
            .controller(controller)
            .partitions
            .iter()
            .any(|p| self.graph.partition(*p).name == name)
        {
            return Err(SanplanError::new(DuplicateDefinitionError::Name {
                kind: EntityKind::Partition,
                name,
                scope: format!("controller '{controller_name}'"),
            }));
        }

        let root_pool = doc.attr(node, "rootaggr").map(str::to_owned).structured(
            MissingAttributeError::Field {
                kind: EntityKind::Partition,
                name: name.clone(),
                field: "rootaggr".into(),
            },
        )?;

        let vlan = self.partition_vlan(node, &name, site)?;
        let gateway = self
            .graph
            .vlan(vlan)
            .networks
            .first()
            .map(|network| network.gateway)
            .structured(MissingAttributeError::Field {
                kind: EntityKind::Vlan,
                name: self.graph.vlan(vlan).number.to_string(),
                field: "network".into(),
            })?;

        let primary = doc.first_child(node, NodeKind::PrimaryIp).structured(
            MalformedInputError::MissingField {
                kind: EntityKind::Partition,
                name: name.clone(),
                field: "primaryip".into(),
            },
        )?;
        let primary_address: Ipv4Addr = parse_field(
            required_text(doc, primary, NodeKind::IpAddr, EntityKind::Partition, &name, "ipaddr")?,
            EntityKind::Partition,
            &name,
            "ipaddr",
        )?;
        let netmask = optional_text(doc, primary, NodeKind::Netmask)
            .unwrap_or_else(|| DEFAULT_PARTITION_NETMASK.to_owned());
        let netmask: Ipv4Addr = parse_field(&netmask, EntityKind::Partition, &name, "netmask")?;

        let mut aliases = Vec::new();
        for alias in doc.children_of_kind(node, NodeKind::AliasIp) {
            let address = parse_field(
                required_text(doc, alias, NodeKind::IpAddr, EntityKind::Partition, &name, "aliasip")?,
                EntityKind::Partition,
                &name,
                "aliasip",
            )?;
            let netmask = optional_text(doc, alias, NodeKind::Netmask)
                .map(|mask| parse_field(&mask, EntityKind::Partition, &name, "netmask"))
                .transpose()?;
            aliases.push(AliasAddress { address, netmask });
        }

        let mut service_addresses = Vec::new();
        for vlan_ip in doc.children_of_kind(node, NodeKind::VlanIp) {
            let number = required_attr(doc, vlan_ip, EntityKind::Partition, &name, "vlan")?;
            let service_vlan = parse_field(number, EntityKind::Partition, &name, "vlan")
                .ok()
                .and_then(|number| self.vlan_at(site, number))
                .filter(|vlan| self.graph.vlan(*vlan).is_services())
                .structured(UndefinedReferenceError::Entity {
                    referrer: name.clone(),
                    kind: EntityKind::Vlan,
                    name: number.to_owned(),
                })?;
            let address = parse_field(
                required_text(doc, vlan_ip, NodeKind::IpAddr, EntityKind::Partition, &name, "vlanip")?,
                EntityKind::Partition,
                &name,
                "vlanip",
            )?;
            service_addresses.push(ServiceAddress {
                vlan: service_vlan,
                address,
            });
        }

        let protocols = doc
            .children_of_kind(node, NodeKind::Protocol)
            .map(|protocol| {
                let text = doc.text(protocol);
                Protocol::from_str(text).ok().structured(
                    ConfigurationInvalidError::UnsupportedValue {
                        kind: EntityKind::Partition,
                        name: name.clone(),
                        field: "protocol".into(),
                        value: text.to_owned(),
                    },
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let netbios_name = self.netbios_name(controller, &name);
        let dns_domain = self.defaults.global("dns_domain_name");
        let fqdn = dns_domain
            .as_ref()
            .map(|domain| format!("{netbios_name}.{domain}"));

        let id = PartitionId(self.graph.partitions.len());
        trace!("Adding partition '{name}' on '{controller_name}'");
        self.graph.partitions.push(VirtualPartition {
            name,
            controller,
            root_pool,
            vlan,
            primary_address,
            netmask,
            gateway,
            aliases,
            service_addresses,
            protocols,
            dns_domain,
            ad_account_location: self.defaults.global("ad_account_location"),
            netbios_name,
            fqdn,
            node,
        });
        self.graph.controllers[controller.0].partitions.push(id);
        Ok(())
    }

    /// Home VLAN of a partition: the project VLAN numbered by its `vlan`
    /// attribute, or by the first VLAN declared at the site.
    fn partition_vlan(
        &self,
        node: NodeId,
        partition: &str,
        site: SiteId,
    ) -> Result<VlanId, SanplanError> {
        let site_vlans = &self.graph.site(site).vlans;
        let number = match self.doc.attr(node, "vlan") {
            Some(number) => parse_field(number, EntityKind::Partition, partition, "vlan")?,
            None => site_vlans
                .first()
                .map(|vlan| self.graph.vlan(*vlan).number)
                .structured(UndefinedReferenceError::NoCandidate {
                    referrer: partition.to_owned(),
                    kind: EntityKind::Vlan,
                    criterion: format!("at site '{}'", self.graph.site(site).name),
                })?,
        };

        site_vlans
            .iter()
            .copied()
            .find(|vlan| {
                let vlan = self.graph.vlan(*vlan);
                vlan.number == number && vlan.is_project()
            })
            .structured(UndefinedReferenceError::Entity {
                referrer: partition.to_owned(),
                kind: EntityKind::Vlan,
                name: number.to_string(),
            })
    }

    /// NetBIOS name: the controller's first two characters, a class letter,
    /// its last two characters, then the partition name.
    fn netbios_name(&mut self, controller: ControllerId, partition: &str) -> String {
        let controller = self.graph.controller(controller);
        let chars: Vec<char> = controller.name.chars().collect();
        let head: String = chars.iter().take(2).collect();
        let tail: String = chars[chars.len().saturating_sub(2)..].iter().collect();
        let class = if controller.is_nearstore() { 'n' } else { 'f' };

        let mut name = format!("{head}{class}{tail}-{partition}");
        if name.chars().count() > NETBIOS_NAME_MAX {
            self.diagnostics.warn(format!(
                "NetBIOS name '{name}' is longer than {NETBIOS_NAME_MAX} characters and is truncated"
            ));
            name = name.chars().take(NETBIOS_NAME_MAX).collect();
        }
        name
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::{
        error::ErrorKind,
        resolver::fixtures::{project, resolve_project},
    };

    use super::*;

    const HOST: &str = indoc! {r#"
        <host name="web01">
          <platform>intel</platform>
          <operatingsystem>Linux</operatingsystem>
          <location>rack 1</location>
        </host>
    "#};

    #[test]
    fn test_partition_details() {
        let resolution = resolve_project(&project(&format!(
            indoc! {r#"
                <site name="alpha" type="primary">
                  <vlan number="100" type="project"><network number="10.1.0.0/24" gateway="10.1.0.254"/></vlan>
                  <vlan number="300" type="services"><network number="10.3.0.0/24" gateway="10.3.0.254"/></vlan>
                  {}
                  <filer name="alpha-nas01" type="nearstore">
                    <vfiler name="projectabc" rootaggr="aggr0">
                      <primaryip><ipaddr>10.1.0.1</ipaddr><netmask>255.255.255.0</netmask></primaryip>
                      <aliasip><ipaddr>10.1.0.5</ipaddr><netmask>255.255.255.0</netmask></aliasip>
                      <vlanip vlan="300"><ipaddr>10.3.0.1</ipaddr></vlanip>
                      <protocol>NFS</protocol>
                      <protocol>iscsi</protocol>
                    </vfiler>
                  </filer>
                </site>
            "#},
            HOST
        )))
        .unwrap();
        let graph = &resolution.graph;

        let partition = &graph.partitions()[0];
        assert_eq!(partition.root_pool, "aggr0");
        assert_eq!(partition.gateway, Ipv4Addr::new(10, 1, 0, 254));
        assert_eq!(partition.netmask, Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(
            graph.partition_addresses(PartitionId(0)),
            vec![Ipv4Addr::new(10, 1, 0, 1), Ipv4Addr::new(10, 1, 0, 5)]
        );
        assert_eq!(partition.service_addresses.len(), 1);
        assert_eq!(partition.protocols, vec![Protocol::Nfs, Protocol::Iscsi]);
        assert_eq!(partition.dns_domain.as_deref(), Some("example.net"));
        assert_eq!(partition.netbios_name, "aln01-projectab");
        assert_eq!(partition.fqdn.as_deref(), Some("aln01-projectab.example.net"));
        assert!(resolution.diagnostics.mentions("is truncated"));
    }

    #[test]
    fn test_secondary_pairing() {
        let resolution = resolve_project(&project(&format!(
            indoc! {r#"
                <site name="alpha" type="primary">
                  <vlan number="100" type="project"><network number="10.1.0.0/24" gateway="10.1.0.254"/></vlan>
                  {}
                  <filer name="alpha-f1" type="primary"/>
                  <filer name="alpha-f2" type="secondary"/>
                </site>
                <site name="beta" type="secondary">
                  <filer name="beta-f1" type="primary"/>
                </site>
            "#},
            HOST
        )))
        .unwrap();
        let graph = &resolution.graph;
        assert!(graph.has_dr);
        assert_eq!(graph.controller(ControllerId(0)).secondary, Some(ControllerId(1)));
        assert_eq!(graph.controller(ControllerId(1)).secondary_for, Some(ControllerId(0)));
        assert_eq!(graph.controller(ControllerId(2)).site, SiteId(1));
    }

    #[test]
    fn test_secondary_pairs_past_nearstore() {
        let resolution = resolve_project(&project(&format!(
            indoc! {r#"
                <site name="alpha" type="primary">
                  {}
                  <filer name="alpha-f1" type="primary"/>
                  <filer name="alpha-ns1" type="nearstore"/>
                  <filer name="alpha-f2" type="secondary"/>
                </site>
            "#},
            HOST
        )))
        .unwrap();
        let graph = &resolution.graph;
        let secondary = graph.controller_by_name("alpha-f2").unwrap();
        let partner = graph.controller(secondary).secondary_for.unwrap();
        assert_eq!(graph.controller(partner).name, "alpha-f1");
        assert_eq!(graph.controller(partner).secondary, Some(secondary));

        let nearstore = graph.controller_by_name("alpha-ns1").unwrap();
        assert_eq!(graph.controller(nearstore).secondary, None);
    }

    #[test]
    fn test_secondary_after_nearstore_only() {
        let error = resolve_project(&project(&format!(
            indoc! {r#"
                <site name="alpha" type="primary">
                  {}
                  <filer name="alpha-ns1" type="nearstore"/>
                  <filer name="alpha-f2" type="secondary"/>
                </site>
            "#},
            HOST
        )))
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::MalformedInput(MalformedInputError::UnpairedSecondary {
                controller: "alpha-f2".into()
            })
        );
    }

    #[test]
    fn test_unpaired_secondary() {
        let error = resolve_project(&project(&format!(
            indoc! {r#"
                <site name="alpha" type="primary">
                  {}
                  <filer name="alpha-f2" type="secondary"/>
                </site>
            "#},
            HOST
        )))
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::MalformedInput(MalformedInputError::UnpairedSecondary {
                controller: "alpha-f2".into()
            })
        );
    }

    #[test]
    fn test_duplicate_controller() {
        let error = resolve_project(&project(&format!(
            indoc! {r#"
                <site name="alpha" type="primary">
                  {}
                  <filer name="alpha-f1" type="primary"/>
                  <filer name="alpha-f1" type="nearstore"/>
                </site>
            "#},
            HOST
        )))
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::DuplicateDefinition(DuplicateDefinitionError::Name {
                kind: EntityKind::Controller,
                name: "alpha-f1".into(),
                scope: "project".into(),
            })
        );
    }

    #[test]
    fn test_missing_root_pool() {
        let error = resolve_project(&project(&format!(
            indoc! {r#"
                <site name="alpha" type="primary">
                  <vlan number="100" type="project"><network number="10.1.0.0/24" gateway="10.1.0.254"/></vlan>
                  {}
                  <filer name="alpha-f1" type="primary">
                    <vfiler><primaryip><ipaddr>10.1.0.1</ipaddr></primaryip></vfiler>
                  </filer>
                </site>
            "#},
            HOST
        )))
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::MissingAttribute(MissingAttributeError::Field {
                kind: EntityKind::Partition,
                name: "abc".into(),
                field: "rootaggr".into(),
            })
        );
    }

    #[test]
    fn test_undefined_service_vlan() {
        let error = resolve_project(&project(&format!(
            indoc! {r#"
                <site name="alpha" type="primary">
                  <vlan number="100" type="project"><network number="10.1.0.0/24" gateway="10.1.0.254"/></vlan>
                  {}
                  <filer name="alpha-f1" type="primary">
                    <vfiler rootaggr="aggr0">
                      <primaryip><ipaddr>10.1.0.1</ipaddr></primaryip>
                      <vlanip vlan="100"><ipaddr>10.1.0.9</ipaddr></vlanip>
                    </vfiler>
                  </filer>
                </site>
            "#},
            HOST
        )))
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::UndefinedReference(UndefinedReferenceError::Entity {
                referrer: "abc".into(),
                kind: EntityKind::Vlan,
                name: "100".into(),
            })
        );
    }
}
