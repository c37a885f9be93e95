use std::{net::Ipv4Addr, str::FromStr};

use log::{debug, trace};

use crate::{
    config::{
        ActiveSwitch, Host, HostId, Interface, InterfaceMode, Network, Site, SiteId, SiteRole,
        SwitchType, Vlan, VlanId,
    },
    constants::DEFAULT_VLAN_MTU,
    document::{NodeId, NodeKind},
    error::{
        AmbiguousReferenceError, ConfigurationInvalidError, DuplicateDefinitionError, EntityKind,
        MalformedInputError, ReportError, SanplanError, UndefinedReferenceError,
    },
    primitives::network::{netmask_to_prefix, parse_cidr, prefix_to_netmask},
};

use super::{optional_text, parse_field, required_attr, required_text, Resolver};

impl Resolver<'_> {
    /// Resolves sites, their VLANs and the hosts declared within them.
    pub(super) fn resolve_topology(&mut self) -> Result<(), SanplanError> {
        debug!("Resolving sites");
        let site_nodes: Vec<NodeId> = self.doc.children_of_kind(self.root, NodeKind::Site).collect();
        for node in site_nodes {
            self.resolve_site(node)?;
        }

        trace!("Resolving VLANs");
        for site in self.graph.site_ids().collect::<Vec<_>>() {
            self.resolve_vlans(site)?;
        }

        debug!("Resolving hosts");
        self.resolve_hosts()
    }

    fn resolve_site(&mut self, node: NodeId) -> Result<(), SanplanError> {
        let doc = self.doc;
        let name = match doc.attr(node, "name") {
            Some(name) => name.to_owned(),
            None => {
                let controller = doc
                    .first_child(node, NodeKind::Filer)
                    .and_then(|filer| doc.attr(filer, "name"))
                    .structured(MalformedInputError::MissingField {
                        kind: EntityKind::Site,
                        name: "<unnamed>".into(),
                        field: "name".into(),
                    })?;
                let name = controller.split('-').next().unwrap_or(controller).to_owned();
                self.diagnostics.warn(format!(
                    "Site has no name, using '{name}' derived from controller '{controller}'"
                ));
                name
            }
        };

        if self.graph.site_by_name(&name).is_some() {
            return Err(SanplanError::new(DuplicateDefinitionError::Name {
                kind: EntityKind::Site,
                name,
                scope: "project".into(),
            }));
        }

        let role = doc
            .attr(node, "type")
            .map(str::to_owned)
            .or_else(|| self.defaults.get(&name, "type"))
            .structured(MalformedInputError::MissingField {
                kind: EntityKind::Site,
                name: name.clone(),
                field: "type".into(),
            })?;
        let role = SiteRole::from_str(&role.to_ascii_lowercase())
            .ok()
            .structured(ConfigurationInvalidError::UnsupportedValue {
                kind: EntityKind::Site,
                name: name.clone(),
                field: "type".into(),
                value: role.clone(),
            })?;

        let location = match doc.attr(node, "location") {
            Some(location) => Some(location.to_owned()),
            None => {
                self.diagnostics.warn(format!(
                    "Site '{name}' has no location, using the defaults table"
                ));
                self.defaults.get(&name, "location")
            }
        };

        trace!("Adding {role} site '{name}'");
        self.graph.sites.push(Site {
            name_servers: self.defaults.list(&name, "nameservers"),
            wins_servers: self.defaults.list(&name, "winsservers"),
            name,
            role,
            location,
            hosts: Vec::new(),
            controllers: Vec::new(),
            vlans: Vec::new(),
            node,
        });
        Ok(())
    }

    fn resolve_vlans(&mut self, site: SiteId) -> Result<(), SanplanError> {
        let doc = self.doc;
        let site_node = self.graph.site(site).node;
        let site_name = self.graph.site(site).name.clone();

        for node in doc.children_of_kind(site_node, NodeKind::Vlan) {
            let number: u32 = parse_field(
                required_attr(doc, node, EntityKind::Vlan, &site_name, "number")?,
                EntityKind::Vlan,
                &site_name,
                "number",
            )?;
            let label = number.to_string();

            if self.vlan_at(site, number).is_some() {
                return Err(SanplanError::new(DuplicateDefinitionError::Name {
                    kind: EntityKind::Vlan,
                    name: label,
                    scope: format!("site '{site_name}'"),
                }));
            }

            let vlan_type = required_attr(doc, node, EntityKind::Vlan, &label, "type")?.to_owned();
            let mtu = match doc.attr(node, "mtu") {
                Some(mtu) => parse_field(mtu, EntityKind::Vlan, &label, "mtu")?,
                None => DEFAULT_VLAN_MTU,
            };

            let mut networks = doc
                .children_of_kind(node, NodeKind::Network)
                .map(|network| self.resolve_network(network, &label, "number"))
                .collect::<Result<Vec<_>, _>>()?;
            if doc.attr(node, "network").is_some() {
                self.diagnostics.warn(format!(
                    "VLAN {label} declares its network with attributes, use <network/> elements instead"
                ));
                networks.push(self.resolve_network(node, &label, "network")?);
            }

            let description = Some(doc.text(node))
                .filter(|text| !text.is_empty())
                .map(str::to_owned);

            let id = VlanId(self.graph.vlans.len());
            self.graph.vlans.push(Vlan {
                number,
                site,
                vlan_type,
                mtu,
                description,
                networks,
            });
            self.graph.sites[site.0].vlans.push(id);
        }
        Ok(())
    }

    /// Reads a network block. The address is either in `a.b.c.d/bits` form or
    /// accompanied by a `netmask` attribute.
    fn resolve_network(
        &self,
        node: NodeId,
        vlan: &str,
        address_field: &str,
    ) -> Result<Network, SanplanError> {
        let doc = self.doc;
        let number = required_attr(doc, node, EntityKind::Network, vlan, address_field)?;

        let (address, prefix_len, netmask) = match parse_cidr(number) {
            Some((address, bits)) => (address, bits, prefix_to_netmask(bits)),
            None => {
                let address: Ipv4Addr =
                    parse_field(number, EntityKind::Network, vlan, address_field)?;
                let mask_text = required_attr(doc, node, EntityKind::Network, vlan, "netmask")?;
                let netmask: Ipv4Addr =
                    parse_field(mask_text, EntityKind::Network, vlan, "netmask")?;
                let bits = netmask_to_prefix(netmask).structured(
                    MalformedInputError::InvalidValue {
                        kind: EntityKind::Network,
                        name: vlan.to_owned(),
                        field: "netmask".into(),
                        value: mask_text.to_owned(),
                    },
                )?;
                (address, bits, netmask)
            }
        };

        let gateway = parse_field(
            required_attr(doc, node, EntityKind::Network, vlan, "gateway")?,
            EntityKind::Network,
            vlan,
            "gateway",
        )?;

        Ok(Network {
            address,
            netmask,
            prefix_len,
            gateway,
        })
    }

    fn resolve_hosts(&mut self) -> Result<(), SanplanError> {
        let doc = self.doc;
        let nodes: Vec<NodeId> = doc
            .children_of_kind(self.root, NodeKind::Site)
            .flat_map(|site| doc.children_of_kind(site, NodeKind::Host))
            .collect();

        if nodes.is_empty() {
            if doc.first_child(self.root, NodeKind::Host).is_some() {
                self.diagnostics
                    .error("Hosts are declared outside of any site and are ignored");
            }
            return Err(SanplanError::new(MalformedInputError::NoHosts));
        }

        let mut dr_references = Vec::new();
        for node in nodes {
            let (host, dr_names) = self.resolve_host(node)?;
            let id = HostId(self.graph.hosts.len());
            self.graph.sites[host.site.0].hosts.push(id);
            self.graph.hosts.push(host);
            dr_references.push((id, dr_names));
        }

        // Counterparts may be declared after the host that names them.
        for (id, names) in dr_references {
            for name in names {
                let counterpart = self.graph.host_by_name(&name).structured(
                    UndefinedReferenceError::Entity {
                        referrer: self.graph.host(id).name.clone(),
                        kind: EntityKind::Host,
                        name,
                    },
                )?;
                self.graph.hosts[id.0].dr_hosts.push(counterpart);
            }
        }
        Ok(())
    }

    fn resolve_host(&mut self, node: NodeId) -> Result<(Host, Vec<String>), SanplanError> {
        let doc = self.doc;
        let name = required_attr(doc, node, EntityKind::Host, "<unnamed>", "name")?.to_owned();
        if self.graph.host_by_name(&name).is_some() {
            return Err(SanplanError::new(DuplicateDefinitionError::Name {
                kind: EntityKind::Host,
                name,
                scope: "project".into(),
            }));
        }

        let site = self.locate_site(node, &name)?;
        let text = |child, field| {
            required_text(doc, node, child, EntityKind::Host, &name, field).map(str::to_owned)
        };
        let platform = text(NodeKind::Platform, "platform")?;
        let operating_system = text(NodeKind::OperatingSystem, "operatingsystem")?;
        let location = text(NodeKind::Location, "location")?;
        let is_virtual = doc.attr_is_yes(node, "virtual");

        let dr_names = doc
            .children_of_kind(node, NodeKind::DrHost)
            .map(|dr| required_attr(doc, dr, EntityKind::Host, &name, "name").map(str::to_owned))
            .collect::<Result<Vec<_>, _>>()?;

        let mut interfaces = Vec::new();
        for interface in doc.children_of_kind(node, NodeKind::Interface) {
            interfaces.push(self.resolve_interface(interface, &name, site, is_virtual)?);
        }

        trace!("Adding host '{name}' at site '{}'", self.graph.site(site).name);
        let host = Host {
            site,
            platform,
            operating_system,
            location,
            description: optional_text(doc, node, NodeKind::Description),
            iscsi_initiator: optional_text(doc, node, NodeKind::IscsiInitiator),
            is_virtual,
            interfaces,
            dr_hosts: Vec::new(),
            name,
        };
        Ok((host, dr_names))
    }

    fn resolve_interface(
        &mut self,
        node: NodeId,
        host: &str,
        site: SiteId,
        is_virtual: bool,
    ) -> Result<Interface, SanplanError> {
        let doc = self.doc;
        let interface_type =
            required_attr(doc, node, EntityKind::Interface, host, "type")?.to_owned();

        let mode = doc.attr(node, "mode").unwrap_or("passive");
        let mode = InterfaceMode::from_str(&mode.to_ascii_lowercase())
            .ok()
            .structured(ConfigurationInvalidError::UnsupportedValue {
                kind: EntityKind::Interface,
                name: host.to_owned(),
                field: "mode".into(),
                value: mode.to_owned(),
            })?;

        let (switch_name, switch_port) = match (
            optional_text(doc, node, NodeKind::SwitchName),
            optional_text(doc, node, NodeKind::SwitchPort),
        ) {
            (Some(name), Some(port)) => (Some(name), Some(port)),
            _ => {
                if !is_virtual {
                    self.diagnostics.warn(format!(
                        "Host '{host}' has an interface without switch configuration"
                    ));
                }
                (None, None)
            }
        };

        let host_port = optional_text(doc, node, NodeKind::HostPort);
        if host_port.is_none() {
            self.diagnostics
                .warn(format!("Host '{host}' has an interface without a host port"));
        }

        let address = optional_text(doc, node, NodeKind::IpAddr)
            .map(|address| parse_field(&address, EntityKind::Interface, host, "ipaddr"))
            .transpose()?;

        let project_vlan = self.graph.project_vlan(site);
        let mtu = match doc.attr(node, "mtu") {
            Some(mtu) => parse_field(mtu, EntityKind::Interface, host, "mtu")?,
            None => project_vlan.map_or(DEFAULT_VLAN_MTU, |vlan| self.graph.vlan(vlan).mtu),
        };

        let numbers: Vec<&str> = doc
            .children_of_kind(node, NodeKind::VlanNumber)
            .map(|number| doc.text(number))
            .collect();
        let vlans = if numbers.is_empty() {
            project_vlan.into_iter().collect()
        } else {
            numbers
                .into_iter()
                .map(|number| {
                    let parsed = parse_field(number, EntityKind::Interface, host, "vlan_number")?;
                    self.vlan_at(site, parsed)
                        .structured(UndefinedReferenceError::Entity {
                            referrer: host.to_owned(),
                            kind: EntityKind::Vlan,
                            name: number.to_owned(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        if let Some(switch_name) = &switch_name {
            self.activate_switch(switch_name, site, host)?;
        }

        Ok(Interface {
            interface_type,
            mode,
            switch_name,
            switch_port,
            host_port,
            address,
            mtu,
            vlans,
        })
    }

    /// Adds a registry switch to the project's active set. Edge switches pull
    /// in their core uplinks.
    fn activate_switch(
        &mut self,
        name: &str,
        site: SiteId,
        referrer: &str,
    ) -> Result<(), SanplanError> {
        let switch = self
            .switches
            .get(name)
            .structured(UndefinedReferenceError::Entity {
                referrer: referrer.to_owned(),
                kind: EntityKind::Switch,
                name: name.to_owned(),
            })?
            .clone();

        if switch.switch_type == SwitchType::Edge {
            for uplink in &switch.uplinks {
                let core = self
                    .switches
                    .get(uplink)
                    .structured(UndefinedReferenceError::Entity {
                        referrer: switch.name.clone(),
                        kind: EntityKind::Switch,
                        name: uplink.clone(),
                    })?;
                self.graph
                    .active_switches
                    .entry(uplink.clone())
                    .or_insert_with(|| ActiveSwitch {
                        switch: core.clone(),
                        site,
                    });
            }
        }

        trace!("Activating switch '{name}'");
        self.graph
            .active_switches
            .insert(name.to_owned(), ActiveSwitch { switch, site });
        Ok(())
    }

    /// The VLAN with the given number at a site.
    pub(super) fn vlan_at(&self, site: SiteId, number: u32) -> Option<VlanId> {
        self.graph
            .site(site)
            .vlans
            .iter()
            .copied()
            .find(|vlan| self.graph.vlan(*vlan).number == number)
    }

    /// Finds the site an element belongs to: its own `site` attribute, the
    /// name of the enclosing site declaration, or the unique site of the
    /// enclosing declaration's type.
    pub(super) fn locate_site(&self, node: NodeId, referrer: &str) -> Result<SiteId, SanplanError> {
        let doc = self.doc;
        if let Some(name) = doc.attr(node, "site") {
            return self.site_named(name, referrer);
        }

        if let Some(enclosing) = doc.nearest_ancestor(node, NodeKind::Site) {
            if let Some(name) = doc.attr(enclosing, "name") {
                return self.site_named(name, referrer);
            }
            if let Some(site_type) = doc.attr(enclosing, "type") {
                return self.site_of_type(site_type, referrer);
            }
            if let Some(index) = self.graph.sites.iter().position(|s| s.node == enclosing) {
                return Ok(SiteId(index));
            }
        }

        Err(SanplanError::new(UndefinedReferenceError::NoCandidate {
            referrer: referrer.to_owned(),
            kind: EntityKind::Site,
            criterion: "enclosing it".into(),
        }))
    }

    fn site_named(&self, name: &str, referrer: &str) -> Result<SiteId, SanplanError> {
        self.graph
            .site_by_name(name)
            .structured(UndefinedReferenceError::Entity {
                referrer: referrer.to_owned(),
                kind: EntityKind::Site,
                name: name.to_owned(),
            })
    }

    fn site_of_type(&self, site_type: &str, referrer: &str) -> Result<SiteId, SanplanError> {
        let candidates: Vec<SiteId> = self
            .graph
            .site_ids()
            .filter(|site| {
                self.graph
                    .site(*site)
                    .role
                    .to_string()
                    .eq_ignore_ascii_case(site_type)
            })
            .collect();

        match candidates.as_slice() {
            [site] => Ok(*site),
            [] => Err(SanplanError::new(UndefinedReferenceError::NoCandidate {
                referrer: referrer.to_owned(),
                kind: EntityKind::Site,
                criterion: format!("of type '{site_type}'"),
            })),
            _ => Err(SanplanError::new(AmbiguousReferenceError::SiteOfType {
                referrer: referrer.to_owned(),
                site_type: site_type.to_owned(),
                candidates: candidates
                    .iter()
                    .map(|site| self.graph.site(*site).name.clone())
                    .collect(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::{
        error::ErrorKind,
        resolver::fixtures::{project, resolve_with, SWITCHES},
    };

    use super::*;

    #[test]
    fn test_sites_and_vlans() {
        let resolution = resolve_with(
            &project(indoc! {r#"
                <site name="alpha" type="primary" location="Sydney">
                  <vlan number="100" type="project" mtu="1500">Project storage
                    <network number="10.1.0.0/24" gateway="10.1.0.254"/>
                  </vlan>
                  <vlan number="200" type="services" network="10.2.0.0" netmask="255.255.0.0" gateway="10.2.0.1"/>
                  <host name="web01">
                    <platform>intel</platform>
                    <operatingsystem>Linux</operatingsystem>
                    <location>rack 1</location>
                    <interface type="storage" mode="active">
                      <switchname>edge01</switchname>
                      <switchport>1/1</switchport>
                      <hostport>eth1</hostport>
                      <ipaddr>10.1.0.10</ipaddr>
                    </interface>
                  </host>
                </site>
            "#}),
            "[alpha]\nnameservers = 10.0.0.1 10.0.0.2\n",
            SWITCHES,
        )
        .unwrap();
        let graph = &resolution.graph;

        let site = &graph.sites()[0];
        assert_eq!(site.role, SiteRole::Primary);
        assert_eq!(site.location.as_deref(), Some("Sydney"));
        assert_eq!(site.name_servers, vec!["10.0.0.1", "10.0.0.2"]);
        assert!(site.wins_servers.is_empty());

        let project_vlan = graph.vlan(graph.project_vlan(SiteId(0)).unwrap());
        assert_eq!(project_vlan.number, 100);
        assert_eq!(project_vlan.mtu, 1500);
        assert_eq!(project_vlan.description.as_deref(), Some("Project storage"));
        assert_eq!(project_vlan.networks[0].netmask, Ipv4Addr::new(255, 255, 255, 0));

        let services = graph.services_vlans(SiteId(0));
        assert_eq!(services.len(), 1);
        let services = graph.vlan(services[0]);
        assert_eq!(services.mtu, DEFAULT_VLAN_MTU);
        assert_eq!(services.networks[0].prefix_len, 16);
        assert!(resolution.diagnostics.mentions("declares its network with attributes"));

        let host = &graph.hosts()[0];
        let interface = &host.interfaces[0];
        assert_eq!(interface.mtu, 1500);
        assert_eq!(interface.vlans, vec![graph.project_vlan(SiteId(0)).unwrap()]);
        assert_eq!(host.storage_addresses(), vec![Ipv4Addr::new(10, 1, 0, 10)]);

        // The edge switch pulls in both of its core uplinks.
        let active: Vec<&str> = graph.active_switches().keys().map(String::as_str).collect();
        assert_eq!(active, vec!["core01", "core02", "edge01"]);
    }

    #[test]
    fn test_undefined_switch() {
        let error = resolve_with(
            &project(indoc! {r#"
                <site name="alpha" type="primary">
                  <vlan number="100" type="project"><network number="10.1.0.0/24" gateway="10.1.0.254"/></vlan>
                  <host name="web01">
                    <platform>intel</platform>
                    <operatingsystem>Linux</operatingsystem>
                    <location>rack 1</location>
                    <interface type="storage">
                      <switchname>edge99</switchname>
                      <switchport>1/1</switchport>
                    </interface>
                  </host>
                </site>
            "#}),
            "",
            SWITCHES,
        )
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::UndefinedReference(UndefinedReferenceError::Entity {
                referrer: "web01".into(),
                kind: EntityKind::Switch,
                name: "edge99".into(),
            })
        );
    }

    #[test]
    fn test_site_type_from_defaults() {
        let resolution = resolve_with(
            &project(indoc! {r#"
                <site name="beta">
                  <host name="dr01">
                    <platform>intel</platform>
                    <operatingsystem>Solaris 10</operatingsystem>
                    <location>rack 9</location>
                  </host>
                </site>
            "#}),
            "[beta]\ntype = secondary\nlocation = Melbourne\n",
            SWITCHES,
        )
        .unwrap();
        let site = &resolution.graph.sites()[0];
        assert_eq!(site.role, SiteRole::Secondary);
        assert_eq!(site.location.as_deref(), Some("Melbourne"));
    }

    #[test]
    fn test_ambiguous_site_type() {
        let error = resolve_with(
            &project(indoc! {r#"
                <site name="alpha" type="primary"/>
                <site type="primary">
                  <filer name="gamma-f1" type="primary"/>
                  <host name="web01">
                    <platform>intel</platform>
                    <operatingsystem>Linux</operatingsystem>
                    <location>rack 1</location>
                  </host>
                </site>
            "#}),
            "",
            SWITCHES,
        )
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::AmbiguousReference(AmbiguousReferenceError::SiteOfType {
                referrer: "web01".into(),
                site_type: "primary".into(),
                candidates: vec!["alpha".into(), "gamma".into()],
            })
        );
    }

    #[test]
    fn test_no_hosts() {
        let error = resolve_with(
            &project(r#"<site name="alpha" type="primary"/>"#),
            "",
            SWITCHES,
        )
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::MalformedInput(MalformedInputError::NoHosts)
        );
    }

    #[test]
    fn test_undefined_dr_host() {
        let error = resolve_with(
            &project(indoc! {r#"
                <site name="alpha" type="primary">
                  <host name="web01">
                    <platform>intel</platform>
                    <operatingsystem>Linux</operatingsystem>
                    <location>rack 1</location>
                    <drhost name="web99"/>
                  </host>
                </site>
            "#}),
            "",
            SWITCHES,
        )
        .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::UndefinedReference(UndefinedReferenceError::Entity {
                referrer: "web01".into(),
                kind: EntityKind::Host,
                name: "web99".into(),
            })
        );
    }
}
