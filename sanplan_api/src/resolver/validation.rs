use std::{
    collections::{btree_map::Entry, BTreeMap},
    net::Ipv4Addr,
};

use log::{debug, trace};

use crate::{
    config::{VolumeKind, WorkloadType},
    constants::MINIMUM_CM_VOLUME_GB,
    document::NodeKind,
    error::{ConfigurationInvalidError, DuplicateDefinitionError, SanplanError},
    primitives::Gigabytes,
};

use super::Resolver;

impl Resolver<'_> {
    /// Rejects documents written for the obsolete `nas` topology layout.
    pub(super) fn check_legacy_topology(&self) -> Result<(), SanplanError> {
        if self.doc.first_child(self.root, NodeKind::Nas).is_some() {
            return Err(SanplanError::new(ConfigurationInvalidError::LegacyTopology));
        }
        Ok(())
    }

    /// Cross-cutting checks over the complete graph.
    pub(super) fn validate(&mut self) -> Result<(), SanplanError> {
        self.validate_partition_addresses()?;
        self.validate_interface_addresses()?;
        self.validate_switch_ports();
        self.validate_volume_sizes()?;
        debug!("Project graph is valid");
        Ok(())
    }

    fn validate_partition_addresses(&self) -> Result<(), SanplanError> {
        let mut seen: BTreeMap<Ipv4Addr, String> = BTreeMap::new();
        for partition in &self.graph.partitions {
            let label = format!(
                "{}:{}",
                self.graph.controller(partition.controller).name,
                partition.name
            );
            match seen.entry(partition.primary_address) {
                Entry::Occupied(first) => {
                    return Err(SanplanError::new(DuplicateDefinitionError::PartitionAddress {
                        address: partition.primary_address.to_string(),
                        first: first.get().clone(),
                        second: label,
                    }))
                }
                Entry::Vacant(entry) => {
                    trace!("Partition '{label}' serves {}", partition.primary_address);
                    entry.insert(label);
                }
            }
        }
        Ok(())
    }

    fn validate_interface_addresses(&self) -> Result<(), SanplanError> {
        let mut seen: BTreeMap<Ipv4Addr, &str> = BTreeMap::new();
        for host in &self.graph.hosts {
            for address in host.interfaces.iter().filter_map(|iface| iface.address) {
                match seen.entry(address) {
                    Entry::Occupied(first) if *first.get() != host.name => {
                        return Err(SanplanError::new(
                            DuplicateDefinitionError::InterfaceAddress {
                                address: address.to_string(),
                                first: first.get().to_string(),
                                second: host.name.clone(),
                            },
                        ))
                    }
                    Entry::Occupied(_) => {}
                    Entry::Vacant(entry) => {
                        entry.insert(&host.name);
                    }
                }
            }
        }
        Ok(())
    }

    /// A switch port cabled to two host interfaces is reported, not fatal.
    fn validate_switch_ports(&mut self) {
        let mut seen: BTreeMap<(String, String), String> = BTreeMap::new();
        let mut reused = Vec::new();
        for host in &self.graph.hosts {
            for iface in &host.interfaces {
                let (Some(switch), Some(port)) = (&iface.switch_name, &iface.switch_port) else {
                    continue;
                };
                match seen.entry((switch.clone(), port.clone())) {
                    Entry::Occupied(first) => reused.push(format!(
                        "Switch port {switch}:{port} is used by both '{}' and '{}'",
                        first.get(),
                        host.name
                    )),
                    Entry::Vacant(entry) => {
                        entry.insert(host.name.clone());
                    }
                }
            }
        }
        for message in reused {
            self.diagnostics.warn(message);
        }
    }

    fn validate_volume_sizes(&self) -> Result<(), SanplanError> {
        let minimum = Gigabytes(MINIMUM_CM_VOLUME_GB);
        for volume in &self.graph.volumes {
            if volume.kind == VolumeKind::Declared
                && volume.workload == WorkloadType::OraCm
                && volume.usable < minimum
            {
                return Err(SanplanError::new(ConfigurationInvalidError::UndersizedVolume {
                    volume: volume.name.clone(),
                    workload: volume.workload.to_string(),
                    usable: volume.usable.to_string(),
                    minimum: minimum.to_string(),
                }));
            }
        }
        Ok(())
    }
}
