use std::{collections::BTreeMap, str::FromStr};

use crate::{
    config::{Switch, SwitchType},
    error::{InvalidInputError, SanplanError},
};

/// Registry of known network switches, keyed by name.
///
/// Each non-comment line reads `name,type,site,location,uplink1,uplink2`. The
/// uplink columns are optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwitchRegistry {
    switches: BTreeMap<String, Switch>,
}

impl SwitchRegistry {
    pub fn parse(text: &str) -> Result<Self, SanplanError> {
        let mut switches = BTreeMap::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() < 4 {
                return Err(SanplanError::new(InvalidInputError::ParseSwitches {
                    line: index + 1,
                    reason: format!("expected at least 4 fields, found {}", fields.len()),
                }));
            }

            let switch_type = SwitchType::from_str(fields[1]).map_err(|_| {
                SanplanError::new(InvalidInputError::ParseSwitches {
                    line: index + 1,
                    reason: format!("unknown switch type '{}'", fields[1]),
                })
            })?;

            let switch = Switch {
                name: fields[0].to_owned(),
                switch_type,
                site_name: fields[2].to_owned(),
                location: fields[3].to_owned(),
                uplinks: fields[4..]
                    .iter()
                    .filter(|uplink| !uplink.is_empty())
                    .map(|uplink| uplink.to_string())
                    .collect(),
            };
            switches.insert(switch.name.clone(), switch);
        }
        Ok(Self { switches })
    }

    pub fn get(&self, name: &str) -> Option<&Switch> {
        self.switches.get(name)
    }

    pub fn len(&self) -> usize {
        self.switches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }
}
