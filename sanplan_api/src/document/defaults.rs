use configparser::ini::Ini;

use crate::{
    constants::GLOBAL_SECTION,
    error::{InvalidInputError, ReportError, SanplanError},
};

/// Site-keyed defaults table. Sections are site names plus `global`; section
/// and key lookups ignore case.
#[derive(Debug, Clone)]
pub struct Defaults {
    ini: Ini,
}

impl Default for Defaults {
    fn default() -> Self {
        Self { ini: Ini::new() }
    }
}

impl Defaults {
    pub fn parse(text: &str) -> Result<Self, SanplanError> {
        let mut ini = Ini::new();
        ini.read(text.to_owned())
            .map_err(anyhow::Error::msg)
            .structured(InvalidInputError::ParseDefaults)?;
        Ok(Self { ini })
    }

    /// Non-empty value of a key in a section.
    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get(section, key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    /// Whitespace separated list stored under a key; empty when absent.
    pub fn list(&self, section: &str, key: &str) -> Vec<String> {
        self.get(section, key)
            .map(|value| value.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    pub fn global(&self, key: &str) -> Option<String> {
        self.get(GLOBAL_SECTION, key)
    }
}
