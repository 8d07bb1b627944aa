//! Top-level sections of a product or director configuration file.

use std::fmt;

use serde_yaml::{Mapping, Value};

use crate::error::{ConfigError, Result};

/// The recognized top-level sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    ProductProperties,
    NetworkProperties,
    ResourceConfig,
    ErrandConfig,
    AzConfiguration,
    NetworkAssignment,
    NetworksConfiguration,
    IaasConfiguration,
    DirectorConfiguration,
    SyslogConfiguration,
    SecurityConfiguration,
    OpsmanConfiguration,
}

impl SectionKind {
    pub const ALL: [SectionKind; 12] = [
        Self::ProductProperties,
        Self::NetworkProperties,
        Self::ResourceConfig,
        Self::ErrandConfig,
        Self::AzConfiguration,
        Self::NetworkAssignment,
        Self::NetworksConfiguration,
        Self::IaasConfiguration,
        Self::DirectorConfiguration,
        Self::SyslogConfiguration,
        Self::SecurityConfiguration,
        Self::OpsmanConfiguration,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::ProductProperties => "product-properties",
            Self::NetworkProperties => "network-properties",
            Self::ResourceConfig => "resource-config",
            Self::ErrandConfig => "errand-config",
            Self::AzConfiguration => "az-configuration",
            Self::NetworkAssignment => "network-assignment",
            Self::NetworksConfiguration => "networks-configuration",
            Self::IaasConfiguration => "iaas-configuration",
            Self::DirectorConfiguration => "director-configuration",
            Self::SyslogConfiguration => "syslog-configuration",
            Self::SecurityConfiguration => "security-configuration",
            Self::OpsmanConfiguration => "opsman-configuration",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One top-level entry of a configuration tree
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    /// A recognized section
    Known { kind: SectionKind, value: Value },
    /// Any other key, carried through unchanged
    Other { key: Value, value: Value },
}

/// A configuration document split into its top-level sections, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    sections: Vec<Section>,
}

impl ConfigTree {
    pub fn from_value(value: Value) -> Result<Self> {
        let mapping = match value {
            Value::Null => Mapping::new(),
            Value::Mapping(mapping) => mapping,
            _ => {
                return Err(ConfigError::parse(
                    "configuration",
                    "expected a mapping at the top level",
                ))
            }
        };

        let sections = mapping
            .into_iter()
            .map(|(key, value)| match key.as_str().and_then(SectionKind::from_key) {
                Some(kind) => Section::Known { kind, value },
                None => Section::Other { key, value },
            })
            .collect();
        Ok(Self { sections })
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// The value of a recognized section, if present
    pub fn get(&self, wanted: SectionKind) -> Option<&Value> {
        self.sections.iter().find_map(|section| match section {
            Section::Known { kind, value } if *kind == wanted => Some(value),
            _ => None,
        })
    }

    /// Look up any top-level key, recognized or not
    pub fn get_key(&self, wanted: &str) -> Option<&Value> {
        self.sections.iter().find_map(|section| match section {
            Section::Known { kind, value } if kind.key() == wanted => Some(value),
            Section::Other { key, value } if key.as_str() == Some(wanted) => Some(value),
            _ => None,
        })
    }

    /// Keys that are not recognized sections
    pub fn unknown_keys(&self) -> impl Iterator<Item = &Value> {
        self.sections.iter().filter_map(|section| match section {
            Section::Other { key, .. } => Some(key),
            Section::Known { .. } => None,
        })
    }

    pub fn into_value(self) -> Value {
        let mut mapping = Mapping::with_capacity(self.sections.len());
        for section in self.sections {
            match section {
                Section::Known { kind, value } => {
                    mapping.insert(Value::String(kind.key().to_string()), value);
                }
                Section::Other { key, value } => {
                    mapping.insert(key, value);
                }
            }
        }
        Value::Mapping(mapping)
    }
}
