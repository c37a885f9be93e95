use std::fmt::{Debug, Write};
use std::{borrow::Cow, panic::Location};

use serde::{ser::SerializeStruct, Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};

/// The kind of entity an error refers to.
#[derive(Debug, Clone, Copy, Display, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    #[strum(serialize = "project")]
    Project,
    #[strum(serialize = "revision")]
    Revision,
    #[strum(serialize = "site")]
    Site,
    #[strum(serialize = "host")]
    Host,
    #[strum(serialize = "interface")]
    Interface,
    #[strum(serialize = "switch")]
    Switch,
    #[strum(serialize = "VLAN")]
    Vlan,
    #[strum(serialize = "network")]
    Network,
    #[strum(serialize = "controller")]
    Controller,
    #[strum(serialize = "partition")]
    Partition,
    #[strum(serialize = "volume")]
    Volume,
    #[strum(serialize = "volume set")]
    VolumeSet,
    #[strum(serialize = "qtree")]
    Qtree,
    #[strum(serialize = "export")]
    Export,
    #[strum(serialize = "LUN")]
    Lun,
    #[strum(serialize = "initiator group")]
    Igroup,
    #[strum(serialize = "snapvault set")]
    VaultSet,
    #[strum(serialize = "snapmirror set")]
    MirrorSet,
}

/// One of the input documents could not be read or parsed.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidInputError {
    #[error("Failed to load project document from '{path}'")]
    LoadProject { path: String },
    #[error("Failed to parse project document")]
    ParseProject,
    #[error("Failed to load defaults table from '{path}'")]
    LoadDefaults { path: String },
    #[error("Failed to parse defaults table")]
    ParseDefaults,
    #[error("Failed to load switch registry from '{path}'")]
    LoadSwitches { path: String },
    #[error("Invalid switch registry entry on line {line}: {reason}")]
    ParseSwitches { line: usize, reason: String },
    #[error("Failed to write output file '{path}'")]
    WriteOutputFile { path: String },
}

/// A required element or field is absent or unreadable.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedInputError {
    #[error("The {kind} '{name}' is missing required field '{field}'")]
    MissingField {
        kind: EntityKind,
        name: String,
        field: String,
    },
    #[error("Field '{field}' of {kind} '{name}' has invalid value '{value}'")]
    InvalidValue {
        kind: EntityKind,
        name: String,
        field: String,
        value: String,
    },
    #[error("No hosts are declared, hosts must be declared within a site")]
    NoHosts,
    #[error("Secondary controller '{controller}' is not preceded by a primary controller at its site")]
    UnpairedSecondary { controller: String },
}

/// A name is referenced but never declared.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum UndefinedReferenceError {
    #[error("'{referrer}' references undefined {kind} '{name}'")]
    Entity {
        referrer: String,
        kind: EntityKind,
        name: String,
    },
    #[error("'{referrer}' requires a {kind} {criterion}, but none is declared")]
    NoCandidate {
        referrer: String,
        kind: EntityKind,
        criterion: String,
    },
}

/// A name or address that must be unique within its scope is reused.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateDefinitionError {
    #[error("The {kind} '{name}' is defined more than once in {scope}")]
    Name {
        kind: EntityKind,
        name: String,
        scope: String,
    },
    #[error("Partitions '{first}' and '{second}' share primary address '{address}'")]
    PartitionAddress {
        address: String,
        first: String,
        second: String,
    },
    #[error("Hosts '{first}' and '{second}' both use interface address '{address}'")]
    InterfaceAddress {
        address: String,
        first: String,
        second: String,
    },
}

/// A value is present but cannot be satisfied.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigurationInvalidError {
    #[error("Volume '{volume}' has a snapshot reserve of 100%")]
    FullSnapshotReserve { volume: String },
    #[error("Size of {size} GB does not round to a positive amount")]
    NonPositiveCreateSize { size: String },
    #[error("LUNs of volume '{volume}' request {requested} GB, the volume holds {available} GB")]
    OverallocatedVolume {
        volume: String,
        requested: String,
        available: String,
    },
    #[error("Volume '{volume}' of type '{workload}' is {usable} GB, the minimum is {minimum} GB")]
    UndersizedVolume {
        volume: String,
        workload: String,
        usable: String,
        minimum: String,
    },
    #[error("Field '{field}' of {kind} '{name}' has unsupported value '{value}'")]
    UnsupportedValue {
        kind: EntityKind,
        name: String,
        field: String,
        value: String,
    },
    #[error("Volume '{volume}' references snapshot set '{set}', snapshot sets are not supported")]
    SnapshotSetUnsupported { volume: String, set: String },
    #[error("Project uses the obsolete 'nas' topology declaration")]
    LegacyTopology,
}

/// An implicit reference matches more than one candidate.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguousReferenceError {
    #[error("'{referrer}' refers to the site of type '{site_type}', which matches {candidates:?}")]
    SiteOfType {
        referrer: String,
        site_type: String,
        candidates: Vec<String>,
    },
}

/// An entity lacks an attribute that a later derivation depends on.
#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum MissingAttributeError {
    #[error("The {kind} '{name}' has no '{field}'")]
    Field {
        kind: EntityKind,
        name: String,
        field: String,
    },
    #[error("Host '{host}' has no iSCSI initiator, required by LUN '{lun}'")]
    InitiatorName { host: String, lun: String },
}

#[derive(Debug, Eq, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InternalError {
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Failed to serialize project graph")]
    SerializeGraph,
}

/// Each variant of `ErrorKind` corresponds to a different category of error.
#[derive(Debug, Eq, thiserror::Error, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// An input document could not be read or parsed.
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),

    /// A required field or node is absent from the declarative tree.
    #[error(transparent)]
    MalformedInput(#[from] MalformedInputError),

    /// A host, switch, controller or policy set is referenced but not declared.
    #[error(transparent)]
    UndefinedReference(#[from] UndefinedReferenceError),

    /// A name or address is reused within a scope that requires uniqueness.
    #[error(transparent)]
    DuplicateDefinition(#[from] DuplicateDefinitionError),

    /// A value is structurally present but semantically impossible.
    #[error(transparent)]
    ConfigurationInvalid(#[from] ConfigurationInvalidError),

    /// An implicit reference matches more than one candidate.
    #[error(transparent)]
    AmbiguousReference(#[from] AmbiguousReferenceError),

    /// An entity lacks an attribute needed by a later derivation.
    #[error(transparent)]
    MissingAttribute(#[from] MissingAttributeError),

    /// A bug was encountered.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

#[derive(Debug)]
struct SanplanErrorInner {
    kind: ErrorKind,
    location: &'static Location<'static>,
    source: Option<anyhow::Error>,
    context: Vec<(Cow<'static, str>, &'static Location<'static>)>,
}

pub struct SanplanError(Box<SanplanErrorInner>);
impl SanplanError {
    #[track_caller]
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        SanplanError(Box::new(SanplanErrorInner {
            kind: kind.into(),
            location: Location::caller(),
            source: None,
            context: Vec::new(),
        }))
    }

    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(InternalError::Internal(message.into()))
    }

    /// Returns a reference to the inner ErrorKind.
    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }
}

pub trait ReportError<T, K> {
    /// Convert this error into a structured SanplanError.
    fn structured(self, kind: K) -> Result<T, SanplanError>;
}

impl<T, K> ReportError<T, K> for Option<T>
where
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, SanplanError> {
        match self {
            Some(t) => Ok(t),
            None => Err(SanplanError(Box::new(SanplanErrorInner {
                kind: kind.into(),
                location: Location::caller(),
                source: None,
                context: Vec::new(),
            }))),
        }
    }
}

impl<T, E, K> ReportError<T, K> for Result<T, E>
where
    E: Into<anyhow::Error>,
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, SanplanError> {
        match self {
            Ok(o) => Ok(o),
            Err(e) => Err(SanplanError(Box::new(SanplanErrorInner {
                kind: kind.into(),
                location: Location::caller(),
                source: Some(e.into()),
                context: Vec::new(),
            }))),
        }
    }
}

pub trait SanplanResultExt<T> {
    /// Attach a context message to the error.
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, SanplanError>;
}

impl<T> SanplanResultExt<T> for Result<T, SanplanError> {
    #[track_caller]
    fn message(mut self, context: impl Into<Cow<'static, str>>) -> Result<T, SanplanError> {
        if let Err(ref mut e) = self {
            e.0.context.push((context.into(), Location::caller()));
        }
        self
    }
}

impl Serialize for SanplanError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("sanplan-error", 5)?;
        state.serialize_field("message", &self.0.kind.to_string())?;
        match self.0.kind {
            ErrorKind::InvalidInput(ref e) => state.serialize_field("error", e)?,
            ErrorKind::MalformedInput(ref e) => state.serialize_field("error", e)?,
            ErrorKind::UndefinedReference(ref e) => state.serialize_field("error", e)?,
            ErrorKind::DuplicateDefinition(ref e) => state.serialize_field("error", e)?,
            ErrorKind::ConfigurationInvalid(ref e) => state.serialize_field("error", e)?,
            ErrorKind::AmbiguousReference(ref e) => state.serialize_field("error", e)?,
            ErrorKind::MissingAttribute(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Internal(ref e) => state.serialize_field("error", e)?,
        }
        state.serialize_field("category", <&str>::from(&self.0.kind))?;
        state.serialize_field(
            "location",
            &format!("{}:{}", self.0.location.file(), self.0.location.line()),
        )?;
        match self.0.source {
            Some(ref e) => state.serialize_field("cause", &Some(format!("{:?}", e)))?,
            None => state.serialize_field("cause", &None::<String>)?,
        }
        state.end()
    }
}

impl Debug for SanplanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.0.kind,
            self.0.location.file(),
            self.0.location.line()
        )?;

        if !self.0.context.is_empty() {
            writeln!(f, "\n\nContext:")?;
            for (i, (context, location)) in self.0.context.iter().enumerate() {
                for (j, line) in context.split('\n').enumerate() {
                    if j == 0 {
                        write!(f, "{: >5}: ", i)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                writeln!(f, " at {}:{}", location.file(), location.line())?;
            }
        }

        if let Some(ref source) = self.0.source {
            writeln!(f, "\n\nCaused by:")?;
            let mut index = 0;
            let mut source: Option<&dyn std::error::Error> = Some(source.as_ref());
            while let Some(e) = source {
                for (i, line) in e.to_string().split('\n').enumerate() {
                    if i == 0 {
                        write!(f, "{: >5}: ", index)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                f.write_char('\n')?;
                source = e.source();
                index += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use serde_yaml::Value;

    use super::*;

    #[test]
    fn test_error_serialize() {
        let e = SanplanError(Box::new(SanplanErrorInner {
            kind: ErrorKind::InvalidInput(InvalidInputError::LoadProject {
                path: "/non-existent-file".into(),
            }),
            location: Location::caller(),
            source: Some(
                std::fs::read("/non-existent-file")
                    .context("failed to read file")
                    .unwrap_err(),
            ),
            context: Vec::new(),
        }));
        match serde_yaml::to_value(e).unwrap() {
            Value::Mapping(m) => {
                assert_eq!(m.len(), 5);
                assert!(matches!(m["error"], Value::Tagged(_)));
                assert_eq!(m["category"], Value::String("invalid-input".into()));
                assert!(matches!(m["cause"], Value::String(_)));
                assert_eq!(
                    m["message"],
                    Value::String(
                        "Failed to load project document from '/non-existent-file'".into()
                    )
                );
                match m["location"] {
                    Value::String(ref s) => assert!(s.contains("error.rs:")),
                    _ => panic!("location isn't string"),
                }
            }
            _ => panic!("value isn't mapping"),
        }
    }

    #[test]
    fn test_error_debug() {
        let error = Err::<(), _>(anyhow::anyhow!("z"))
            .context("x\ny")
            .structured(InvalidInputError::ParseDefaults)
            .unwrap_err();
        assert_eq!(
            format!("{:?}", error),
            format!(
                "Failed to parse defaults table at {}:{}\n\nCaused by:\n    0: x\n       y\n    1: z\n",
                error.0.location.file(),
                error.0.location.line(),
            ),
        );
    }

    #[test]
    fn test_error_message_context() {
        let error = Err::<(), _>(SanplanError::new(MalformedInputError::NoHosts))
            .message("Failed to load hosts")
            .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::MalformedInput(MalformedInputError::NoHosts)
        );
        let rendered = format!("{error:?}");
        assert!(rendered.contains("Context:"));
        assert!(rendered.contains("Failed to load hosts"));
    }

    #[test]
    fn test_entity_kind_display() {
        assert_eq!(EntityKind::VaultSet.to_string(), "snapvault set");
        assert_eq!(EntityKind::Lun.to_string(), "LUN");
    }
}
