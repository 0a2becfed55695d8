//! Read-only snapshot data model.
//!
//! The backend pushes its current object graph (categories, instances,
//! variables, scripts, events, media, links) plus the variable profiles
//! that describe how raw values map to display semantics. This crate
//! only reads the snapshot; ownership stays with the consumer's store,
//! which keeps it updated from push events.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend object types, by wire discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ObjectKind {
    Category,
    Instance,
    Variable,
    Script,
    Event,
    Media,
    Link,
}

impl TryFrom<u8> for ObjectKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Category),
            1 => Ok(Self::Instance),
            2 => Ok(Self::Variable),
            3 => Ok(Self::Script),
            4 => Ok(Self::Event),
            5 => Ok(Self::Media),
            6 => Ok(Self::Link),
            other => Err(format!("unknown object type {other}")),
        }
    }
}

impl From<ObjectKind> for u8 {
    fn from(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Category => 0,
            ObjectKind::Instance => 1,
            ObjectKind::Variable => 2,
            ObjectKind::Script => 3,
            ObjectKind::Event => 4,
            ObjectKind::Media => 5,
            ObjectKind::Link => 6,
        }
    }
}

/// Backend variable kinds. `Float` is the only continuous kind;
/// the others match profile associations by exact value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum VariableKind {
    Boolean,
    Integer,
    Float,
    String,
}

impl TryFrom<u8> for VariableKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Boolean),
            1 => Ok(Self::Integer),
            2 => Ok(Self::Float),
            3 => Ok(Self::String),
            other => Err(format!("unknown variable type {other}")),
        }
    }
}

impl From<VariableKind> for u8 {
    fn from(kind: VariableKind) -> Self {
        match kind {
            VariableKind::Boolean => 0,
            VariableKind::Integer => 1,
            VariableKind::Float => 2,
            VariableKind::String => 3,
        }
    }
}

/// Variable payload of a snapshot object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VariableData {
    #[serde(default)]
    pub variable_value: Value,

    pub variable_type: VariableKind,

    /// Declared profile name; empty when none is assigned.
    #[serde(default)]
    pub variable_profile: String,

    /// Custom profile override; takes precedence over the declared one.
    #[serde(default)]
    pub variable_custom_profile: String,
}

impl VariableData {
    /// The effective profile name, preferring the custom override.
    /// `None` when neither is assigned.
    pub fn effective_profile(&self) -> Option<&str> {
        if !self.variable_custom_profile.is_empty() {
            Some(&self.variable_custom_profile)
        } else if !self.variable_profile.is_empty() {
            Some(&self.variable_profile)
        } else {
            None
        }
    }
}

/// One object of the backend's object graph.
///
/// The backend flattens per-kind payloads into the object record, so
/// variable fields and the link target are optional here and only
/// present for the matching [`ObjectKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", try_from = "RawSnapshotObject")]
pub struct SnapshotObject {
    #[serde(rename = "ObjectID")]
    pub id: u32,

    pub object_type: ObjectKind,

    pub object_name: String,

    /// Declared icon name; empty means unset.
    pub object_icon: String,

    /// Variable payload, present when `object_type` is `Variable`.
    #[serde(flatten)]
    pub variable: Option<VariableData>,

    /// Link target, present when `object_type` is `Link`.
    #[serde(rename = "TargetID")]
    pub target_id: Option<u32>,
}

// Deserialized through a flat intermediate: the wire record mixes the
// per-kind payload fields into the object itself, and `object_type`
// decides which of them are meaningful.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSnapshotObject {
    #[serde(default, rename = "ObjectID")]
    id: u32,

    object_type: ObjectKind,

    #[serde(default)]
    object_name: String,

    #[serde(default)]
    object_icon: String,

    #[serde(default)]
    variable_value: Value,

    #[serde(default)]
    variable_type: Option<VariableKind>,

    #[serde(default)]
    variable_profile: String,

    #[serde(default)]
    variable_custom_profile: String,

    #[serde(default, rename = "TargetID")]
    target_id: Option<u32>,
}

impl TryFrom<RawSnapshotObject> for SnapshotObject {
    type Error = String;

    fn try_from(raw: RawSnapshotObject) -> Result<Self, Self::Error> {
        let variable = if raw.object_type == ObjectKind::Variable {
            let variable_type = raw
                .variable_type
                .ok_or_else(|| format!("variable object {} without VariableType", raw.id))?;
            Some(VariableData {
                variable_value: raw.variable_value,
                variable_type,
                variable_profile: raw.variable_profile,
                variable_custom_profile: raw.variable_custom_profile,
            })
        } else {
            None
        };

        Ok(Self {
            id: raw.id,
            object_type: raw.object_type,
            object_name: raw.object_name,
            object_icon: raw.object_icon,
            variable,
            target_id: raw.target_id,
        })
    }
}

impl SnapshotObject {
    /// The object's own declared icon, with the empty string
    /// normalized away.
    pub fn declared_icon(&self) -> Option<&str> {
        if self.object_icon.is_empty() {
            None
        } else {
            Some(&self.object_icon)
        }
    }
}

/// One value→display mapping inside a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProfileAssociation {
    #[serde(default)]
    pub value: Value,

    #[serde(default)]
    pub name: String,

    /// Icon for this association; empty means "use the profile icon".
    #[serde(default)]
    pub icon: String,

    #[serde(default)]
    pub color: i32,
}

/// Display metadata for a variable: icon, value associations, numeric
/// range, and formatting hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VariableProfile {
    #[serde(default)]
    pub icon: String,

    /// Ordered associations; keyed by exact value for discrete kinds,
    /// searched by nearest value for continuous kinds.
    #[serde(default)]
    pub associations: Vec<ProfileAssociation>,

    #[serde(default)]
    pub min_value: f64,

    #[serde(default)]
    pub max_value: f64,

    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub suffix: String,

    #[serde(default)]
    pub digits: u8,
}

impl VariableProfile {
    pub fn declared_icon(&self) -> Option<&str> {
        if self.icon.is_empty() { None } else { Some(&self.icon) }
    }
}

/// The backend's current object graph as last pushed or fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub objects: HashMap<u32, SnapshotObject>,

    #[serde(default)]
    pub profiles: HashMap<String, VariableProfile>,
}

impl Snapshot {
    /// Look up an object by its numeric identifier.
    pub fn object(&self, id: u32) -> Option<&SnapshotObject> {
        self.objects.get(&id)
    }

    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Option<&VariableProfile> {
        self.profiles.get(name)
    }
}
