//! Icon resolution engine.
//!
//! Derives a display icon name from a snapshot object, its variable
//! profile, and — for continuous values — an adaptive nearest-bucket
//! interpolation. Pure reads against the snapshot; resolution is an
//! ordered chain of fallback steps where the first non-empty result
//! wins, so each step stays independently testable.

use serde_json::Value;

use crate::snapshot::{
    ObjectKind, Snapshot, SnapshotObject, VariableData, VariableKind, VariableProfile,
};

/// Icon names carrying this prefix ship with the vendor skin rather
/// than the stock icon set.
pub const VENDOR_ICON_PREFIX: &str = "Knockaut";

/// Percentage positions an adaptive icon has variants for.
pub const ADAPTIVE_BUCKETS: &[u32] = &[0, 25, 50, 75, 100];

/// Stock icons with per-level adaptive variants (`Name-0` … `Name-100`).
const DEFAULT_ADAPTIVE_ICONS: &[&str] = &["Battery", "Intensity", "Shutter"];

/// What the caller hands in for resolution.
#[derive(Debug, Clone, Copy)]
pub enum IconRef<'a> {
    /// Already a plain icon name; used directly.
    Name(&'a str),
    /// Numeric object identifier, looked up in the snapshot.
    Id(u32),
    /// An already-resolved snapshot object.
    Object(&'a SnapshotObject),
}

impl<'a> IconRef<'a> {
    /// Interpret a raw string: all-digit strings are object
    /// identifiers, anything else is a literal icon name.
    pub fn parse(raw: &'a str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            raw.parse().map_or(Self::Name(raw), Self::Id)
        } else {
            Self::Name(raw)
        }
    }
}

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconResolution {
    /// Resolved to an asset path.
    Path(String),
    /// Strict mode and the chain found no icon; the caller applies its
    /// own default.
    NotFound,
    /// The numeric identifier is absent from the snapshot — distinct
    /// from "no icon found".
    UnknownObject,
}

impl IconResolution {
    pub fn into_path(self) -> Option<String> {
        match self {
            Self::Path(path) => Some(path),
            Self::NotFound | Self::UnknownObject => None,
        }
    }
}

/// Resolves icons against a snapshot.
///
/// Holds the adaptive-icon registry and the path templates; the
/// defaults match the stock skin layout.
#[derive(Debug, Clone)]
pub struct IconResolver {
    /// Icon names with adaptive per-level variants.
    pub adaptive_icons: Vec<String>,
    /// Percentage buckets the adaptive variants exist for.
    pub buckets: Vec<u32>,
    /// Directory for vendor-skin icons.
    pub skin_path: String,
    /// Directory for stock icons.
    pub asset_path: String,
}

impl Default for IconResolver {
    fn default() -> Self {
        Self {
            adaptive_icons: DEFAULT_ADAPTIVE_ICONS.iter().map(|s| (*s).to_owned()).collect(),
            buckets: ADAPTIVE_BUCKETS.to_vec(),
            skin_path: "skins/knockaut/icons".to_owned(),
            asset_path: "img/icons".to_owned(),
        }
    }
}

impl IconResolver {
    /// Resolve a display icon for `re`.
    ///
    /// In strict mode the generic per-kind fallbacks are suppressed and
    /// an unresolved chain reports [`IconResolution::NotFound`] so the
    /// caller can apply its own default.
    pub fn resolve(&self, snapshot: &Snapshot, re: IconRef<'_>, strict: bool) -> IconResolution {
        let object = match re {
            IconRef::Name(name) => return IconResolution::Path(self.format_path(name)),
            IconRef::Id(id) => match snapshot.object(id) {
                Some(object) => object,
                None => return IconResolution::UnknownObject,
            },
            IconRef::Object(object) => object,
        };

        match self.object_icon(snapshot, object, strict) {
            Some(name) => IconResolution::Path(self.format_path(&name)),
            None => IconResolution::NotFound,
        }
    }

    /// The fallback chain, first match wins:
    /// own icon → link target's icon → variable profile → kind default.
    fn object_icon(
        &self,
        snapshot: &Snapshot,
        object: &SnapshotObject,
        strict: bool,
    ) -> Option<String> {
        own_icon(object)
            .or_else(|| linked_icon(snapshot, object))
            .or_else(|| self.variable_icon(snapshot, object))
            .or_else(|| {
                if strict {
                    None
                } else {
                    kind_default(object.object_type).map(str::to_owned)
                }
            })
    }

    /// Profile-driven resolution for variables: association match,
    /// else the profile's own icon, with adaptive suffixing applied to
    /// registered names.
    fn variable_icon(&self, snapshot: &Snapshot, object: &SnapshotObject) -> Option<String> {
        if object.object_type != ObjectKind::Variable {
            return None;
        }
        let var = object.variable.as_ref()?;
        let profile = snapshot.profile(var.effective_profile()?)?;

        let name = association_icon(profile, var)
            .or_else(|| profile.declared_icon().map(str::to_owned))?;

        if self.is_adaptive(&name) {
            if let Some(bucket) = self.nearest_bucket(var, profile) {
                return Some(format!("{name}-{bucket}"));
            }
        }
        Some(name)
    }

    fn is_adaptive(&self, name: &str) -> bool {
        self.adaptive_icons.iter().any(|a| a == name)
    }

    /// The adaptive bucket nearest to the value's 0–100 position in
    /// `[min, max]`. `None` when the range is degenerate or the kind
    /// has no numeric position; ties break toward the first bucket.
    fn nearest_bucket(&self, var: &VariableData, profile: &VariableProfile) -> Option<u32> {
        let percent = match var.variable_type {
            VariableKind::Boolean => {
                if var.variable_value.as_bool().unwrap_or(false) {
                    100.0
                } else {
                    0.0
                }
            }
            VariableKind::Integer | VariableKind::Float => {
                if profile.max_value <= profile.min_value {
                    return None;
                }
                let value = coerce_f64(&var.variable_value)?;
                ((value - profile.min_value) / (profile.max_value - profile.min_value) * 100.0)
                    .clamp(0.0, 100.0)
            }
            VariableKind::String => return None,
        };

        let mut best: Option<(u32, f64)> = None;
        for &bucket in &self.buckets {
            let distance = (f64::from(bucket) - percent).abs();
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((bucket, distance));
            }
        }
        best.map(|(bucket, _)| bucket)
    }

    /// Map an icon name to its asset path. Vendor-prefixed names live
    /// in the skin directory, everything else in the stock set.
    fn format_path(&self, name: &str) -> String {
        if name.starts_with(VENDOR_ICON_PREFIX) {
            format!("{}/{name}.svg", self.skin_path)
        } else {
            format!("{}/{name}.svg", self.asset_path)
        }
    }
}

/// Step: the object's own declared icon.
fn own_icon(object: &SnapshotObject) -> Option<String> {
    object.declared_icon().map(str::to_owned)
}

/// Step: for links, follow one hop to the target's own icon.
/// Chains deeper than one hop are not resolved further.
fn linked_icon(snapshot: &Snapshot, object: &SnapshotObject) -> Option<String> {
    if object.object_type != ObjectKind::Link {
        return None;
    }
    let target = snapshot.object(object.target_id?)?;
    own_icon(target)
}

/// Step: generic per-kind defaults, suppressed in strict mode.
fn kind_default(kind: ObjectKind) -> Option<&'static str> {
    match kind {
        ObjectKind::Category => Some("Door"),
        ObjectKind::Instance => Some("Plug"),
        ObjectKind::Script => Some("Script"),
        ObjectKind::Event => Some("Clock"),
        ObjectKind::Media => Some("Image"),
        ObjectKind::Link => Some("Link"),
        ObjectKind::Variable => Some("Minus"),
    }
}

/// Pick the association for the variable's current value: exact
/// (type-coerced) equality for discrete kinds, numerically nearest for
/// the continuous float kind. The matched association's icon falls back
/// to the profile icon when empty.
fn association_icon(profile: &VariableProfile, var: &VariableData) -> Option<String> {
    if profile.associations.is_empty() {
        return None;
    }

    let matched = match var.variable_type {
        VariableKind::Float => {
            let value = coerce_f64(&var.variable_value)?;
            let mut best: Option<(usize, f64)> = None;
            for (i, assoc) in profile.associations.iter().enumerate() {
                let Some(candidate) = coerce_f64(&assoc.value) else {
                    continue;
                };
                let distance = (candidate - value).abs();
                if best.is_none_or(|(_, d)| distance < d) {
                    best = Some((i, distance));
                }
            }
            best.map(|(i, _)| &profile.associations[i])
        }
        _ => profile
            .associations
            .iter()
            .find(|assoc| values_equal(&assoc.value, &var.variable_value)),
    }?;

    if matched.icon.is_empty() {
        None
    } else {
        Some(matched.icon.clone())
    }
}

/// Loose numeric coercion for association matching: numbers directly,
/// booleans as 0/1, numeric strings parsed.
fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Type-coerced equality: numeric comparison when both sides coerce,
/// string comparison otherwise.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (coerce_f64(a), coerce_f64(b)) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a.as_str().is_some() && a.as_str() == b.as_str(),
    }
}
