//! Field-name classification.
//!
//! FA field names encode the model level as a prefix: `S` followed by three
//! digits, then the basename (`S042WIND.U.PHYS`). A basename present at every
//! declared model level is a 3D field; one present at only some levels
//! (radiation fluxes at top and bottom, for instance) is pseudo-3D. Names
//! without the prefix are plain 2D fields.
//!
//! The classification runs once per source file and is consulted by key
//! afterwards.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{FaError, Result};
use crate::metadata::{unbox, value_as_f64};

/// One row of the decoder's field listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spectral: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbits: Option<i64>,
}

impl FieldRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            index: None,
            spectral: None,
            nbits: None,
        }
    }

    /// Parse a record leniently: values may be boxed in length-1 arrays,
    /// `spectral` may be a boolean, 0/1 or a string.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| FaError::invalid_metadata(format!("field record is not an object: {}", value)))?;

        let name = match obj.get("name").and_then(unbox) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                return Err(FaError::invalid_metadata(format!(
                    "field record without a name: {}",
                    value
                )))
            }
        };

        let int = |key: &str| {
            obj.get(key)
                .and_then(unbox)
                .and_then(value_as_f64)
                .map(|v| v as i64)
        };

        let spectral = obj.get("spectral").and_then(unbox).and_then(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            other => value_as_f64(other).map(|n| n != 0.0),
        });

        Ok(Self {
            name,
            index: int("index"),
            spectral,
            nbits: int("nbits"),
        })
    }
}

/// Class of a raw field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldNameClass {
    /// Single-level field, requested by its full name.
    Pure2D,
    /// Level of a field present at every model level.
    Pure3D { basename: String, level: u32 },
    /// Level of a field present at only some model levels.
    Pseudo3D { basename: String, level: u32 },
}

impl FieldNameClass {
    pub fn basename(&self) -> Option<&str> {
        match self {
            FieldNameClass::Pure2D => None,
            FieldNameClass::Pure3D { basename, .. } | FieldNameClass::Pseudo3D { basename, .. } => {
                Some(basename)
            }
        }
    }

    pub fn level(&self) -> Option<u32> {
        match self {
            FieldNameClass::Pure2D => None,
            FieldNameClass::Pure3D { level, .. } | FieldNameClass::Pseudo3D { level, .. } => {
                Some(*level)
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FieldNameClass::Pure2D => "2D",
            FieldNameClass::Pure3D { .. } => "3D",
            FieldNameClass::Pseudo3D { .. } => "pseudo-3D",
        }
    }
}

/// Split a level-prefixed name (`S` + 3 digits + basename) into level and basename.
pub fn parse_level_prefix(name: &str) -> Option<(u32, &str)> {
    let bytes = name.as_bytes();
    if bytes.len() < 5 || bytes[0] != b'S' || !bytes[1..4].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let level = name[1..4].parse().ok()?;
    Some((level, &name[4..]))
}

/// A 2D name and a multilevel basename that coincide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasenameConflict {
    pub name: String,
    /// True when the 2D field appeared first and the multilevel group was
    /// demoted to individual 2D names.
    pub kept_2d: bool,
}

/// Classification of every field name of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCatalog {
    nlev: u32,
    classes: BTreeMap<String, FieldNameClass>,
    pure_2d: BTreeSet<String>,
    pure_3d_names: BTreeSet<String>,
    pure_3d_basenames: BTreeSet<String>,
    pseudo_3d_names: BTreeSet<String>,
    pseudo_3d_basenames: BTreeSet<String>,
    /// Basename -> levels present, for every multilevel group.
    levels: BTreeMap<String, BTreeSet<u32>>,
    /// Listing order of unique names.
    order: Vec<String>,
    duplicates: Vec<String>,
    conflicts: Vec<BasenameConflict>,
}

impl FieldCatalog {
    /// Classify the names of a file declaring `nlev` model levels.
    pub fn classify<S: AsRef<str>>(names: &[S], nlev: i64) -> Result<Self> {
        if names.is_empty() {
            return Err(FaError::EmptyCatalog("file declares zero fields".to_string()));
        }
        if nlev <= 0 {
            return Err(FaError::invalid_metadata(format!(
                "declared number of levels must be positive, got {}",
                nlev
            )));
        }
        let nlev = u32::try_from(nlev)
            .map_err(|_| FaError::invalid_metadata(format!("nlev out of range: {}", nlev)))?;

        // Unique names in first-seen order
        let mut order: Vec<String> = Vec::with_capacity(names.len());
        let mut seen = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        for raw in names {
            let name = raw.as_ref().trim().to_string();
            if name.is_empty() {
                continue;
            }
            if !seen.insert(name.clone()) {
                duplicates.insert(name);
                continue;
            }
            order.push(name);
        }
        if order.is_empty() {
            return Err(FaError::EmptyCatalog("all field names are blank".to_string()));
        }
        for name in &duplicates {
            warn!(field = %name, "Duplicate field name in catalog, last record wins");
        }

        let first_seen: BTreeMap<String, usize> = order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();

        // Partition by the level-prefix test
        let mut pure_2d = BTreeSet::new();
        let mut groups: BTreeMap<String, Vec<(u32, String)>> = BTreeMap::new();
        let mut group_first: BTreeMap<String, usize> = BTreeMap::new();
        for (pos, name) in order.iter().enumerate() {
            match parse_level_prefix(name) {
                Some((level, basename)) => {
                    groups
                        .entry(basename.to_string())
                        .or_default()
                        .push((level, name.clone()));
                    group_first.entry(basename.to_string()).or_insert(pos);
                }
                None => {
                    pure_2d.insert(name.clone());
                }
            }
        }

        let mut catalog = Self {
            nlev,
            classes: BTreeMap::new(),
            pure_2d: BTreeSet::new(),
            pure_3d_names: BTreeSet::new(),
            pure_3d_basenames: BTreeSet::new(),
            pseudo_3d_names: BTreeSet::new(),
            pseudo_3d_basenames: BTreeSet::new(),
            levels: BTreeMap::new(),
            order,
            duplicates: duplicates.into_iter().collect(),
            conflicts: Vec::new(),
        };

        for name in pure_2d {
            catalog.classes.insert(name.clone(), FieldNameClass::Pure2D);
            catalog.pure_2d.insert(name);
        }

        for (basename, members) in groups {
            if let Some(&pos_2d) = first_seen.get(&basename) {
                if catalog.pure_2d.contains(&basename) {
                    let kept_2d = pos_2d < group_first[&basename];
                    warn!(
                        field = %basename,
                        kept_2d,
                        "2D field name coincides with a multilevel basename"
                    );
                    catalog.conflicts.push(BasenameConflict {
                        name: basename.clone(),
                        kept_2d,
                    });
                    if kept_2d {
                        // Members stay importable under their full names
                        for (_, name) in members {
                            catalog.classes.insert(name.clone(), FieldNameClass::Pure2D);
                            catalog.pure_2d.insert(name);
                        }
                        continue;
                    }
                }
            }

            let distinct: BTreeSet<u32> = members.iter().map(|(level, _)| *level).collect();
            let count = distinct.len() as u32;
            let is_3d = count == nlev;
            if count > nlev {
                warn!(
                    field = %basename,
                    levels = count,
                    nlev,
                    "Multilevel field has more levels than declared, treating as pseudo-3D"
                );
            }

            for (level, name) in members {
                let class = if is_3d {
                    catalog.pure_3d_names.insert(name.clone());
                    FieldNameClass::Pure3D {
                        basename: basename.clone(),
                        level,
                    }
                } else {
                    catalog.pseudo_3d_names.insert(name.clone());
                    FieldNameClass::Pseudo3D {
                        basename: basename.clone(),
                        level,
                    }
                };
                catalog.classes.insert(name, class);
            }
            if is_3d {
                catalog.pure_3d_basenames.insert(basename.clone());
            } else {
                catalog.pseudo_3d_basenames.insert(basename.clone());
            }
            catalog.levels.insert(basename, distinct);
        }

        debug!(
            pure_2d = catalog.pure_2d.len(),
            pure_3d = catalog.pure_3d_basenames.len(),
            pseudo_3d = catalog.pseudo_3d_basenames.len(),
            nlev,
            "Classified field catalog"
        );

        Ok(catalog)
    }

    /// Classify the names of decoder records.
    pub fn from_records(records: &[FieldRecord], nlev: i64) -> Result<Self> {
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        Self::classify(&names, nlev)
    }

    pub fn nlev(&self) -> u32 {
        self.nlev
    }

    /// Number of unique field names.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn class_of(&self, name: &str) -> Option<&FieldNameClass> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn pure_2d_names(&self) -> &BTreeSet<String> {
        &self.pure_2d
    }

    pub fn pure_3d_names(&self) -> &BTreeSet<String> {
        &self.pure_3d_names
    }

    pub fn pure_3d_basenames(&self) -> &BTreeSet<String> {
        &self.pure_3d_basenames
    }

    pub fn pseudo_3d_names(&self) -> &BTreeSet<String> {
        &self.pseudo_3d_names
    }

    pub fn pseudo_3d_basenames(&self) -> &BTreeSet<String> {
        &self.pseudo_3d_basenames
    }

    pub fn is_pure_3d_basename(&self, name: &str) -> bool {
        self.pure_3d_basenames.contains(name)
    }

    pub fn is_pseudo_3d_basename(&self, name: &str) -> bool {
        self.pseudo_3d_basenames.contains(name)
    }

    /// Levels present for a multilevel basename.
    pub fn levels_of(&self, basename: &str) -> Option<&BTreeSet<u32>> {
        self.levels.get(basename)
    }

    /// Full names of a multilevel basename, ordered by level.
    pub fn members_of(&self, basename: &str) -> Vec<String> {
        let mut members: Vec<(u32, &String)> = self
            .classes
            .iter()
            .filter_map(|(name, class)| match class.basename() {
                Some(b) if b == basename => class.level().map(|l| (l, name)),
                _ => None,
            })
            .collect();
        members.sort();
        members.into_iter().map(|(_, n)| n.clone()).collect()
    }

    /// All unique names in listing order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Names listed more than once by the decoder.
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    /// 2D names that coincide with a multilevel basename.
    pub fn conflicts(&self) -> &[BasenameConflict] {
        &self.conflicts
    }

    /// A 2D name hidden behind a multilevel basename of the same spelling.
    pub fn is_shadowed_2d(&self, name: &str) -> bool {
        self.conflicts.iter().any(|c| c.name == name && !c.kept_2d)
    }

    /// Comma-separated listing of the first `max` names, for diagnostics.
    pub fn listing(&self, max: usize) -> String {
        let shown: Vec<&str> = self.order.iter().take(max).map(|s| s.as_str()).collect();
        let mut out = shown.join(", ");
        if self.order.len() > max {
            out.push_str(&format!(", ... ({} more)", self.order.len() - max));
        }
        out
    }
}
