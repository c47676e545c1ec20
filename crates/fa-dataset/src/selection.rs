//! Whitelist/blacklist resolution against a field catalog.
//!
//! Requests use full names for 2D and pseudo-3D levels and basenames for 3D
//! fields. Resolution rules:
//! - a full name is taken as-is and never expanded;
//! - a 3D basename selects the whole 3D field;
//! - a pseudo-3D basename expands to every level present in the file;
//! - the blacklist is applied last and always wins;
//! - without a whitelist every 2D name, every pseudo-3D level and every 3D
//!   basename is selected.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::FieldCatalog;
use crate::error::{FaError, Result};

/// User request for which fields to import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSelection {
    /// Names to import; `None` imports everything.
    pub whitelist: Option<Vec<String>>,
    /// Names never to import.
    #[serde(default)]
    pub blacklist: Vec<String>,
}

impl FieldSelection {
    /// Import every field of the file.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            whitelist: Some(names.into_iter().map(Into::into).collect()),
            blacklist: Vec::new(),
        }
    }

    pub fn excluding<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.blacklist.extend(names.into_iter().map(Into::into));
        self
    }
}

/// What the decoder must extract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSelection {
    /// Full names decoded as single-level fields (2D, pseudo-3D levels and
    /// explicitly requested 3D levels).
    pub fields_2d: BTreeSet<String>,
    /// Basenames decoded as full 3D fields.
    pub basenames_3d: BTreeSet<String>,
    /// Whitelist entries that matched nothing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmatched: Vec<String>,
}

impl ResolvedSelection {
    pub fn is_empty(&self) -> bool {
        self.fields_2d.is_empty() && self.basenames_3d.is_empty()
    }

    /// Number of variables the resulting dataset will hold.
    pub fn len(&self) -> usize {
        self.fields_2d.len() + self.basenames_3d.len()
    }

    /// Requested names in the form the decoder expects.
    pub fn decoder_names(&self) -> Vec<String> {
        self.fields_2d
            .iter()
            .chain(self.basenames_3d.iter())
            .cloned()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields_2d.contains(name) || self.basenames_3d.contains(name)
    }
}

/// Resolve a selection against the catalog.
///
/// `source` names the file in error messages and `max_listed` bounds the
/// number of available names listed when nothing matches.
pub fn resolve(
    catalog: &FieldCatalog,
    selection: &FieldSelection,
    source: &str,
    max_listed: usize,
) -> Result<ResolvedSelection> {
    let mut resolved = ResolvedSelection::default();

    match &selection.whitelist {
        Some(whitelist) => {
            for request in whitelist {
                let request = request.trim();
                if !add_request(catalog, request, &mut resolved) {
                    warn!(field = %request, source = %source, "Requested field not in catalog");
                    resolved.unmatched.push(request.to_string());
                }
            }
            if resolved.is_empty() {
                return Err(not_found(catalog, &resolved.unmatched, source, max_listed));
            }
        }
        None => {
            resolved.fields_2d.extend(catalog.pure_2d_names().iter().cloned());
            resolved
                .fields_2d
                .extend(catalog.pseudo_3d_names().iter().cloned());
            resolved
                .basenames_3d
                .extend(catalog.pure_3d_basenames().iter().cloned());
        }
    }

    for name in &selection.blacklist {
        let name = name.trim();
        resolved.fields_2d.remove(name);
        resolved.basenames_3d.remove(name);
        if catalog.is_pseudo_3d_basename(name) {
            for member in catalog.members_of(name) {
                resolved.fields_2d.remove(&member);
            }
        }
    }

    // A 2D name hidden by a 3D basename of the same spelling would collide
    // with it in the dataset.
    let shadowed: Vec<String> = resolved
        .fields_2d
        .iter()
        .filter(|n| catalog.is_shadowed_2d(n) && resolved.basenames_3d.contains(*n))
        .cloned()
        .collect();
    for name in shadowed {
        warn!(field = %name, "2D field shadowed by the 3D field of the same name, not imported");
        resolved.fields_2d.remove(&name);
    }

    if resolved.is_empty() {
        return Err(FaError::field_not_found(format!(
            "no fields left to import from {} after applying the blacklist {:?}",
            source, selection.blacklist
        )));
    }

    info!(
        source = %source,
        fields_2d = resolved.fields_2d.len(),
        fields_3d = resolved.basenames_3d.len(),
        "Resolved field selection"
    );

    Ok(resolved)
}

fn add_request(catalog: &FieldCatalog, request: &str, resolved: &mut ResolvedSelection) -> bool {
    if catalog.is_pure_3d_basename(request) {
        resolved.basenames_3d.insert(request.to_string());
        return true;
    }
    if catalog.pure_2d_names().contains(request)
        || catalog.pseudo_3d_names().contains(request)
        || catalog.pure_3d_names().contains(request)
    {
        resolved.fields_2d.insert(request.to_string());
        return true;
    }
    if catalog.is_pseudo_3d_basename(request) {
        resolved.fields_2d.extend(catalog.members_of(request));
        return true;
    }
    false
}

/// Build the "field not found" error with the catalog listing.
pub fn not_found(
    catalog: &FieldCatalog,
    requested: &[String],
    source: &str,
    max_listed: usize,
) -> FaError {
    FaError::field_not_found(format!(
        "{:?} not found in {}. Available fields: {}",
        requested,
        source,
        catalog.listing(max_listed)
    ))
}
