// catalog.rs — Module type catalog
//
// Maps a G2 module type id to its display name, ordered inlet rates, ordered
// outlet rates and parameter count. The built-in catalog is a JSON resource
// compiled into the binary; a replacement can be loaded from disk.
//
// Preconditions: none.
// Postconditions: a `Catalog` never holds two entries for one type id.
// Failure modes: unreadable file, malformed JSON, duplicate type id.
// Side effects: `Catalog::load` reads one file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../resources/modules.json");

// ── Data types ──────────────────────────────────────────────────────────────

/// Signal-rate class of a jack. Each class has its own bus space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PortRate {
    #[serde(rename = "a")]
    Audio,
    #[serde(rename = "k")]
    Control,
}

impl PortRate {
    /// Csound rate letter.
    pub fn letter(self) -> char {
        match self {
            PortRate::Audio => 'a',
            PortRate::Control => 'k',
        }
    }
}

impl fmt::Display for PortRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Interface of one module type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub inlets: Vec<PortRate>,
    #[serde(default)]
    pub outlets: Vec<PortRate>,
    #[serde(default)]
    pub params: usize,
}

#[derive(Deserialize)]
struct CatalogFile {
    modules: Vec<ModuleSpec>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{origin}: malformed catalog: {source}")]
    Json {
        origin: String,
        source: serde_json::Error,
    },
    #[error("duplicate module type {id}: '{first}' and '{second}'")]
    DuplicateType {
        id: u32,
        first: String,
        second: String,
    },
}

// ── Catalog ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    types: BTreeMap<u32, ModuleSpec>,
}

impl Catalog {
    /// The catalog shipped with the tool.
    pub fn builtin() -> Result<Catalog, CatalogError> {
        Self::from_json(BUILTIN_CATALOG, "<builtin catalog>")
    }

    /// Load a catalog from a JSON file shaped like `resources/modules.json`.
    pub fn load(path: &Path) -> Result<Catalog, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|e| CatalogError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&text, &path.display().to_string())
    }

    pub fn from_json(text: &str, origin: &str) -> Result<Catalog, CatalogError> {
        let file: CatalogFile = serde_json::from_str(text).map_err(|e| CatalogError::Json {
            origin: origin.to_string(),
            source: e,
        })?;
        Self::from_specs(file.modules)
    }

    pub fn from_specs(specs: impl IntoIterator<Item = ModuleSpec>) -> Result<Catalog, CatalogError> {
        let mut types: BTreeMap<u32, ModuleSpec> = BTreeMap::new();
        for spec in specs {
            if let Some(first) = types.get(&spec.id) {
                return Err(CatalogError::DuplicateType {
                    id: spec.id,
                    first: first.name.clone(),
                    second: spec.name,
                });
            }
            types.insert(spec.id, spec);
        }
        Ok(Catalog { types })
    }

    pub fn lookup(&self, type_id: u32) -> Option<&ModuleSpec> {
        self.types.get(&type_id)
    }

    /// All entries in ascending type id order.
    pub fn types(&self) -> impl Iterator<Item = &ModuleSpec> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_loads() {
        let catalog = Catalog::builtin().expect("builtin catalog");
        assert!(!catalog.is_empty());
        let out2 = catalog.lookup(4).expect("2-Out");
        assert_eq!(out2.name, "2-Out");
        assert_eq!(out2.inlets, vec![PortRate::Audio, PortRate::Audio]);
        assert!(out2.outlets.is_empty());
        assert_eq!(out2.params, 3);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let catalog = Catalog::from_json(
            r#"{"modules": [{"id": 5, "name": "Blank"}]}"#,
            "test",
        )
        .unwrap();
        let spec = catalog.lookup(5).unwrap();
        assert!(spec.inlets.is_empty());
        assert!(spec.outlets.is_empty());
        assert_eq!(spec.params, 0);
    }

    #[test]
    fn unknown_rate_is_rejected() {
        let err = Catalog::from_json(
            r#"{"modules": [{"id": 5, "name": "Bad", "inlets": ["x"]}]}"#,
            "test",
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::Json { .. }));
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let err = Catalog::from_json(
            r#"{"modules": [{"id": 5, "name": "A"}, {"id": 5, "name": "B"}]}"#,
            "test",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "duplicate module type 5: 'A' and 'B'");
    }

    #[test]
    fn types_iterate_in_id_order() {
        let catalog = Catalog::builtin().unwrap();
        let ids: Vec<u32> = catalog.types().map(|s| s.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }
}
