//! Code registry: maps human-readable business-rule descriptions onto the
//! raw coded values that actually appear in the deed and taxroll extracts.
//!
//! One registry is built per code family (deeds, taxrolls) from a
//! comma-separated reference file with columns `TABLE, CATEGORY, CODE,
//! DESCRIPTION`. All downstream validators resolve the codes they filter on
//! through a registry; a description that fails to resolve is an integrity
//! fault, not a per-record rejection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use tracing::info;

use crate::error::{EtlError, Result};
use crate::tabular::DelimitedReader;

/// Reference entries that are known-bad and filtered before insertion,
/// keyed by (table, category, description). The vendor file ships these for
/// other jurisdictions; no record in our extracts carries them.
const SKIPPED_REFERENCE_ENTRIES: &[(&str, &str, &str)] = &[
    ("SALE CODE", "sale", "Non-Disclosure"),
    ("DOCUMENT TYPE", "deed", "Not Applicable"),
];

fn is_skipped(table: &str, category: &str, description: &str) -> bool {
    SKIPPED_REFERENCE_ENTRIES
        .iter()
        .any(|&(t, c, d)| t == table && c == category && d == description)
}

/// Lookup from (code table, description) to the raw coded value.
///
/// Insertion enforces that a (table, description) pair maps to exactly one
/// value, so `lookup` ambiguity is structurally impossible; it is still
/// checked defensively.
#[derive(Debug)]
pub struct CodeRegistry {
    family: String,
    values: BTreeMap<(String, String), Vec<String>>,
}

impl CodeRegistry {
    pub fn new(family: &str) -> Self {
        Self {
            family: family.to_string(),
            values: BTreeMap::new(),
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Insert a code entry. An exact duplicate is silently ignored; the same
    /// (table, description) mapping to a different value means the reference
    /// file is corrupt and halts the build.
    pub fn register(&mut self, table: &str, value: &str, description: &str) -> Result<()> {
        let key = (table.to_string(), description.to_string());
        let existing = self.values.entry(key).or_default();
        if existing.iter().any(|v| v == value) {
            return Ok(());
        }
        if let Some(other) = existing.first() {
            return Err(EtlError::CodeConflict {
                table: table.to_string(),
                description: description.to_string(),
                existing: other.clone(),
                incoming: value.to_string(),
            });
        }
        existing.push(value.to_string());
        Ok(())
    }

    /// The single value registered for (table, description).
    pub fn lookup(&self, table: &str, description: &str) -> Result<&str> {
        let key = (table.to_string(), description.to_string());
        match self.values.get(&key).map(Vec::as_slice) {
            None | Some([]) => Err(EtlError::CodeNotFound {
                table: table.to_string(),
                description: description.to_string(),
            }),
            Some([value]) => Ok(value),
            Some(values) => Err(EtlError::CodeAmbiguous {
                table: table.to_string(),
                description: description.to_string(),
                count: values.len(),
            }),
        }
    }

    fn lookup_int(&self, table: &str, description: &str) -> Result<i64> {
        let value = self.lookup(table, description)?;
        value.trim().parse().map_err(|_| {
            EtlError::Config(format!(
                "code table {table}: value '{value}' for '{description}' is not an integer"
            ))
        })
    }
}

/// Build a registry from a comma-separated reference file.
pub fn load_reference_file(path: &Path, family: &str) -> Result<CodeRegistry> {
    let text = std::fs::read_to_string(path)?;
    let mut registry = CodeRegistry::new(family);
    let mut skipped = 0u64;
    for row in DelimitedReader::new(&text, ',')? {
        let table = row.get("TABLE")?.trim();
        let category = row.get("CATEGORY")?.trim();
        let code = row.get("CODE")?.trim();
        let description = row.get("DESCRIPTION")?.trim();
        if is_skipped(table, category, description) {
            skipped += 1;
            continue;
        }
        registry.register(table, code, description)?;
    }
    info!(
        family,
        path = %path.display(),
        skipped,
        "code registry built"
    );
    Ok(registry)
}

/// The deed-file codes the validator chain filters on, resolved once per
/// run. Transaction-type codes are compared numerically, so they are parsed
/// here.
#[derive(Debug, Clone)]
pub struct DeedCodes {
    pub single_family: String,
    pub grant_deed: String,
    pub arms_length: String,
    pub full_price: String,
    pub resale: i64,
    pub new_construction: i64,
}

impl DeedCodes {
    pub fn resolve(registry: &CodeRegistry) -> Result<Self> {
        Ok(Self {
            single_family: registry
                .lookup("PROPERTY INDICATOR", "Single Family Residence")?
                .to_string(),
            grant_deed: registry.lookup("DOCUMENT TYPE", "Grant Deed")?.to_string(),
            arms_length: registry
                .lookup("PRIMARY CATEGORY", "Arms Length Transaction")?
                .to_string(),
            full_price: registry.lookup("SALE CODE", "Sale Price (Full)")?.to_string(),
            resale: registry.lookup_int("TRANSACTION TYPE", "Resale")?,
            new_construction: registry.lookup_int("TRANSACTION TYPE", "New Construction")?,
        })
    }
}

/// Broad property classes assigned by the fixed description table. The two
/// refined classes are narrowed to school/park by the land-use code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyClass {
    Residential,
    Commercial,
    Industrial,
    PublicService,
    Amusement,
    Other,
}

/// Description -> class table for the taxroll property-indicator codes.
const PROPERTY_CLASSES: &[(&str, PropertyClass)] = &[
    ("Single Family Residence", PropertyClass::Residential),
    ("Condominium", PropertyClass::Residential),
    ("Duplex", PropertyClass::Residential),
    ("Apartment", PropertyClass::Residential),
    ("Commercial", PropertyClass::Commercial),
    ("Hotel", PropertyClass::Commercial),
    ("Retail", PropertyClass::Commercial),
    ("Office Building", PropertyClass::Commercial),
    ("Industrial", PropertyClass::Industrial),
    ("Industrial Light", PropertyClass::Industrial),
    ("Industrial Heavy", PropertyClass::Industrial),
    ("Transport", PropertyClass::Other),
    ("Utilities", PropertyClass::Other),
    ("Agricultural", PropertyClass::Other),
    ("Public Service", PropertyClass::PublicService),
    ("Amusement-Recreation", PropertyClass::Amusement),
];

/// Property-indicator descriptions excluded from neighborhood aggregation.
const SKIPPED_PROPERTY_DESCRIPTIONS: &[&str] = &["Vacant", "Miscellaneous"];

/// The taxroll-file codes shared by the neighborhood aggregator and the
/// parcel feature extractor.
#[derive(Debug, Clone)]
pub struct TaxrollCodes {
    pub single_family: String,
    pub class_by_code: HashMap<String, PropertyClass>,
    pub skip_property: HashSet<String>,
    pub unknown_land_use: String,
    pub school_land_use: String,
    pub park_land_use: String,
}

impl TaxrollCodes {
    pub fn resolve(registry: &CodeRegistry) -> Result<Self> {
        let mut class_by_code = HashMap::new();
        for (description, class) in PROPERTY_CLASSES {
            let code = registry.lookup("PROPERTY INDICATOR", description)?;
            class_by_code.insert(code.to_string(), *class);
        }
        let mut skip_property = HashSet::new();
        for description in SKIPPED_PROPERTY_DESCRIPTIONS {
            let code = registry.lookup("PROPERTY INDICATOR", description)?;
            skip_property.insert(code.to_string());
        }
        Ok(Self {
            single_family: registry
                .lookup("PROPERTY INDICATOR", "Single Family Residence")?
                .to_string(),
            class_by_code,
            skip_property,
            unknown_land_use: registry.lookup("LAND USE", "Unknown")?.to_string(),
            school_land_use: registry.lookup("LAND USE", "School")?.to_string(),
            park_land_use: registry.lookup("LAND USE", "Park")?.to_string(),
        })
    }

    pub fn classify(&self, property_code: &str) -> PropertyClass {
        self.class_by_code
            .get(property_code)
            .copied()
            .unwrap_or(PropertyClass::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_duplicate_registration_is_ignored() {
        let mut registry = CodeRegistry::new("deeds");
        registry.register("DOCUMENT TYPE", "G", "Grant Deed").unwrap();
        registry.register("DOCUMENT TYPE", "G", "Grant Deed").unwrap();
        assert_eq!(registry.lookup("DOCUMENT TYPE", "Grant Deed").unwrap(), "G");
    }

    #[test]
    fn conflicting_registration_fails() {
        let mut registry = CodeRegistry::new("deeds");
        registry.register("DOCUMENT TYPE", "G", "Grant Deed").unwrap();
        let err = registry
            .register("DOCUMENT TYPE", "Q", "Grant Deed")
            .unwrap_err();
        assert!(matches!(err, EtlError::CodeConflict { .. }));
    }

    #[test]
    fn lookup_misses_are_hard_errors() {
        let registry = CodeRegistry::new("deeds");
        assert!(matches!(
            registry.lookup("DOCUMENT TYPE", "Quitclaim Deed"),
            Err(EtlError::CodeNotFound { .. })
        ));
    }

    #[test]
    fn same_description_in_different_tables_is_fine() {
        let mut registry = CodeRegistry::new("taxrolls");
        registry.register("PROPERTY INDICATOR", "10", "Unknown").unwrap();
        registry.register("LAND USE", "999", "Unknown").unwrap();
        assert_eq!(registry.lookup("LAND USE", "Unknown").unwrap(), "999");
        assert_eq!(
            registry.lookup("PROPERTY INDICATOR", "Unknown").unwrap(),
            "10"
        );
    }

    #[test]
    fn skip_predicate_matches_known_bad_entries() {
        assert!(is_skipped("SALE CODE", "sale", "Non-Disclosure"));
        assert!(!is_skipped("SALE CODE", "sale", "Sale Price (Full)"));
    }

    #[test]
    fn unknown_property_code_classifies_as_other() {
        let codes = TaxrollCodes {
            single_family: "10".to_string(),
            class_by_code: HashMap::new(),
            skip_property: HashSet::new(),
            unknown_land_use: "999".to_string(),
            school_land_use: "650".to_string(),
            park_land_use: "757".to_string(),
        };
        assert_eq!(codes.classify("77"), PropertyClass::Other);
    }
}
