//! Internal-code to external-code translation (MappingResolver).
//!
//! Mapping entries are administered outside the sync subsystem; a resolver
//! is built from a snapshot of the active entries at the start of each run
//! and is read-only afterwards.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Kind of code being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingType {
    Sku,
    Warehouse,
    TaxOffice,
    Unit,
}

impl MappingType {
    pub const ALL: [MappingType; 4] = [
        MappingType::Sku,
        MappingType::Warehouse,
        MappingType::TaxOffice,
        MappingType::Unit,
    ];

    /// String representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingType::Sku => "sku",
            MappingType::Warehouse => "warehouse",
            MappingType::TaxOffice => "tax_office",
            MappingType::Unit => "unit",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "sku" => Ok(MappingType::Sku),
            "warehouse" => Ok(MappingType::Warehouse),
            "tax_office" => Ok(MappingType::TaxOffice),
            "unit" => Ok(MappingType::Unit),
            other => Err(CoreError::Validation(format!(
                "Unknown mapping type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for MappingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot lookup table of active mapping entries.
#[derive(Debug, Clone, Default)]
pub struct MappingResolver {
    entries: HashMap<(MappingType, String), String>,
}

impl MappingResolver {
    /// Build a resolver from `(type, source, target)` triples.
    ///
    /// Callers pass active entries only. Source values are trimmed; the
    /// match itself is exact (case-sensitive), because external codes are.
    pub fn new<I, S, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (MappingType, S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(mapping_type, source, target)| {
                let source: String = source.into();
                ((mapping_type, source.trim().to_string()), target.into())
            })
            .collect();
        Self { entries }
    }

    /// Translate an internal code, failing with `MappingMissing`.
    pub fn translate(&self, mapping_type: MappingType, source: &str) -> Result<String, CoreError> {
        let key = (mapping_type, source.trim().to_string());
        self.entries
            .get(&key)
            .cloned()
            .ok_or_else(|| CoreError::MappingMissing {
                mapping_type,
                source_value: source.trim().to_string(),
            })
    }

    /// Translate an optional code; `None` stays `None`.
    pub fn translate_opt(
        &self,
        mapping_type: MappingType,
        source: Option<&str>,
    ) -> Result<Option<String>, CoreError> {
        source
            .map(|s| self.translate(mapping_type, s))
            .transpose()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn resolver() -> MappingResolver {
        MappingResolver::new([
            (MappingType::Sku, "SKU-1", "9310011"),
            (MappingType::Warehouse, " MAIN ", "01"),
        ])
    }

    #[test]
    fn translates_known_codes() {
        let r = resolver();
        assert_eq!(r.translate(MappingType::Sku, "SKU-1").unwrap(), "9310011");
        assert_eq!(r.translate(MappingType::Warehouse, "MAIN").unwrap(), "01");
    }

    #[test]
    fn mapping_type_scopes_the_lookup() {
        let err = resolver().translate(MappingType::Unit, "SKU-1").unwrap_err();
        assert_matches!(
            err,
            CoreError::MappingMissing { mapping_type: MappingType::Unit, ref source_value }
                if source_value == "SKU-1"
        );
    }

    #[test]
    fn match_is_case_sensitive() {
        assert!(resolver().translate(MappingType::Sku, "sku-1").is_err());
    }

    #[test]
    fn optional_codes() {
        let r = resolver();
        assert_eq!(r.translate_opt(MappingType::Unit, None).unwrap(), None);
        assert!(r.translate_opt(MappingType::Unit, Some("KG")).is_err());
    }

    #[test]
    fn missing_mapping_message_names_type_and_value() {
        let err = resolver().translate(MappingType::TaxOffice, "KADIKOY").unwrap_err();
        assert_eq!(err.to_string(), "No active tax_office mapping for 'KADIKOY'");
    }
}
