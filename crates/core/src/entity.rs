//! Entity types kept in sync with the external accounting platform.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The closed set of internal entity kinds that have a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Stock,
    Invoice,
    Customer,
    PurchaseOrder,
    SalesOrder,
}

impl EntityType {
    /// Every entity type, in the order `run_all` schedules them.
    ///
    /// Customers go first so that documents referencing them find the
    /// counterparty already mirrored.
    pub const ALL: [EntityType; 5] = [
        EntityType::Customer,
        EntityType::Stock,
        EntityType::Invoice,
        EntityType::PurchaseOrder,
        EntityType::SalesOrder,
    ];

    /// String representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Stock => "stock",
            EntityType::Invoice => "invoice",
            EntityType::Customer => "customer",
            EntityType::PurchaseOrder => "purchase_order",
            EntityType::SalesOrder => "sales_order",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stock" => Ok(EntityType::Stock),
            "invoice" => Ok(EntityType::Invoice),
            "customer" => Ok(EntityType::Customer),
            "purchase_order" => Ok(EntityType::PurchaseOrder),
            "sales_order" => Ok(EntityType::SalesOrder),
            other => Err(CoreError::Validation(format!(
                "Unknown entity type '{other}'. Must be one of: {}",
                Self::ALL.map(|e| e.as_str()).join(", ")
            ))),
        }
    }

    /// Parse a comma-separated selection such as `"stock,invoice"`.
    ///
    /// Blank input selects every entity type. Duplicates are dropped while
    /// keeping the first occurrence's position.
    pub fn parse_selection(raw: &str) -> Result<Vec<Self>, CoreError> {
        let mut selected = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let entity = Self::parse(part)?;
            if !selected.contains(&entity) {
                selected.push(entity);
            }
        }
        if selected.is_empty() {
            return Ok(Self::ALL.to_vec());
        }
        Ok(selected)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_and_parse_agree() {
        for entity in EntityType::ALL {
            assert_eq!(EntityType::parse(entity.as_str()).unwrap(), entity);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(EntityType::parse(" Sales_Order ").unwrap(), EntityType::SalesOrder);
    }

    #[test]
    fn parse_rejects_unknown() {
        let err = EntityType::parse("warehouse").unwrap_err();
        assert!(err.to_string().contains("Unknown entity type"));
    }

    #[test]
    fn selection_blank_means_all() {
        assert_eq!(EntityType::parse_selection("  ").unwrap().len(), 5);
    }

    #[test]
    fn selection_dedups_and_keeps_order() {
        let selected = EntityType::parse_selection("invoice, stock,invoice").unwrap();
        assert_eq!(selected, vec![EntityType::Invoice, EntityType::Stock]);
    }
}
