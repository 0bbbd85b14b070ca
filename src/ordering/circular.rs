//! Circular dependency allow-list
//!
//! Some schemas are cyclic on purpose (an order pointing at its latest
//! invoice, the invoice pointing back at the order). Those cycles can still be
//! loaded in phases when one of the foreign keys is nullable.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// A cycle operators have accepted, named by its table set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AllowedCycle {
    #[validate(length(min = 1, message = "An allowed cycle must name at least one table"))]
    pub tables: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AllowedCycle {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            reason: None,
        }
    }

    fn covers(&self, tables: &[String]) -> bool {
        tables
            .iter()
            .all(|t| self.tables.iter().any(|allowed| allowed.eq_ignore_ascii_case(t)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct CircularDependencyOptions {
    #[serde(alias = "allowed_cycles")]
    #[validate(nested)]
    pub allowed_cycles: Vec<AllowedCycle>,
}

impl CircularDependencyOptions {
    pub fn new(allowed_cycles: Vec<AllowedCycle>) -> Self {
        Self { allowed_cycles }
    }

    /// A cycle is allowed when one configured entry names every table in it.
    pub fn is_cycle_allowed(&self, tables: &[String]) -> bool {
        !tables.is_empty() && self.allowed_cycles.iter().any(|c| c.covers(tables))
    }

    /// The configured reason of the first entry covering `tables`
    pub fn reason_for(&self, tables: &[String]) -> Option<&str> {
        self.allowed_cycles
            .iter()
            .find(|c| c.covers(tables))
            .and_then(|c| c.reason.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_cycle_must_be_fully_covered() {
        let options = CircularDependencyOptions::new(vec![AllowedCycle::new(["Order", "Invoice"])]);
        assert!(options.is_cycle_allowed(&names(&["invoice", "ORDER"])));
        assert!(!options.is_cycle_allowed(&names(&["Order", "Invoice", "Payment"])));
        assert!(!options.is_cycle_allowed(&[]));
    }

    #[test]
    fn test_reason_lookup() {
        let mut cycle = AllowedCycle::new(["A", "B"]);
        cycle.reason = Some("legacy bootstrap".to_string());
        let options = CircularDependencyOptions::new(vec![cycle]);
        assert_eq!(options.reason_for(&names(&["B", "A"])), Some("legacy bootstrap"));
        assert_eq!(options.reason_for(&names(&["C"])), None);
    }

    #[test]
    fn test_empty_cycle_is_rejected() {
        let options = CircularDependencyOptions::new(vec![AllowedCycle::default()]);
        assert!(options.validate().is_err());
    }
}
