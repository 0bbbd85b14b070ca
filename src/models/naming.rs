//! Effective name resolution
//!
//! The dependency sorter and the ordering validator must agree on what an
//! entity is called after naming overrides are applied, otherwise positions in
//! an ordering cannot be joined back to the model. Both take a
//! `&dyn EffectiveNameResolver` and nothing else resolves names.

use crate::models::entity::EntityIdentity;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$#@]*$").expect("identifier pattern is valid"));

/// Resolves an entity to the name it is emitted under.
pub trait EffectiveNameResolver: Send + Sync {
    fn effective_name(&self, entity: &EntityIdentity) -> String;

    /// Case-insensitive join key: schema plus effective name
    fn lookup_key(&self, entity: &EntityIdentity) -> String {
        format!("{}.{}", entity.schema, self.effective_name(entity)).to_ascii_lowercase()
    }
}

/// A single override. Either the entity selector (`module` + `entity`) or the
/// table selector (`schema` + `table`) must be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_selector"))]
pub struct NamingOverrideRule {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub entity: Option<String>,
    #[validate(custom(function = "validate_identifier"))]
    pub target: String,
}

impl NamingOverrideRule {
    pub fn for_table(schema: Option<&str>, table: &str, target: &str) -> Self {
        Self {
            schema: schema.map(str::to_string),
            table: Some(table.to_string()),
            target: target.to_string(),
            ..Default::default()
        }
    }

    pub fn for_entity(module: Option<&str>, entity: &str, target: &str) -> Self {
        Self {
            module: module.map(str::to_string),
            entity: Some(entity.to_string()),
            target: target.to_string(),
            ..Default::default()
        }
    }

    fn matches_entity(&self, identity: &EntityIdentity) -> bool {
        let Some(entity) = &self.entity else {
            return false;
        };
        if identity.logical_name.is_empty() || !entity.eq_ignore_ascii_case(&identity.logical_name) {
            return false;
        }
        self.module
            .as_ref()
            .map_or(true, |m| m.eq_ignore_ascii_case(&identity.module))
    }

    fn matches_table(&self, identity: &EntityIdentity) -> bool {
        let Some(table) = &self.table else {
            return false;
        };
        if !table.eq_ignore_ascii_case(&identity.physical_name) {
            return false;
        }
        self.schema
            .as_ref()
            .map_or(true, |s| s.eq_ignore_ascii_case(&identity.schema))
    }
}

/// Ordered set of naming overrides. Entity rules win over table rules; within
/// a kind, the first matching rule wins. Without a match the physical name is
/// used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NamingOverrides {
    #[serde(default)]
    #[validate(nested)]
    pub rules: Vec<NamingOverrideRule>,
}

impl NamingOverrides {
    pub fn new(rules: Vec<NamingOverrideRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl EffectiveNameResolver for NamingOverrides {
    fn effective_name(&self, entity: &EntityIdentity) -> String {
        self.rules
            .iter()
            .find(|r| r.matches_entity(entity))
            .or_else(|| self.rules.iter().find(|r| r.matches_table(entity)))
            .map(|r| r.target.clone())
            .unwrap_or_else(|| entity.physical_name.clone())
    }
}

fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if !IDENTIFIER.is_match(name) {
        let mut err = ValidationError::new("invalid_identifier");
        err.message = Some("Override target must be a plain SQL identifier".into());
        return Err(err);
    }
    Ok(())
}

fn validate_selector(rule: &NamingOverrideRule) -> Result<(), ValidationError> {
    if rule.table.is_none() && rule.entity.is_none() {
        let mut err = ValidationError::new("missing_selector");
        err.message = Some("Naming override needs either a table or an entity selector".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> EntityIdentity {
        EntityIdentity {
            module: "CRM".to_string(),
            logical_name: "Customer".to_string(),
            schema: "dbo".to_string(),
            physical_name: "OSUSR_ABC_CUSTOMER".to_string(),
        }
    }

    #[test]
    fn test_no_rules_uses_physical_name() {
        let naming = NamingOverrides::default();
        assert_eq!(naming.effective_name(&customer()), "OSUSR_ABC_CUSTOMER");
        assert_eq!(naming.lookup_key(&customer()), "dbo.osusr_abc_customer");
    }

    #[test]
    fn test_entity_rule_beats_table_rule() {
        let naming = NamingOverrides::new(vec![
            NamingOverrideRule::for_table(Some("dbo"), "OSUSR_ABC_CUSTOMER", "CustomerTable"),
            NamingOverrideRule::for_entity(Some("crm"), "customer", "Customer"),
        ]);
        assert_eq!(naming.effective_name(&customer()), "Customer");
    }

    #[test]
    fn test_table_rule_applies_to_constraint_only_identity() {
        let naming = NamingOverrides::new(vec![NamingOverrideRule::for_table(
            None,
            "osusr_abc_customer",
            "Customer",
        )]);
        let identity = EntityIdentity::table("dbo", "OSUSR_ABC_CUSTOMER");
        assert_eq!(naming.effective_name(&identity), "Customer");
    }

    #[test]
    fn test_rule_validation() {
        let bad_target = NamingOverrideRule::for_table(None, "T", "not valid");
        assert!(bad_target.validate().is_err());

        let no_selector = NamingOverrideRule {
            target: "Valid".to_string(),
            ..Default::default()
        };
        assert!(no_selector.validate().is_err());

        let overrides = NamingOverrides::new(vec![NamingOverrideRule::for_entity(None, "E", "Valid")]);
        assert!(overrides.validate().is_ok());
    }
}
