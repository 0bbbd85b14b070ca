//! Foreign key vocabulary shared by the model export and the evidence snapshot

use serde::{Deserialize, Serialize};

/// Referential action for ON DELETE / ON UPDATE
///
/// The modelling platform exports its own delete-rule names (`Protect`,
/// `Delete`, `Ignore`); those are accepted as aliases. `Ignore` means the
/// relationship is documentary only and must never become a constraint.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    #[default]
    #[serde(alias = "Protect", alias = "protect")]
    Restrict,
    #[serde(alias = "Delete", alias = "delete")]
    Cascade,
    SetNull,
    NoAction,
    SetDefault,
    #[serde(alias = "Ignore", alias = "ignore")]
    Ignore,
}

impl ReferentialAction {
    /// SQL spelling of the action. `Ignore` has no SQL form.
    pub fn as_sql(&self) -> Option<&'static str> {
        match self {
            ReferentialAction::Restrict => Some("RESTRICT"),
            ReferentialAction::Cascade => Some("CASCADE"),
            ReferentialAction::SetNull => Some("SET NULL"),
            ReferentialAction::NoAction => Some("NO ACTION"),
            ReferentialAction::SetDefault => Some("SET DEFAULT"),
            ReferentialAction::Ignore => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.as_sql().unwrap_or("IGNORE")
    }
}

impl std::fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A constraint that was found in the live database for a relationship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActualConstraint {
    pub name: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    #[serde(default)]
    pub owner_columns: Vec<String>,
    #[serde(default)]
    pub referenced_columns: Vec<String>,
    #[serde(default)]
    pub delete_rule: ReferentialAction,
}

impl ActualConstraint {
    pub fn referenced_path(&self) -> String {
        format!("{}.{}", self.referenced_schema, self.referenced_table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_delete_rules_deserialize() {
        let rules: Vec<ReferentialAction> =
            serde_json::from_str(r#"["Protect", "Delete", "Ignore", "SET_NULL"]"#).unwrap();
        assert_eq!(
            rules,
            vec![
                ReferentialAction::Restrict,
                ReferentialAction::Cascade,
                ReferentialAction::Ignore,
                ReferentialAction::SetNull,
            ]
        );
    }

    #[test]
    fn test_ignore_has_no_sql() {
        assert_eq!(ReferentialAction::Ignore.as_sql(), None);
        assert_eq!(ReferentialAction::Ignore.to_string(), "IGNORE");
        assert_eq!(ReferentialAction::SetNull.to_string(), "SET NULL");
    }
}
