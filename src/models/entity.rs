//! Entity, attribute and relationship definitions from the model export

use crate::models::foreign_key::{ActualConstraint, ReferentialAction};
use serde::{Deserialize, Serialize};
use validator::Validate;

fn default_true() -> bool {
    true
}

/// The whole exported data model.
///
/// Entities are kept flat in export order; each one names its owning module.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[serde(default)]
    #[validate(nested)]
    pub entities: Vec<EntityModel>,
}

impl Model {
    pub fn new(entities: Vec<EntityModel>) -> Self {
        Self { entities }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityModel> {
        self.entities.iter()
    }

    /// Find an entity by logical name (case-insensitive, first match wins)
    pub fn find_entity(&self, logical_name: &str) -> Option<&EntityModel> {
        self.entities
            .iter()
            .find(|e| e.logical_name.eq_ignore_ascii_case(logical_name))
    }

    /// Find an entity by its physical coordinates
    pub fn find_table(&self, schema: &str, physical_name: &str) -> Option<&EntityModel> {
        self.entities.iter().find(|e| {
            e.schema.eq_ignore_ascii_case(schema) && e.physical_name.eq_ignore_ascii_case(physical_name)
        })
    }

    /// Module names in order of first appearance
    pub fn module_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entity in &self.entities {
            if !names.contains(&entity.module.as_str()) {
                names.push(&entity.module);
            }
        }
        names
    }
}

/// A table-like object in the model
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EntityModel {
    pub module: String,
    pub logical_name: String,
    pub schema: String,
    pub physical_name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub attributes: Vec<AttributeModel>,
    #[serde(default)]
    pub relationships: Vec<RelationshipModel>,
    #[serde(default)]
    #[validate(nested)]
    pub indexes: Vec<IndexModel>,
}

impl EntityModel {
    pub fn identity(&self) -> EntityIdentity {
        EntityIdentity {
            module: self.module.clone(),
            logical_name: self.logical_name.clone(),
            schema: self.schema.clone(),
            physical_name: self.physical_name.clone(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.physical_name)
    }

    pub fn attribute(&self, logical_name: &str) -> Option<&AttributeModel> {
        self.attributes
            .iter()
            .find(|a| a.logical_name.eq_ignore_ascii_case(logical_name))
    }

    pub fn attribute_by_column(&self, column_name: &str) -> Option<&AttributeModel> {
        self.attributes
            .iter()
            .find(|a| a.column_name.eq_ignore_ascii_case(column_name))
    }
}

/// A column of an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeModel {
    pub logical_name: String,
    pub column_name: String,
    #[serde(default)]
    pub is_mandatory: bool,
    #[serde(default)]
    pub is_identifier: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl AttributeModel {
    /// Whether the model allows NULL in this column
    pub fn is_nullable(&self) -> bool {
        !self.is_mandatory && !self.is_identifier
    }
}

/// A reference from one entity to another through an attribute.
///
/// `has_db_constraint` is what the model declares; `actual_constraints` is
/// what was found in the database. The two are independent facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipModel {
    pub via_attribute: String,
    pub target_entity: String,
    pub target_physical_name: String,
    #[serde(default)]
    pub delete_rule: ReferentialAction,
    #[serde(default)]
    pub has_db_constraint: bool,
    #[serde(default)]
    pub actual_constraints: Vec<ActualConstraint>,
}

impl RelationshipModel {
    pub fn is_constraint_backed(&self) -> bool {
        !self.actual_constraints.is_empty()
    }
}

/// An index declared in the model
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IndexModel {
    pub name: String,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_primary: bool,
    #[validate(length(min = 1, message = "An index needs at least one column"))]
    pub columns: Vec<String>,
}

/// Identifier of an entity as handed around by sorters and validators
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityIdentity {
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub logical_name: String,
    pub schema: String,
    pub physical_name: String,
}

impl EntityIdentity {
    /// Identity of a table known only from a database constraint
    pub fn table(schema: impl Into<String>, physical_name: impl Into<String>) -> Self {
        Self {
            module: String::new(),
            logical_name: String::new(),
            schema: schema.into(),
            physical_name: physical_name.into(),
        }
    }
}

impl std::fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.physical_name)
    }
}
