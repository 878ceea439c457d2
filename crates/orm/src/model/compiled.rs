//! Compiled model: everything the runtime needs about one entity, derived
//! once from its schema and shared immutably afterwards.

use indexmap::IndexMap;

use crate::error::{ModelError, ModelResult, RelationshipError};
use crate::naming;
use crate::relationships::ResolvedRelation;
use crate::schema::{AttributeDefinition, AttributeValidator, Column, ModelSchema, TraitFlags};
use crate::search::SearchProjection;
use crate::storage::Row;

/// Columns that never leave the instance through `to_json`
const SECRET_COLUMNS: [&str; 1] = ["two_factor_secret"];

#[derive(Debug, Clone)]
pub struct CompiledModel {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub columns: Vec<Column>,
    pub attributes: IndexMap<String, AttributeDefinition>,
    pub fillable: Vec<String>,
    pub guarded: Vec<String>,
    pub hidden: Vec<String>,
    pub relations: IndexMap<String, ResolvedRelation>,
    pub traits: TraitFlags,
    pub validator: AttributeValidator,
    pub search: SearchProjection,
}

impl CompiledModel {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    pub fn relation(&self, name: &str) -> ModelResult<&ResolvedRelation> {
        self.relations.get(name).ok_or_else(|| {
            RelationshipError::Undeclared {
                model: self.name.clone(),
                relation: name.to_string(),
            }
            .into()
        })
    }

    pub fn soft_deletes(&self) -> bool {
        self.traits.use_soft_deletes
    }

    pub fn timestamps(&self) -> bool {
        self.traits.use_timestamps
    }

    pub fn uses_uuid(&self) -> bool {
        self.traits.use_uuid
    }

    /// `fillable ∩ ¬guarded`
    pub fn is_fillable(&self, field: &str) -> bool {
        self.fillable.iter().any(|f| f == field) && !self.guarded.iter().any(|g| g == field)
    }

    /// Drops every field outside the mass-assignable set
    pub fn filter_fillable(&self, values: &Row) -> Row {
        values
            .iter()
            .filter(|(key, _)| self.is_fillable(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Keeps every known column, mass-assignable or not
    pub fn filter_columns(&self, values: &Row) -> Row {
        values
            .iter()
            .filter(|(key, _)| self.has_column(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn is_hidden(&self, field: &str) -> bool {
        self.hidden.iter().any(|h| h == field) || SECRET_COLUMNS.contains(&field)
    }

    /// Column other tables use to point at this model: `GiftCard` -> `gift_card_id`
    pub fn foreign_key_name(&self) -> String {
        naming::foreign_key(&self.name)
    }

    /// Owner type stored in polymorphic association tables: the table name
    pub fn morph_type(&self) -> &str {
        &self.table
    }

    /// Raises a definition error when a trait operation is used on a model
    /// that did not enable it
    pub fn require_trait(&self, enabled: bool, trait_name: &str) -> ModelResult<()> {
        if enabled {
            Ok(())
        } else {
            Err(ModelError::Definition(format!(
                "{} is not {}",
                self.name, trait_name
            )))
        }
    }

    /// Fillable, guarded and hidden lists. Every belongsTo foreign key is
    /// fillable; system columns never are.
    pub(crate) fn derive_access_lists(
        schema: &ModelSchema,
    ) -> (Vec<String>, Vec<String>, Vec<String>) {
        let mut fillable = Vec::new();
        let mut guarded = Vec::new();
        let mut hidden = Vec::new();

        for (name, definition) in &schema.attributes {
            if definition.fillable {
                fillable.push(name.clone());
            }
            if definition.guarded {
                guarded.push(name.clone());
            }
            if definition.hidden {
                hidden.push(name.clone());
            }
        }

        for declaration in &schema.relations.belongs_to {
            let key = declaration.options().belongs_to_key();
            if !fillable.contains(&key) {
                fillable.push(key);
            }
        }

        (fillable, guarded, hidden)
    }
}
