//! Model instances: one persisted (or about to be persisted) row plus its
//! loaded relations.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::compiled::CompiledModel;
use crate::model::persistence;
use crate::relationships::{RelationAccessor, RelationValue};
use crate::storage::Row;
use crate::traits::{Billable, Categorizable, Commentable, Likeable, Taggable, TwoFactor};

#[derive(Debug, Clone)]
pub struct ModelInstance {
    model: Arc<CompiledModel>,
    attributes: Row,
    original: Row,
    changes: Row,
    relations: IndexMap<String, RelationValue>,
    exists: bool,
}

impl PartialEq for ModelInstance {
    fn eq(&self, other: &Self) -> bool {
        self.model.name == other.model.name
            && self.attributes == other.attributes
            && self.relations == other.relations
    }
}

impl ModelInstance {
    /// Unsaved instance with no attributes
    pub fn new(model: Arc<CompiledModel>) -> Self {
        Self {
            model,
            attributes: Row::new(),
            original: Row::new(),
            changes: Row::new(),
            relations: IndexMap::new(),
            exists: false,
        }
    }

    /// Instance hydrated from a fetched row
    pub fn from_row(model: Arc<CompiledModel>, row: Row) -> Self {
        Self {
            model,
            original: row.clone(),
            attributes: row,
            changes: Row::new(),
            relations: IndexMap::new(),
            exists: true,
        }
    }

    pub fn model(&self) -> &Arc<CompiledModel> {
        &self.model
    }

    pub fn model_name(&self) -> &str {
        &self.model.name
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Typed attribute read; `None` when absent or null
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> ModelResult<Option<T>> {
        match self.attributes.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.attributes
            .get(&self.model.primary_key)
            .and_then(Value::as_i64)
    }

    pub(crate) fn require_id(&self) -> ModelResult<i64> {
        self.id().ok_or(ModelError::MissingPrimaryKey)
    }

    pub fn set<T: Into<Value>>(&mut self, key: &str, value: T) -> &mut Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Mass assignment: fields outside `fillable ∩ ¬guarded` are dropped
    pub fn fill(&mut self, values: Value) -> ModelResult<&mut Self> {
        let values = persistence::into_row(values)?;
        let filtered = self.model.filter_fillable(&values);
        self.attributes.extend(filtered);
        Ok(self)
    }

    /// Assigns every known column, ignoring the fillable lists
    pub fn force_fill(&mut self, values: Value) -> ModelResult<&mut Self> {
        let values = persistence::into_row(values)?;
        let filtered = self.model.filter_columns(&values);
        self.attributes.extend(filtered);
        Ok(self)
    }

    /// Attributes whose value differs from the loaded snapshot
    pub fn get_dirty(&self) -> Row {
        self.attributes
            .iter()
            .filter(|(key, value)| self.original.get(key.as_str()) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.get_dirty().is_empty()
    }

    pub fn is_attribute_dirty(&self, key: &str) -> bool {
        self.get_dirty().contains_key(key)
    }

    pub fn is_clean(&self) -> bool {
        !self.is_dirty()
    }

    /// Whether the last save changed `key`
    pub fn was_changed(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }

    pub fn get_original(&self, key: &str) -> Option<&Value> {
        self.original.get(key)
    }

    /// Attributes written by the last save
    pub fn get_changes(&self) -> &Row {
        &self.changes
    }

    pub fn relation(&self, name: &str) -> Option<&RelationValue> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> &IndexMap<String, RelationValue> {
        &self.relations
    }

    pub(crate) fn set_relation(&mut self, name: &str, value: RelationValue) {
        self.relations.insert(name.to_string(), value);
    }

    /// Visible attributes plus loaded relations
    pub fn to_json(&self) -> Value {
        let mut json = Row::new();
        for (key, value) in &self.attributes {
            if !self.model.is_hidden(key) {
                json.insert(key.clone(), value.clone());
            }
        }
        for (name, relation) in &self.relations {
            json.insert(name.clone(), relation.to_json());
        }
        Value::Object(json)
    }

    /// Document handed to a search index
    pub fn to_searchable_object(&self) -> ModelResult<Value> {
        if !self.model.search.enabled {
            return Err(ModelError::Definition(format!(
                "{} is not searchable",
                self.model.name
            )));
        }
        Ok(self.model.search.project(&self.attributes))
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> ModelResult<T> {
        Ok(serde_json::from_value(Value::Object(self.attributes.clone()))?)
    }

    /// Replaces the state with a freshly persisted row
    pub(crate) fn sync_persisted(&mut self, row: Row, changes: Row) {
        self.original = row.clone();
        self.attributes = row;
        self.changes = changes;
        self.exists = true;
    }

    /// Inserts when new, otherwise writes the dirty attributes
    pub async fn save(&mut self, db: &Database) -> ModelResult<()> {
        if !self.exists {
            let values = self.model.filter_columns(&self.attributes);
            let created = persistence::insert(db, &self.model, vec![values], true).await?;
            if let Some(created) = created.into_iter().next() {
                let changes = created.attributes.clone();
                self.sync_persisted(created.attributes, changes);
            }
            return Ok(());
        }

        let dirty = self.model.filter_columns(&self.get_dirty());
        if dirty.is_empty() {
            return Ok(());
        }
        let id = self.require_id()?;
        let updated = persistence::update(db, &self.model, id, dirty.clone(), true).await?;
        self.sync_persisted(updated.attributes, dirty);
        Ok(())
    }

    /// Mass-assignment filtered, validated update
    pub async fn update(&mut self, db: &Database, values: Value) -> ModelResult<()> {
        let values = self.model.filter_fillable(&persistence::into_row(values)?);
        self.write_update(db, values, true).await
    }

    /// Update without fillable filtering or validation
    pub async fn force_update(&mut self, db: &Database, values: Value) -> ModelResult<()> {
        let values = self.model.filter_columns(&persistence::into_row(values)?);
        self.write_update(db, values, false).await
    }

    async fn write_update(&mut self, db: &Database, values: Row, validate: bool) -> ModelResult<()> {
        let id = self.require_id()?;
        let updated = persistence::update(db, &self.model, id, values.clone(), validate).await?;
        self.sync_persisted(updated.attributes, values);
        Ok(())
    }

    /// Soft delete when the model uses soft deletes, physical delete otherwise
    pub async fn delete(&mut self, db: &Database) -> ModelResult<()> {
        let id = self.require_id()?;
        if let Some(row) = persistence::delete(db, &self.model, id).await? {
            let changes = row
                .iter()
                .filter(|(key, value)| self.attributes.get(key.as_str()) != Some(*value))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            self.sync_persisted(row, changes);
        }
        if !self.model.soft_deletes() {
            self.exists = false;
        }
        Ok(())
    }

    /// Reloads the attributes from storage
    pub async fn refresh(&mut self, db: &Database) -> ModelResult<()> {
        let id = self.require_id()?;
        let fresh = db
            .model(&self.model.name)?
            .query()
            .with_trashed()
            .find_or_fail(id)
            .await?;
        self.sync_persisted(fresh.attributes, Row::new());
        Ok(())
    }

    /// Traverses a declared relation
    pub async fn related(&self, db: &Database, relation: &str) -> ModelResult<RelationValue> {
        RelationAccessor::new(db, self).fetch(relation).await
    }

    /// Single-row relation (belongsTo, hasOne, hasOneThrough)
    pub async fn related_one(&self, db: &Database, relation: &str) -> ModelResult<ModelInstance> {
        match self.related(db, relation).await? {
            RelationValue::One(instance) => Ok(*instance),
            RelationValue::Many(_) => Err(ModelError::InvalidQueryCondition(format!(
                "relation '{}' on {} returns many rows",
                relation, self.model.name
            ))),
        }
    }

    /// Multi-row relation (hasMany, belongsToMany, hasManyThrough)
    pub async fn related_many(
        &self,
        db: &Database,
        relation: &str,
    ) -> ModelResult<Vec<ModelInstance>> {
        Ok(self.related(db, relation).await?.many())
    }

    pub fn taggable<'a>(&self, db: &'a Database) -> ModelResult<Taggable<'a>> {
        Taggable::new(db, self)
    }

    pub fn categorizable<'a>(&self, db: &'a Database) -> ModelResult<Categorizable<'a>> {
        Categorizable::new(db, self)
    }

    pub fn commentable<'a>(&self, db: &'a Database) -> ModelResult<Commentable<'a>> {
        Commentable::new(db, self)
    }

    pub fn likeable<'a>(&self, db: &'a Database) -> ModelResult<Likeable<'a>> {
        Likeable::new(db, self)
    }

    /// Billing operations; writes `stripe_id` back onto this instance
    pub fn billable<'a>(&'a mut self, db: &'a Database) -> ModelResult<Billable<'a>> {
        Billable::new(db, self)
    }

    pub fn two_factor<'a>(&'a mut self, db: &'a Database) -> ModelResult<TwoFactor<'a>> {
        TwoFactor::new(db, self)
    }
}
