//! Relation accessors: lazy traversal of one declared relation from one
//! owning instance.

use serde_json::Value;
use tracing::debug;

use crate::database::Database;
use crate::error::{ModelError, ModelResult, RelationshipError};
use crate::model::ModelInstance;
use crate::query::builder::{pivot_columns, through_columns};
use crate::query::conditions::ConditionBuilder;
use crate::query::ModelQuery;
use crate::relationships::metadata::{
    Cardinality, RelationMechanism, RelationValue, ResolvedRelation,
};
use crate::storage::select_from;

pub struct RelationAccessor<'a> {
    db: &'a Database,
    owner: &'a ModelInstance,
}

impl<'a> RelationAccessor<'a> {
    pub fn new(db: &'a Database, owner: &'a ModelInstance) -> Self {
        Self { db, owner }
    }

    /// Resolve `name` with the algorithm its mechanism selects
    pub async fn fetch(&self, name: &str) -> ModelResult<RelationValue> {
        let relation = self.owner.model().relation(name)?;
        debug!(
            "Traversing {}.{} ({})",
            self.owner.model_name(),
            relation.name,
            relation.mechanism.as_str()
        );

        match relation.mechanism {
            RelationMechanism::BelongsTo => self.belongs_to(relation).await,
            RelationMechanism::HasMany => self.has_many(relation).await,
            RelationMechanism::HasOne => self.has_one(relation).await,
            RelationMechanism::BelongsToMany => self.belongs_to_many(relation).await,
            RelationMechanism::ThroughMany => self.through(relation).await,
        }
    }

    fn target_query(&self, relation: &ResolvedRelation) -> ModelResult<ModelQuery> {
        Ok(self.db.model(&relation.target_entity)?.query())
    }

    fn owner_key(&self, relation: &ResolvedRelation) -> ModelResult<Value> {
        match self.owner.get(&relation.local_key) {
            Some(value) if !value.is_null() => Ok(value.clone()),
            _ => Err(ModelError::MissingPrimaryKey),
        }
    }

    fn missing(&self, relation: &ResolvedRelation, detail: String) -> ModelError {
        RelationshipError::MissingTarget {
            relation: format!("{}.{}", self.owner.model_name(), relation.name),
            detail,
        }
        .into()
    }

    async fn belongs_to(&self, relation: &ResolvedRelation) -> ModelResult<RelationValue> {
        let key = match self.owner.get(&relation.local_key) {
            Some(value) if !value.is_null() => value.clone(),
            _ => {
                return Err(self.missing(relation, format!("{} is null", relation.local_key)));
            }
        };

        let parent = self
            .target_query(relation)?
            .where_eq(&relation.foreign_key, key.clone())
            .first()
            .await?
            .ok_or_else(|| {
                self.missing(
                    relation,
                    format!("{}.{} = {}", relation.target_table, relation.foreign_key, key),
                )
            })?;
        Ok(RelationValue::One(Box::new(parent)))
    }

    async fn has_many(&self, relation: &ResolvedRelation) -> ModelResult<RelationValue> {
        let key = self.owner_key(relation)?;
        let mut query = self
            .target_query(relation)?
            .where_eq(&relation.foreign_key, key);
        let pk = query.qualified_key();
        query = query.order_by_asc(&pk);
        if let Some(page_size) = relation.page_size {
            query = query.take(page_size);
        }
        Ok(RelationValue::Many(query.get().await?))
    }

    async fn has_one(&self, relation: &ResolvedRelation) -> ModelResult<RelationValue> {
        let key = self.owner_key(relation)?;
        let query = self
            .target_query(relation)?
            .where_eq(&relation.foreign_key, key.clone());
        let pk = query.qualified_key();
        let related = query.order_by_asc(&pk).first().await?.ok_or_else(|| {
            self.missing(
                relation,
                format!("{}.{} = {}", relation.target_table, relation.foreign_key, key),
            )
        })?;
        Ok(RelationValue::One(Box::new(related)))
    }

    async fn belongs_to_many(&self, relation: &ResolvedRelation) -> ModelResult<RelationValue> {
        let (pivot, pivot_foreign_key, pivot_related_key) = pivot_columns(relation)?;
        let key = self.owner_key(relation)?;

        let related_ids: Vec<Value> = select_from(&pivot)
            .where_eq(&pivot_foreign_key, key)
            .execute(self.db.storage())
            .await?
            .into_iter()
            .filter_map(|mut row| row.remove(&pivot_related_key))
            .filter(|value| !value.is_null())
            .collect();

        if related_ids.is_empty() {
            return Ok(RelationValue::Many(Vec::new()));
        }

        let related = self
            .target_query(relation)?
            .where_in(&relation.foreign_key, related_ids)
            .get()
            .await?;
        Ok(RelationValue::Many(related))
    }

    async fn through(&self, relation: &ResolvedRelation) -> ModelResult<RelationValue> {
        let (_, through_key, through_foreign_key) = through_columns(relation)?;
        let through_entity = relation.through_entity.as_deref().ok_or_else(|| {
            ModelError::Definition(format!(
                "relation '{}' has no intermediate model",
                relation.name
            ))
        })?;
        let key = self.owner_key(relation)?;

        let intermediate_query = self
            .db
            .model(through_entity)?
            .query()
            .where_eq(&through_foreign_key, key.clone());
        let intermediate_pk = intermediate_query.qualified_key();
        let intermediate = intermediate_query
            .order_by_asc(&intermediate_pk)
            .first()
            .await?
            .ok_or_else(|| {
                self.missing(
                    relation,
                    format!("no {} with {} = {}", through_entity, through_foreign_key, key),
                )
            })?;

        let through_value = intermediate
            .get(&through_key)
            .cloned()
            .unwrap_or(Value::Null);
        let query = self
            .target_query(relation)?
            .where_eq(&relation.foreign_key, through_value.clone());

        match relation.cardinality {
            Cardinality::Many => Ok(RelationValue::Many(query.get().await?)),
            Cardinality::One => {
                let pk = query.qualified_key();
                let related = query.order_by_asc(&pk).first().await?.ok_or_else(|| {
                    self.missing(
                        relation,
                        format!(
                            "{}.{} = {}",
                            relation.target_table, relation.foreign_key, through_value
                        ),
                    )
                })?;
                Ok(RelationValue::One(Box::new(related)))
            }
        }
    }
}
