//! Eager Loading System - one query per relation per batch, results
//! attributed back to their owners by key value

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::{CompiledModel, ModelInstance};
use crate::query::builder::{pivot_columns, through_columns};
use crate::query::conditions::ConditionBuilder;
use crate::relationships::metadata::{
    Cardinality, RelationMechanism, RelationValue, ResolvedRelation,
};
use crate::storage::select_from;

/// Key values compare across numeric and textual representations
pub(crate) fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(
            number
                .as_i64()
                .map(|n| n.to_string())
                .unwrap_or_else(|| number.to_string()),
        ),
        other => Some(other.to_string()),
    }
}

/// Distinct non-null values of `column` across `instances`, in first-seen order
fn distinct_keys(instances: &[ModelInstance], column: &str) -> Vec<Value> {
    let mut seen = Vec::new();
    let mut values = Vec::new();
    for instance in instances {
        if let Some(value) = instance.get(column) {
            if let Some(key) = key_of(value) {
                if !seen.contains(&key) {
                    seen.push(key);
                    values.push(value.clone());
                }
            }
        }
    }
    values
}

fn group_by_key(rows: Vec<ModelInstance>, column: &str) -> HashMap<String, Vec<ModelInstance>> {
    let mut grouped: HashMap<String, Vec<ModelInstance>> = HashMap::new();
    for row in rows {
        if let Some(key) = row.get(column).and_then(key_of) {
            grouped.entry(key).or_default().push(row);
        }
    }
    grouped
}

/// Loads every relation in `names` onto `instances`, in order
pub async fn load_relations(
    db: &Database,
    model: &Arc<CompiledModel>,
    instances: &mut [ModelInstance],
    names: &[String],
) -> ModelResult<()> {
    for name in names {
        let relation = model.relation(name)?;
        debug!(
            "Eager loading {}.{} for {} rows",
            model.name,
            relation.name,
            instances.len()
        );

        match relation.mechanism {
            RelationMechanism::BelongsTo => load_belongs_to(db, relation, instances).await?,
            RelationMechanism::HasMany | RelationMechanism::HasOne => {
                load_has(db, relation, instances).await?
            }
            RelationMechanism::BelongsToMany => {
                load_belongs_to_many(db, relation, instances).await?
            }
            RelationMechanism::ThroughMany => load_through(db, relation, instances).await?,
        }
    }
    Ok(())
}

async fn load_belongs_to(
    db: &Database,
    relation: &ResolvedRelation,
    instances: &mut [ModelInstance],
) -> ModelResult<()> {
    let keys = distinct_keys(instances, &relation.local_key);
    if keys.is_empty() {
        return Ok(());
    }

    let parents = db
        .model(&relation.target_entity)?
        .query()
        .where_in(&relation.foreign_key, keys)
        .get()
        .await?;
    let by_key = group_by_key(parents, &relation.foreign_key);

    for instance in instances.iter_mut() {
        let parent = instance
            .get(&relation.local_key)
            .and_then(key_of)
            .and_then(|key| by_key.get(&key))
            .and_then(|rows| rows.first());
        if let Some(parent) = parent {
            instance.set_relation(&relation.name, RelationValue::One(Box::new(parent.clone())));
        }
    }
    Ok(())
}

async fn load_has(
    db: &Database,
    relation: &ResolvedRelation,
    instances: &mut [ModelInstance],
) -> ModelResult<()> {
    let keys = distinct_keys(instances, &relation.local_key);
    let mut by_key = HashMap::new();
    if !keys.is_empty() {
        let query = db
            .model(&relation.target_entity)?
            .query()
            .where_in(&relation.foreign_key, keys);
        let pk = query.qualified_key();
        let related = query.order_by_asc(&pk).get().await?;
        by_key = group_by_key(related, &relation.foreign_key);
    }

    for instance in instances.iter_mut() {
        let mut related = instance
            .get(&relation.local_key)
            .and_then(key_of)
            .and_then(|key| by_key.get(&key).cloned())
            .unwrap_or_default();

        match relation.mechanism {
            RelationMechanism::HasOne => {
                if !related.is_empty() {
                    let first = related.swap_remove(0);
                    instance.set_relation(&relation.name, RelationValue::One(Box::new(first)));
                }
            }
            _ => {
                if let Some(page_size) = relation.page_size {
                    related.truncate(page_size);
                }
                instance.set_relation(&relation.name, RelationValue::Many(related));
            }
        }
    }
    Ok(())
}

async fn load_belongs_to_many(
    db: &Database,
    relation: &ResolvedRelation,
    instances: &mut [ModelInstance],
) -> ModelResult<()> {
    let (pivot, pivot_foreign_key, pivot_related_key) = pivot_columns(relation)?;
    let keys = distinct_keys(instances, &relation.local_key);

    // owner key -> related keys, in pivot order
    let mut links: HashMap<String, Vec<String>> = HashMap::new();
    let mut related_ids = Vec::new();
    if !keys.is_empty() {
        let pivot_rows = select_from(&pivot)
            .where_in(&pivot_foreign_key, keys)
            .execute(db.storage())
            .await?;
        for row in pivot_rows {
            let owner = row.get(&pivot_foreign_key).and_then(key_of);
            let related = row.get(&pivot_related_key);
            if let (Some(owner), Some(related)) = (owner, related) {
                if let Some(related_key) = key_of(related) {
                    links.entry(owner).or_default().push(related_key);
                    related_ids.push(related.clone());
                }
            }
        }
    }

    let mut by_key = HashMap::new();
    if !related_ids.is_empty() {
        let related = db
            .model(&relation.target_entity)?
            .query()
            .where_in(&relation.foreign_key, related_ids)
            .get()
            .await?;
        by_key = group_by_key(related, &relation.foreign_key);
    }

    for instance in instances.iter_mut() {
        let related: Vec<ModelInstance> = instance
            .get(&relation.local_key)
            .and_then(key_of)
            .and_then(|key| links.get(&key))
            .map(|related_keys| {
                related_keys
                    .iter()
                    .filter_map(|key| by_key.get(key).and_then(|rows| rows.first()).cloned())
                    .collect()
            })
            .unwrap_or_default();
        instance.set_relation(&relation.name, RelationValue::Many(related));
    }
    Ok(())
}

async fn load_through(
    db: &Database,
    relation: &ResolvedRelation,
    instances: &mut [ModelInstance],
) -> ModelResult<()> {
    let (_, through_key, through_foreign_key) = through_columns(relation)?;
    let through_entity = relation.through_entity.as_deref().ok_or_else(|| {
        ModelError::Definition(format!(
            "relation '{}' has no intermediate model",
            relation.name
        ))
    })?;
    let keys = distinct_keys(instances, &relation.local_key);

    // owner key -> the first intermediate row's key
    let mut intermediates: HashMap<String, String> = HashMap::new();
    let mut intermediate_ids = Vec::new();
    if !keys.is_empty() {
        let query = db
            .model(through_entity)?
            .query()
            .where_in(&through_foreign_key, keys);
        let pk = query.qualified_key();
        for row in query.order_by_asc(&pk).get().await? {
            let owner = row.get(&through_foreign_key).and_then(key_of);
            let through = row.get(&through_key);
            if let (Some(owner), Some(through)) = (owner, through) {
                if intermediates.contains_key(&owner) {
                    continue;
                }
                if let Some(through_value) = key_of(through) {
                    intermediates.insert(owner, through_value);
                    intermediate_ids.push(through.clone());
                }
            }
        }
    }

    let mut by_key = HashMap::new();
    if !intermediate_ids.is_empty() {
        let query = db
            .model(&relation.target_entity)?
            .query()
            .where_in(&relation.foreign_key, intermediate_ids);
        let pk = query.qualified_key();
        let related = query.order_by_asc(&pk).get().await?;
        by_key = group_by_key(related, &relation.foreign_key);
    }

    for instance in instances.iter_mut() {
        let related = instance
            .get(&relation.local_key)
            .and_then(key_of)
            .and_then(|key| intermediates.get(&key))
            .and_then(|through| by_key.get(through).cloned());

        match relation.cardinality {
            Cardinality::Many => {
                instance.set_relation(
                    &relation.name,
                    RelationValue::Many(related.unwrap_or_default()),
                );
            }
            Cardinality::One => {
                if let Some(first) = related.and_then(|rows| rows.into_iter().next()) {
                    instance.set_relation(&relation.name, RelationValue::One(Box::new(first)));
                }
            }
        }
    }
    Ok(())
}
