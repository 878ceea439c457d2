//! Write paths shared by model handles and instances.
//!
//! Every write stamps system columns, optionally validates, executes the
//! statement, re-selects the persisted row and fires the lifecycle event.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::debug;

use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::events::LifecycleEvent;
use crate::model::compiled::CompiledModel;
use crate::model::instance::ModelInstance;
use crate::query::conditions::ConditionBuilder;
use crate::schema::ValidationMode;
use crate::storage::{delete_from, insert_into, select_from, update_table, Row};

/// Timestamp written to `created_at`, `updated_at` and `deleted_at`
pub fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Attribute maps are accepted as JSON objects
pub fn into_row(values: Value) -> ModelResult<Row> {
    match values {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Row::new()),
        other => Err(ModelError::InvalidQueryCondition(format!(
            "expected an object of attribute values, got {}",
            other
        ))),
    }
}

fn should_validate(db: &Database, validate: bool) -> bool {
    validate && db.config().validate_on_write
}

/// Inserts `rows` (already filtered by the caller) and returns the
/// persisted instances in insertion order.
pub async fn insert(
    db: &Database,
    model: &Arc<CompiledModel>,
    rows: Vec<Row>,
    validate: bool,
) -> ModelResult<Vec<ModelInstance>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut statement = insert_into(&model.table).returning(&model.primary_key);
    for mut row in rows {
        if should_validate(db, validate) {
            model.validator.validate(&row, ValidationMode::Create)?;
        }
        if model.uses_uuid() {
            row.insert(
                "uuid".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        if model.timestamps() {
            let stamp = now();
            row.entry("created_at").or_insert_with(|| stamp.clone());
            row.entry("updated_at").or_insert(stamp);
        }
        statement = statement.values(row);
    }

    let ids = statement.execute(db.storage()).await?;
    debug!("Inserted {} {} rows", ids.len(), model.name);

    let fetched = select_from(&model.table)
        .where_in(&model.primary_key, ids.clone())
        .execute(db.storage())
        .await?;
    let mut by_id: HashMap<i64, Row> = fetched
        .into_iter()
        .filter_map(|row| {
            let id = row.get(&model.primary_key).and_then(Value::as_i64)?;
            Some((id, row))
        })
        .collect();

    let mut instances = Vec::with_capacity(ids.len());
    for id in ids {
        let row = by_id
            .remove(&id)
            .ok_or_else(|| ModelError::failed_to_retrieve("created", &model.name))?;
        instances.push(ModelInstance::from_row(model.clone(), row));
    }

    let dispatcher = db.lifecycle(model);
    for instance in &instances {
        dispatcher
            .fire(LifecycleEvent::Created, &instance.to_json())
            .await;
    }

    Ok(instances)
}

/// Updates one row by primary key and returns it re-selected
pub async fn update(
    db: &Database,
    model: &Arc<CompiledModel>,
    id: i64,
    mut values: Row,
    validate: bool,
) -> ModelResult<ModelInstance> {
    if should_validate(db, validate) {
        model.validator.validate(&values, ValidationMode::Update)?;
    }
    if model.timestamps() {
        values.entry("updated_at").or_insert_with(now);
    }

    if !values.is_empty() {
        update_table(&model.table)
            .set(values)
            .where_eq(&model.primary_key, id)
            .execute(db.storage())
            .await?;
    }

    let row = select_from(&model.table)
        .where_eq(&model.primary_key, id)
        .execute_take_first(db.storage())
        .await?
        .ok_or_else(|| ModelError::failed_to_retrieve("updated", &model.name))?;
    let instance = ModelInstance::from_row(model.clone(), row);

    db.lifecycle(model)
        .fire(LifecycleEvent::Updated, &instance.to_json())
        .await;
    Ok(instance)
}

/// Soft-deletes or removes one row. Returns the soft-deleted row, or
/// `None` after a physical delete.
pub async fn delete(
    db: &Database,
    model: &Arc<CompiledModel>,
    id: i64,
) -> ModelResult<Option<Row>> {
    // An already trashed row counts as missing
    let lookup = select_from(&model.table).where_eq(&model.primary_key, id);
    let lookup = if model.soft_deletes() {
        lookup.where_null("deleted_at")
    } else {
        lookup
    };
    let existing = lookup
        .execute_take_first(db.storage())
        .await?
        .ok_or_else(|| ModelError::record_not_found(&model.name, id))?;

    let result = if model.soft_deletes() {
        let mut values = Row::new();
        values.insert("deleted_at".to_string(), now());
        update_table(&model.table)
            .set(values)
            .where_eq(&model.primary_key, id)
            .execute(db.storage())
            .await?;
        let row = select_from(&model.table)
            .where_eq(&model.primary_key, id)
            .execute_take_first(db.storage())
            .await?
            .ok_or_else(|| ModelError::failed_to_retrieve("deleted", &model.name))?;
        Some(row)
    } else {
        delete_from(&model.table)
            .where_eq(&model.primary_key, id)
            .execute(db.storage())
            .await?;
        None
    };

    let payload = ModelInstance::from_row(model.clone(), result.clone().unwrap_or(existing));
    db.lifecycle(model)
        .fire(LifecycleEvent::Deleted, &payload.to_json())
        .await;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_row() {
        assert_eq!(into_row(json!({"a": 1})).unwrap().len(), 1);
        assert!(into_row(Value::Null).unwrap().is_empty());
        assert!(matches!(
            into_row(json!([1, 2])),
            Err(ModelError::InvalidQueryCondition(_))
        ));
    }

    #[test]
    fn test_now_is_rfc3339_utc() {
        let stamp = now();
        let text = stamp.as_str().unwrap();
        assert!(text.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(text).is_ok());
    }
}
