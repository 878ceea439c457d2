//! Owner-scoped access to the shared polymorphic tables used by the trait
//! modules. Every statement is filtered by the owner id and owner type.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::persistence;
use crate::model::ModelInstance;
use crate::query::conditions::ConditionBuilder;
use crate::query::types::AggregateFunction;
use crate::storage::statement::AGGREGATE_ALIAS;
use crate::storage::{delete_from, insert_into, select_from, update_table, Row, SelectStatement};

pub(crate) struct MorphScope<'a> {
    db: &'a Database,
    table: String,
    id_column: String,
    type_column: String,
    owner_id: i64,
    owner_type: String,
}

impl<'a> MorphScope<'a> {
    pub(crate) fn new(
        db: &'a Database,
        owner: &ModelInstance,
        table: &str,
        id_column: &str,
        type_column: &str,
    ) -> ModelResult<Self> {
        Ok(Self {
            db,
            table: table.to_string(),
            id_column: id_column.to_string(),
            type_column: type_column.to_string(),
            owner_id: owner.require_id()?,
            owner_type: owner.model().morph_type().to_string(),
        })
    }

    pub(crate) fn db(&self) -> &'a Database {
        self.db
    }

    pub(crate) fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn owner_id(&self) -> i64 {
        self.owner_id
    }

    pub(crate) fn owner_type(&self) -> &str {
        &self.owner_type
    }

    /// `SELECT` on the table, already scoped to the owner
    pub(crate) fn select(&self) -> SelectStatement {
        select_from(&self.table)
            .where_eq(&self.id_column, self.owner_id)
            .where_eq(&self.type_column, self.owner_type.as_str())
    }

    pub(crate) async fn fetch<T: DeserializeOwned>(
        &self,
        statement: SelectStatement,
    ) -> ModelResult<Vec<T>> {
        let rows = statement.execute(self.db.storage()).await?;
        rows.into_iter().map(decode).collect()
    }

    pub(crate) async fn count(&self) -> ModelResult<i64> {
        let row = self
            .select()
            .aggregate(AggregateFunction::Count, None)
            .execute_take_first(self.db.storage())
            .await?;
        Ok(row
            .and_then(|row| row.get(AGGREGATE_ALIAS).and_then(Value::as_i64))
            .unwrap_or(0))
    }

    /// Inserts `values` with the owner columns and timestamps filled in
    pub(crate) async fn insert<T: DeserializeOwned>(&self, mut values: Row) -> ModelResult<T> {
        values.insert(self.id_column.clone(), Value::from(self.owner_id));
        values.insert(
            self.type_column.clone(),
            Value::String(self.owner_type.clone()),
        );
        insert_stamped(self.db, &self.table, values).await
    }

    /// Updates one owned row; returns the affected count
    pub(crate) async fn update(&self, id: i64, mut values: Row) -> ModelResult<u64> {
        values.insert("updated_at".to_string(), persistence::now());
        let mut statement = update_table(&self.table).set(values).where_eq("id", id);
        statement = statement
            .where_eq(&self.id_column, self.owner_id)
            .where_eq(&self.type_column, self.owner_type.as_str());
        statement.execute(self.db.storage()).await
    }

    /// Deletes one owned row; returns the affected count
    pub(crate) async fn delete(&self, id: i64) -> ModelResult<u64> {
        let affected = delete_from(&self.table)
            .where_eq("id", id)
            .where_eq(&self.id_column, self.owner_id)
            .where_eq(&self.type_column, self.owner_type.as_str())
            .execute(self.db.storage())
            .await?;
        debug!(
            "Removed {} rows from {} for {} {}",
            affected, self.table, self.owner_type, self.owner_id
        );
        Ok(affected)
    }
}

/// Inserts one row into `table` with `created_at`/`updated_at` set and
/// returns it re-selected
pub(crate) async fn insert_stamped<T: DeserializeOwned>(
    db: &Database,
    table: &str,
    mut values: Row,
) -> ModelResult<T> {
    let stamp = persistence::now();
    values
        .entry("created_at")
        .or_insert_with(|| stamp.clone());
    values.entry("updated_at").or_insert(stamp);

    let id = insert_into(table)
        .values(values)
        .execute_take_first(db.storage())
        .await?
        .ok_or_else(|| ModelError::failed_to_retrieve("created", table))?;
    let row = select_from(table)
        .where_eq("id", id)
        .execute_take_first(db.storage())
        .await?
        .ok_or_else(|| ModelError::failed_to_retrieve("created", table))?;
    decode(row)
}

pub(crate) fn decode<T: DeserializeOwned>(row: Row) -> ModelResult<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}
