//! Query execution: fetching terminals, aggregates and bulk writes

use serde_json::Value;
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::model::persistence;
use crate::model::ModelInstance;
use crate::query::builder::ModelQuery;
use crate::query::conditions::ConditionBuilder;
use crate::query::types::{AggregateFunction, OrderClause, OrderDirection};
use crate::relationships::eager;
use crate::schema::ValidationMode;
use crate::storage::statement::AGGREGATE_ALIAS;
use crate::storage::{delete_from, update_table, Projection, Row};

impl ModelQuery {
    /// Execute the query and return every matching instance
    pub async fn get(&self) -> ModelResult<Vec<ModelInstance>> {
        let statement = self.statement();
        debug!("Fetching {} from {}", self.model.name, statement.table);

        let rows = statement.execute(self.db.storage()).await?;
        let mut instances: Vec<ModelInstance> = rows
            .into_iter()
            .map(|row| ModelInstance::from_row(self.model.clone(), row))
            .collect();

        if !self.with.is_empty() && !instances.is_empty() {
            // Loaders fetch through `get` again; the box breaks the cycle
            Box::pin(eager::load_relations(
                &self.db,
                &self.model,
                &mut instances,
                &self.with,
            ))
            .await?;
        }
        Ok(instances)
    }

    pub async fn all(&self) -> ModelResult<Vec<ModelInstance>> {
        self.get().await
    }

    pub async fn first(&self) -> ModelResult<Option<ModelInstance>> {
        let mut query = self.clone();
        query.limit = Some(1);
        Ok(query.get().await?.into_iter().next())
    }

    pub async fn first_or_fail(&self) -> ModelResult<ModelInstance> {
        self.first()
            .await?
            .ok_or_else(|| ModelError::empty_result(&self.model.name))
    }

    /// Highest primary key first, one row
    pub async fn last(&self) -> ModelResult<Option<ModelInstance>> {
        let mut query = self.clone();
        query.order_by = vec![OrderClause::Column(
            self.qualified_key(),
            OrderDirection::Desc,
        )];
        query.first().await
    }

    /// Newest row by `column` (default `created_at`)
    pub async fn latest(&self, column: Option<&str>) -> ModelResult<Option<ModelInstance>> {
        self.clone()
            .order_by_desc(column.unwrap_or("created_at"))
            .first()
            .await
    }

    /// Oldest row by `column` (default `created_at`)
    pub async fn oldest(&self, column: Option<&str>) -> ModelResult<Option<ModelInstance>> {
        self.clone()
            .order_by_asc(column.unwrap_or("created_at"))
            .first()
            .await
    }

    pub async fn find(&self, id: i64) -> ModelResult<Option<ModelInstance>> {
        self.clone()
            .where_eq(&self.qualified_key(), id)
            .first()
            .await
    }

    pub async fn find_or_fail(&self, id: i64) -> ModelResult<ModelInstance> {
        self.find(id)
            .await?
            .ok_or_else(|| ModelError::record_not_found(&self.model.name, id))
    }

    pub async fn find_many(&self, ids: &[i64]) -> ModelResult<Vec<ModelInstance>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.clone()
            .where_in(&self.qualified_key(), ids.to_vec())
            .get()
            .await
    }

    /// Number of matching rows (or groups when grouped)
    pub async fn count(&self) -> ModelResult<i64> {
        if !self.group_by.is_empty() {
            let mut query = self.clone();
            query.with.clear();
            return Ok(query.statement().execute(self.db.storage()).await?.len() as i64);
        }

        let value = self.aggregate(AggregateFunction::Count, None).await?;
        Ok(value.as_i64().or_else(|| value.as_f64().map(|v| v as i64)).unwrap_or(0))
    }

    pub async fn exists(&self) -> ModelResult<bool> {
        Ok(self.count().await? > 0)
    }

    pub async fn max(&self, column: &str) -> ModelResult<f64> {
        self.numeric_aggregate(AggregateFunction::Max, column).await
    }

    pub async fn min(&self, column: &str) -> ModelResult<f64> {
        self.numeric_aggregate(AggregateFunction::Min, column).await
    }

    pub async fn avg(&self, column: &str) -> ModelResult<f64> {
        self.numeric_aggregate(AggregateFunction::Avg, column).await
    }

    pub async fn sum(&self, column: &str) -> ModelResult<f64> {
        self.numeric_aggregate(AggregateFunction::Sum, column).await
    }

    async fn numeric_aggregate(&self, function: AggregateFunction, column: &str) -> ModelResult<f64> {
        let value = self.aggregate(function, Some(column)).await?;
        match value {
            Value::Null => Ok(0.0),
            Value::Number(number) => Ok(number.as_f64().unwrap_or(0.0)),
            Value::String(text) => text.parse::<f64>().map_err(|_| {
                ModelError::Serialization(format!(
                    "{} of '{}' is not numeric: {}",
                    function, column, text
                ))
            }),
            other => Err(ModelError::Serialization(format!(
                "{} of '{}' is not numeric: {}",
                function, column, other
            ))),
        }
    }

    async fn aggregate(&self, function: AggregateFunction, column: Option<&str>) -> ModelResult<Value> {
        let mut statement = self.statement();
        statement.projection = Projection::Aggregate {
            function,
            column: column.map(str::to_string),
        };
        statement.order_by.clear();
        statement.limit = None;
        statement.offset = None;

        let row = statement.execute_take_first(self.db.storage()).await?;
        Ok(row
            .and_then(|mut row| row.remove(AGGREGATE_ALIAS))
            .unwrap_or(Value::Null))
    }

    /// Values of one column across the matching rows
    pub async fn pluck(&self, column: &str) -> ModelResult<Vec<Value>> {
        let mut statement = self.statement();
        statement.projection = Projection::Columns(vec![column.to_string()]);
        let key = result_key(column);

        let rows = statement.execute(self.db.storage()).await?;
        Ok(rows
            .into_iter()
            .map(|mut row| row.remove(&key).unwrap_or(Value::Null))
            .collect())
    }

    /// Mass-assignment filtered update of every matched row; no events fire
    pub async fn update(&self, values: Value) -> ModelResult<u64> {
        let values = self.model.filter_fillable(&persistence::into_row(values)?);
        self.bulk_update(values, true).await
    }

    /// Update of every matched row without fillable filtering or validation
    pub async fn force_update(&self, values: Value) -> ModelResult<u64> {
        let values = self.model.filter_columns(&persistence::into_row(values)?);
        self.bulk_update(values, false).await
    }

    async fn bulk_update(&self, mut values: Row, validate: bool) -> ModelResult<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        if validate && self.db.config().validate_on_write {
            self.model.validator.validate(&values, ValidationMode::Update)?;
        }
        if self.model.timestamps() {
            values.entry("updated_at").or_insert_with(persistence::now);
        }

        let mut statement = update_table(&self.model.table).set(values);
        statement.conditions = self.scoped_conditions();
        let affected = statement.execute(self.db.storage()).await?;
        debug!("Updated {} {} rows", affected, self.model.name);
        Ok(affected)
    }

    /// Deletes every matched row (soft when the model uses soft deletes);
    /// no events fire
    pub async fn delete(&self) -> ModelResult<u64> {
        let affected = if self.model.soft_deletes() {
            let mut values = Row::new();
            values.insert("deleted_at".to_string(), persistence::now());
            let mut statement = update_table(&self.model.table).set(values);
            statement.conditions = self.scoped_conditions();
            statement.execute(self.db.storage()).await?
        } else {
            let mut statement = delete_from(&self.model.table);
            statement.conditions = self.scoped_conditions();
            statement.execute(self.db.storage()).await?
        };
        debug!("Deleted {} {} rows", affected, self.model.name);
        Ok(affected)
    }

    pub(crate) fn qualified_key(&self) -> String {
        format!("{}.{}", self.model.table, self.model.primary_key)
    }
}

/// Row key a projected column comes back under
fn result_key(column: &str) -> String {
    let lowered = column.to_lowercase();
    if let Some(position) = lowered.find(" as ") {
        if column.is_ascii() {
            return column[position + 4..].trim().to_string();
        }
    }
    column.rsplit('.').next().unwrap_or(column).to_string()
}
