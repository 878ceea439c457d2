//! Model handle: the static side of the query contract for one compiled
//! model (`Customer::find`, `GiftCard::create`, ...).

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::compiled::CompiledModel;
use crate::model::instance::ModelInstance;
use crate::model::persistence;
use crate::query::conditions::ConditionBuilder;
use crate::query::{ModelQuery, PageOptions, Paginated};
use crate::storage::Row;

#[derive(Clone)]
pub struct Model {
    db: Database,
    compiled: Arc<CompiledModel>,
}

impl Model {
    pub(crate) fn new(db: Database, compiled: Arc<CompiledModel>) -> Self {
        Self { db, compiled }
    }

    pub fn compiled(&self) -> &Arc<CompiledModel> {
        &self.compiled
    }

    pub fn name(&self) -> &str {
        &self.compiled.name
    }

    pub fn table(&self) -> &str {
        &self.compiled.table
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Fresh query with the soft-delete scope applied
    pub fn query(&self) -> ModelQuery {
        ModelQuery::new(self.db.clone(), self.compiled.clone())
    }

    /// Unsaved instance, mass-assignment filtered
    pub fn new_instance(&self, values: Value) -> ModelResult<ModelInstance> {
        let mut instance = ModelInstance::new(self.compiled.clone());
        instance.fill(values)?;
        Ok(instance)
    }

    pub async fn find(&self, id: i64) -> ModelResult<Option<ModelInstance>> {
        self.query().find(id).await
    }

    pub async fn find_or_fail(&self, id: i64) -> ModelResult<ModelInstance> {
        self.query().find_or_fail(id).await
    }

    pub async fn find_many(&self, ids: &[i64]) -> ModelResult<Vec<ModelInstance>> {
        self.query().find_many(ids).await
    }

    pub async fn all(&self) -> ModelResult<Vec<ModelInstance>> {
        self.query().get().await
    }

    pub async fn first(&self) -> ModelResult<Option<ModelInstance>> {
        self.query().first().await
    }

    pub async fn last(&self) -> ModelResult<Option<ModelInstance>> {
        self.query().last().await
    }

    pub async fn latest(&self, column: Option<&str>) -> ModelResult<Option<ModelInstance>> {
        self.query().latest(column).await
    }

    pub async fn oldest(&self, column: Option<&str>) -> ModelResult<Option<ModelInstance>> {
        self.query().oldest(column).await
    }

    pub async fn count(&self) -> ModelResult<i64> {
        self.query().count().await
    }

    pub async fn paginate(&self, options: PageOptions) -> ModelResult<Paginated> {
        self.query().paginate(options).await
    }

    /// Insert one row from mass-assignable values
    pub async fn create(&self, values: Value) -> ModelResult<ModelInstance> {
        let row = self.compiled.filter_fillable(&persistence::into_row(values)?);
        self.insert_one(row, true).await
    }

    /// Insert several rows in one statement; results keep input order
    pub async fn create_many(&self, values: Vec<Value>) -> ModelResult<Vec<ModelInstance>> {
        let rows = values
            .into_iter()
            .map(|value| Ok(self.compiled.filter_fillable(&persistence::into_row(value)?)))
            .collect::<ModelResult<Vec<Row>>>()?;
        persistence::insert(&self.db, &self.compiled, rows, true).await
    }

    /// Insert bypassing the fillable lists and validation
    pub async fn force_create(&self, values: Value) -> ModelResult<ModelInstance> {
        let row = self.compiled.filter_columns(&persistence::into_row(values)?);
        self.insert_one(row, false).await
    }

    async fn insert_one(&self, row: Row, validate: bool) -> ModelResult<ModelInstance> {
        persistence::insert(&self.db, &self.compiled, vec![row], validate)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::failed_to_retrieve("created", &self.compiled.name))
    }

    /// First row matching `search`, or a new row built from `search ∪ values`
    pub async fn first_or_create(&self, search: Value, values: Value) -> ModelResult<ModelInstance> {
        let search = persistence::into_row(search)?;
        if let Some(existing) = self.search_query(&search)?.first().await? {
            return Ok(existing);
        }

        let mut attributes = search;
        attributes.extend(persistence::into_row(values)?);
        self.create(Value::Object(attributes)).await
    }

    /// Updates the first row matching `search` with `values`, or creates it
    pub async fn update_or_create(&self, search: Value, values: Value) -> ModelResult<ModelInstance> {
        let search = persistence::into_row(search)?;
        let values = persistence::into_row(values)?;

        if let Some(mut existing) = self.search_query(&search)?.first().await? {
            debug!("update_or_create matched {} {:?}", self.compiled.name, existing.id());
            existing.update(&self.db, Value::Object(values)).await?;
            return Ok(existing);
        }

        let mut attributes = search;
        attributes.extend(values);
        self.create(Value::Object(attributes)).await
    }

    fn search_query(&self, search: &Row) -> ModelResult<ModelQuery> {
        let mut query = self.query();
        for (column, value) in search {
            if !self.compiled.has_column(column) {
                return Err(ModelError::InvalidQueryCondition(format!(
                    "{} has no attribute '{}'",
                    self.compiled.name, column
                )));
            }
            query = if value.is_null() {
                query.where_null(column)
            } else {
                query.where_eq(column, value.clone())
            };
        }
        Ok(query)
    }

    /// Deletes by primary key. Returns `false` when no such row exists.
    pub async fn remove(&self, id: i64) -> ModelResult<bool> {
        match persistence::delete(&self.db, &self.compiled, id).await {
            Ok(_) => Ok(true),
            Err(ModelError::RecordNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.compiled.name)
            .field("table", &self.compiled.table)
            .finish()
    }
}
