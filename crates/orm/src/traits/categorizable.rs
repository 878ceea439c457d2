//! Categorizable: shared categories linked to owners through
//! `categorizable_models`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::database::Database;
use crate::error::ModelResult;
use crate::model::ModelInstance;
use crate::naming;
use crate::query::conditions::ConditionBuilder;
use crate::storage::{select_from, Row};
use crate::traits::association::{decode, insert_stamped, MorphScope};

pub const CATEGORIES_TABLE: &str = "categorizables";
pub const CATEGORY_LINKS_TABLE: &str = "categorizable_models";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_active() -> bool {
    true
}

/// Input for `add_category`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewCategory {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: None,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct CategoryLink {
    id: i64,
    category_id: i64,
}

pub struct Categorizable<'a> {
    links: MorphScope<'a>,
}

impl<'a> Categorizable<'a> {
    pub(crate) fn new(db: &'a Database, owner: &ModelInstance) -> ModelResult<Self> {
        owner
            .model()
            .require_trait(owner.model().traits.categorizable, "categorizable")?;
        Ok(Self {
            links: MorphScope::new(
                db,
                owner,
                CATEGORY_LINKS_TABLE,
                "categorizable_id",
                "categorizable_type",
            )?,
        })
    }

    async fn links(&self) -> ModelResult<Vec<CategoryLink>> {
        self.links.fetch(self.links.select()).await
    }

    async fn category_ids(&self) -> ModelResult<Vec<i64>> {
        let mut ids: Vec<i64> = Vec::new();
        for link in self.links().await? {
            if !ids.contains(&link.category_id) {
                ids.push(link.category_id);
            }
        }
        Ok(ids)
    }

    async fn fetch_categories(&self, is_active: Option<bool>) -> ModelResult<Vec<Category>> {
        let ids = self.category_ids().await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let statement = select_from(CATEGORIES_TABLE)
            .where_in("id", ids)
            .when(is_active.is_some(), |statement| {
                statement.where_eq("is_active", is_active.unwrap_or(true))
            });
        let rows = statement.execute(self.links.db().storage()).await?;
        rows.into_iter().map(decode).collect()
    }

    pub async fn categories(&self) -> ModelResult<Vec<Category>> {
        self.fetch_categories(None).await
    }

    pub async fn category_count(&self) -> ModelResult<i64> {
        Ok(self.category_ids().await?.len() as i64)
    }

    /// Links the category named `category.name`, creating it first when no
    /// category with that name exists
    pub async fn add_category(&self, category: NewCategory) -> ModelResult<Category> {
        let db = self.links.db();
        let existing = select_from(CATEGORIES_TABLE)
            .where_eq("name", category.name.as_str())
            .execute_take_first(db.storage())
            .await?;

        let record: Category = match existing {
            Some(row) => decode(row)?,
            None => {
                let mut values = Row::new();
                values.insert(
                    "slug".to_string(),
                    Value::String(naming::slugify(&category.name)),
                );
                values.insert("name".to_string(), Value::String(category.name));
                values.insert(
                    "description".to_string(),
                    category.description.map(Value::String).unwrap_or(Value::Null),
                );
                values.insert("is_active".to_string(), Value::Bool(true));
                insert_stamped(db, CATEGORIES_TABLE, values).await?
            }
        };

        if !self.category_ids().await?.contains(&record.id) {
            let mut link = Row::new();
            link.insert("category_id".to_string(), Value::from(record.id));
            let _: Row = self.links.insert(link).await?;
        }
        Ok(record)
    }

    pub async fn active_categories(&self) -> ModelResult<Vec<Category>> {
        self.fetch_categories(Some(true)).await
    }

    pub async fn inactive_categories(&self) -> ModelResult<Vec<Category>> {
        self.fetch_categories(Some(false)).await
    }

    /// Detaches `category_id` from this owner; the category itself stays
    pub async fn remove_category(&self, category_id: i64) -> ModelResult<bool> {
        let mut removed = 0;
        for link in self.links().await? {
            if link.category_id == category_id {
                removed += self.links.delete(link.id).await?;
            }
        }
        debug!(
            "Detached category {} from {} {} ({} links)",
            category_id,
            self.links.owner_type(),
            self.links.owner_id(),
            removed
        );
        Ok(removed > 0)
    }
}
