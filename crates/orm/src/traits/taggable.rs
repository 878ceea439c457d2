//! Taggable: free-form tags stored in the shared `taggables` table

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::Database;
use crate::error::ModelResult;
use crate::model::ModelInstance;
use crate::naming;
use crate::query::conditions::ConditionBuilder;
use crate::storage::Row;
use crate::traits::association::MorphScope;

pub const TAGGABLES_TABLE: &str = "taggables";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub taggable_id: i64,
    pub taggable_type: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order: i64,
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

/// Input for `add_tag`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTag {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewTag {
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

pub struct Taggable<'a> {
    scope: MorphScope<'a>,
}

impl<'a> Taggable<'a> {
    pub(crate) fn new(db: &'a Database, owner: &ModelInstance) -> ModelResult<Self> {
        owner
            .model()
            .require_trait(owner.model().traits.taggable, "taggable")?;
        Ok(Self {
            scope: MorphScope::new(db, owner, TAGGABLES_TABLE, "taggable_id", "taggable_type")?,
        })
    }

    pub async fn tags(&self) -> ModelResult<Vec<Tag>> {
        self.scope.fetch(self.scope.select()).await
    }

    pub async fn tag_count(&self) -> ModelResult<i64> {
        self.scope.count().await
    }

    /// New active tag with `order = 0` and a slug derived from the name
    pub async fn add_tag(&self, tag: NewTag) -> ModelResult<Tag> {
        let mut values = Row::new();
        values.insert("slug".to_string(), Value::String(naming::slugify(&tag.name)));
        values.insert("name".to_string(), Value::String(tag.name));
        values.insert(
            "description".to_string(),
            tag.description.map(Value::String).unwrap_or(Value::Null),
        );
        values.insert("order".to_string(), Value::from(0));
        values.insert("is_active".to_string(), Value::Bool(true));
        self.scope.insert(values).await
    }

    pub async fn active_tags(&self) -> ModelResult<Vec<Tag>> {
        self.scope
            .fetch(self.scope.select().where_eq("is_active", true))
            .await
    }

    pub async fn inactive_tags(&self) -> ModelResult<Vec<Tag>> {
        self.scope
            .fetch(self.scope.select().where_eq("is_active", false))
            .await
    }

    /// Removes one of this owner's tags; `false` when it was not attached
    pub async fn remove_tag(&self, tag_id: i64) -> ModelResult<bool> {
        Ok(self.scope.delete(tag_id).await? > 0)
    }
}
