//! Likeable: per-user likes stored in `<table>_likes`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::database::Database;
use crate::error::ModelResult;
use crate::model::ModelInstance;
use crate::naming;
use crate::query::conditions::ConditionBuilder;
use crate::query::types::AggregateFunction;
use crate::storage::statement::AGGREGATE_ALIAS;
use crate::storage::{delete_from, select_from, Row, SelectStatement};
use crate::traits::association::{decode, insert_stamped};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub created_at: Option<String>,
}

pub struct Likeable<'a> {
    db: &'a Database,
    table: String,
    foreign_key: String,
    owner_id: i64,
}

impl<'a> Likeable<'a> {
    pub(crate) fn new(db: &'a Database, owner: &ModelInstance) -> ModelResult<Self> {
        let model = owner.model();
        model.require_trait(model.traits.likeable.is_enabled(), "likeable")?;

        let options = model.traits.likeable.options();
        Ok(Self {
            db,
            table: options
                .table
                .unwrap_or_else(|| format!("{}_likes", model.table)),
            foreign_key: options
                .foreign_key
                .unwrap_or_else(|| naming::foreign_key_for_table(&model.table)),
            owner_id: owner.require_id()?,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    fn scoped(&self) -> SelectStatement {
        select_from(&self.table).where_eq(&self.foreign_key, self.owner_id)
    }

    pub async fn likes(&self) -> ModelResult<Vec<Like>> {
        let rows = self.scoped().execute(self.db.storage()).await?;
        rows.into_iter().map(decode).collect()
    }

    pub async fn like_count(&self) -> ModelResult<i64> {
        let row = self
            .scoped()
            .aggregate(AggregateFunction::Count, None)
            .execute_take_first(self.db.storage())
            .await?;
        Ok(row
            .and_then(|row| row.get(AGGREGATE_ALIAS).and_then(Value::as_i64))
            .unwrap_or(0))
    }

    pub async fn is_liked(&self, user_id: i64) -> ModelResult<bool> {
        Ok(self
            .scoped()
            .where_eq("user_id", user_id)
            .execute_take_first(self.db.storage())
            .await?
            .is_some())
    }

    /// Records a like; liking twice keeps a single row
    pub async fn like(&self, user_id: i64) -> ModelResult<()> {
        if self.is_liked(user_id).await? {
            debug!("{} {} already liked by {}", self.table, self.owner_id, user_id);
            return Ok(());
        }

        let mut values = Row::new();
        values.insert(self.foreign_key.clone(), Value::from(self.owner_id));
        values.insert("user_id".to_string(), Value::from(user_id));
        let _: Row = insert_stamped(self.db, &self.table, values).await?;
        Ok(())
    }

    pub async fn unlike(&self, user_id: i64) -> ModelResult<bool> {
        let removed = delete_from(&self.table)
            .where_eq(&self.foreign_key, self.owner_id)
            .where_eq("user_id", user_id)
            .execute(self.db.storage())
            .await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelCompiler;
    use crate::schema::{LikeableConfig, LikeableOptions, ModelSchema, TraitFlags};
    use serde_json::json;

    fn database() -> Database {
        let registry = ModelCompiler::new()
            .add(ModelSchema::new("Activity").traits(TraitFlags {
                likeable: LikeableConfig::Enabled(true),
                ..TraitFlags::default()
            }))
            .unwrap()
            .add(ModelSchema::new("Product").traits(TraitFlags {
                likeable: LikeableConfig::Custom(LikeableOptions {
                    table: Some("product_upvotes".to_string()),
                    foreign_key: Some("upvoted_id".to_string()),
                }),
                ..TraitFlags::default()
            }))
            .unwrap()
            .compile()
            .unwrap();
        Database::memory(registry)
    }

    #[tokio::test]
    async fn test_like_is_idempotent() {
        let db = database();
        let activity = db.model("Activity").unwrap().create(json!({})).await.unwrap();
        let likes = activity.likeable(&db).unwrap();
        assert_eq!(likes.table(), "activities_likes");
        assert_eq!(likes.foreign_key(), "activity_id");

        likes.like(7).await.unwrap();
        likes.like(7).await.unwrap();
        likes.like(8).await.unwrap();
        assert_eq!(likes.like_count().await.unwrap(), 2);
        assert!(likes.is_liked(7).await.unwrap());

        assert!(likes.unlike(7).await.unwrap());
        assert!(!likes.unlike(7).await.unwrap());
        assert!(!likes.is_liked(7).await.unwrap());

        let remaining = likes.likes().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, 8);
    }

    #[tokio::test]
    async fn test_pivot_overrides() {
        let db = database();
        let product = db.model("Product").unwrap().create(json!({})).await.unwrap();
        let likes = product.likeable(&db).unwrap();
        assert_eq!(likes.table(), "product_upvotes");
        assert_eq!(likes.foreign_key(), "upvoted_id");

        likes.like(1).await.unwrap();
        assert_eq!(likes.like_count().await.unwrap(), 1);
    }
}
