//! Commentable: moderated comments stored in the shared `comments` table

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::Database;
use crate::error::ModelResult;
use crate::model::ModelInstance;
use crate::query::conditions::ConditionBuilder;
use crate::storage::Row;
use crate::traits::association::MorphScope;

pub const COMMENTS_TABLE: &str = "comments";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Pending,
    Approved,
    Rejected,
}

impl CommentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentStatus::Pending => "pending",
            CommentStatus::Approved => "approved",
            CommentStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for CommentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub commentables_id: i64,
    pub commentables_type: String,
    pub title: String,
    pub body: String,
    pub status: CommentStatus,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Input for `add_comment`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewComment {
    pub title: String,
    pub body: String,
}

impl NewComment {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
        }
    }
}

pub struct Commentable<'a> {
    scope: MorphScope<'a>,
}

impl<'a> Commentable<'a> {
    pub(crate) fn new(db: &'a Database, owner: &ModelInstance) -> ModelResult<Self> {
        owner
            .model()
            .require_trait(owner.model().traits.commentable, "commentable")?;
        Ok(Self {
            scope: MorphScope::new(
                db,
                owner,
                COMMENTS_TABLE,
                "commentables_id",
                "commentables_type",
            )?,
        })
    }

    pub async fn comments(&self) -> ModelResult<Vec<Comment>> {
        self.scope.fetch(self.scope.select()).await
    }

    pub async fn comment_count(&self) -> ModelResult<i64> {
        self.scope.count().await
    }

    /// New comments start out `pending`
    pub async fn add_comment(&self, comment: NewComment) -> ModelResult<Comment> {
        let mut values = Row::new();
        values.insert("title".to_string(), Value::String(comment.title));
        values.insert("body".to_string(), Value::String(comment.body));
        values.insert(
            "status".to_string(),
            Value::String(CommentStatus::Pending.to_string()),
        );
        self.scope.insert(values).await
    }

    async fn with_status(&self, status: CommentStatus) -> ModelResult<Vec<Comment>> {
        self.scope
            .fetch(self.scope.select().where_eq("status", status.as_str()))
            .await
    }

    pub async fn approved_comments(&self) -> ModelResult<Vec<Comment>> {
        self.with_status(CommentStatus::Approved).await
    }

    pub async fn pending_comments(&self) -> ModelResult<Vec<Comment>> {
        self.with_status(CommentStatus::Pending).await
    }

    pub async fn rejected_comments(&self) -> ModelResult<Vec<Comment>> {
        self.with_status(CommentStatus::Rejected).await
    }

    /// Moderates one of this owner's comments
    pub async fn set_comment_status(
        &self,
        comment_id: i64,
        status: CommentStatus,
    ) -> ModelResult<bool> {
        let mut values = Row::new();
        values.insert("status".to_string(), Value::String(status.to_string()));
        Ok(self.scope.update(comment_id, values).await? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelCompiler;
    use crate::schema::{AttributeDefinition, ModelSchema, TraitFlags};
    use serde_json::json;

    fn database() -> Database {
        let commentable = TraitFlags {
            commentable: true,
            ..TraitFlags::default()
        };
        let registry = ModelCompiler::new()
            .add(
                ModelSchema::new("Post")
                    .attribute("title", AttributeDefinition::string().fillable())
                    .traits(commentable),
            )
            .unwrap()
            .compile()
            .unwrap();
        Database::memory(registry)
    }

    #[tokio::test]
    async fn test_comment_moderation() {
        let db = database();
        let posts = db.model("Post").unwrap();
        let first = posts.create(json!({ "title": "First" })).await.unwrap();
        let second = posts.create(json!({ "title": "Second" })).await.unwrap();

        let comments = first.commentable(&db).unwrap();
        let great = comments
            .add_comment(NewComment::new("Great", "Loved it"))
            .await
            .unwrap();
        let spam = comments
            .add_comment(NewComment::new("Buy now", "cheap pills"))
            .await
            .unwrap();
        assert_eq!(great.status, CommentStatus::Pending);
        assert_eq!(great.commentables_type, "posts");
        assert_eq!(comments.pending_comments().await.unwrap().len(), 2);

        assert!(comments
            .set_comment_status(great.id, CommentStatus::Approved)
            .await
            .unwrap());
        assert!(comments
            .set_comment_status(spam.id, CommentStatus::Rejected)
            .await
            .unwrap());

        let approved = comments.approved_comments().await.unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].title, "Great");
        assert_eq!(comments.rejected_comments().await.unwrap()[0].id, spam.id);
        assert!(comments.pending_comments().await.unwrap().is_empty());
        assert_eq!(comments.comment_count().await.unwrap(), 2);

        let other = second.commentable(&db).unwrap();
        assert!(!other
            .set_comment_status(great.id, CommentStatus::Pending)
            .await
            .unwrap());
        assert_eq!(other.comment_count().await.unwrap(), 0);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_value(CommentStatus::Approved).unwrap(), json!("approved"));
        assert_eq!(CommentStatus::Rejected.to_string(), "rejected");
    }
}
