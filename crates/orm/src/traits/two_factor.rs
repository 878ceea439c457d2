//! Two-factor authentication: the auth provider generates and checks
//! secrets, the owning row keeps only the opaque `two_factor_secret`.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::ModelInstance;

const SECRET_COLUMN: &str = "two_factor_secret";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("Two-factor authentication is not enabled for {model} {id}")]
    NotEnabled { model: String, id: i64 },
    #[error("Auth provider error: {message}")]
    Provider { message: String },
}

impl AuthError {
    pub fn provider(message: &str) -> Self {
        Self::Provider {
            message: message.to_string(),
        }
    }
}

impl From<AuthError> for ModelError {
    fn from(err: AuthError) -> Self {
        ModelError::Auth(err.to_string())
    }
}

/// Auth collaborator
#[async_trait]
pub trait TwoFactorProvider: Send + Sync {
    async fn generate_secret(&self) -> Result<String, AuthError>;

    async fn verify(&self, secret: &str, code: &str) -> Result<bool, AuthError>;
}

pub struct TwoFactor<'a> {
    db: &'a Database,
    owner: &'a mut ModelInstance,
}

impl<'a> TwoFactor<'a> {
    pub(crate) fn new(db: &'a Database, owner: &'a mut ModelInstance) -> ModelResult<Self> {
        owner
            .model()
            .require_trait(owner.model().traits.use_auth.uses_two_factor(), "two-factor")?;
        Ok(Self { db, owner })
    }

    fn secret(&self) -> Option<&str> {
        self.owner
            .get(SECRET_COLUMN)
            .and_then(Value::as_str)
            .filter(|secret| !secret.is_empty())
    }

    pub fn has_two_factor(&self) -> bool {
        self.secret().is_some()
    }

    async fn store_secret(&mut self, secret: Value) -> ModelResult<()> {
        let mut values = serde_json::Map::new();
        values.insert(SECRET_COLUMN.to_string(), secret);
        self.owner.force_update(self.db, Value::Object(values)).await
    }

    /// Generates a fresh secret, replacing any previous one, and returns it
    pub async fn enable_two_factor(&mut self) -> ModelResult<String> {
        let secret = self.db.two_factor()?.generate_secret().await?;
        self.store_secret(Value::String(secret.clone())).await?;
        info!(
            "Enabled two-factor authentication for {} {}",
            self.owner.model_name(),
            self.owner.require_id()?
        );
        Ok(secret)
    }

    pub async fn verify_two_factor(&self, code: &str) -> ModelResult<bool> {
        let secret = self.secret().ok_or_else(|| AuthError::NotEnabled {
            model: self.owner.model_name().to_string(),
            id: self.owner.id().unwrap_or_default(),
        })?;
        Ok(self.db.two_factor()?.verify(secret, code).await?)
    }

    pub async fn disable_two_factor(&mut self) -> ModelResult<()> {
        self.store_secret(Value::Null).await
    }
}
