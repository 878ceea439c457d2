//! Database context
//!
//! A `Database` bundles the active storage handle, the compiled model
//! registry, configuration and the external collaborators. It is passed
//! explicitly to every operation; there is no process-wide current handle.
//! Cloning is cheap.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{OrmConfig, PoolConfig};
use crate::error::{ModelError, ModelResult};
use crate::events::{EventBus, LifecycleDispatcher};
use crate::model::{CompiledModel, Model, ModelRegistry};
use crate::storage::sql::ColumnTypes;
use crate::storage::{MemoryStorage, PostgresStorage, Storage, StorageHandle};
use crate::traits::{PaymentsProvider, TwoFactorProvider};
use crate::transaction::TransactionConfig;

#[derive(Clone)]
pub struct Database {
    handle: StorageHandle,
    registry: Arc<ModelRegistry>,
    config: Arc<OrmConfig>,
    events: Option<Arc<dyn EventBus>>,
    payments: Option<Arc<dyn PaymentsProvider>>,
    two_factor: Option<Arc<dyn TwoFactorProvider>>,
}

impl Database {
    pub fn new(storage: Arc<dyn Storage>, registry: ModelRegistry) -> Self {
        Self {
            handle: StorageHandle::Pool(storage),
            registry: Arc::new(registry),
            config: Arc::new(OrmConfig::default()),
            events: None,
            payments: None,
            two_factor: None,
        }
    }

    /// In-process storage, mostly for tests and embedded use
    pub fn memory(registry: ModelRegistry) -> Self {
        Self::new(Arc::new(MemoryStorage::new()), registry)
    }

    /// Connects to Postgres using `config.database_url`
    pub async fn connect(
        config: OrmConfig,
        pool: &PoolConfig,
        registry: ModelRegistry,
    ) -> ModelResult<Self> {
        config.validate()?;
        let url = config.database_url.clone().ok_or_else(|| {
            ModelError::Configuration("DATABASE_URL is not set".to_string())
        })?;
        let storage = PostgresStorage::connect(&url, pool)
            .await?
            .with_column_types(ColumnTypes::from_registry(&registry));
        info!("Connected to PostgreSQL");
        Ok(Self::new(Arc::new(storage), registry).with_config(config))
    }

    pub fn with_config(mut self, config: OrmConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn with_payments(mut self, provider: Arc<dyn PaymentsProvider>) -> Self {
        self.payments = Some(provider);
        self
    }

    pub fn with_two_factor(mut self, provider: Arc<dyn TwoFactorProvider>) -> Self {
        self.two_factor = Some(provider);
        self
    }

    /// Query handle for a registered model
    pub fn model(&self, name: &str) -> ModelResult<Model> {
        Ok(Model::new(self.clone(), self.registry.get(name)?))
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    pub fn storage(&self) -> &dyn Storage {
        self.handle.storage()
    }

    pub fn in_transaction(&self) -> bool {
        self.handle.is_transaction()
    }

    pub fn payments(&self) -> ModelResult<&Arc<dyn PaymentsProvider>> {
        self.payments
            .as_ref()
            .ok_or_else(|| ModelError::Configuration("No payments provider configured".to_string()))
    }

    pub fn two_factor(&self) -> ModelResult<&Arc<dyn TwoFactorProvider>> {
        self.two_factor.as_ref().ok_or_else(|| {
            ModelError::Configuration("No two-factor provider configured".to_string())
        })
    }

    pub(crate) fn lifecycle<'a>(&'a self, model: &'a CompiledModel) -> LifecycleDispatcher<'a> {
        let bus = if self.config.dispatch_events {
            self.events.as_ref()
        } else {
            None
        };
        LifecycleDispatcher::new(bus, &model.name, &model.traits.observe)
    }

    /// Runs `work` against a transaction-bound copy of this context.
    /// Commits on `Ok`, rolls back on `Err`. `self` is never rebound, so
    /// the previous handle is back in effect on every path.
    pub async fn transaction<F, Fut, T>(&self, work: F) -> ModelResult<T>
    where
        F: FnOnce(Database) -> Fut,
        Fut: Future<Output = ModelResult<T>>,
    {
        self.transaction_with(TransactionConfig::default(), work)
            .await
    }

    pub async fn transaction_with<F, Fut, T>(
        &self,
        config: TransactionConfig,
        work: F,
    ) -> ModelResult<T>
    where
        F: FnOnce(Database) -> Fut,
        Fut: Future<Output = ModelResult<T>>,
    {
        if self.in_transaction() {
            return Err(ModelError::Transaction(
                "Nested transactions are not supported".to_string(),
            ));
        }

        let tx = self.handle.storage().begin(&config).await?;
        info!("Transaction started on {}", tx.backend_name());

        let mut scoped = self.clone();
        scoped.handle = StorageHandle::Transaction(tx.clone());

        match work(scoped).await {
            Ok(value) => {
                tx.commit().await?;
                info!("Transaction committed");
                Ok(value)
            }
            Err(e) => {
                warn!("Rolling back transaction: {}", e);
                if let Err(rollback_error) = tx.rollback().await {
                    warn!("Rollback failed: {}", rollback_error);
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("handle", &self.handle)
            .field("models", &self.registry.names())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelCompiler;
    use crate::schema::ModelSchema;

    fn database() -> Database {
        let registry = ModelCompiler::new()
            .add(ModelSchema::new("Customer"))
            .unwrap()
            .compile()
            .unwrap();
        Database::memory(registry)
    }

    #[tokio::test]
    async fn test_transaction_binds_scoped_handle() {
        let db = database();
        assert!(!db.in_transaction());

        let inside = db
            .transaction(|tx| async move { Ok(tx.in_transaction()) })
            .await
            .unwrap();
        assert!(inside);
        assert!(!db.in_transaction());
    }

    #[tokio::test]
    async fn test_nested_transactions_are_rejected() {
        let db = database();
        let result = db
            .transaction(|tx| async move {
                tx.transaction(|_inner| async move { Ok(()) }).await
            })
            .await;
        assert!(matches!(result, Err(ModelError::Transaction(_))));
    }

    #[test]
    fn test_missing_collaborators() {
        let db = database();
        assert!(matches!(db.payments(), Err(ModelError::Configuration(_))));
        assert!(matches!(db.two_factor(), Err(ModelError::Configuration(_))));
        assert!(matches!(db.model("Invoice"), Err(ModelError::Definition(_))));
        assert!(db.model("Customer").is_ok());
    }

    #[tokio::test]
    async fn test_connect_requires_url() {
        let registry = ModelRegistry::default();
        let result = Database::connect(OrmConfig::default(), &PoolConfig::default(), registry).await;
        assert!(matches!(result, Err(ModelError::Configuration(_))));
    }
}
