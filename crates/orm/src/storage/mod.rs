//! Storage collaborator boundary
//!
//! The compiler never speaks SQL directly. Model queries are lowered into
//! statements which a `Storage` backend executes, returning plain row maps.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ModelResult;
use crate::transaction::TransactionConfig;

pub mod memory;
pub mod postgres;
pub mod sql;
pub mod statement;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use statement::{
    delete_from, insert_into, select_from, update_table, DeleteStatement, InsertStatement,
    Projection, SelectStatement, UpdateStatement,
};

/// A fetched or to-be-written row
pub type Row = Map<String, Value>;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn select(&self, statement: &SelectStatement) -> ModelResult<Vec<Row>>;

    /// Returns the generated key of every inserted row
    async fn insert(&self, statement: &InsertStatement) -> ModelResult<Vec<i64>>;

    async fn update(&self, statement: &UpdateStatement) -> ModelResult<u64>;

    async fn delete(&self, statement: &DeleteStatement) -> ModelResult<u64>;

    async fn begin(&self, config: &TransactionConfig) -> ModelResult<Arc<dyn StorageTransaction>>;

    fn backend_name(&self) -> &'static str;
}

/// A storage handle whose statements run inside one transaction
#[async_trait]
pub trait StorageTransaction: Storage {
    async fn commit(&self) -> ModelResult<()>;

    async fn rollback(&self) -> ModelResult<()>;

    fn as_storage(&self) -> &dyn Storage;
}

/// The storage a `Database` context currently routes statements to
#[derive(Clone)]
pub enum StorageHandle {
    Pool(Arc<dyn Storage>),
    Transaction(Arc<dyn StorageTransaction>),
}

impl StorageHandle {
    pub fn storage(&self) -> &dyn Storage {
        match self {
            StorageHandle::Pool(storage) => storage.as_ref(),
            StorageHandle::Transaction(tx) => tx.as_storage(),
        }
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, StorageHandle::Transaction(_))
    }
}

impl std::fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageHandle::Pool(storage) => write!(f, "Pool({})", storage.backend_name()),
            StorageHandle::Transaction(tx) => write!(f, "Transaction({})", tx.backend_name()),
        }
    }
}
