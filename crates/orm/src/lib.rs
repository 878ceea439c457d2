//! # forge-orm: declarative model compiler
//!
//! Schema definitions (YAML or built in code) are compiled into models with
//! a typed query builder, relation traversal and eager loading, polymorphic
//! trait modules, lifecycle events and a transaction wrapper.
//!
//! ```ignore
//! let registry = ModelCompiler::new().add_yaml(GIFT_CARD)?.add_yaml(ORDER)?.compile()?;
//! let db = Database::memory(registry);
//! let card = db.model("GiftCard")?.create(json!({ "code": "GC-1" })).await?;
//! let open = db.model("GiftCard")?.query().where_eq("status", "open").get().await?;
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod model;
pub mod naming;
pub mod query;
pub mod relationships;
pub mod schema;
pub mod search;
pub mod storage;
pub mod traits;
pub mod transaction;

pub use config::{ConfigError, OrmConfig, PoolConfig};
pub use database::Database;
pub use error::{ModelError, ModelResult, OrmError, OrmResult, RelationshipError};
pub use events::{DispatchedEvent, EventBus, EventError, LifecycleEvent, MemoryEventBus};
pub use model::{CompiledModel, Model, ModelCompiler, ModelInstance, ModelRegistry};
pub use query::{
    ConditionBuilder, ModelQuery, OrderDirection, PageOptions, Paginated, Paging, QueryOperator,
    TrashedScope,
};
pub use relationships::{Cardinality, RelationMechanism, RelationValue, ResolvedRelation};
pub use schema::{AttributeDefinition, FieldType, ModelSchema, TraitFlags};
pub use storage::{MemoryStorage, PostgresStorage, Row, Storage};
pub use transaction::{IsolationLevel, TransactionConfig};

/// Glob import for application code
pub mod prelude {
    pub use crate::database::Database;
    pub use crate::error::{ModelError, ModelResult};
    pub use crate::model::{Model, ModelCompiler, ModelInstance};
    pub use crate::query::{ConditionBuilder, ModelQuery, OrderDirection, PageOptions, QueryOperator};
    pub use crate::relationships::RelationValue;
}
