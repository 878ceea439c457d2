//! Relationships Module - resolution, lazy traversal and eager loading

pub mod accessor;
pub mod eager;
pub mod metadata;
pub mod resolver;

pub use accessor::RelationAccessor;
pub use metadata::{Cardinality, RelationMechanism, RelationValue, ResolvedRelation};
pub use resolver::RelationResolver;
