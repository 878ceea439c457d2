//! Declarative model definitions and the passes that turn them into a
//! concrete column set.

pub mod augment;
pub mod definition;
pub mod traits;
pub mod validation;

pub use augment::{AttributeAugmenter, Column, ColumnSource};
pub use definition::{
    AttributeDefinition, FieldType, ModelSchema, RelationDeclaration, RelationDeclarations,
    RelationOptions, ValidationRule,
};
pub use traits::{
    AuthConfig, AuthOptions, LikeableConfig, LikeableOptions, ObserveConfig, SearchConfig,
    SearchOptions, TraitFlags,
};
pub use validation::{AttributeValidator, ValidationMode};
