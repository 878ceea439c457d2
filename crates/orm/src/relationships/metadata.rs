//! Relationship Metadata System - resolved relation definitions

use serde::{Deserialize, Serialize};

use crate::model::ModelInstance;

/// Resolution algorithm chosen for a declared relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationMechanism {
    /// Foreign key on the owning row -> one related row (mandatory)
    BelongsTo,
    /// Related rows carry the owner's key; bounded by the page size
    HasMany,
    /// First related row carrying the owner's key
    HasOne,
    /// Many-to-many through a pivot table
    BelongsToMany,
    /// One intermediate row, then the final relation through it
    ThroughMany,
}

impl RelationMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationMechanism::BelongsTo => "belongsTo",
            RelationMechanism::HasMany => "hasMany",
            RelationMechanism::HasOne => "hasOne",
            RelationMechanism::BelongsToMany => "belongsToMany",
            RelationMechanism::ThroughMany => "throughMany",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

/// Everything an accessor needs to traverse one declared relation.
///
/// Key meaning depends on the mechanism:
/// - belongsTo: `local_key` is the foreign key column on the owner,
///   `foreign_key` the primary key of the target.
/// - hasMany / hasOne: `local_key` is the owner's primary key,
///   `foreign_key` the column on the target pointing back at it.
/// - belongsToMany: `local_key` is the owner's primary key,
///   `foreign_key` the target's primary key; the pivot columns link them.
/// - throughMany: `local_key` is the owner's primary key,
///   `through_foreign_key` the column on the intermediate table pointing
///   at the owner, `foreign_key` the column on the target pointing at the
///   intermediate row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRelation {
    /// Accessor name
    pub name: String,

    /// Related model name
    pub target_entity: String,

    /// Related model's table
    pub target_table: String,

    pub cardinality: Cardinality,

    pub mechanism: RelationMechanism,

    pub local_key: String,

    pub foreign_key: String,

    pub pivot_table: Option<String>,

    /// Pivot column holding the owner's key
    pub pivot_foreign_key: Option<String>,

    /// Pivot column holding the related row's key
    pub pivot_related_key: Option<String>,

    pub through_entity: Option<String>,

    pub through_table: Option<String>,

    /// Primary key of the intermediate table
    pub through_primary_key: Option<String>,

    pub through_foreign_key: Option<String>,

    /// Row cap for hasMany fetches
    pub page_size: Option<usize>,
}

impl ResolvedRelation {
    pub fn is_collection(&self) -> bool {
        self.cardinality == Cardinality::Many
    }

    /// Name of the generated accessor method
    pub fn accessor_name(&self) -> String {
        match self.mechanism {
            RelationMechanism::BelongsTo => format!("{}_belong", self.name),
            _ => self.name.clone(),
        }
    }
}

/// Result of traversing a relation
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    One(Box<ModelInstance>),
    Many(Vec<ModelInstance>),
}

impl RelationValue {
    pub fn one(self) -> Option<ModelInstance> {
        match self {
            RelationValue::One(instance) => Some(*instance),
            RelationValue::Many(_) => None,
        }
    }

    pub fn many(self) -> Vec<ModelInstance> {
        match self {
            RelationValue::One(instance) => vec![*instance],
            RelationValue::Many(instances) => instances,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RelationValue::One(instance) => instance.to_json(),
            RelationValue::Many(instances) => {
                serde_json::Value::Array(instances.iter().map(ModelInstance::to_json).collect())
            }
        }
    }
}
