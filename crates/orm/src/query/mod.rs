//! Query Builder Module - condition trees and the model query contract

pub mod builder;
pub mod conditions;
pub mod execution;
pub mod pagination;
pub mod types;

pub use builder::{ModelQuery, TrashedScope};
pub use conditions::{
    ConditionBuilder, ConditionKind, ConditionNode, ConditionTree, Correlation, Subquery,
    SubqueryBuilder,
};
pub use pagination::{PageOptions, Paginated, Paging};
pub use types::{
    AggregateFunction, Conjunction, JoinClause, JoinType, OrderClause, OrderDirection,
    QueryOperator,
};
