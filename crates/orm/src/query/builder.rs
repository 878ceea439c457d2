//! Model query builder - the chainable query contract every compiled
//! model exposes.
//!
//! Builder methods consume and return `self`. Terminal methods live in
//! `execution.rs`, paging in `pagination.rs`.

use std::sync::Arc;

use serde_json::Value;

use crate::database::Database;
use crate::error::{ModelError, ModelResult};
use crate::model::CompiledModel;
use crate::query::conditions::{
    ConditionBuilder, ConditionKind, ConditionTree, Correlation, Subquery, SubqueryBuilder,
};
use crate::query::types::{Conjunction, JoinClause, JoinType, OrderClause, OrderDirection, QueryOperator};
use crate::relationships::{RelationMechanism, ResolvedRelation};
use crate::storage::{select_from, Projection, SelectStatement};

/// Which rows the soft-delete scope lets through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrashedScope {
    Exclude,
    Include,
    Only,
}

/// Query builder bound to one compiled model
#[derive(Clone)]
pub struct ModelQuery {
    pub(crate) db: Database,
    pub(crate) model: Arc<CompiledModel>,
    pub(crate) conditions: ConditionTree,
    pub(crate) columns: Option<Vec<String>>,
    pub(crate) distinct: bool,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) group_by: Vec<String>,
    pub(crate) having: ConditionTree,
    pub(crate) order_by: Vec<OrderClause>,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: Option<usize>,
    pub(crate) with: Vec<String>,
    pub(crate) trashed: TrashedScope,
}

impl ModelQuery {
    pub fn new(db: Database, model: Arc<CompiledModel>) -> Self {
        Self {
            db,
            model,
            conditions: ConditionTree::new(),
            columns: None,
            distinct: false,
            joins: Vec::new(),
            group_by: Vec::new(),
            having: ConditionTree::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            with: Vec::new(),
            trashed: TrashedScope::Exclude,
        }
    }

    pub fn model(&self) -> &Arc<CompiledModel> {
        &self.model
    }

    pub fn conditions(&self) -> &ConditionTree {
        &self.conditions
    }

    /// Equality filter on a declared column; backs every generated
    /// `where_<field>` method
    pub fn where_attribute<T: Into<Value>>(self, field: &str, value: T) -> ModelResult<Self> {
        if !self.model.has_column(field) {
            return Err(ModelError::InvalidQueryCondition(format!(
                "{} has no attribute '{}'",
                self.model.name, field
            )));
        }
        Ok(self.where_eq(field, value))
    }

    /// Correlated `EXISTS` on `table`, joined by `<table>.<entity>_id = <own table>.<pk>`
    pub fn where_exists<F>(self, table: &str, callback: F) -> Self
    where
        F: FnOnce(SubqueryBuilder) -> SubqueryBuilder,
    {
        let correlation = Correlation {
            inner_column: self.model.foreign_key_name(),
            outer_table: self.model.table.clone(),
            outer_column: self.model.primary_key.clone(),
        };
        let subquery = callback(SubqueryBuilder::new(table)).correlate(correlation);
        self.where_exists_subquery(subquery)
    }

    /// Rows with at least one related row
    pub fn has(self, relation: &str) -> ModelResult<Self> {
        self.where_has(relation, |query| query)
    }

    /// Rows without any related row
    pub fn doesnt_have(self, relation: &str) -> ModelResult<Self> {
        self.where_doesnt_have(relation, |query| query)
    }

    /// Rows with at least one related row matching `callback`'s conditions.
    /// The callback's builder is scoped to the related table.
    pub fn where_has<F>(self, relation: &str, callback: F) -> ModelResult<Self>
    where
        F: FnOnce(SubqueryBuilder) -> SubqueryBuilder,
    {
        let subquery = self.relation_subquery(relation, callback)?;
        Ok(self.where_exists_subquery(subquery))
    }

    pub fn where_doesnt_have<F>(self, relation: &str, callback: F) -> ModelResult<Self>
    where
        F: FnOnce(SubqueryBuilder) -> SubqueryBuilder,
    {
        let subquery = self.relation_subquery(relation, callback)?;
        Ok(self.where_not_exists_subquery(subquery))
    }

    fn relation_subquery<F>(&self, name: &str, callback: F) -> ModelResult<Subquery>
    where
        F: FnOnce(SubqueryBuilder) -> SubqueryBuilder,
    {
        let relation = self.model.relation(name)?.clone();
        let target = self.db.registry().get(&relation.target_entity)?;

        let mut builder = callback(SubqueryBuilder::new(&relation.target_table));
        if target.soft_deletes() {
            builder = builder
                .enclosed()
                .where_null(&format!("{}.deleted_at", relation.target_table));
        }

        let owner_table = self.model.table.clone();
        let subquery = match relation.mechanism {
            RelationMechanism::BelongsTo => builder.correlate(Correlation {
                inner_column: relation.foreign_key.clone(),
                outer_table: owner_table,
                outer_column: relation.local_key.clone(),
            }),
            RelationMechanism::HasMany | RelationMechanism::HasOne => {
                builder.correlate(Correlation {
                    inner_column: relation.foreign_key.clone(),
                    outer_table: owner_table,
                    outer_column: relation.local_key.clone(),
                })
            }
            RelationMechanism::BelongsToMany => {
                let (pivot, pivot_foreign_key, pivot_related_key) = pivot_columns(&relation)?;
                let related = builder.correlate(Correlation {
                    inner_column: relation.foreign_key.clone(),
                    outer_table: pivot.clone(),
                    outer_column: pivot_related_key,
                });
                SubqueryBuilder::new(&pivot)
                    .where_exists_subquery(related)
                    .correlate(Correlation {
                        inner_column: pivot_foreign_key,
                        outer_table: owner_table,
                        outer_column: relation.local_key.clone(),
                    })
            }
            RelationMechanism::ThroughMany => {
                let (through_table, through_key, through_foreign_key) = through_columns(&relation)?;
                let related = builder.correlate(Correlation {
                    inner_column: relation.foreign_key.clone(),
                    outer_table: through_table.clone(),
                    outer_column: through_key,
                });
                SubqueryBuilder::new(&through_table)
                    .where_exists_subquery(related)
                    .correlate(Correlation {
                        inner_column: through_foreign_key,
                        outer_table: owner_table,
                        outer_column: relation.local_key.clone(),
                    })
            }
        };
        Ok(subquery)
    }

    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn join(self, table: &str, first: &str, operator: &str, second: &str) -> ModelResult<Self> {
        self.add_join(JoinType::Inner, table, first, operator, second)
    }

    pub fn left_join(
        self,
        table: &str,
        first: &str,
        operator: &str,
        second: &str,
    ) -> ModelResult<Self> {
        self.add_join(JoinType::Left, table, first, operator, second)
    }

    fn add_join(
        mut self,
        join_type: JoinType,
        table: &str,
        first: &str,
        operator: &str,
        second: &str,
    ) -> ModelResult<Self> {
        if operator.parse::<QueryOperator>()? != QueryOperator::Equal {
            return Err(ModelError::InvalidQueryCondition(format!(
                "joins only support '=', got '{}'",
                operator
            )));
        }
        self.joins.push(JoinClause {
            join_type,
            table: table.to_string(),
            first: first.to_string(),
            second: second.to_string(),
        });
        Ok(self)
    }

    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order_by
            .push(OrderClause::Column(column.to_string(), direction));
        self
    }

    pub fn order_by_asc(self, column: &str) -> Self {
        self.order_by(column, OrderDirection::Asc)
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, OrderDirection::Desc)
    }

    pub fn in_random_order(mut self) -> Self {
        self.order_by.push(OrderClause::Random);
        self
    }

    pub fn group_by(mut self, columns: &[&str]) -> Self {
        self.group_by
            .extend(columns.iter().map(|c| c.to_string()));
        self
    }

    /// Filter on grouped rows. `column` is a grouped column or `count`.
    pub fn having<T: Into<Value>>(
        mut self,
        column: &str,
        operator: &str,
        value: T,
    ) -> ModelResult<Self> {
        let operator = operator.parse::<QueryOperator>()?;
        self.having.push(
            Conjunction::And,
            ConditionKind::Compare {
                column: column.to_string(),
                operator,
                value: value.into(),
            },
        );
        Ok(self)
    }

    /// Eager-load the named relations on the next fetch
    pub fn with(mut self, relations: &[&str]) -> ModelResult<Self> {
        for relation in relations {
            self.model.relation(relation)?;
            if !self.with.iter().any(|r| r == relation) {
                self.with.push(relation.to_string());
            }
        }
        Ok(self)
    }

    pub fn with_trashed(mut self) -> Self {
        self.trashed = TrashedScope::Include;
        self
    }

    pub fn only_trashed(mut self) -> Self {
        self.trashed = TrashedScope::Only;
        self
    }

    /// Accumulated conditions plus the soft-delete scope
    pub(crate) fn scoped_conditions(&self) -> ConditionTree {
        if !self.model.soft_deletes() || self.trashed == TrashedScope::Include {
            return self.conditions.clone();
        }

        let scoped = self.conditions.clone().enclosed();
        let column = format!("{}.deleted_at", self.model.table);
        match self.trashed {
            TrashedScope::Only => scoped.where_not_null(&column),
            _ => scoped.where_null(&column),
        }
    }

    /// Lowers the builder into a storage statement
    pub(crate) fn statement(&self) -> SelectStatement {
        let mut statement = select_from(&self.model.table);
        if let Some(columns) = &self.columns {
            statement.projection = Projection::Columns(columns.clone());
        }
        statement.distinct = self.distinct;
        statement.joins = self.joins.clone();
        statement.conditions = self.scoped_conditions();
        statement.group_by = self.group_by.clone();
        statement.having = self.having.clone();
        statement.order_by = self.order_by.clone();
        statement.limit = self.limit;
        statement.offset = self.offset;
        statement
    }
}

impl ConditionBuilder for ModelQuery {
    fn conditions_mut(&mut self) -> &mut ConditionTree {
        &mut self.conditions
    }
}

impl std::fmt::Debug for ModelQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelQuery")
            .field("model", &self.model.name)
            .field("statement", &self.statement())
            .field("with", &self.with)
            .finish()
    }
}

pub(crate) fn pivot_columns(relation: &ResolvedRelation) -> ModelResult<(String, String, String)> {
    match (
        &relation.pivot_table,
        &relation.pivot_foreign_key,
        &relation.pivot_related_key,
    ) {
        (Some(table), Some(foreign_key), Some(related_key)) => {
            Ok((table.clone(), foreign_key.clone(), related_key.clone()))
        }
        _ => Err(ModelError::Definition(format!(
            "relation '{}' has no pivot table",
            relation.name
        ))),
    }
}

pub(crate) fn through_columns(relation: &ResolvedRelation) -> ModelResult<(String, String, String)> {
    match (
        &relation.through_table,
        &relation.through_primary_key,
        &relation.through_foreign_key,
    ) {
        (Some(table), Some(key), Some(foreign_key)) => {
            Ok((table.clone(), key.clone(), foreign_key.clone()))
        }
        _ => Err(ModelError::Definition(format!(
            "relation '{}' has no intermediate model",
            relation.name
        ))),
    }
}
