//! Statement builders handed to a `Storage` backend.

use crate::error::ModelResult;
use crate::query::conditions::{ConditionBuilder, ConditionTree};
use crate::query::types::{
    AggregateFunction, JoinClause, JoinType, OrderClause, OrderDirection,
};
use crate::storage::{Row, Storage};

/// Alias under which aggregate projections are returned
pub const AGGREGATE_ALIAS: &str = "aggregate";

/// Grouped rows expose their row count under this name for `HAVING`
pub const GROUP_COUNT_ALIAS: &str = "count";

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
    /// `column: None` means `COUNT(*)`
    Aggregate {
        function: AggregateFunction,
        column: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub table: String,
    pub projection: Projection,
    pub distinct: bool,
    pub joins: Vec<JoinClause>,
    pub conditions: ConditionTree,
    pub group_by: Vec<String>,
    pub having: ConditionTree,
    pub order_by: Vec<OrderClause>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn select_from(table: &str) -> SelectStatement {
    SelectStatement {
        table: table.to_string(),
        projection: Projection::All,
        distinct: false,
        joins: Vec::new(),
        conditions: ConditionTree::new(),
        group_by: Vec::new(),
        having: ConditionTree::new(),
        order_by: Vec::new(),
        limit: None,
        offset: None,
    }
}

impl SelectStatement {
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.projection = Projection::Columns(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn aggregate(mut self, function: AggregateFunction, column: Option<&str>) -> Self {
        self.projection = Projection::Aggregate {
            function,
            column: column.map(str::to_string),
        };
        self
    }

    pub fn join(mut self, join_type: JoinType, table: &str, first: &str, second: &str) -> Self {
        self.joins.push(JoinClause {
            join_type,
            table: table.to_string(),
            first: first.to_string(),
            second: second.to_string(),
        });
        self
    }

    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order_by
            .push(OrderClause::Column(column.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub async fn execute(&self, storage: &dyn Storage) -> ModelResult<Vec<Row>> {
        storage.select(self).await
    }

    pub async fn execute_take_first(&self, storage: &dyn Storage) -> ModelResult<Option<Row>> {
        let mut statement = self.clone();
        statement.limit = Some(1);
        Ok(storage.select(&statement).await?.into_iter().next())
    }
}

impl ConditionBuilder for SelectStatement {
    fn conditions_mut(&mut self) -> &mut ConditionTree {
        &mut self.conditions
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub rows: Vec<Row>,
    /// Generated key column reported back per inserted row
    pub returning: String,
}

pub fn insert_into(table: &str) -> InsertStatement {
    InsertStatement {
        table: table.to_string(),
        rows: Vec::new(),
        returning: "id".to_string(),
    }
}

impl InsertStatement {
    pub fn values(mut self, row: Row) -> Self {
        self.rows.push(row);
        self
    }

    pub fn returning(mut self, column: &str) -> Self {
        self.returning = column.to_string();
        self
    }

    /// Generated keys, one per inserted row, in insertion order
    pub async fn execute(&self, storage: &dyn Storage) -> ModelResult<Vec<i64>> {
        storage.insert(self).await
    }

    pub async fn execute_take_first(&self, storage: &dyn Storage) -> ModelResult<Option<i64>> {
        Ok(storage.insert(self).await?.into_iter().next())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub values: Row,
    pub conditions: ConditionTree,
}

pub fn update_table(table: &str) -> UpdateStatement {
    UpdateStatement {
        table: table.to_string(),
        values: Row::new(),
        conditions: ConditionTree::new(),
    }
}

impl UpdateStatement {
    pub fn set(mut self, values: Row) -> Self {
        self.values.extend(values);
        self
    }

    /// Affected row count
    pub async fn execute(&self, storage: &dyn Storage) -> ModelResult<u64> {
        storage.update(self).await
    }
}

impl ConditionBuilder for UpdateStatement {
    fn conditions_mut(&mut self) -> &mut ConditionTree {
        &mut self.conditions
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub conditions: ConditionTree,
}

pub fn delete_from(table: &str) -> DeleteStatement {
    DeleteStatement {
        table: table.to_string(),
        conditions: ConditionTree::new(),
    }
}

impl DeleteStatement {
    /// Affected row count
    pub async fn execute(&self, storage: &dyn Storage) -> ModelResult<u64> {
        storage.delete(self).await
    }
}

impl ConditionBuilder for DeleteStatement {
    fn conditions_mut(&mut self) -> &mut ConditionTree {
        &mut self.conditions
    }
}
