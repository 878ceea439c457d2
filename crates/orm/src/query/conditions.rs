//! Condition tree: a structural, executor-agnostic list of predicates.
//!
//! The same tree filters model queries, scopes storage statements and forms
//! the body of correlated `EXISTS` subqueries. Builders consume and return
//! `self`, so a tree handed out earlier is never changed by later appends.

use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::query::types::{Conjunction, QueryOperator};

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionKind {
    Compare {
        column: String,
        operator: QueryOperator,
        value: Value,
    },
    /// Column-to-column comparison, e.g. `orders.customer_id = customers.id`
    ColumnCompare {
        first: String,
        operator: QueryOperator,
        second: String,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    NotIn {
        column: String,
        values: Vec<Value>,
    },
    Null {
        column: String,
    },
    NotNull {
        column: String,
    },
    Between {
        column: String,
        low: Value,
        high: Value,
    },
    /// Parenthesized sub-tree
    Group(ConditionTree),
    Exists {
        subquery: Box<Subquery>,
        negated: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionNode {
    pub conjunction: Conjunction,
    pub kind: ConditionKind,
}

/// Ordered predicate list. Evaluation follows SQL precedence: `AND` binds
/// tighter than `OR`, so each `OR` node starts a new conjunctive segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionTree {
    nodes: Vec<ConditionNode>,
}

impl ConditionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[ConditionNode] {
        &self.nodes
    }

    pub fn push(&mut self, conjunction: Conjunction, kind: ConditionKind) {
        self.nodes.push(ConditionNode { conjunction, kind });
    }

    /// Splits the tree into `OR`-separated segments of `AND`-joined nodes
    pub fn segments(&self) -> Vec<&[ConditionNode]> {
        let mut segments = Vec::new();
        let mut start = 0;
        for (index, node) in self.nodes.iter().enumerate() {
            if index > 0 && node.conjunction == Conjunction::Or {
                segments.push(&self.nodes[start..index]);
                start = index;
            }
        }
        if start < self.nodes.len() {
            segments.push(&self.nodes[start..]);
        }
        segments
    }

    /// Wraps the tree in one group when it holds an `OR`, so a predicate
    /// appended afterwards applies to every branch
    pub fn enclosed(self) -> ConditionTree {
        if !self.nodes.iter().any(|node| node.conjunction == Conjunction::Or) {
            return self;
        }
        let mut grouped = ConditionTree::new();
        grouped.and_group(self);
        grouped
    }

    /// Appends every node of `other` as one parenthesized group
    pub fn and_group(&mut self, other: ConditionTree) {
        if !other.is_empty() {
            self.push(Conjunction::And, ConditionKind::Group(other));
        }
    }
}

/// Correlation between a subquery row and the outer row:
/// `<subquery table>.<inner_column> = <outer_table>.<outer_column>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub inner_column: String,
    pub outer_table: String,
    pub outer_column: String,
}

/// Body of an `EXISTS` condition: an independent tree on another table
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub table: String,
    pub correlation: Correlation,
    pub conditions: ConditionTree,
}

/// Fresh builder handed to `where_has`-style callbacks, scoped to the
/// related table
#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryBuilder {
    table: String,
    conditions: ConditionTree,
}

impl SubqueryBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            conditions: ConditionTree::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn enclosed(mut self) -> Self {
        self.conditions = std::mem::take(&mut self.conditions).enclosed();
        self
    }

    pub fn correlate(self, correlation: Correlation) -> Subquery {
        Subquery {
            table: self.table,
            correlation,
            conditions: self.conditions,
        }
    }
}

/// The where-family shared by every builder that carries a condition tree
pub trait ConditionBuilder: Sized {
    fn conditions_mut(&mut self) -> &mut ConditionTree;

    /// Add WHERE condition with equality
    fn where_eq<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, QueryOperator::Equal, value)
    }

    /// Add WHERE condition with not equal
    fn where_ne<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, QueryOperator::NotEqual, value)
    }

    fn where_gt<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, QueryOperator::GreaterThan, value)
    }

    fn where_gte<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, QueryOperator::GreaterThanOrEqual, value)
    }

    fn where_lt<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, QueryOperator::LessThan, value)
    }

    fn where_lte<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_op(column, QueryOperator::LessThanOrEqual, value)
    }

    fn where_op<T: Into<Value>>(mut self, column: &str, operator: QueryOperator, value: T) -> Self {
        self.conditions_mut().push(
            Conjunction::And,
            ConditionKind::Compare {
                column: column.to_string(),
                operator,
                value: value.into(),
            },
        );
        self
    }

    /// Same as `where_op` with the operator given as text (`">="`, `"like"`)
    fn where_condition<T: Into<Value>>(
        self,
        column: &str,
        operator: &str,
        value: T,
    ) -> ModelResult<Self> {
        let operator = operator.parse::<QueryOperator>()?;
        Ok(self.where_op(column, operator, value))
    }

    /// Single OR-joined comparison
    fn or_where_op<T: Into<Value>>(
        mut self,
        column: &str,
        operator: QueryOperator,
        value: T,
    ) -> Self {
        self.conditions_mut().push(
            Conjunction::Or,
            ConditionKind::Compare {
                column: column.to_string(),
                operator,
                value: value.into(),
            },
        );
        self
    }

    /// `(a = x OR b = y ...)` ANDed onto the tree. An empty list is rejected.
    fn or_where(mut self, conditions: Vec<(&str, Value)>) -> ModelResult<Self> {
        if conditions.is_empty() {
            return Err(ModelError::InvalidQueryCondition(
                "or_where requires at least one condition".to_string(),
            ));
        }

        let mut group = ConditionTree::new();
        for (column, value) in conditions {
            group.push(
                Conjunction::Or,
                ConditionKind::Compare {
                    column: column.to_string(),
                    operator: QueryOperator::Equal,
                    value,
                },
            );
        }
        self.conditions_mut()
            .push(Conjunction::And, ConditionKind::Group(group));
        Ok(self)
    }

    fn where_in<T: Into<Value>>(mut self, column: &str, values: Vec<T>) -> Self {
        self.conditions_mut().push(
            Conjunction::And,
            ConditionKind::In {
                column: column.to_string(),
                values: values.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    fn where_not_in<T: Into<Value>>(mut self, column: &str, values: Vec<T>) -> Self {
        self.conditions_mut().push(
            Conjunction::And,
            ConditionKind::NotIn {
                column: column.to_string(),
                values: values.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    fn where_null(mut self, column: &str) -> Self {
        self.conditions_mut().push(
            Conjunction::And,
            ConditionKind::Null {
                column: column.to_string(),
            },
        );
        self
    }

    fn where_not_null(mut self, column: &str) -> Self {
        self.conditions_mut().push(
            Conjunction::And,
            ConditionKind::NotNull {
                column: column.to_string(),
            },
        );
        self
    }

    /// Exactly two bounds, inclusive. Any other count is rejected here,
    /// before anything reaches storage.
    fn where_between<T: Into<Value>>(mut self, column: &str, values: Vec<T>) -> ModelResult<Self> {
        if values.len() != 2 {
            return Err(ModelError::InvalidQueryCondition(format!(
                "where_between on '{}' expects exactly 2 values, got {}",
                column,
                values.len()
            )));
        }

        let mut bounds = values.into_iter().map(Into::into);
        let low = bounds.next().unwrap_or(Value::Null);
        let high = bounds.next().unwrap_or(Value::Null);
        self.conditions_mut().push(
            Conjunction::And,
            ConditionKind::Between {
                column: column.to_string(),
                low,
                high,
            },
        );
        Ok(self)
    }

    fn where_like(self, column: &str, pattern: &str) -> Self {
        self.where_op(column, QueryOperator::Like, pattern)
    }

    fn where_column(mut self, first: &str, operator: QueryOperator, second: &str) -> Self {
        self.conditions_mut().push(
            Conjunction::And,
            ConditionKind::ColumnCompare {
                first: first.to_string(),
                operator,
                second: second.to_string(),
            },
        );
        self
    }

    /// Correlated `EXISTS (subquery)`
    fn where_exists_subquery(mut self, subquery: Subquery) -> Self {
        self.conditions_mut().push(
            Conjunction::And,
            ConditionKind::Exists {
                subquery: Box::new(subquery),
                negated: false,
            },
        );
        self
    }

    /// Correlated `NOT EXISTS (subquery)`
    fn where_not_exists_subquery(mut self, subquery: Subquery) -> Self {
        self.conditions_mut().push(
            Conjunction::And,
            ConditionKind::Exists {
                subquery: Box::new(subquery),
                negated: true,
            },
        );
        self
    }

    /// Apply `callback` only when `condition` holds
    fn when<F>(self, condition: bool, callback: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        if condition {
            callback(self)
        } else {
            self
        }
    }
}

impl ConditionBuilder for ConditionTree {
    fn conditions_mut(&mut self) -> &mut ConditionTree {
        self
    }
}

impl ConditionBuilder for SubqueryBuilder {
    fn conditions_mut(&mut self) -> &mut ConditionTree {
        &mut self.conditions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nodes_keep_insertion_order() {
        let tree = ConditionTree::new()
            .where_eq("status", "active")
            .where_gt("balance", 10)
            .where_null("deleted_at");

        assert_eq!(tree.len(), 3);
        assert!(matches!(
            &tree.nodes()[0].kind,
            ConditionKind::Compare { column, operator: QueryOperator::Equal, .. } if column == "status"
        ));
        assert!(matches!(&tree.nodes()[2].kind, ConditionKind::Null { .. }));
    }

    #[test]
    fn test_earlier_trees_are_not_mutated() {
        let base = ConditionTree::new().where_eq("is_active", true);
        let extended = base.clone().where_eq("code", "A1");
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
    }

    #[test]
    fn test_where_between_requires_two_values() {
        assert!(ConditionTree::new()
            .where_between("balance", vec![10, 20])
            .is_ok());
        assert!(matches!(
            ConditionTree::new().where_between("balance", vec![10]),
            Err(ModelError::InvalidQueryCondition(_))
        ));
        assert!(matches!(
            ConditionTree::new().where_between("balance", vec![1, 2, 3]),
            Err(ModelError::InvalidQueryCondition(_))
        ));
    }

    #[test]
    fn test_or_where_groups_conditions() {
        let tree = ConditionTree::new()
            .where_eq("is_active", true)
            .or_where(vec![("code", json!("A")), ("code", json!("B"))])
            .unwrap();

        assert_eq!(tree.len(), 2);
        match &tree.nodes()[1].kind {
            ConditionKind::Group(group) => {
                assert_eq!(group.len(), 2);
                assert_eq!(group.segments().len(), 2);
            }
            other => panic!("expected group, got {:?}", other),
        }

        assert!(matches!(
            ConditionTree::new().or_where(vec![]),
            Err(ModelError::InvalidQueryCondition(_))
        ));
    }

    #[test]
    fn test_segments_follow_sql_precedence() {
        let tree = ConditionTree::new()
            .where_eq("a", 1)
            .where_eq("b", 2)
            .or_where_op("c", QueryOperator::Equal, 3)
            .where_eq("d", 4);

        let segments = tree.segments();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].len(), 2);
        assert_eq!(segments[1].len(), 2);
    }

    #[test]
    fn test_enclosed_groups_only_or_trees() {
        let plain = ConditionTree::new().where_eq("a", 1).where_eq("b", 2);
        assert_eq!(plain.clone().enclosed(), plain);

        let branched = ConditionTree::new()
            .where_eq("a", 1)
            .or_where_op("b", QueryOperator::Equal, 2)
            .enclosed()
            .where_null("deleted_at");
        assert_eq!(branched.len(), 2);
        assert_eq!(branched.segments().len(), 1);
        assert!(matches!(&branched.nodes()[0].kind, ConditionKind::Group(group) if group.len() == 2));
    }

    #[test]
    fn test_subquery_builder_is_independent() {
        let sub = SubqueryBuilder::new("orders").where_gt("total", 100);
        let subquery = sub.correlate(Correlation {
            inner_column: "customer_id".to_string(),
            outer_table: "customers".to_string(),
            outer_column: "id".to_string(),
        });
        let tree = ConditionTree::new().where_exists_subquery(subquery.clone());

        match &tree.nodes()[0].kind {
            ConditionKind::Exists { subquery: inner, negated } => {
                assert!(!negated);
                assert_eq!(inner.table, "orders");
                assert_eq!(inner.conditions.len(), 1);
            }
            other => panic!("expected exists, got {:?}", other),
        }
        assert_eq!(subquery.conditions.len(), 1);
    }

    #[test]
    fn test_when_and_where_condition() {
        let tree = ConditionTree::new()
            .when(true, |t| t.where_eq("a", 1))
            .when(false, |t| t.where_eq("b", 2));
        assert_eq!(tree.len(), 1);

        let tree = ConditionTree::new().where_condition("age", ">=", 18).unwrap();
        assert!(matches!(
            &tree.nodes()[0].kind,
            ConditionKind::Compare { operator: QueryOperator::GreaterThanOrEqual, .. }
        ));
        assert!(ConditionTree::new().where_condition("age", "=~", 18).is_err());
    }
}
