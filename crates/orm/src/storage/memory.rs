//! In-process storage engine
//!
//! Evaluates statements directly against row maps held in memory. Used by
//! the test-suite and for embedded use where no database server exists.
//! Transactions read and write a private snapshot. Their writes are
//! journaled and replayed onto the shared state on commit, so statements
//! committed by others in the meantime are kept.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{ModelError, ModelResult};
use crate::query::conditions::{ConditionKind, ConditionTree};
use crate::query::types::{AggregateFunction, JoinType, OrderClause, OrderDirection, QueryOperator};
use crate::storage::statement::{
    DeleteStatement, InsertStatement, Projection, SelectStatement, UpdateStatement,
    AGGREGATE_ALIAS, GROUP_COUNT_ALIAS,
};
use crate::storage::{Row, Storage, StorageTransaction};
use crate::transaction::TransactionConfig;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Row>>,
    sequences: HashMap<String, i64>,
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw table contents, bypassing every model scope
    pub async fn table_rows(&self, table: &str) -> Vec<Row> {
        let state = self.state.read().await;
        state.tables.get(table).cloned().unwrap_or_default()
    }

    pub async fn table_len(&self, table: &str) -> usize {
        let state = self.state.read().await;
        state.tables.get(table).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn select(&self, statement: &SelectStatement) -> ModelResult<Vec<Row>> {
        let state = self.state.read().await;
        run_select(&state, statement)
    }

    async fn insert(&self, statement: &InsertStatement) -> ModelResult<Vec<i64>> {
        let mut state = self.state.write().await;
        run_insert(&mut state, statement)
    }

    async fn update(&self, statement: &UpdateStatement) -> ModelResult<u64> {
        let mut state = self.state.write().await;
        run_update(&mut state, statement)
    }

    async fn delete(&self, statement: &DeleteStatement) -> ModelResult<u64> {
        let mut state = self.state.write().await;
        run_delete(&mut state, statement)
    }

    async fn begin(&self, config: &TransactionConfig) -> ModelResult<Arc<dyn StorageTransaction>> {
        debug!("Beginning memory transaction with config: {:?}", config);
        let snapshot = self.state.read().await.clone();
        Ok(Arc::new(MemoryTransaction {
            parent: Arc::clone(&self.state),
            working: RwLock::new(snapshot),
            journal: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Write made inside a transaction, replayed on commit
#[derive(Debug, Clone)]
enum JournalEntry {
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

pub struct MemoryTransaction {
    parent: Arc<RwLock<MemoryState>>,
    working: RwLock<MemoryState>,
    journal: Mutex<Vec<JournalEntry>>,
    finished: AtomicBool,
}

impl MemoryTransaction {
    fn ensure_active(&self) -> ModelResult<()> {
        if self.finished.load(AtomicOrdering::SeqCst) {
            return Err(ModelError::Transaction(
                "transaction already committed or rolled back".to_string(),
            ));
        }
        Ok(())
    }

    /// Draws generated keys from the shared sequence, like a Postgres
    /// sequence, so rows inserted outside the transaction never reuse them.
    /// Reserved keys are not returned on rollback.
    async fn reserve_keys(&self, statement: &InsertStatement) -> InsertStatement {
        let mut parent = self.parent.write().await;
        let sequence = parent.sequences.entry(statement.table.clone()).or_insert(0);
        let mut keyed = statement.clone();
        for row in &mut keyed.rows {
            match row.get(&statement.returning).and_then(Value::as_i64) {
                Some(explicit) => *sequence = (*sequence).max(explicit),
                None => {
                    *sequence += 1;
                    row.insert(statement.returning.clone(), Value::from(*sequence));
                }
            }
        }
        keyed
    }

    async fn record(&self, entry: JournalEntry) {
        self.journal.lock().await.push(entry);
    }
}

#[async_trait]
impl Storage for MemoryTransaction {
    async fn select(&self, statement: &SelectStatement) -> ModelResult<Vec<Row>> {
        self.ensure_active()?;
        let state = self.working.read().await;
        run_select(&state, statement)
    }

    async fn insert(&self, statement: &InsertStatement) -> ModelResult<Vec<i64>> {
        self.ensure_active()?;
        let keyed = self.reserve_keys(statement).await;
        let ids = run_insert(&mut *self.working.write().await, &keyed)?;
        self.record(JournalEntry::Insert(keyed)).await;
        Ok(ids)
    }

    async fn update(&self, statement: &UpdateStatement) -> ModelResult<u64> {
        self.ensure_active()?;
        let affected = run_update(&mut *self.working.write().await, statement)?;
        self.record(JournalEntry::Update(statement.clone())).await;
        Ok(affected)
    }

    async fn delete(&self, statement: &DeleteStatement) -> ModelResult<u64> {
        self.ensure_active()?;
        let affected = run_delete(&mut *self.working.write().await, statement)?;
        self.record(JournalEntry::Delete(statement.clone())).await;
        Ok(affected)
    }

    async fn begin(&self, _config: &TransactionConfig) -> ModelResult<Arc<dyn StorageTransaction>> {
        Err(ModelError::Transaction(
            "nested transactions are not supported".to_string(),
        ))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl StorageTransaction for MemoryTransaction {
    async fn commit(&self) -> ModelResult<()> {
        self.ensure_active()?;
        self.finished.store(true, AtomicOrdering::SeqCst);
        let journal = std::mem::take(&mut *self.journal.lock().await);

        // Replay onto a copy so a conflicting write leaves the shared state untouched
        let mut parent = self.parent.write().await;
        let mut merged = parent.clone();
        for entry in &journal {
            let replayed = match entry {
                JournalEntry::Insert(statement) => run_insert(&mut merged, statement).map(|_| ()),
                JournalEntry::Update(statement) => run_update(&mut merged, statement).map(|_| ()),
                JournalEntry::Delete(statement) => run_delete(&mut merged, statement).map(|_| ()),
            };
            replayed.map_err(|e| {
                ModelError::Transaction(format!("Failed to commit transaction: {}", e))
            })?;
        }
        *parent = merged;
        debug!("Memory transaction committed ({} writes)", journal.len());
        Ok(())
    }

    async fn rollback(&self) -> ModelResult<()> {
        self.ensure_active()?;
        self.finished.store(true, AtomicOrdering::SeqCst);
        debug!("Memory transaction rolled back");
        Ok(())
    }

    fn as_storage(&self) -> &dyn Storage {
        self
    }
}

/// A row under evaluation: the base row plus every column reachable by
/// qualified (`table.column`) or unqualified name.
#[derive(Debug, Clone)]
struct Scope {
    base: Row,
    columns: Row,
}

impl Scope {
    fn new(table: &str, row: &Row) -> Self {
        let mut columns = Row::new();
        for (key, value) in row {
            columns.insert(format!("{}.{}", table, key), value.clone());
            columns.insert(key.clone(), value.clone());
        }
        Self {
            base: row.clone(),
            columns,
        }
    }

    fn join(&self, table: &str, row: Option<&Row>) -> Self {
        let mut joined = self.clone();
        if let Some(row) = row {
            for (key, value) in row {
                joined
                    .columns
                    .insert(format!("{}.{}", table, key), value.clone());
            }
        }
        joined
    }

    /// Scope for a subquery row: inner columns shadow the outer ones
    fn nested(&self, table: &str, row: &Row) -> Self {
        let mut nested = self.clone();
        nested.base = row.clone();
        for (key, value) in row {
            nested
                .columns
                .insert(format!("{}.{}", table, key), value.clone());
            nested.columns.insert(key.clone(), value.clone());
        }
        nested
    }

    fn lookup(&self, column: &str) -> Value {
        self.columns.get(column).cloned().unwrap_or(Value::Null)
    }
}

fn run_select(state: &MemoryState, statement: &SelectStatement) -> ModelResult<Vec<Row>> {
    debug!("memory select from {}", statement.table);

    let empty = Vec::new();
    let rows = state.tables.get(&statement.table).unwrap_or(&empty);
    let mut scopes: Vec<Scope> = rows
        .iter()
        .map(|row| Scope::new(&statement.table, row))
        .collect();

    for join in &statement.joins {
        let join_rows = state.tables.get(&join.table).unwrap_or(&empty);
        let mut joined = Vec::new();
        for scope in &scopes {
            let mut matched = false;
            for join_row in join_rows {
                let candidate = scope.join(&join.table, Some(join_row));
                if loose_eq(&candidate.lookup(&join.first), &candidate.lookup(&join.second)) {
                    joined.push(candidate);
                    matched = true;
                }
            }
            if !matched && join.join_type == JoinType::Left {
                joined.push(scope.join(&join.table, None));
            }
        }
        scopes = joined;
    }

    scopes.retain(|scope| eval_tree(&statement.conditions, scope, state));

    let grouped = !statement.group_by.is_empty();
    if grouped {
        scopes = group_scopes(scopes, &statement.group_by);
        scopes.retain(|scope| eval_tree(&statement.having, scope, state));
    }

    if let Projection::Aggregate { function, column } = &statement.projection {
        let value = aggregate(&scopes, *function, column.as_deref());
        let mut row = Row::new();
        row.insert(AGGREGATE_ALIAS.to_string(), value);
        return Ok(vec![row]);
    }

    sort_scopes(&mut scopes, &statement.order_by);

    let mut output: Vec<Row> = scopes
        .iter()
        .map(|scope| project(scope, &statement.projection, &statement.group_by))
        .collect();

    if statement.distinct {
        let mut unique: Vec<Row> = Vec::new();
        for row in output {
            if !unique.contains(&row) {
                unique.push(row);
            }
        }
        output = unique;
    }

    let offset = statement.offset.unwrap_or(0);
    let limit = statement.limit.unwrap_or(usize::MAX);
    Ok(output.into_iter().skip(offset).take(limit).collect())
}

fn group_scopes(scopes: Vec<Scope>, group_by: &[String]) -> Vec<Scope> {
    let mut groups: Vec<(Vec<Value>, Scope, i64)> = Vec::new();
    for scope in scopes {
        let key: Vec<Value> = group_by.iter().map(|c| scope.lookup(c)).collect();
        match groups.iter_mut().find(|(existing, _, _)| *existing == key) {
            Some((_, _, count)) => *count += 1,
            None => groups.push((key, scope, 1)),
        }
    }

    groups
        .into_iter()
        .map(|(_, mut scope, count)| {
            scope
                .columns
                .insert(GROUP_COUNT_ALIAS.to_string(), Value::from(count));
            scope
        })
        .collect()
}

fn project(scope: &Scope, projection: &Projection, group_by: &[String]) -> Row {
    match projection {
        Projection::Columns(columns) => {
            let mut row = Row::new();
            for column in columns {
                let (source, alias) = split_alias(column);
                row.insert(alias, scope.lookup(&source));
            }
            row
        }
        _ if !group_by.is_empty() => {
            let mut row = Row::new();
            for column in group_by {
                row.insert(unqualified(column), scope.lookup(column));
            }
            row.insert(
                GROUP_COUNT_ALIAS.to_string(),
                scope.lookup(GROUP_COUNT_ALIAS),
            );
            row
        }
        _ => scope.base.clone(),
    }
}

/// `"orders.total as amount"` -> (`orders.total`, `amount`)
fn split_alias(column: &str) -> (String, String) {
    let lowered = column.to_lowercase();
    if let Some(position) = lowered.find(" as ") {
        let source = column[..position].trim().to_string();
        let alias = column[position + 4..].trim().to_string();
        return (source, alias);
    }
    (column.to_string(), unqualified(column))
}

fn unqualified(column: &str) -> String {
    column.rsplit('.').next().unwrap_or(column).to_string()
}

fn sort_scopes(scopes: &mut [Scope], order_by: &[OrderClause]) {
    if order_by.iter().any(|clause| *clause == OrderClause::Random) {
        scopes.shuffle(&mut rand::thread_rng());
        return;
    }

    scopes.sort_by(|a, b| {
        for clause in order_by {
            if let OrderClause::Column(column, direction) = clause {
                let ordering = order_values(&a.lookup(column), &b.lookup(column));
                let ordering = match direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
        Ordering::Equal
    });
}

/// Total order used for sorting: nulls sort after every value
fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

fn aggregate(scopes: &[Scope], function: AggregateFunction, column: Option<&str>) -> Value {
    let values: Vec<Value> = match column {
        Some(column) => scopes
            .iter()
            .map(|scope| scope.lookup(column))
            .filter(|value| !value.is_null())
            .collect(),
        None => Vec::new(),
    };

    match function {
        AggregateFunction::Count => match column {
            Some(_) => Value::from(values.len() as i64),
            None => Value::from(scopes.len() as i64),
        },
        AggregateFunction::Sum | AggregateFunction::Avg => {
            let numbers: Vec<f64> = values.iter().filter_map(as_number).collect();
            if numbers.is_empty() {
                return Value::Null;
            }
            let sum: f64 = numbers.iter().sum();
            if function == AggregateFunction::Avg {
                return Value::from(sum / numbers.len() as f64);
            }
            if values.iter().all(|v| v.is_i64()) {
                Value::from(sum as i64)
            } else {
                Value::from(sum)
            }
        }
        AggregateFunction::Min | AggregateFunction::Max => {
            let mut best: Option<Value> = None;
            for value in values {
                best = match best {
                    None => Some(value),
                    Some(current) => {
                        let ordering = compare_values(&value, &current).unwrap_or(Ordering::Equal);
                        let better = if function == AggregateFunction::Min {
                            ordering == Ordering::Less
                        } else {
                            ordering == Ordering::Greater
                        };
                        Some(if better { value } else { current })
                    }
                };
            }
            best.unwrap_or(Value::Null)
        }
    }
}

fn run_insert(state: &mut MemoryState, statement: &InsertStatement) -> ModelResult<Vec<i64>> {
    debug!(
        "memory insert into {} ({} rows)",
        statement.table,
        statement.rows.len()
    );

    // Every explicit key is checked before any row lands
    let key_of = |row: &Row| row.get(&statement.returning).and_then(Value::as_i64);
    let mut taken: HashSet<i64> = state
        .tables
        .get(&statement.table)
        .map(|rows| rows.iter().filter_map(key_of).collect())
        .unwrap_or_default();
    for explicit in statement.rows.iter().filter_map(key_of) {
        if !taken.insert(explicit) {
            return Err(ModelError::Database(format!(
                "duplicate key value violates unique constraint: {}.{} = {}",
                statement.table, statement.returning, explicit
            )));
        }
    }

    let mut ids = Vec::with_capacity(statement.rows.len());
    let sequence = state.sequences.entry(statement.table.clone()).or_insert(0);
    let table = state.tables.entry(statement.table.clone()).or_default();

    for row in &statement.rows {
        let mut row = row.clone();
        let id = match key_of(&row) {
            Some(explicit) => {
                *sequence = (*sequence).max(explicit);
                explicit
            }
            None => {
                *sequence += 1;
                *sequence
            }
        };
        row.insert(statement.returning.clone(), Value::from(id));
        table.push(row);
        ids.push(id);
    }

    Ok(ids)
}

fn matching_indices(state: &MemoryState, table: &str, conditions: &ConditionTree) -> Vec<usize> {
    state
        .tables
        .get(table)
        .map(|rows| {
            rows.iter()
                .enumerate()
                .filter(|(_, row)| eval_tree(conditions, &Scope::new(table, row), state))
                .map(|(index, _)| index)
                .collect()
        })
        .unwrap_or_default()
}

fn run_update(state: &mut MemoryState, statement: &UpdateStatement) -> ModelResult<u64> {
    debug!("memory update {}", statement.table);

    let indices = matching_indices(state, &statement.table, &statement.conditions);
    if let Some(rows) = state.tables.get_mut(&statement.table) {
        for index in &indices {
            for (key, value) in &statement.values {
                rows[*index].insert(key.clone(), value.clone());
            }
        }
    }
    Ok(indices.len() as u64)
}

fn run_delete(state: &mut MemoryState, statement: &DeleteStatement) -> ModelResult<u64> {
    debug!("memory delete from {}", statement.table);

    let indices = matching_indices(state, &statement.table, &statement.conditions);
    if let Some(rows) = state.tables.get_mut(&statement.table) {
        let mut index = 0;
        rows.retain(|_| {
            let keep = !indices.contains(&index);
            index += 1;
            keep
        });
    }
    Ok(indices.len() as u64)
}

fn eval_tree(tree: &ConditionTree, scope: &Scope, state: &MemoryState) -> bool {
    if tree.is_empty() {
        return true;
    }
    tree.segments()
        .iter()
        .any(|segment| segment.iter().all(|node| eval_kind(&node.kind, scope, state)))
}

fn eval_kind(kind: &ConditionKind, scope: &Scope, state: &MemoryState) -> bool {
    match kind {
        ConditionKind::Compare {
            column,
            operator,
            value,
        } => compare_op(&scope.lookup(column), *operator, value),
        ConditionKind::ColumnCompare {
            first,
            operator,
            second,
        } => compare_op(&scope.lookup(first), *operator, &scope.lookup(second)),
        ConditionKind::In { column, values } => {
            let current = scope.lookup(column);
            !current.is_null() && values.iter().any(|v| loose_eq(&current, v))
        }
        ConditionKind::NotIn { column, values } => {
            let current = scope.lookup(column);
            !current.is_null() && !values.iter().any(|v| loose_eq(&current, v))
        }
        ConditionKind::Null { column } => scope.lookup(column).is_null(),
        ConditionKind::NotNull { column } => !scope.lookup(column).is_null(),
        ConditionKind::Between { column, low, high } => {
            let current = scope.lookup(column);
            compare_op(&current, QueryOperator::GreaterThanOrEqual, low)
                && compare_op(&current, QueryOperator::LessThanOrEqual, high)
        }
        ConditionKind::Group(tree) => eval_tree(tree, scope, state),
        ConditionKind::Exists { subquery, negated } => {
            let outer = scope.lookup(&format!(
                "{}.{}",
                subquery.correlation.outer_table, subquery.correlation.outer_column
            ));
            let found = state
                .tables
                .get(&subquery.table)
                .map(|rows| {
                    rows.iter().any(|row| {
                        let inner = scope.nested(&subquery.table, row);
                        loose_eq(&inner.lookup(&subquery.correlation.inner_column), &outer)
                            && eval_tree(&subquery.conditions, &inner, state)
                    })
                })
                .unwrap_or(false);
            found != *negated
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// SQL-style comparison; `None` when either side is null or the types
/// cannot be compared
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            as_number(a)?.partial_cmp(&as_number(b)?)
        }
        (x, y) if x == y => Some(Ordering::Equal),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Some(Ordering::Equal)
}

fn compare_op(current: &Value, operator: QueryOperator, expected: &Value) -> bool {
    match operator {
        QueryOperator::Like | QueryOperator::NotLike => {
            let (Some(text), Some(pattern)) = (as_text(current), as_text(expected)) else {
                return false;
            };
            let matched = like_match(&text, &pattern);
            if operator == QueryOperator::Like {
                matched
            } else {
                !matched
            }
        }
        _ => match compare_values(current, expected) {
            Some(ordering) => match operator {
                QueryOperator::Equal => ordering == Ordering::Equal,
                QueryOperator::NotEqual => ordering != Ordering::Equal,
                QueryOperator::GreaterThan => ordering == Ordering::Greater,
                QueryOperator::GreaterThanOrEqual => ordering != Ordering::Less,
                QueryOperator::LessThan => ordering == Ordering::Less,
                QueryOperator::LessThanOrEqual => ordering != Ordering::Greater,
                QueryOperator::Like | QueryOperator::NotLike => false,
            },
            None => false,
        },
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `LIKE` matching with `%` (any run) and `_` (one character)
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let mut matches = vec![vec![false; pattern.len() + 1]; text.len() + 1];
    matches[0][0] = true;

    for j in 1..=pattern.len() {
        if pattern[j - 1] == '%' {
            matches[0][j] = matches[0][j - 1];
        }
    }

    for i in 1..=text.len() {
        for j in 1..=pattern.len() {
            matches[i][j] = match pattern[j - 1] {
                '%' => matches[i][j - 1] || matches[i - 1][j],
                '_' => matches[i - 1][j - 1],
                ch => matches[i - 1][j - 1] && ch == text[i - 1],
            };
        }
    }

    matches[text.len()][pattern.len()]
}
