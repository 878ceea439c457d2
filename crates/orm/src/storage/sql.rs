//! SQL generation for the Postgres storage adapter
//!
//! Statements are rendered with `$n` placeholders; parameter values are
//! carried alongside as `SqlValue`s so the adapter can bind them. Strings
//! bind as text, and the placeholder is cast (`$1::uuid`) when the column
//! it targets is declared with a non-text type.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::model::ModelRegistry;
use crate::query::conditions::{ConditionKind, ConditionTree};
use crate::query::types::{AggregateFunction, OrderClause};
use crate::schema::FieldType;
use crate::storage::statement::{
    DeleteStatement, InsertStatement, Projection, SelectStatement, UpdateStatement,
    AGGREGATE_ALIAS, GROUP_COUNT_ALIAS,
};

/// Parameter derived from a JSON value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(Value),
}

impl SqlValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => n.as_f64().map(SqlValue::Float).unwrap_or(SqlValue::Null),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => SqlValue::Json(value.clone()),
        }
    }
}

/// Stamp columns of tables outside the registry, such as the trait
/// association tables
const STAMP_COLUMNS: [&str; 3] = ["created_at", "updated_at", "deleted_at"];

/// Declared column types per table
#[derive(Debug, Clone, Default)]
pub struct ColumnTypes {
    tables: HashMap<String, HashMap<String, FieldType>>,
}

impl ColumnTypes {
    pub fn from_registry(registry: &ModelRegistry) -> Self {
        let mut types = Self::default();
        for model in registry.iter() {
            for column in &model.columns {
                types.insert(&model.table, &column.name, column.field_type);
            }
        }
        types
    }

    pub fn insert(&mut self, table: &str, column: &str, field_type: FieldType) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string(), field_type);
    }

    /// Type of `column` (plain or `table.column`) as seen from `table`
    pub fn field_type(&self, table: &str, column: &str) -> Option<FieldType> {
        let (table, column) = column.rsplit_once('.').unwrap_or((table, column));
        match self.tables.get(table) {
            Some(columns) => columns.get(column).copied(),
            None => STAMP_COLUMNS
                .contains(&column)
                .then_some(FieldType::Timestamp),
        }
    }
}

fn postgres_type(field_type: FieldType) -> Option<&'static str> {
    match field_type {
        FieldType::String | FieldType::Text | FieldType::Enum => None,
        FieldType::Integer => Some("bigint"),
        FieldType::Float => Some("double precision"),
        FieldType::Decimal => Some("numeric"),
        FieldType::Boolean => Some("boolean"),
        FieldType::Date => Some("date"),
        FieldType::Timestamp => Some("timestamptz"),
        FieldType::Json => Some("jsonb"),
        FieldType::Uuid => Some("uuid"),
    }
}

/// Cast for a text or null parameter bound against a column of `field_type`
fn placeholder_cast(field_type: FieldType, value: &Value) -> Option<&'static str> {
    match (value, field_type) {
        (Value::Null, _) => postgres_type(field_type),
        (
            Value::String(_),
            FieldType::Uuid | FieldType::Timestamp | FieldType::Date | FieldType::Decimal,
        ) => postgres_type(field_type),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedSql {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

struct SqlWriter<'a> {
    sql: String,
    params: Vec<SqlValue>,
    types: &'a ColumnTypes,
}

impl<'a> SqlWriter<'a> {
    fn new(types: &'a ColumnTypes) -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
            types,
        }
    }

    fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    /// Binds `value` as the next parameter, compared with or assigned to
    /// `column` of `table`
    fn bind(&mut self, table: &str, column: &str, value: &Value) {
        self.params.push(SqlValue::from_json(value));
        let cast = self
            .types
            .field_type(table, column)
            .and_then(|field_type| placeholder_cast(field_type, value));
        match cast {
            Some(cast) => self.sql.push_str(&format!("${}::{}", self.params.len(), cast)),
            None => self.sql.push_str(&format!("${}", self.params.len())),
        }
    }

    fn finish(self) -> RenderedSql {
        RenderedSql {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Accepts `column`, `table.column`, `table.*` and `expr as alias` forms
/// built from plain identifiers.
pub fn validate_identifier(identifier: &str) -> ModelResult<&str> {
    if !identifier.is_ascii() {
        return Err(ModelError::InvalidQueryCondition(format!(
            "invalid identifier '{}'",
            identifier
        )));
    }

    let lowered = identifier.to_lowercase();
    let parts: Vec<&str> = match lowered.find(" as ") {
        Some(position) => vec![&identifier[..position], &identifier[position + 4..]],
        None => vec![identifier],
    };

    let valid = parts.iter().all(|part| {
        let part = part.trim();
        !part.is_empty()
            && part.split('.').all(|segment| {
                segment == "*"
                    || (!segment.is_empty()
                        && segment
                            .chars()
                            .all(|c| c.is_ascii_alphanumeric() || c == '_')
                        && !segment.starts_with(|c: char| c.is_ascii_digit()))
            })
    });

    if valid {
        Ok(identifier)
    } else {
        Err(ModelError::InvalidQueryCondition(format!(
            "invalid identifier '{}'",
            identifier
        )))
    }
}

/// Words that must be double-quoted when used as a column or table name
const RESERVED_WORDS: [&str; 16] = [
    "all", "asc", "check", "column", "default", "desc", "end", "from", "group", "limit",
    "offset", "order", "select", "table", "user", "where",
];

/// Validated identifier with reserved-word segments double-quoted
pub fn quote_identifier(identifier: &str) -> ModelResult<String> {
    validate_identifier(identifier)?;

    let lowered = identifier.to_lowercase();
    let (source, alias) = match lowered.find(" as ") {
        Some(position) => (&identifier[..position], Some(identifier[position + 4..].trim())),
        None => (identifier, None),
    };
    let quoted = source
        .trim()
        .split('.')
        .map(quote_segment)
        .collect::<Vec<_>>()
        .join(".");

    Ok(match alias {
        Some(alias) => format!("{} AS {}", quoted, quote_segment(alias)),
        None => quoted,
    })
}

fn quote_segment(segment: &str) -> String {
    if RESERVED_WORDS.contains(&segment.to_lowercase().as_str()) {
        format!("\"{}\"", segment)
    } else {
        segment.to_string()
    }
}

pub fn render_select(statement: &SelectStatement, types: &ColumnTypes) -> ModelResult<RenderedSql> {
    let mut writer = SqlWriter::new(types);
    let table = quote_identifier(&statement.table)?;

    writer.push(if statement.distinct {
        "SELECT DISTINCT "
    } else {
        "SELECT "
    });

    match &statement.projection {
        Projection::All if statement.group_by.is_empty() => {
            writer.push(&format!("{}.*", table));
        }
        Projection::All => {
            let mut columns = Vec::new();
            for column in &statement.group_by {
                columns.push(quote_identifier(column)?.to_string());
            }
            columns.push(format!("COUNT(*) AS {}", GROUP_COUNT_ALIAS));
            writer.push(&columns.join(", "));
        }
        Projection::Columns(columns) => {
            let mut rendered = Vec::new();
            for column in columns {
                rendered.push(quote_identifier(column)?.to_string());
            }
            writer.push(&rendered.join(", "));
        }
        Projection::Aggregate { function, column } => {
            let target = match (function, column) {
                (AggregateFunction::Count, None) => "*".to_string(),
                (_, Some(column)) => quote_identifier(column)?.to_string(),
                (_, None) => {
                    return Err(ModelError::InvalidQueryCondition(format!(
                        "{} requires a column",
                        function
                    )))
                }
            };
            writer.push(&format!("{}({}) AS {}", function, target, AGGREGATE_ALIAS));
        }
    }

    writer.push(&format!(" FROM {}", table));

    for join in &statement.joins {
        writer.push(&format!(
            " {} {} ON {} = {}",
            join.join_type,
            quote_identifier(&join.table)?,
            quote_identifier(&join.first)?,
            quote_identifier(&join.second)?
        ));
    }

    if !statement.conditions.is_empty() {
        writer.push(" WHERE ");
        write_tree(&mut writer, &statement.conditions, &statement.table, false)?;
    }

    if !statement.group_by.is_empty() {
        let mut columns = Vec::new();
        for column in &statement.group_by {
            columns.push(quote_identifier(column)?);
        }
        writer.push(&format!(" GROUP BY {}", columns.join(", ")));

        if !statement.having.is_empty() {
            writer.push(" HAVING ");
            write_tree(&mut writer, &statement.having, &statement.table, true)?;
        }
    }

    if !statement.order_by.is_empty() {
        let mut clauses = Vec::new();
        for clause in &statement.order_by {
            clauses.push(match clause {
                OrderClause::Column(column, direction) => {
                    format!("{} {}", quote_identifier(column)?, direction)
                }
                OrderClause::Random => "RANDOM()".to_string(),
            });
        }
        writer.push(&format!(" ORDER BY {}", clauses.join(", ")));
    }

    if let Some(limit) = statement.limit {
        writer.push(&format!(" LIMIT {}", limit));
    }

    if let Some(offset) = statement.offset {
        writer.push(&format!(" OFFSET {}", offset));
    }

    Ok(writer.finish())
}

pub fn render_insert(statement: &InsertStatement, types: &ColumnTypes) -> ModelResult<RenderedSql> {
    let mut writer = SqlWriter::new(types);
    let table = quote_identifier(&statement.table)?;
    let returning = quote_identifier(&statement.returning)?;

    let mut columns: Vec<&String> = Vec::new();
    for row in &statement.rows {
        for key in row.keys() {
            if !columns.contains(&key) {
                quote_identifier(key)?;
                columns.push(key);
            }
        }
    }

    if columns.is_empty() {
        writer.push(&format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING ({})::bigint",
            table, returning
        ));
        return Ok(writer.finish());
    }

    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<ModelResult<Vec<String>>>()?;
    writer.push(&format!(
        "INSERT INTO {} ({}) VALUES ",
        table,
        column_list.join(", ")
    ));

    for (row_index, row) in statement.rows.iter().enumerate() {
        if row_index > 0 {
            writer.push(", ");
        }
        writer.push("(");
        for (column_index, column) in columns.iter().enumerate() {
            if column_index > 0 {
                writer.push(", ");
            }
            match row.get(column.as_str()) {
                Some(value) => writer.bind(&statement.table, column.as_str(), value),
                None => writer.push("DEFAULT"),
            }
        }
        writer.push(")");
    }

    writer.push(&format!(" RETURNING ({})::bigint", returning));
    Ok(writer.finish())
}

pub fn render_update(statement: &UpdateStatement, types: &ColumnTypes) -> ModelResult<RenderedSql> {
    let mut writer = SqlWriter::new(types);
    writer.push(&format!(
        "UPDATE {} SET ",
        quote_identifier(&statement.table)?
    ));

    for (index, (column, value)) in statement.values.iter().enumerate() {
        if index > 0 {
            writer.push(", ");
        }
        writer.push(&format!("{} = ", quote_identifier(column)?));
        writer.bind(&statement.table, column, value);
    }

    if !statement.conditions.is_empty() {
        writer.push(" WHERE ");
        write_tree(&mut writer, &statement.conditions, &statement.table, false)?;
    }

    Ok(writer.finish())
}

pub fn render_delete(statement: &DeleteStatement, types: &ColumnTypes) -> ModelResult<RenderedSql> {
    let mut writer = SqlWriter::new(types);
    writer.push(&format!(
        "DELETE FROM {}",
        quote_identifier(&statement.table)?
    ));

    if !statement.conditions.is_empty() {
        writer.push(" WHERE ");
        write_tree(&mut writer, &statement.conditions, &statement.table, false)?;
    }

    Ok(writer.finish())
}

fn column_expr(column: &str, having: bool) -> ModelResult<String> {
    if having && column == GROUP_COUNT_ALIAS {
        return Ok("COUNT(*)".to_string());
    }
    quote_identifier(column)
}

fn write_tree(
    writer: &mut SqlWriter<'_>,
    tree: &ConditionTree,
    table: &str,
    having: bool,
) -> ModelResult<()> {
    for (index, node) in tree.nodes().iter().enumerate() {
        if index > 0 {
            writer.push(&format!(" {} ", node.conjunction));
        }

        match &node.kind {
            ConditionKind::Compare {
                column,
                operator,
                value,
            } => {
                writer.push(&format!("{} {} ", column_expr(column, having)?, operator));
                writer.bind(table, column, value);
            }
            ConditionKind::ColumnCompare {
                first,
                operator,
                second,
            } => {
                writer.push(&format!(
                    "{} {} {}",
                    column_expr(first, having)?,
                    operator,
                    column_expr(second, having)?
                ));
            }
            ConditionKind::In { column, values } | ConditionKind::NotIn { column, values } => {
                let negated = matches!(node.kind, ConditionKind::NotIn { .. });
                if values.is_empty() {
                    writer.push(if negated { "TRUE" } else { "FALSE" });
                    continue;
                }
                writer.push(&format!(
                    "{} {} (",
                    column_expr(column, having)?,
                    if negated { "NOT IN" } else { "IN" }
                ));
                for (value_index, value) in values.iter().enumerate() {
                    if value_index > 0 {
                        writer.push(", ");
                    }
                    writer.bind(table, column, value);
                }
                writer.push(")");
            }
            ConditionKind::Null { column } => {
                writer.push(&format!("{} IS NULL", column_expr(column, having)?));
            }
            ConditionKind::NotNull { column } => {
                writer.push(&format!("{} IS NOT NULL", column_expr(column, having)?));
            }
            ConditionKind::Between { column, low, high } => {
                writer.push(&format!("{} BETWEEN ", column_expr(column, having)?));
                writer.bind(table, column, low);
                writer.push(" AND ");
                writer.bind(table, column, high);
            }
            ConditionKind::Group(group) => {
                writer.push("(");
                write_tree(writer, group, table, having)?;
                writer.push(")");
            }
            ConditionKind::Exists { subquery, negated } => {
                let table = quote_identifier(&subquery.table)?;
                writer.push(&format!(
                    "{}EXISTS (SELECT 1 FROM {} WHERE {}.{} = {}.{}",
                    if *negated { "NOT " } else { "" },
                    table,
                    table,
                    quote_identifier(&subquery.correlation.inner_column)?,
                    quote_identifier(&subquery.correlation.outer_table)?,
                    quote_identifier(&subquery.correlation.outer_column)?
                ));
                if !subquery.conditions.is_empty() {
                    writer.push(" AND (");
                    write_tree(writer, &subquery.conditions, &subquery.table, false)?;
                    writer.push(")");
                }
                writer.push(")");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::conditions::{ConditionBuilder, Correlation, SubqueryBuilder};
    use crate::query::types::{JoinType, OrderDirection};
    use crate::storage::statement::{delete_from, insert_into, select_from, update_table};
    use crate::model::ModelCompiler;
    use crate::schema::{AttributeDefinition, ModelSchema, TraitFlags};
    use serde_json::json;

    fn types() -> ColumnTypes {
        ColumnTypes::default()
    }

    #[test]
    fn test_select_with_conditions() {
        let statement = select_from("gift_cards")
            .where_eq("is_active", true)
            .where_in("status", vec!["new", "used"])
            .where_null("deleted_at")
            .order_by("id", OrderDirection::Asc)
            .limit(3)
            .offset(2);

        let rendered = render_select(&statement, &types()).unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT gift_cards.* FROM gift_cards WHERE is_active = $1 AND status IN ($2, $3) \
             AND deleted_at IS NULL ORDER BY id ASC LIMIT 3 OFFSET 2"
        );
        assert_eq!(rendered.params.len(), 3);
        assert_eq!(rendered.params[0], SqlValue::Bool(true));
    }

    #[test]
    fn test_or_group_and_between() {
        let statement = select_from("orders")
            .where_between("total", vec![10, 20])
            .unwrap()
            .or_where(vec![("status", json!("paid")), ("status", json!("shipped"))])
            .unwrap();
        let rendered = render_select(&statement, &types()).unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT orders.* FROM orders WHERE total BETWEEN $1 AND $2 AND (status = $3 OR status = $4)"
        );
    }

    #[test]
    fn test_exists_subquery() {
        let subquery = SubqueryBuilder::new("orders")
            .where_gt("total", 100)
            .correlate(Correlation {
                inner_column: "customer_id".to_string(),
                outer_table: "customers".to_string(),
                outer_column: "id".to_string(),
            });
        let statement = select_from("customers").where_not_exists_subquery(subquery);
        let rendered = render_select(&statement, &types()).unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT customers.* FROM customers WHERE NOT EXISTS (SELECT 1 FROM orders \
             WHERE orders.customer_id = customers.id AND (total > $1))"
        );
    }

    #[test]
    fn test_aggregate_join_group() {
        let statement = select_from("orders")
            .join(JoinType::Inner, "customers", "orders.customer_id", "customers.id")
            .aggregate(AggregateFunction::Sum, Some("orders.total"));
        let rendered = render_select(&statement, &types()).unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT SUM(orders.total) AS aggregate FROM orders INNER JOIN customers ON orders.customer_id = customers.id"
        );

        let mut grouped = select_from("customers");
        grouped.group_by = vec!["tier".to_string()];
        grouped.having = ConditionTree::new().where_gt("count", 1);
        let rendered = render_select(&grouped, &types()).unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT tier, COUNT(*) AS count FROM customers GROUP BY tier HAVING COUNT(*) > $1"
        );
    }

    #[test]
    fn test_writes() {
        let mut first = serde_json::Map::new();
        first.insert("name".to_string(), json!("a"));
        let mut second = serde_json::Map::new();
        second.insert("name".to_string(), json!("b"));
        second.insert("slug".to_string(), json!("b"));

        let rendered = render_insert(&insert_into("tags").values(first.clone()).values(second), &types()).unwrap();
        assert_eq!(
            rendered.sql,
            "INSERT INTO tags (name, slug) VALUES ($1, DEFAULT), ($2, $3) RETURNING (id)::bigint"
        );

        let rendered = render_update(&update_table("tags").set(first).where_eq("id", 4), &types()).unwrap();
        assert_eq!(rendered.sql, "UPDATE tags SET name = $1 WHERE id = $2");

        let rendered = render_delete(&delete_from("tags").where_in::<i64>("id", vec![]), &types()).unwrap();
        assert_eq!(rendered.sql, "DELETE FROM tags WHERE FALSE");
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_identifier("orders.total").is_ok());
        assert!(validate_identifier("orders.*").is_ok());
        assert!(validate_identifier("total as amount").is_ok());
        assert!(validate_identifier("id; DROP TABLE users").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(render_select(&select_from("users").where_eq("name = 'x' --", 1), &types()).is_err());
        assert_eq!(quote_identifier("taggables.order").unwrap(), "taggables.\"order\"");
        assert_eq!(quote_identifier("total as amount").unwrap(), "total AS amount");
    }

    #[test]
    fn test_value_typing() {
        assert_eq!(SqlValue::from_json(&json!(3)), SqlValue::Int(3));
        assert_eq!(SqlValue::from_json(&json!("plain")), SqlValue::Text("plain".to_string()));
        assert_eq!(
            SqlValue::from_json(&json!("2024-01-01T00:00:00Z")),
            SqlValue::Text("2024-01-01T00:00:00Z".to_string())
        );
    }

    fn gift_card_types() -> ColumnTypes {
        let registry = ModelCompiler::new()
            .add(
                ModelSchema::new("GiftCard")
                    .attribute("code", AttributeDefinition::string())
                    .attribute("balance", AttributeDefinition::integer())
                    .traits(TraitFlags {
                        use_uuid: true,
                        use_soft_deletes: true,
                        ..TraitFlags::default()
                    }),
            )
            .unwrap()
            .compile()
            .unwrap();
        ColumnTypes::from_registry(&registry)
    }

    #[test]
    fn test_casts_follow_declared_column_types() {
        let types = gift_card_types();
        let uuid = "550e8400-e29b-41d4-a716-446655440000";

        let rendered = render_select(
            &select_from("gift_cards")
                .where_eq("code", uuid)
                .where_eq("gift_cards.uuid", uuid)
                .where_eq("code", "2024-01-01T00:00:00Z"),
            &types,
        )
        .unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT gift_cards.* FROM gift_cards WHERE code = $1 AND gift_cards.uuid = $2::uuid AND code = $3"
        );
        assert!(rendered
            .params
            .iter()
            .all(|param| matches!(param, SqlValue::Text(_))));

        let mut stamp = serde_json::Map::new();
        stamp.insert("deleted_at".to_string(), json!("2024-01-01T00:00:00.000000Z"));
        let rendered = render_update(&update_table("gift_cards").set(stamp).where_eq("id", 1), &types).unwrap();
        assert_eq!(
            rendered.sql,
            "UPDATE gift_cards SET deleted_at = $1::timestamptz WHERE id = $2"
        );

        let mut cleared = serde_json::Map::new();
        cleared.insert("balance".to_string(), Value::Null);
        let rendered = render_update(&update_table("gift_cards").set(cleared), &types).unwrap();
        assert_eq!(rendered.sql, "UPDATE gift_cards SET balance = $1::bigint");
    }

    #[test]
    fn test_unregistered_tables_cast_stamp_columns() {
        let mut row = serde_json::Map::new();
        row.insert("created_at".to_string(), json!("2024-01-01T00:00:00Z"));
        let rendered = render_insert(&insert_into("taggables").values(row), &gift_card_types()).unwrap();
        assert_eq!(
            rendered.sql,
            "INSERT INTO taggables (created_at) VALUES ($1::timestamptz) RETURNING (id)::bigint"
        );

        let rendered = render_select(
            &select_from("taggables").where_eq("name", "2024-01-01T00:00:00Z"),
            &gift_card_types(),
        )
        .unwrap();
        assert_eq!(rendered.sql, "SELECT taggables.* FROM taggables WHERE name = $1");
    }
}
