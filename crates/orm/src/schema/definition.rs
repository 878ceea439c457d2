use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ModelResult;
use crate::naming;
use crate::schema::traits::TraitFlags;

/// Declarative description of one entity. Pure data; compiling it never
/// mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub primary_key: Option<String>,
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeDefinition>,
    #[serde(default)]
    pub relations: RelationDeclarations,
    #[serde(default)]
    pub traits: TraitFlags,
}

impl ModelSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: None,
            primary_key: None,
            attributes: IndexMap::new(),
            relations: RelationDeclarations::default(),
            traits: TraitFlags::default(),
        }
    }

    pub fn from_yaml(source: &str) -> ModelResult<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_file(path: &Path) -> ModelResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_yaml(&source)
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn attribute(mut self, name: &str, definition: AttributeDefinition) -> Self {
        self.attributes.insert(name.to_string(), definition);
        self
    }

    pub fn belongs_to(mut self, declaration: impl Into<RelationDeclaration>) -> Self {
        self.relations.belongs_to.push(declaration.into());
        self
    }

    pub fn has_many(mut self, declaration: impl Into<RelationDeclaration>) -> Self {
        self.relations.has_many.push(declaration.into());
        self
    }

    pub fn has_one(mut self, declaration: impl Into<RelationDeclaration>) -> Self {
        self.relations.has_one.push(declaration.into());
        self
    }

    pub fn has_one_through(mut self, declaration: impl Into<RelationDeclaration>) -> Self {
        self.relations.has_one_through.push(declaration.into());
        self
    }

    pub fn has_many_through(mut self, declaration: impl Into<RelationDeclaration>) -> Self {
        self.relations.has_many_through.push(declaration.into());
        self
    }

    pub fn belongs_to_many(mut self, declaration: impl Into<RelationDeclaration>) -> Self {
        self.relations.belongs_to_many.push(declaration.into());
        self
    }

    pub fn traits(mut self, traits: TraitFlags) -> Self {
        self.traits = traits;
        self
    }

    /// Declared table, or the snake_case plural of the model name
    pub fn table_name(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| naming::table_name(&self.name))
    }

    pub fn primary_key_name(&self) -> String {
        self.primary_key.clone().unwrap_or_else(|| "id".to_string())
    }
}

/// Column types a declared attribute can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Text,
    Integer,
    Float,
    Decimal,
    Boolean,
    Date,
    Timestamp,
    Json,
    Uuid,
    Enum,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float | FieldType::Decimal)
    }

    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            FieldType::String
                | FieldType::Text
                | FieldType::Date
                | FieldType::Timestamp
                | FieldType::Uuid
                | FieldType::Enum
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub fillable: bool,
    #[serde(default)]
    pub guarded: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Allowed values for `enum` attributes
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub validation: Option<ValidationRule>,
}

impl AttributeDefinition {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            fillable: false,
            guarded: false,
            hidden: false,
            nullable: true,
            values: Vec::new(),
            validation: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn text() -> Self {
        Self::new(FieldType::Text)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn float() -> Self {
        Self::new(FieldType::Float)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn timestamp() -> Self {
        Self::new(FieldType::Timestamp)
    }

    pub fn json() -> Self {
        Self::new(FieldType::Json)
    }

    pub fn enumeration(values: &[&str]) -> Self {
        let mut definition = Self::new(FieldType::Enum);
        definition.values = values.iter().map(|v| v.to_string()).collect();
        definition
    }

    pub fn fillable(mut self) -> Self {
        self.fillable = true;
        self
    }

    pub fn guarded(mut self) -> Self {
        self.guarded = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        let mut rule = self.validation.take().unwrap_or_default();
        rule.required = true;
        self.validation = Some(rule);
        self
    }

    pub fn validation(mut self, rule: ValidationRule) -> Self {
        self.validation = Some(rule);
        self
    }
}

/// Declarative checks applied on write. `min`/`max` bound numbers by value
/// and strings by character count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub pattern: Option<String>,
}

/// Relation declarations grouped by shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationDeclarations {
    #[serde(default)]
    pub belongs_to: Vec<RelationDeclaration>,
    #[serde(default)]
    pub has_many: Vec<RelationDeclaration>,
    #[serde(default)]
    pub has_one: Vec<RelationDeclaration>,
    #[serde(default)]
    pub has_one_through: Vec<RelationDeclaration>,
    #[serde(default, alias = "through_many")]
    pub has_many_through: Vec<RelationDeclaration>,
    #[serde(default)]
    pub belongs_to_many: Vec<RelationDeclaration>,
}

impl RelationDeclarations {
    pub fn is_empty(&self) -> bool {
        self.belongs_to.is_empty()
            && self.has_many.is_empty()
            && self.has_one.is_empty()
            && self.has_one_through.is_empty()
            && self.has_many_through.is_empty()
            && self.belongs_to_many.is_empty()
    }
}

/// Either a bare model name or the detailed form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationDeclaration {
    Model(String),
    Detailed(RelationOptions),
}

impl RelationDeclaration {
    pub fn options(&self) -> RelationOptions {
        match self {
            RelationDeclaration::Model(model) => RelationOptions::new(model),
            RelationDeclaration::Detailed(options) => options.clone(),
        }
    }
}

impl From<&str> for RelationDeclaration {
    fn from(model: &str) -> Self {
        RelationDeclaration::Model(model.to_string())
    }
}

impl From<RelationOptions> for RelationDeclaration {
    fn from(options: RelationOptions) -> Self {
        RelationDeclaration::Detailed(options)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationOptions {
    pub model: String,
    #[serde(default)]
    pub relation_name: Option<String>,
    #[serde(default)]
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub through: Option<String>,
    #[serde(default)]
    pub through_foreign_key: Option<String>,
    #[serde(default)]
    pub pivot_table: Option<String>,
    #[serde(default)]
    pub pivot_foreign_key: Option<String>,
    #[serde(default)]
    pub pivot_related_key: Option<String>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

impl RelationOptions {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            relation_name: None,
            foreign_key: None,
            through: None,
            through_foreign_key: None,
            pivot_table: None,
            pivot_foreign_key: None,
            pivot_related_key: None,
            page_size: None,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.relation_name = Some(name.to_string());
        self
    }

    pub fn foreign_key(mut self, key: &str) -> Self {
        self.foreign_key = Some(key.to_string());
        self
    }

    pub fn through(mut self, model: &str) -> Self {
        self.through = Some(model.to_string());
        self
    }

    pub fn through_foreign_key(mut self, key: &str) -> Self {
        self.through_foreign_key = Some(key.to_string());
        self
    }

    pub fn pivot_table(mut self, table: &str) -> Self {
        self.pivot_table = Some(table.to_string());
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Column a belongsTo declaration adds to the owning table
    pub fn belongs_to_key(&self) -> String {
        self.foreign_key
            .clone()
            .unwrap_or_else(|| naming::foreign_key(&self.model))
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_from_yaml() {
        let yaml = r#"
name: GiftCard
attributes:
  code:
    type: string
    fillable: true
    validation:
      required: true
      max: 32
  balance:
    type: float
    fillable: true
  is_active:
    type: boolean
    fillable: true
relations:
  belongs_to:
    - Customer
    - model: User
      foreign_key: issuer_id
traits:
  use_uuid: true
  use_soft_deletes: true
"#;
        let schema = ModelSchema::from_yaml(yaml).unwrap();
        assert_eq!(schema.name, "GiftCard");
        assert_eq!(schema.table_name(), "gift_cards");
        assert_eq!(schema.primary_key_name(), "id");

        let names: Vec<&String> = schema.attributes.keys().collect();
        assert_eq!(names, vec!["code", "balance", "is_active"]);
        assert_eq!(schema.attributes["balance"].field_type, FieldType::Float);
        assert!(schema.attributes["code"].validation.as_ref().unwrap().required);

        assert_eq!(schema.relations.belongs_to.len(), 2);
        assert_eq!(schema.relations.belongs_to[0].options().belongs_to_key(), "customer_id");
        assert_eq!(schema.relations.belongs_to[1].options().belongs_to_key(), "issuer_id");

        assert!(schema.traits.use_uuid);
        assert!(schema.traits.use_timestamps);
    }

    #[test]
    fn test_builder_matches_yaml_shape() {
        let schema = ModelSchema::new("Order")
            .attribute("total", AttributeDefinition::float().fillable())
            .attribute("secret_note", AttributeDefinition::text().hidden())
            .belongs_to("Customer")
            .has_many(RelationOptions::new("LineItem").page_size(50));

        assert_eq!(schema.table_name(), "orders");
        assert!(schema.attributes["total"].fillable);
        assert!(schema.attributes["secret_note"].hidden);
        assert_eq!(
            schema.relations.has_many[0].options().page_size,
            Some(50)
        );
        assert!(!schema.relations.is_empty());
    }

    #[test]
    fn test_invalid_yaml_is_definition_error() {
        let err = ModelSchema::from_yaml("name: [unterminated").unwrap_err();
        assert!(matches!(err, crate::error::ModelError::Definition(_)));
    }
}
