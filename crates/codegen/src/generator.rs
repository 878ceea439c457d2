use serde::Serialize;

use forge_orm::naming::snake_case;
use forge_orm::schema::FieldType;
use forge_orm::{CompiledModel, ModelRegistry};

use crate::error::CodegenResult;
use crate::templates::{render_template, FACADE_TEMPLATE, MOD_TEMPLATE};

#[derive(Debug, Clone, Serialize)]
pub struct FieldContext {
    pub name: String,
    pub column: String,
    pub rust_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationContext {
    pub name: String,
    pub accessor: String,
    pub target: String,
    pub returns_many: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacadeContext {
    pub model: String,
    pub table: String,
    pub module: String,
    pub fields: Vec<FieldContext>,
    pub relations: Vec<RelationContext>,
    pub has_relations: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ModContext {
    modules: Vec<String>,
}

/// Renders the facade source for one compiled model
pub struct FacadeGenerator<'a> {
    model: &'a CompiledModel,
}

impl<'a> FacadeGenerator<'a> {
    pub fn new(model: &'a CompiledModel) -> Self {
        Self { model }
    }

    pub fn module_name(&self) -> String {
        snake_case(&self.model.name)
    }

    pub fn context(&self) -> FacadeContext {
        // Declared attributes and foreign keys; system columns get no predicate
        let fields = self
            .model
            .columns
            .iter()
            .filter(|column| !column.source.is_system())
            .map(|column| FieldContext {
                name: snake_case(&column.name),
                column: column.name.clone(),
                rust_type: map_field_type(column.field_type, column.name.ends_with("_id")),
            })
            .collect();

        let relations: Vec<RelationContext> = self
            .model
            .relations
            .values()
            .map(|relation| RelationContext {
                name: relation.name.clone(),
                accessor: relation.accessor_name(),
                target: relation.target_entity.clone(),
                returns_many: relation.is_collection(),
            })
            .collect();

        FacadeContext {
            model: self.model.name.clone(),
            table: self.model.table.clone(),
            module: self.module_name(),
            fields,
            has_relations: !relations.is_empty(),
            relations,
        }
    }

    pub fn render(&self) -> CodegenResult<String> {
        render_template("facade", FACADE_TEMPLATE, &self.context())
    }
}

/// `mod.rs` re-exporting every facade module, in registry order
pub fn render_mod(registry: &ModelRegistry) -> CodegenResult<String> {
    let context = ModContext {
        modules: registry
            .iter()
            .map(|model| FacadeGenerator::new(model).module_name())
            .collect(),
    };
    render_template("mod", MOD_TEMPLATE, &context)
}

fn map_field_type(field_type: FieldType, is_key: bool) -> String {
    if is_key {
        return "i64".to_string();
    }
    match field_type {
        FieldType::Integer => "i64",
        FieldType::Float | FieldType::Decimal => "f64",
        FieldType::Boolean => "bool",
        FieldType::Json => "serde_json::Value",
        FieldType::String
        | FieldType::Text
        | FieldType::Date
        | FieldType::Timestamp
        | FieldType::Uuid
        | FieldType::Enum => "&str",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_orm::schema::{AttributeDefinition, ModelSchema, TraitFlags};
    use forge_orm::ModelCompiler;

    fn registry() -> ModelRegistry {
        ModelCompiler::new()
            .add(
                ModelSchema::new("GiftCard")
                    .attribute("code", AttributeDefinition::string().fillable())
                    .attribute("balance", AttributeDefinition::float().fillable())
                    .attribute("is_active", AttributeDefinition::boolean())
                    .belongs_to("Customer")
                    .traits(TraitFlags {
                        use_uuid: true,
                        ..TraitFlags::default()
                    }),
            )
            .unwrap()
            .add(ModelSchema::new("Customer").has_many("GiftCard"))
            .unwrap()
            .compile()
            .unwrap()
    }

    #[test]
    fn test_context_lists_declared_fields_and_relations() {
        let registry = registry();
        let card = registry.get("GiftCard").unwrap();
        let context = FacadeGenerator::new(&card).context();

        let fields: Vec<(&str, &str)> = context
            .fields
            .iter()
            .map(|f| (f.column.as_str(), f.rust_type.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("code", "&str"),
                ("balance", "f64"),
                ("is_active", "bool"),
                ("customer_id", "i64"),
            ]
        );
        assert_eq!(context.module, "gift_card");
        assert_eq!(context.relations[0].accessor, "customer_belong");
        assert!(!context.relations[0].returns_many);
    }

    #[test]
    fn test_render_facade() {
        let registry = registry();
        let card = registry.get("GiftCard").unwrap();
        let source = FacadeGenerator::new(&card).render().unwrap();

        assert!(source.contains("pub struct GiftCardQuery(ModelQuery);"));
        assert!(source.contains("pub fn where_code(self, value: &str) -> ModelResult<Self> {"));
        assert!(source.contains("self.0.where_attribute(\"balance\", value)?"));
        assert!(source.contains("pub async fn customer_belong(&self) -> ModelResult<ModelInstance> {"));
        assert!(source.contains("related_one(self.db, \"customer\")"));
        assert!(!source.contains("where_uuid"));
        assert!(source.contains("// <<<FORGE:BEGIN custom:gift_card>>>"));

        let customer = registry.get("Customer").unwrap();
        let source = FacadeGenerator::new(&customer).render().unwrap();
        assert!(source.contains("pub async fn gift_cards(&self) -> ModelResult<Vec<ModelInstance>> {"));
    }

    #[test]
    fn test_render_mod() {
        let source = render_mod(&registry()).unwrap();
        assert!(source.contains("pub mod gift_card;"));
        assert!(source.contains("pub use customer::*;"));
    }
}
