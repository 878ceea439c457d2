use serde::Serialize;
use tinytemplate::TinyTemplate;

use crate::error::CodegenResult;

/// Renders `template` with `context`. Values are emitted verbatim; the
/// default formatter would HTML-escape `&str` parameter types.
pub fn render_template<C: Serialize>(name: &str, template: &str, context: &C) -> CodegenResult<String> {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template(name, template)?;
    Ok(tt.render(name, context)?)
}

pub static FACADE_TEMPLATE: &str = r#"// Generated by forge-codegen from the {model} model definition.
// Only the block between the FORGE markers survives regeneration.

use forge_orm::prelude::*;

/// Typed query over `{table}`
#[derive(Debug, Clone)]
pub struct {model}Query(ModelQuery);

impl {model}Query \{
    pub fn new(db: &Database) -> ModelResult<Self> \{
        Ok(Self(db.model("{model}")?.query()))
    }

    pub fn into_inner(self) -> ModelQuery \{
        self.0
    }

    pub async fn get(&self) -> ModelResult<Vec<ModelInstance>> \{
        self.0.get().await
    }

    pub async fn first(&self) -> ModelResult<Option<ModelInstance>> \{
        self.0.first().await
    }
{{ for field in fields }}
    pub fn where_{field.name}(self, value: {field.rust_type}) -> ModelResult<Self> \{
        Ok(Self(self.0.where_attribute("{field.column}", value)?))
    }
{{ endfor }}
}
{{ if has_relations }}
/// Relation accessors for one `{model}` instance
pub struct {model}Relations<'a> \{
    db: &'a Database,
    instance: &'a ModelInstance,
}

impl<'a> {model}Relations<'a> \{
    pub fn new(db: &'a Database, instance: &'a ModelInstance) -> Self \{
        Self \{ db, instance }
    }
{{ for relation in relations }}{{ if relation.returns_many }}
    pub async fn {relation.accessor}(&self) -> ModelResult<Vec<ModelInstance>> \{
        self.instance.related_many(self.db, "{relation.name}").await
    }
{{ else }}
    pub async fn {relation.accessor}(&self) -> ModelResult<ModelInstance> \{
        self.instance.related_one(self.db, "{relation.name}").await
    }
{{ endif }}{{ endfor }}
}
{{ endif }}
// <<<FORGE:BEGIN custom:{module}>>>
// <<<FORGE:END custom:{module}>>>
"#;

pub static MOD_TEMPLATE: &str = r#"// Generated by forge-codegen. Do not edit.
{{ for module in modules }}
pub mod {module};
pub use {module}::*;
{{ endfor }}
"#;
