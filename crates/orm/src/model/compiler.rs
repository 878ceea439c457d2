//! Model compiler: schema definitions in, compiled models out.
//!
//! Compilation runs the attribute augmenter, resolves relations against
//! every registered schema and prepares validators and search projections.
//! All definition errors surface here, before any query runs.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::config::OrmConfig;
use crate::error::{ModelError, ModelResult};
use crate::model::compiled::CompiledModel;
use crate::relationships::RelationResolver;
use crate::schema::{AttributeAugmenter, AttributeValidator, ModelSchema};
use crate::search::SearchProjection;

#[derive(Debug, Default)]
pub struct ModelCompiler {
    schemas: IndexMap<String, ModelSchema>,
    relation_page_size: Option<usize>,
}

impl ModelCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the configured hasMany page size
    pub fn with_config(mut self, config: &OrmConfig) -> Self {
        self.relation_page_size = Some(config.relation_page_size);
        self
    }

    pub fn add(mut self, schema: ModelSchema) -> ModelResult<Self> {
        if self.schemas.contains_key(&schema.name) {
            return Err(ModelError::Definition(format!(
                "Model {} is defined more than once",
                schema.name
            )));
        }
        self.schemas.insert(schema.name.clone(), schema);
        Ok(self)
    }

    pub fn add_yaml(self, source: &str) -> ModelResult<Self> {
        self.add(ModelSchema::from_yaml(source)?)
    }

    /// Adds every `*.yaml` / `*.yml` file of `dir`, in file-name order
    pub fn load_dir(mut self, dir: &Path) -> ModelResult<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false);
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            debug!("Loading model definition {}", path.display());
            self = self.add(ModelSchema::from_file(&path)?)?;
        }
        Ok(self)
    }

    pub fn schemas(&self) -> &IndexMap<String, ModelSchema> {
        &self.schemas
    }

    pub fn compile(self) -> ModelResult<ModelRegistry> {
        let page_size = self
            .relation_page_size
            .unwrap_or_else(|| OrmConfig::default().relation_page_size);
        let resolver = RelationResolver::new(&self.schemas, page_size);

        let mut models = IndexMap::new();
        for schema in self.schemas.values() {
            let compiled = compile_schema(schema, &resolver)?;
            models.insert(compiled.name.clone(), Arc::new(compiled));
        }

        info!("Compiled {} models", models.len());
        Ok(ModelRegistry { models })
    }
}

fn compile_schema(schema: &ModelSchema, resolver: &RelationResolver<'_>) -> ModelResult<CompiledModel> {
    let columns = AttributeAugmenter::augment(schema)?;
    let relations = resolver.resolve(schema)?;
    let validator = AttributeValidator::compile(&schema.name, &schema.attributes)?;
    let (fillable, guarded, hidden) = CompiledModel::derive_access_lists(schema);

    let visible: Vec<String> = columns
        .iter()
        .map(|column| column.name.clone())
        .filter(|name| !hidden.contains(name) && name != "two_factor_secret")
        .collect();
    let search = SearchProjection::new(
        schema.traits.use_search.is_enabled(),
        schema.traits.use_search.options(),
        &visible,
    );

    for column in search
        .searchable
        .iter()
        .chain(&search.sortable)
        .chain(&search.filterable)
        .chain(&search.displayable)
    {
        if !columns.iter().any(|c| &c.name == column) {
            return Err(ModelError::Definition(format!(
                "Search column '{}' is not a column of {}",
                column, schema.name
            )));
        }
    }

    debug!(
        "Compiled {} ({} columns, {} relations)",
        schema.name,
        columns.len(),
        relations.len()
    );

    Ok(CompiledModel {
        name: schema.name.clone(),
        table: schema.table_name(),
        primary_key: schema.primary_key_name(),
        columns,
        attributes: schema.attributes.clone(),
        fillable,
        guarded,
        hidden,
        relations,
        traits: schema.traits.clone(),
        validator,
        search,
    })
}

/// Every compiled model, addressable by name or table
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: IndexMap<String, Arc<CompiledModel>>,
}

impl ModelRegistry {
    pub fn get(&self, name: &str) -> ModelResult<Arc<CompiledModel>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::Definition(format!("Model {} is not registered", name)))
    }

    pub fn by_table(&self, table: &str) -> Option<Arc<CompiledModel>> {
        self.models
            .values()
            .find(|model| model.table == table)
            .cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CompiledModel>> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
