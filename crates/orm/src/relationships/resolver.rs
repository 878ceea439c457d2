//! Relation resolver: classifies each declaration into a mechanism and
//! derives its keys, pivot and intermediate tables.

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{ModelError, ModelResult, RelationshipError};
use crate::naming;
use crate::relationships::metadata::{Cardinality, RelationMechanism, ResolvedRelation};
use crate::schema::{ModelSchema, RelationDeclaration, RelationOptions};

pub struct RelationResolver<'a> {
    schemas: &'a IndexMap<String, ModelSchema>,
    relation_page_size: usize,
}

impl<'a> RelationResolver<'a> {
    pub fn new(schemas: &'a IndexMap<String, ModelSchema>, relation_page_size: usize) -> Self {
        Self {
            schemas,
            relation_page_size,
        }
    }

    /// One entry per declaration, in declaration order
    pub fn resolve(&self, owner: &ModelSchema) -> ModelResult<IndexMap<String, ResolvedRelation>> {
        let mut resolved = IndexMap::new();
        let relations = &owner.relations;

        let groups: [(&[RelationDeclaration], RelationMechanism, Cardinality); 6] = [
            (relations.belongs_to.as_slice(), RelationMechanism::BelongsTo, Cardinality::One),
            (relations.has_many.as_slice(), RelationMechanism::HasMany, Cardinality::Many),
            (relations.has_one.as_slice(), RelationMechanism::HasOne, Cardinality::One),
            (relations.belongs_to_many.as_slice(), RelationMechanism::BelongsToMany, Cardinality::Many),
            (relations.has_one_through.as_slice(), RelationMechanism::ThroughMany, Cardinality::One),
            (relations.has_many_through.as_slice(), RelationMechanism::ThroughMany, Cardinality::Many),
        ];

        for (declarations, mechanism, cardinality) in groups {
            for declaration in declarations {
                let relation = self.resolve_one(owner, &declaration.options(), mechanism, cardinality)?;
                debug!(
                    "Resolved {}.{} as {} -> {}",
                    owner.name,
                    relation.name,
                    mechanism.as_str(),
                    relation.target_entity
                );
                if resolved.contains_key(&relation.name) {
                    return Err(ModelError::Definition(format!(
                        "Relation '{}' is declared more than once on {}",
                        relation.name, owner.name
                    )));
                }
                resolved.insert(relation.name.clone(), relation);
            }
        }

        Ok(resolved)
    }

    fn schema(&self, relation: &str, model: &str) -> ModelResult<&'a ModelSchema> {
        self.schemas.get(model).ok_or_else(|| {
            RelationshipError::InvalidConfiguration(format!(
                "Relation '{}' targets unknown model '{}'",
                relation, model
            ))
            .into()
        })
    }

    fn resolve_one(
        &self,
        owner: &ModelSchema,
        options: &RelationOptions,
        mechanism: RelationMechanism,
        cardinality: Cardinality,
    ) -> ModelResult<ResolvedRelation> {
        let target_snake = naming::snake_case(&options.model);
        let default_name = match cardinality {
            Cardinality::One => target_snake.clone(),
            Cardinality::Many => naming::table_name(&options.model),
        };
        let name = options.relation_name.clone().unwrap_or(default_name);
        let target = self.schema(&name, &options.model)?;
        let owner_key = owner.primary_key_name();

        let mut relation = ResolvedRelation {
            name,
            target_entity: target.name.clone(),
            target_table: target.table_name(),
            cardinality,
            mechanism,
            local_key: owner_key.clone(),
            foreign_key: naming::foreign_key(&owner.name),
            pivot_table: None,
            pivot_foreign_key: None,
            pivot_related_key: None,
            through_entity: None,
            through_table: None,
            through_primary_key: None,
            through_foreign_key: None,
            page_size: None,
        };

        match mechanism {
            RelationMechanism::BelongsTo => {
                relation.local_key = options.belongs_to_key();
                relation.foreign_key = target.primary_key_name();
            }
            RelationMechanism::HasMany | RelationMechanism::HasOne => {
                if let Some(key) = &options.foreign_key {
                    relation.foreign_key = key.clone();
                }
                if mechanism == RelationMechanism::HasMany {
                    relation.page_size = Some(options.page_size.unwrap_or(self.relation_page_size));
                }
            }
            RelationMechanism::BelongsToMany => {
                relation.foreign_key = target.primary_key_name();
                relation.pivot_table = Some(
                    options
                        .pivot_table
                        .clone()
                        .unwrap_or_else(|| naming::pivot_table(&owner.name, &target.name)),
                );
                relation.pivot_foreign_key = Some(
                    options
                        .pivot_foreign_key
                        .clone()
                        .unwrap_or_else(|| naming::foreign_key(&owner.name)),
                );
                relation.pivot_related_key = Some(
                    options
                        .pivot_related_key
                        .clone()
                        .unwrap_or_else(|| format!("{}_id", target_snake)),
                );
            }
            RelationMechanism::ThroughMany => {
                let through_model = options.through.as_deref().ok_or_else(|| {
                    ModelError::from(RelationshipError::InvalidConfiguration(format!(
                        "Relation '{}' on {} needs a 'through' model",
                        relation.name, owner.name
                    )))
                })?;
                let through = self.schema(&relation.name, through_model)?;

                relation.through_entity = Some(through.name.clone());
                relation.through_table = Some(through.table_name());
                relation.through_primary_key = Some(through.primary_key_name());
                relation.through_foreign_key = Some(
                    options
                        .through_foreign_key
                        .clone()
                        .unwrap_or_else(|| naming::foreign_key(&owner.name)),
                );
                relation.foreign_key = options
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| naming::foreign_key(&through.name));
            }
        }

        Ok(relation)
    }
}
