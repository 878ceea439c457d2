//! Derives the final ordered column set of a model by injecting system
//! fields around the declared attributes.

use std::collections::HashSet;

use crate::error::{ModelError, ModelResult};
use crate::schema::definition::{FieldType, ModelSchema};

/// Where a column came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    PrimaryKey,
    Uuid,
    Declared,
    ForeignKey,
    SoftDelete,
    Timestamp,
    Billing,
    TwoFactor,
    Passkey,
}

impl ColumnSource {
    /// System columns are never mass-assignable
    pub fn is_system(&self) -> bool {
        !matches!(self, ColumnSource::Declared | ColumnSource::ForeignKey)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub source: ColumnSource,
}

impl Column {
    fn system(name: &str, field_type: FieldType, nullable: bool, source: ColumnSource) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            nullable,
            source,
        }
    }
}

pub struct AttributeAugmenter;

impl AttributeAugmenter {
    /// Column order is fixed: primary key, uuid, declared attributes,
    /// belongsTo keys, deleted_at, created_at, updated_at, then the
    /// billing and auth identifiers.
    pub fn augment(schema: &ModelSchema) -> ModelResult<Vec<Column>> {
        let traits = &schema.traits;
        let mut columns = ColumnSet::new(&schema.name);

        columns.push_system(Column::system(
            &schema.primary_key_name(),
            FieldType::Integer,
            false,
            ColumnSource::PrimaryKey,
        ))?;

        if traits.use_uuid {
            columns.push_system(Column::system(
                "uuid",
                FieldType::Uuid,
                true,
                ColumnSource::Uuid,
            ))?;
        }

        for (name, definition) in &schema.attributes {
            columns.push_declared(Column {
                name: name.clone(),
                field_type: definition.field_type,
                nullable: definition.nullable,
                source: ColumnSource::Declared,
            })?;
        }

        for declaration in &schema.relations.belongs_to {
            let key = declaration.options().belongs_to_key();
            if schema.attributes.contains_key(&key) {
                continue;
            }
            columns.push_system(Column::system(
                &key,
                FieldType::Integer,
                true,
                ColumnSource::ForeignKey,
            ))?;
        }

        if traits.use_soft_deletes {
            columns.push_system(Column::system(
                "deleted_at",
                FieldType::Timestamp,
                true,
                ColumnSource::SoftDelete,
            ))?;
        }

        if traits.use_timestamps {
            for name in ["created_at", "updated_at"] {
                columns.push_system(Column::system(
                    name,
                    FieldType::Timestamp,
                    true,
                    ColumnSource::Timestamp,
                ))?;
            }
        }

        if traits.billable {
            columns.push_system(Column::system(
                "stripe_id",
                FieldType::String,
                true,
                ColumnSource::Billing,
            ))?;
        }

        if traits.use_auth.uses_two_factor() {
            columns.push_system(Column::system(
                "two_factor_secret",
                FieldType::String,
                true,
                ColumnSource::TwoFactor,
            ))?;
        }

        if traits.use_auth.uses_passkey() {
            columns.push_system(Column::system(
                "public_key",
                FieldType::Text,
                true,
                ColumnSource::Passkey,
            ))?;
        }

        Ok(columns.columns)
    }
}

struct ColumnSet<'a> {
    model: &'a str,
    seen: HashSet<String>,
    columns: Vec<Column>,
}

impl<'a> ColumnSet<'a> {
    fn new(model: &'a str) -> Self {
        Self {
            model,
            seen: HashSet::new(),
            columns: Vec::new(),
        }
    }

    fn push_declared(&mut self, column: Column) -> ModelResult<()> {
        if !self.seen.insert(column.name.clone()) {
            return Err(ModelError::Definition(format!(
                "attribute '{}' on {} collides with a system field",
                column.name, self.model
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    fn push_system(&mut self, column: Column) -> ModelResult<()> {
        if !self.seen.insert(column.name.clone()) {
            return Err(ModelError::Definition(format!(
                "field '{}' on {} is introduced twice ({:?})",
                column.name, self.model, column.source
            )));
        }
        self.columns.push(column);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::definition::AttributeDefinition;
    use crate::schema::traits::{AuthConfig, AuthOptions, TraitFlags};

    fn names(columns: &[Column]) -> Vec<&str> {
        columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_fixed_augmentation_order() {
        let traits = TraitFlags {
            use_uuid: true,
            use_soft_deletes: true,
            billable: true,
            use_auth: AuthConfig::Custom(AuthOptions {
                use_two_factor: true,
                use_passkey: true,
            }),
            ..TraitFlags::default()
        };
        let schema = ModelSchema::new("User")
            .attribute("email", AttributeDefinition::string().fillable())
            .belongs_to("Team")
            .traits(traits);

        let columns = AttributeAugmenter::augment(&schema).unwrap();
        assert_eq!(
            names(&columns),
            vec![
                "id",
                "uuid",
                "email",
                "team_id",
                "deleted_at",
                "created_at",
                "updated_at",
                "stripe_id",
                "two_factor_secret",
                "public_key",
            ]
        );
        assert_eq!(columns[0].source, ColumnSource::PrimaryKey);
        assert_eq!(columns[3].source, ColumnSource::ForeignKey);
        assert!(columns[4].source.is_system());
    }

    #[test]
    fn test_minimal_schema() {
        let traits = TraitFlags {
            use_timestamps: false,
            ..TraitFlags::default()
        };
        let schema = ModelSchema::new("Tag")
            .attribute("name", AttributeDefinition::string())
            .traits(traits);
        let columns = AttributeAugmenter::augment(&schema).unwrap();
        assert_eq!(names(&columns), vec!["id", "name"]);
    }

    #[test]
    fn test_declared_foreign_key_is_not_duplicated() {
        let schema = ModelSchema::new("Order")
            .attribute("customer_id", AttributeDefinition::integer().fillable())
            .belongs_to("Customer");
        let columns = AttributeAugmenter::augment(&schema).unwrap();
        let count = columns.iter().filter(|c| c.name == "customer_id").count();
        assert_eq!(count, 1);
        assert_eq!(columns[1].source, ColumnSource::Declared);
    }

    #[test]
    fn test_colliding_system_field_fails_at_definition_time() {
        let traits = TraitFlags {
            use_uuid: true,
            ..TraitFlags::default()
        };
        let schema = ModelSchema::new("Invoice")
            .attribute("uuid", AttributeDefinition::string())
            .traits(traits);
        assert!(matches!(
            AttributeAugmenter::augment(&schema),
            Err(ModelError::Definition(_))
        ));

        let schema = ModelSchema::new("Invoice").attribute("created_at", AttributeDefinition::timestamp());
        assert!(matches!(
            AttributeAugmenter::augment(&schema),
            Err(ModelError::Definition(_))
        ));
    }

    #[test]
    fn test_two_belongs_to_with_same_key_fails() {
        let schema = ModelSchema::new("Transfer")
            .belongs_to("Account")
            .belongs_to("Account");
        assert!(matches!(
            AttributeAugmenter::augment(&schema),
            Err(ModelError::Definition(_))
        ));
    }
}
