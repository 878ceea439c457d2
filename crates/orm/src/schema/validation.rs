//! Write-time checks compiled from attribute definitions.

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::schema::definition::{AttributeDefinition, FieldType};
use crate::storage::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Required attributes must be present
    Create,
    /// Only the supplied attributes are checked
    Update,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    field_type: FieldType,
    nullable: bool,
    required: bool,
    min: Option<f64>,
    max: Option<f64>,
    pattern: Option<Regex>,
    values: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AttributeValidator {
    rules: IndexMap<String, CompiledRule>,
}

impl AttributeValidator {
    pub fn compile(
        model: &str,
        attributes: &IndexMap<String, AttributeDefinition>,
    ) -> ModelResult<Self> {
        let mut rules = IndexMap::new();
        for (name, definition) in attributes {
            let rule = definition.validation.clone().unwrap_or_default();
            let pattern = match &rule.pattern {
                Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                    ModelError::Definition(format!(
                        "invalid pattern for {}.{}: {}",
                        model, name, e
                    ))
                })?),
                None => None,
            };
            rules.insert(
                name.clone(),
                CompiledRule {
                    field_type: definition.field_type,
                    nullable: definition.nullable,
                    required: rule.required,
                    min: rule.min,
                    max: rule.max,
                    pattern,
                    values: definition.values.clone(),
                },
            );
        }
        Ok(Self { rules })
    }

    pub fn validate(&self, values: &Row, mode: ValidationMode) -> ModelResult<()> {
        let mut failures = Vec::new();

        for (name, rule) in &self.rules {
            match values.get(name) {
                Some(value) => rule.check(name, value, &mut failures),
                None if mode == ValidationMode::Create && rule.required => {
                    failures.push(format!("{} is required", name));
                }
                None => {}
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ModelError::Validation(failures.join("; ")))
        }
    }
}

impl CompiledRule {
    fn check(&self, name: &str, value: &Value, failures: &mut Vec<String>) {
        if value.is_null() {
            if self.required || !self.nullable {
                failures.push(format!("{} cannot be null", name));
            }
            return;
        }

        if !accepts(self.field_type, value) {
            failures.push(format!("{} must be of type {:?}", name, self.field_type));
            return;
        }

        if self.field_type == FieldType::Enum && !self.values.is_empty() {
            let allowed = value
                .as_str()
                .map(|v| self.values.iter().any(|allowed| allowed == v))
                .unwrap_or(false);
            if !allowed {
                failures.push(format!(
                    "{} must be one of [{}]",
                    name,
                    self.values.join(", ")
                ));
            }
        }

        let measured = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => Some(s.chars().count() as f64),
            _ => None,
        };
        if let Some(measured) = measured {
            if let Some(min) = self.min {
                if measured < min {
                    failures.push(format!("{} must be at least {}", name, min));
                }
            }
            if let Some(max) = self.max {
                if measured > max {
                    failures.push(format!("{} must be at most {}", name, max));
                }
            }
        }

        if let (Some(pattern), Some(text)) = (&self.pattern, value.as_str()) {
            if !pattern.is_match(text) {
                failures.push(format!("{} does not match {}", name, pattern.as_str()));
            }
        }
    }
}

fn accepts(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Float | FieldType::Decimal => value.is_number(),
        // Storage engines commonly hand back 0/1 for booleans
        FieldType::Boolean => value.is_boolean() || value.is_i64(),
        FieldType::Json => true,
        _ => value.is_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::definition::ValidationRule;
    use serde_json::json;

    fn validator() -> AttributeValidator {
        let mut attributes = IndexMap::new();
        attributes.insert(
            "code".to_string(),
            AttributeDefinition::string()
                .required()
                .validation(ValidationRule {
                    required: true,
                    min: Some(4.0),
                    max: Some(12.0),
                    pattern: Some("^[A-Z0-9]+$".to_string()),
                }),
        );
        attributes.insert("balance".to_string(), AttributeDefinition::float());
        attributes.insert(
            "status".to_string(),
            AttributeDefinition::enumeration(&["active", "expired"]),
        );
        AttributeValidator::compile("GiftCard", &attributes).unwrap()
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_values_pass() {
        let values = row(json!({"code": "GIFT2024", "balance": 50, "status": "active"}));
        assert!(validator().validate(&values, ValidationMode::Create).is_ok());
    }

    #[test]
    fn test_required_only_checked_on_create() {
        let values = row(json!({"balance": 10.5}));
        let err = validator()
            .validate(&values, ValidationMode::Create)
            .unwrap_err();
        assert!(err.to_string().contains("code is required"));
        assert!(validator().validate(&values, ValidationMode::Update).is_ok());
    }

    #[test]
    fn test_failures_are_collected() {
        let values = row(json!({"code": "ab", "balance": "lots", "status": "lost"}));
        let err = validator()
            .validate(&values, ValidationMode::Update)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("code must be at least 4"));
        assert!(message.contains("code does not match"));
        assert!(message.contains("balance must be of type Float"));
        assert!(message.contains("status must be one of [active, expired]"));
    }

    #[test]
    fn test_bad_pattern_is_definition_error() {
        let mut attributes = IndexMap::new();
        attributes.insert(
            "code".to_string(),
            AttributeDefinition::string().validation(ValidationRule {
                pattern: Some("([".to_string()),
                ..ValidationRule::default()
            }),
        );
        assert!(matches!(
            AttributeValidator::compile("GiftCard", &attributes),
            Err(ModelError::Definition(_))
        ));
    }
}
