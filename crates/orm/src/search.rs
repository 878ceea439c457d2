//! Search projection for models with `use_search`

use serde_json::Value;

use crate::schema::SearchOptions;
use crate::storage::Row;

/// Which columns a search index sees, sorts and filters on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchProjection {
    pub enabled: bool,
    pub searchable: Vec<String>,
    pub sortable: Vec<String>,
    pub filterable: Vec<String>,
    pub displayable: Vec<String>,
}

impl SearchProjection {
    /// `visible_columns` is the fallback when nothing more specific is
    /// declared: displayable falls back to searchable, then to every
    /// visible column.
    pub fn new(enabled: bool, options: SearchOptions, visible_columns: &[String]) -> Self {
        let displayable = if !options.displayable.is_empty() {
            options.displayable
        } else if !options.searchable.is_empty() {
            options.searchable.clone()
        } else {
            visible_columns.to_vec()
        };

        Self {
            enabled,
            searchable: options.searchable,
            sortable: options.sortable,
            filterable: options.filterable,
            displayable,
        }
    }

    pub fn project(&self, attributes: &Row) -> Value {
        let mut projected = Row::new();
        for column in &self.displayable {
            if let Some(value) = attributes.get(column) {
                projected.insert(column.clone(), value.clone());
            }
        }
        Value::Object(projected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_displayable_fallbacks() {
        let visible = vec!["id".to_string(), "name".to_string(), "price".to_string()];

        let projection = SearchProjection::new(true, SearchOptions::default(), &visible);
        assert_eq!(projection.displayable, visible);

        let options = SearchOptions {
            searchable: vec!["name".to_string()],
            ..Default::default()
        };
        let projection = SearchProjection::new(true, options, &visible);
        assert_eq!(projection.displayable, vec!["name".to_string()]);
    }

    #[test]
    fn test_project_keeps_only_displayable() {
        let options = SearchOptions {
            displayable: vec!["name".to_string(), "missing".to_string()],
            ..Default::default()
        };
        let projection = SearchProjection::new(true, options, &[]);
        let row = json!({"id": 1, "name": "Lamp", "price": 20})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(projection.project(&row), json!({"name": "Lamp"}));
    }
}
