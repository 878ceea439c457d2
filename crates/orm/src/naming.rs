//! Naming conventions shared by the compiler, the relation resolver and
//! the trait modules.
//!
//! Everything derived from a model name goes through here so that table
//! names, foreign keys, pivot tables and event names agree with each other.

use heck::{ToLowerCamelCase, ToSnakeCase};

/// Simple pluralization (English-centric)
pub fn pluralize(name: &str) -> String {
    let vowel_y = ["ay", "ey", "iy", "oy", "uy"];
    if name.ends_with('y') && !vowel_y.iter().any(|suffix| name.ends_with(suffix)) {
        format!("{}ies", &name[..name.len() - 1])
    } else if name.ends_with('s')
        || name.ends_with("sh")
        || name.ends_with("ch")
        || name.ends_with('x')
        || name.ends_with('z')
    {
        format!("{}es", name)
    } else {
        format!("{}s", name)
    }
}

/// Simple singularization (English-centric)
pub fn singularize(name: &str) -> String {
    if name.ends_with("ies") && name.len() > 3 {
        format!("{}y", &name[..name.len() - 3])
    } else if name.ends_with("sses")
        || name.ends_with("ches")
        || name.ends_with("shes")
        || name.ends_with("xes")
        || name.ends_with("zes")
    {
        name[..name.len() - 2].to_string()
    } else if name.ends_with('s') && !name.ends_with("ss") && name.len() > 1 {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

/// `GiftCard` -> `gift_card`
pub fn snake_case(name: &str) -> String {
    name.to_snake_case()
}

/// `GiftCard` -> `giftCard`
pub fn lower_camel_case(name: &str) -> String {
    name.to_lower_camel_case()
}

/// Default table for a model: `GiftCard` -> `gift_cards`
pub fn table_name(model: &str) -> String {
    pluralize(&snake_case(model))
}

/// Foreign key pointing at a model: `GiftCard` -> `gift_card_id`
pub fn foreign_key(model: &str) -> String {
    format!("{}_id", snake_case(model))
}

/// Foreign key derived from a table: `gift_cards` -> `gift_card_id`
pub fn foreign_key_for_table(table: &str) -> String {
    format!("{}_id", singularize(table))
}

/// Pivot table for two models. Symmetric: the singular names are sorted
/// before joining, so `Post`/`Tag` and `Tag`/`Post` both give `post_tags`.
pub fn pivot_table(left: &str, right: &str) -> String {
    let mut names = [snake_case(left), snake_case(right)];
    names.sort();
    format!("{}_{}", names[0], pluralize(&names[1]))
}

/// `"Summer Sale!"` -> `"summer-sale"`
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for ch in value.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}
