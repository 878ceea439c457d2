//! Opt-in behavior flags carried by a model schema.

use serde::{Deserialize, Serialize};

use crate::events::LifecycleEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitFlags {
    #[serde(default = "default_true")]
    pub use_timestamps: bool,
    #[serde(default)]
    pub use_soft_deletes: bool,
    #[serde(default)]
    pub use_uuid: bool,
    #[serde(default)]
    pub observe: ObserveConfig,
    #[serde(default)]
    pub billable: bool,
    #[serde(default)]
    pub taggable: bool,
    #[serde(default)]
    pub categorizable: bool,
    #[serde(default)]
    pub commentable: bool,
    #[serde(default)]
    pub likeable: LikeableConfig,
    #[serde(default)]
    pub use_auth: AuthConfig,
    #[serde(default)]
    pub use_search: SearchConfig,
}

impl Default for TraitFlags {
    fn default() -> Self {
        Self {
            use_timestamps: true,
            use_soft_deletes: false,
            use_uuid: false,
            observe: ObserveConfig::default(),
            billable: false,
            taggable: false,
            categorizable: false,
            commentable: false,
            likeable: LikeableConfig::default(),
            use_auth: AuthConfig::default(),
            use_search: SearchConfig::default(),
        }
    }
}

/// `observe: true` fires every lifecycle event, a list fires only those named
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObserveConfig {
    All(bool),
    Events(Vec<LifecycleEvent>),
}

impl Default for ObserveConfig {
    fn default() -> Self {
        ObserveConfig::All(false)
    }
}

impl ObserveConfig {
    pub fn observes(&self, event: LifecycleEvent) -> bool {
        match self {
            ObserveConfig::All(enabled) => *enabled,
            ObserveConfig::Events(events) => events.contains(&event),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LikeableConfig {
    Enabled(bool),
    Custom(LikeableOptions),
}

impl Default for LikeableConfig {
    fn default() -> Self {
        LikeableConfig::Enabled(false)
    }
}

impl LikeableConfig {
    pub fn is_enabled(&self) -> bool {
        match self {
            LikeableConfig::Enabled(enabled) => *enabled,
            LikeableConfig::Custom(_) => true,
        }
    }

    pub fn options(&self) -> LikeableOptions {
        match self {
            LikeableConfig::Enabled(_) => LikeableOptions::default(),
            LikeableConfig::Custom(options) => options.clone(),
        }
    }
}

/// Overrides for the likes pivot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LikeableOptions {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub foreign_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthConfig {
    Enabled(bool),
    Custom(AuthOptions),
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig::Enabled(false)
    }
}

impl AuthConfig {
    pub fn uses_two_factor(&self) -> bool {
        matches!(self, AuthConfig::Custom(options) if options.use_two_factor)
    }

    pub fn uses_passkey(&self) -> bool {
        matches!(self, AuthConfig::Custom(options) if options.use_passkey)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthOptions {
    #[serde(default)]
    pub use_two_factor: bool,
    #[serde(default)]
    pub use_passkey: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchConfig {
    Enabled(bool),
    Custom(SearchOptions),
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig::Enabled(false)
    }
}

impl SearchConfig {
    pub fn is_enabled(&self) -> bool {
        match self {
            SearchConfig::Enabled(enabled) => *enabled,
            SearchConfig::Custom(_) => true,
        }
    }

    pub fn options(&self) -> SearchOptions {
        match self {
            SearchConfig::Enabled(_) => SearchOptions::default(),
            SearchConfig::Custom(options) => options.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default)]
    pub searchable: Vec<String>,
    #[serde(default)]
    pub sortable: Vec<String>,
    #[serde(default)]
    pub filterable: Vec<String>,
    #[serde(default)]
    pub displayable: Vec<String>,
}

fn default_true() -> bool {
    true
}
