use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::source::DataSource;

pub type LevelId = String;

/// Which side of the console a chain was opened from.
///
/// Platform forms start from a cluster, business forms start from a project.
/// Some cache slots keep a separate remembered value per side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Platform,
    Business,
}

impl SelectionMode {
    /// Suffix appended to mode-scoped cache keys
    pub fn cache_suffix(&self) -> &'static str {
        match self {
            SelectionMode::Platform => "ForPlatform",
            SelectionMode::Business => "ForBusiness",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SelectionMode::Platform => "platform",
            SelectionMode::Business => "business",
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Grouping shown next to an option (business namespaces are grouped under
/// the cluster they live in).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionGroup {
    pub key: String,
    pub label: String,
}

/// One entry a level can be set to.
///
/// Equality is by `value` only; `label`, `group` and `raw` are display and
/// payload data carried along for the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<OptionGroup>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            group: None,
            raw: serde_json::Value::Null,
        }
    }

    /// Option whose label is its value
    pub fn plain(value: impl Into<String>) -> Self {
        let value = value.into();
        Self::new(value.clone(), value)
    }

    pub fn with_group(mut self, key: impl Into<String>, label: impl Into<String>) -> Self {
        self.group = Some(OptionGroup {
            key: key.into(),
            label: label.into(),
        });
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }
}

impl PartialEq for SelectOption {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for SelectOption {}

/// What a level does with freshly fetched options when nothing is selected yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoSelect {
    /// Pick the remembered value if it is still offered
    #[default]
    Cached,
    /// Pick the remembered value, else the first option
    CachedOrFirst,
    /// Never pick anything on the user's behalf
    Never,
}

/// Where a level's remembered value lives in the cache store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheSlot {
    Disabled,
    /// One key shared by platform and business forms
    Shared { key: String },
    /// Key suffixed with the chain's selection mode
    PerMode { key: String },
}

impl CacheSlot {
    pub fn scope_key(&self, mode: SelectionMode) -> Option<String> {
        match self {
            CacheSlot::Disabled => None,
            CacheSlot::Shared { key } => Some(key.clone()),
            CacheSlot::PerMode { key } => Some(format!("{}{}", key, mode.cache_suffix())),
        }
    }

    fn base_key(&self) -> Option<&str> {
        match self {
            CacheSlot::Disabled => None,
            CacheSlot::Shared { key } | CacheSlot::PerMode { key } => Some(key),
        }
    }
}

/// A selector position in a chain.
#[derive(Clone)]
pub struct Level {
    pub id: LevelId,
    pub parent: Option<LevelId>,
    pub required: bool,
    pub cache: CacheSlot,
    pub auto_select: AutoSelect,
    pub source: Arc<dyn DataSource>,
}

impl Level {
    /// A level with no upstream dependency
    pub fn root(id: impl Into<LevelId>, source: Arc<dyn DataSource>) -> Self {
        let id = id.into();
        Self {
            cache: CacheSlot::Shared { key: id.clone() },
            id,
            parent: None,
            required: true,
            auto_select: AutoSelect::default(),
            source,
        }
    }

    /// A level whose options depend on `parent`'s selected value
    pub fn child(
        id: impl Into<LevelId>,
        parent: impl Into<LevelId>,
        source: Arc<dyn DataSource>,
    ) -> Self {
        let mut level = Self::root(id, source);
        level.parent = Some(parent.into());
        level
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Use `key` instead of the level id as the cache key
    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache = match self.cache {
            CacheSlot::PerMode { .. } => CacheSlot::PerMode { key: key.into() },
            _ => CacheSlot::Shared { key: key.into() },
        };
        self
    }

    /// Keep separate remembered values for platform and business forms
    pub fn mode_scoped(mut self) -> Self {
        let key = self
            .cache
            .base_key()
            .map(str::to_string)
            .unwrap_or_else(|| self.id.clone());
        self.cache = CacheSlot::PerMode { key };
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = CacheSlot::Disabled;
        self
    }

    pub fn auto_select(mut self, policy: AutoSelect) -> Self {
        self.auto_select = policy;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Level")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("required", &self.required)
            .field("cache", &self.cache)
            .field("auto_select", &self.auto_select)
            .field("source", &self.source.name())
            .finish()
    }
}
