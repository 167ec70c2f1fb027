use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{AutoSelect, CacheSlot, Level, LevelId, SelectionMode};
use crate::source::DataSource;

/// Level definition in the config file
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LevelConfig {
    pub id: LevelId,

    /// Upstream level (omit for the root)
    #[serde(default)]
    pub parent: Option<LevelId>,

    /// Must hold a value before the form can be submitted
    #[serde(default = "default_true")]
    pub required: bool,

    /// Remember the user's choice across sessions
    #[serde(default = "default_true")]
    pub cache: bool,

    /// Cache key (defaults to the level id)
    #[serde(default)]
    pub cache_key: Option<String>,

    /// Separate remembered values for platform and business forms
    #[serde(default)]
    pub mode_scoped: bool,

    #[serde(default)]
    pub auto_select: AutoSelect,

    /// Label for display in the CLI
    #[serde(default)]
    pub label: Option<String>,
}

fn default_true() -> bool {
    true
}

impl LevelConfig {
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    /// Where the level's remembered value is stored
    pub fn cache_slot(&self) -> CacheSlot {
        if !self.cache {
            return CacheSlot::Disabled;
        }
        let key = self.cache_key.clone().unwrap_or_else(|| self.id.clone());
        if self.mode_scoped {
            CacheSlot::PerMode { key }
        } else {
            CacheSlot::Shared { key }
        }
    }

    fn to_level(&self, source: Arc<dyn DataSource>) -> Level {
        let mut level = match &self.parent {
            Some(parent) => Level::child(self.id.clone(), parent.clone(), source),
            None => Level::root(self.id.clone(), source),
        };
        if !self.required {
            level = level.optional();
        }
        level.cache = self.cache_slot();
        level.auto_select(self.auto_select)
    }
}

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChainConfig {
    /// Config file version
    #[serde(default = "default_version")]
    pub version: String,

    /// Form name
    #[serde(default)]
    pub name: Option<String>,

    /// Default selection mode (the CLI may override it)
    #[serde(default)]
    pub mode: SelectionMode,

    /// Level definitions, parents first
    pub levels: Vec<LevelConfig>,
}

fn default_version() -> String {
    "1".into()
}

/// Chain definition errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("chain has no levels")]
    EmptyChain,
    #[error("level '{level}' is defined more than once")]
    DuplicateLevel { level: LevelId },
    #[error("level '{level}' depends on unknown level '{parent}'")]
    UnknownParent { level: LevelId, parent: LevelId },
    #[error("cyclic dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<LevelId> },
    #[error("chain has no root level")]
    MissingRoot,
    #[error("chain has more than one root level: {}", .roots.join(", "))]
    MultipleRoots { roots: Vec<LevelId> },
    #[error("no config file found, searched: {searched:?}")]
    NotFound { searched: Vec<PathBuf> },
}

impl ChainConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a string (useful for testing)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ChainConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search for config file in standard locations
    pub fn discover(start_dir: &Path) -> Result<(PathBuf, Self), ConfigError> {
        let names = ["cascade.yaml", "cascade.yml", ".cascade.yaml", ".cascade.yml"];
        let mut searched = Vec::new();

        // Check environment variable first
        if let Ok(env_path) = std::env::var("CASCADE_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        // Search current directory and parents
        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in &names {
                let path = current.join(name);
                if path.exists() {
                    return Ok((path.clone(), Self::load(&path)?));
                }
                searched.push(path);
            }
            dir = current.parent();
        }

        Err(ConfigError::NotFound { searched })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let edges: Vec<(LevelId, Option<LevelId>)> = self
            .levels
            .iter()
            .map(|l| (l.id.clone(), l.parent.clone()))
            .collect();
        check_topology(&edges)
    }

    pub fn level(&self, id: &str) -> Option<&LevelConfig> {
        self.levels.iter().find(|l| l.id == id)
    }

    /// Build levels, asking `bind` for each level's data source
    pub fn to_levels<F>(&self, mut bind: F) -> Vec<Level>
    where
        F: FnMut(&LevelConfig) -> Arc<dyn DataSource>,
    {
        self.levels
            .iter()
            .map(|cfg| {
                let source = bind(cfg);
                cfg.to_level(source)
            })
            .collect()
    }
}

/// Validate a set of `(level, parent)` edges: ids unique, parents known,
/// no cycles, exactly one root.
pub(crate) fn check_topology(edges: &[(LevelId, Option<LevelId>)]) -> Result<(), ConfigError> {
    if edges.is_empty() {
        return Err(ConfigError::EmptyChain);
    }

    let mut parents: BTreeMap<&str, Option<&str>> = BTreeMap::new();
    for (id, parent) in edges {
        if parents.insert(id.as_str(), parent.as_deref()).is_some() {
            return Err(ConfigError::DuplicateLevel { level: id.clone() });
        }
    }

    for (id, parent) in edges {
        if let Some(parent) = parent {
            if !parents.contains_key(parent.as_str()) {
                return Err(ConfigError::UnknownParent {
                    level: id.clone(),
                    parent: parent.clone(),
                });
            }
        }
    }

    check_cycles(&parents)?;

    let roots: Vec<LevelId> = edges
        .iter()
        .filter(|(_, parent)| parent.is_none())
        .map(|(id, _)| id.clone())
        .collect();
    match roots.len() {
        0 => Err(ConfigError::MissingRoot),
        1 => Ok(()),
        _ => Err(ConfigError::MultipleRoots { roots }),
    }
}

/// Detect cyclic parent links using DFS
fn check_cycles(parents: &BTreeMap<&str, Option<&str>>) -> Result<(), ConfigError> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Unvisited,
        Visiting,
        Visited,
    }

    let mut states: BTreeMap<&str, State> =
        parents.keys().map(|k| (*k, State::Unvisited)).collect();

    fn dfs<'a>(
        node: &'a str,
        parents: &BTreeMap<&'a str, Option<&'a str>>,
        states: &mut BTreeMap<&'a str, State>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), Vec<String>> {
        states.insert(node, State::Visiting);
        path.push(node);

        if let Some(Some(parent)) = parents.get(node).copied() {
            match states.get(parent) {
                Some(State::Visiting) => {
                    let cycle_start = path.iter().position(|n| *n == parent).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[cycle_start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(parent.to_string());
                    return Err(cycle);
                }
                Some(State::Unvisited) | None => {
                    dfs(parent, parents, states, path)?;
                }
                Some(State::Visited) => {}
            }
        }

        path.pop();
        states.insert(node, State::Visited);
        Ok(())
    }

    let ids: BTreeSet<&str> = parents.keys().copied().collect();
    for id in ids {
        if states.get(id) == Some(&State::Unvisited) {
            let mut path = Vec::new();
            if let Err(cycle) = dfs(id, parents, &mut states, &mut path) {
                return Err(ConfigError::CyclicDependency { cycle });
            }
        }
    }

    Ok(())
}
