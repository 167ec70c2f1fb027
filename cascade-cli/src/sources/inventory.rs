use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use cascade_core::model::{LevelId, OptionGroup, SelectOption};
use cascade_core::source::{DataSource, FetchError, FetchRequest};

/// Canned option lists standing in for the console's list APIs.
///
/// ```yaml
/// latency_ms: 40
/// levels:
///   cluster:
///     options:
///       "": [cls-1, { value: cls-2, label: staging }]
///   namespace:
///     failing: [cls-3]
///     options:
///       cls-1: [kube-system, default]
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Inventory {
    /// Simulated round trip for every fetch
    #[serde(default)]
    pub latency_ms: u64,

    #[serde(default)]
    pub levels: BTreeMap<LevelId, LevelInventory>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LevelInventory {
    /// Options per parent value (`""` for the root)
    #[serde(default)]
    pub options: BTreeMap<String, Vec<OptionEntry>>,

    /// Parent values whose fetch fails
    #[serde(default)]
    pub failing: Vec<String>,

    /// Per-parent latency overriding the inventory default
    #[serde(default)]
    pub latency_ms: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum OptionEntry {
    Plain(String),
    Full {
        value: String,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        group: Option<OptionGroup>,
        #[serde(default)]
        raw: serde_json::Value,
    },
}

impl OptionEntry {
    fn to_option(&self) -> SelectOption {
        match self {
            OptionEntry::Plain(value) => SelectOption::plain(value.clone()),
            OptionEntry::Full {
                value,
                label,
                group,
                raw,
            } => {
                let mut option = SelectOption::new(
                    value.clone(),
                    label.clone().unwrap_or_else(|| value.clone()),
                )
                .with_raw(raw.clone());
                option.group = group.clone();
                option
            }
        }
    }
}

impl Inventory {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read inventory {}", path.display()))?;
        Self::from_str(&content)
            .with_context(|| format!("invalid inventory {}", path.display()))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn latency_for(&self, level: &LevelInventory, parent: &str) -> Duration {
        let ms = level
            .latency_ms
            .get(parent)
            .copied()
            .unwrap_or(self.latency_ms);
        Duration::from_millis(ms)
    }
}

/// Data source answering every level from one [`Inventory`]
#[derive(Clone, Debug)]
pub struct InventorySource {
    inventory: Arc<Inventory>,
}

impl InventorySource {
    pub fn new(inventory: Inventory) -> Self {
        Self {
            inventory: Arc::new(inventory),
        }
    }
}

#[async_trait]
impl DataSource for InventorySource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<SelectOption>, FetchError> {
        let Some(level) = self.inventory.levels.get(&request.level) else {
            return Err(FetchError::new(format!(
                "inventory has no entry for level '{}'",
                request.level
            )));
        };
        let parent = request.parent.as_deref().unwrap_or_default();

        let latency = self.inventory.latency_for(level, parent);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if level.failing.iter().any(|p| p == parent) {
            return Err(FetchError::new(format!(
                "listing {} under '{}' failed",
                request.level, parent
            )));
        }

        // an unknown parent lists nothing, like an empty API page
        Ok(level
            .options
            .get(parent)
            .map(|entries| entries.iter().map(OptionEntry::to_option).collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "inventory"
    }
}
