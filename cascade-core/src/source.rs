//! Collaborator contracts the engine consumes.
//!
//! A chain never talks to the network itself: each level is backed by a
//! [`DataSource`], and a fully resolved chain is handed to a [`SubmitSink`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{LevelId, SelectOption, SelectionMode};

/// Everything a data source needs to list one level's options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Level whose options are being listed
    pub level: LevelId,
    /// Selected value of the direct parent (`None` for the root)
    pub parent: Option<String>,
    /// Selected values of every ancestor, keyed by level id
    pub ancestors: BTreeMap<LevelId, String>,
    pub mode: SelectionMode,
}

impl FetchRequest {
    pub fn ancestor(&self, id: &str) -> Option<&str> {
        self.ancestors.get(id).map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FetchError {
    pub message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Lists the options of one level.
///
/// Calls must be idempotent reads: the engine may issue the same request
/// more than once and drop results that arrive after a newer request.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<SelectOption>, FetchError>;

    /// Name used in logs
    fn name(&self) -> &'static str {
        "source"
    }
}

/// Selected value per level, as handed to a [`SubmitSink`]
pub type Resolution = BTreeMap<LevelId, String>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("chain is incomplete, waiting on: {}", .blocking.join(", "))]
    Incomplete { blocking: Vec<LevelId> },
    #[error("submit rejected: {message}")]
    Rejected { message: String },
}

/// Receives a fully resolved chain (create/update request in the console).
#[async_trait]
pub trait SubmitSink: Send + Sync {
    async fn submit(&self, resolution: &Resolution) -> Result<SubmitReceipt, SubmitError>;
}
