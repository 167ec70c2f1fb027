use std::collections::BTreeMap;
use std::fmt;

use crate::chain::ChainDefinition;
use crate::model::LevelId;
use crate::source::Resolution;
use crate::state::{ChainState, OptionsState};

/// Why a level blocks submission, as shown next to its selector
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LevelError {
    /// Required, touched and still empty
    MissingSelection,
    FetchFailed { message: String },
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelError::MissingSelection => f.write_str("a value is required"),
            LevelError::FetchFailed { message } => write!(f, "failed to load options: {}", message),
        }
    }
}

/// Read-only view deciding whether a chain can be submitted.
pub struct ValidationGate<'a> {
    definition: &'a ChainDefinition,
    state: &'a ChainState,
}

impl<'a> ValidationGate<'a> {
    pub fn new(definition: &'a ChainDefinition, state: &'a ChainState) -> Self {
        Self { definition, state }
    }

    /// Every required level is selected and nothing is loading or failed
    pub fn is_complete(&self) -> bool {
        self.definition.levels().all(|level| {
            let Some(s) = self.state.get(&level.id) else {
                return false;
            };
            let settled = matches!(s.options, OptionsState::Idle | OptionsState::Ready(_));
            settled && (!level.required || s.selected.is_some())
        })
    }

    /// Errors to display, keyed by level.
    ///
    /// Missing values are only reported once the user has touched the level.
    pub fn errors(&self) -> BTreeMap<LevelId, LevelError> {
        let mut errors = BTreeMap::new();
        for level in self.definition.levels() {
            let Some(s) = self.state.get(&level.id) else {
                continue;
            };
            if let OptionsState::Error(message) = &s.options {
                errors.insert(
                    level.id.clone(),
                    LevelError::FetchFailed {
                        message: message.clone(),
                    },
                );
            } else if level.required && s.touched && s.selected.is_none() {
                errors.insert(level.id.clone(), LevelError::MissingSelection);
            }
        }
        errors
    }

    /// Levels that currently prevent submission, in chain order
    pub fn blocking(&self) -> Vec<LevelId> {
        self.definition
            .levels()
            .filter(|level| match self.state.get(&level.id) {
                Some(s) => {
                    matches!(s.options, OptionsState::Loading | OptionsState::Error(_))
                        || (level.required && s.selected.is_none())
                }
                None => true,
            })
            .map(|level| level.id.clone())
            .collect()
    }

    /// Selected value of every level that has one, only when complete
    pub fn resolution(&self) -> Option<Resolution> {
        self.is_complete().then(|| self.state.selections())
    }
}
