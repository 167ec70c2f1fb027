use std::collections::BTreeMap;

use crate::model::{LevelId, SelectOption};

/// Option list of one level
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OptionsState {
    /// Nothing to list yet (parent has no value)
    #[default]
    Idle,
    /// Fetch in flight, or waiting on an ancestor's fetch
    Loading,
    Ready(Vec<SelectOption>),
    /// Last fetch failed
    Error(String),
}

impl OptionsState {
    pub fn is_loading(&self) -> bool {
        matches!(self, OptionsState::Loading)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, OptionsState::Error(_))
    }

    /// Current options; empty unless ready
    pub fn options(&self) -> &[SelectOption] {
        match self {
            OptionsState::Ready(options) => options,
            _ => &[],
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.options().iter().any(|o| o.value == value)
    }

    pub fn label(&self) -> &'static str {
        match self {
            OptionsState::Idle => "idle",
            OptionsState::Loading => "loading",
            OptionsState::Ready(_) => "ready",
            OptionsState::Error(_) => "error",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelState {
    pub options: OptionsState,
    pub selected: Option<String>,
    /// Bumped every time the level is invalidated; fetch results carrying an
    /// older generation are discarded.
    pub generation: u64,
    /// The user has interacted with this level
    pub touched: bool,
}

impl LevelState {
    /// The option backing the current selection
    pub fn selected_option(&self) -> Option<&SelectOption> {
        let selected = self.selected.as_deref()?;
        self.options.options().iter().find(|o| o.value == selected)
    }
}

/// Resolved state of every level in a chain, in chain order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainState {
    order: Vec<LevelId>,
    levels: BTreeMap<LevelId, LevelState>,
}

impl ChainState {
    pub fn new(order: Vec<LevelId>) -> Self {
        let levels = order
            .iter()
            .map(|id| (id.clone(), LevelState::default()))
            .collect();
        Self { order, levels }
    }

    pub fn get(&self, id: &str) -> Option<&LevelState> {
        self.levels.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut LevelState> {
        self.levels.get_mut(id)
    }

    pub fn selected(&self, id: &str) -> Option<&str> {
        self.levels.get(id).and_then(|l| l.selected.as_deref())
    }

    pub fn options(&self, id: &str) -> &[SelectOption] {
        self.levels
            .get(id)
            .map(|l| l.options.options())
            .unwrap_or(&[])
    }

    /// Levels in chain order (parents before children)
    pub fn iter(&self) -> impl Iterator<Item = (&LevelId, &LevelState)> {
        self.order
            .iter()
            .filter_map(|id| self.levels.get(id).map(|state| (id, state)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// No level is waiting on a fetch
    pub fn is_settled(&self) -> bool {
        self.levels.values().all(|l| !l.options.is_loading())
    }

    /// Every selected value, keyed by level id
    pub fn selections(&self) -> BTreeMap<LevelId, String> {
        self.levels
            .iter()
            .filter_map(|(id, l)| l.selected.clone().map(|v| (id.clone(), v)))
            .collect()
    }
}
