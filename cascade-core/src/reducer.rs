use std::time::SystemTime;

use crate::model::{LevelId, SelectOption, SelectionMode};
use crate::state::{ChainState, OptionsState};

/// Who set a level's value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionOrigin {
    User,
    /// Remembered value from an earlier session
    Cached,
    /// Value handed in when the form was opened
    Preset,
    /// First option of a level that auto-selects
    First,
}

#[derive(Clone, Debug)]
pub enum ChainEvent {
    Seeded {
        mode: SelectionMode,
    },
    OptionsLoading {
        level: LevelId,
        generation: u64,
    },
    OptionsIdle {
        level: LevelId,
        generation: u64,
    },
    OptionsReady {
        level: LevelId,
        generation: u64,
        options: Vec<SelectOption>,
    },
    FetchFailed {
        level: LevelId,
        generation: u64,
        message: String,
    },
    Selected {
        level: LevelId,
        value: Option<String>,
        origin: SelectionOrigin,
    },
    Touched {
        level: LevelId,
    },
    StaleDiscarded {
        level: LevelId,
        generation: u64,
    },
}

#[derive(Clone, Debug)]
pub struct EventEnvelope {
    pub id: u64,
    pub at: SystemTime,
    pub event: ChainEvent,
}

/// Fold one chain event into a state mirror.
///
/// Replaying every event a chain emitted since creation onto
/// `ChainState::new(order)` yields the chain's own state.
pub fn reduce(state: &mut ChainState, env: &EventEnvelope) {
    match &env.event {
        ChainEvent::Seeded { .. } | ChainEvent::StaleDiscarded { .. } => {}
        ChainEvent::OptionsLoading { level, generation } => {
            if let Some(l) = state.get_mut(level) {
                l.options = OptionsState::Loading;
                l.selected = None;
                l.generation = *generation;
            }
        }
        ChainEvent::OptionsIdle { level, generation } => {
            if let Some(l) = state.get_mut(level) {
                l.options = OptionsState::Idle;
                l.selected = None;
                l.generation = *generation;
            }
        }
        ChainEvent::OptionsReady {
            level,
            generation,
            options,
        } => {
            if let Some(l) = state.get_mut(level) {
                l.options = OptionsState::Ready(options.clone());
                l.generation = *generation;
            }
        }
        ChainEvent::FetchFailed {
            level,
            generation,
            message,
        } => {
            if let Some(l) = state.get_mut(level) {
                l.options = OptionsState::Error(message.clone());
                l.generation = *generation;
            }
        }
        ChainEvent::Selected {
            level,
            value,
            origin,
        } => {
            if let Some(l) = state.get_mut(level) {
                l.selected = value.clone();
                if *origin == SelectionOrigin::User {
                    l.touched = true;
                }
            }
        }
        ChainEvent::Touched { level } => {
            if let Some(l) = state.get_mut(level) {
                l.touched = true;
            }
        }
    }
}
