//! Static shape of a selection chain and the owning handle forms talk to.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{broadcast, mpsc};

use crate::cache::{CachePolicy, CacheStore};
use crate::config::{ConfigError, check_topology};
use crate::engine::FetchCompletion;
use crate::model::{Level, LevelId, SelectionMode};
use crate::reducer::{ChainEvent, EventEnvelope, SelectionOrigin};
use crate::source::{Resolution, SubmitError, SubmitReceipt, SubmitSink};
use crate::state::{ChainState, OptionsState};
use crate::validation::ValidationGate;

/// Capacity of the per-chain event channel
const EVENT_CAPACITY: usize = 1_024;

/// Errors from setting a value on a level.
///
/// These are caller mistakes: the chain logs them and leaves its state
/// untouched.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("unknown level '{level}'")]
    UnknownLevel { level: LevelId },
    #[error("'{value}' is not one of the current options of level '{level}'")]
    InvalidSelection { level: LevelId, value: String },
    #[error("level '{level}' cannot be fetched until its parent has a value")]
    ParentUnresolved { level: LevelId },
}

/// Validated tree of levels.
#[derive(Debug)]
pub struct ChainDefinition {
    levels: BTreeMap<LevelId, Level>,
    children: BTreeMap<LevelId, Vec<LevelId>>,
    /// Depth-first order starting at the root
    order: Vec<LevelId>,
    root: LevelId,
}

/// Validate `levels` and build a chain definition.
pub fn define_chain(levels: Vec<Level>) -> Result<ChainDefinition, ConfigError> {
    let edges: Vec<(LevelId, Option<LevelId>)> = levels
        .iter()
        .map(|l| (l.id.clone(), l.parent.clone()))
        .collect();
    check_topology(&edges)?;

    let mut children: BTreeMap<LevelId, Vec<LevelId>> = BTreeMap::new();
    let mut root = None;
    for level in &levels {
        children.entry(level.id.clone()).or_default();
        match &level.parent {
            Some(parent) => children
                .entry(parent.clone())
                .or_default()
                .push(level.id.clone()),
            None => root = Some(level.id.clone()),
        }
    }
    let root = root.ok_or(ConfigError::MissingRoot)?;

    let levels: BTreeMap<LevelId, Level> =
        levels.into_iter().map(|l| (l.id.clone(), l)).collect();

    let mut definition = ChainDefinition {
        levels,
        children,
        order: Vec::new(),
        root,
    };
    let mut order = vec![definition.root.clone()];
    order.extend(definition.descendants(&definition.root));
    definition.order = order;
    Ok(definition)
}

impl ChainDefinition {
    pub fn root(&self) -> &LevelId {
        &self.root
    }

    pub fn level(&self, id: &str) -> Option<&Level> {
        self.levels.get(id)
    }

    /// Levels in depth-first order, root first
    pub fn levels(&self) -> impl Iterator<Item = &Level> {
        self.order.iter().filter_map(|id| self.levels.get(id))
    }

    pub fn order(&self) -> &[LevelId] {
        &self.order
    }

    pub fn children(&self, id: &str) -> &[LevelId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every level below `id`, depth-first
    pub fn descendants(&self, id: &str) -> Vec<LevelId> {
        let mut out = Vec::new();
        let mut stack: Vec<&LevelId> = self.children(id).iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next.clone());
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// Every level above `id`, nearest first
    pub fn ancestors(&self, id: &str) -> Vec<LevelId> {
        let mut out = Vec::new();
        let mut current = self.levels.get(id).and_then(|l| l.parent.as_ref());
        while let Some(parent) = current {
            out.push(parent.clone());
            current = self.levels.get(parent).and_then(|l| l.parent.as_ref());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Create a live chain for one form instance
    pub fn instantiate(self, mode: SelectionMode, store: Arc<dyn CacheStore>) -> Chain {
        Chain::new(Arc::new(self), mode, store)
    }
}

/// A live selection chain.
///
/// The owner is the only writer: selections apply synchronously, and fetch
/// results are applied when the owner drives [`Chain::next_completion`] or
/// [`Chain::settle`]. Methods that issue fetches spawn tokio tasks and must
/// be called from within a runtime.
pub struct Chain {
    pub(crate) definition: Arc<ChainDefinition>,
    pub(crate) state: ChainState,
    pub(crate) cache: CachePolicy,
    /// Values to pick on the next accepted fetch of each level, ahead of the cache
    pub(crate) presets: BTreeMap<LevelId, String>,
    pub(crate) completions_tx: mpsc::UnboundedSender<FetchCompletion>,
    pub(crate) completions_rx: mpsc::UnboundedReceiver<FetchCompletion>,
    pub(crate) in_flight: usize,
    pub(crate) events: broadcast::Sender<EventEnvelope>,
    next_event_id: u64,
}

impl Chain {
    pub fn new(
        definition: Arc<ChainDefinition>,
        mode: SelectionMode,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: ChainState::new(definition.order().to_vec()),
            definition,
            cache: CachePolicy::new(store, mode),
            presets: BTreeMap::new(),
            completions_tx,
            completions_rx,
            in_flight: 0,
            events,
            next_event_id: 1,
        }
    }

    pub fn definition(&self) -> &ChainDefinition {
        &self.definition
    }

    pub fn mode(&self) -> SelectionMode {
        self.cache.mode()
    }

    pub fn cache(&self) -> &CachePolicy {
        &self.cache
    }

    /// Read-only view of the current state
    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn snapshot(&self) -> ChainState {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    pub fn gate(&self) -> ValidationGate<'_> {
        ValidationGate::new(&self.definition, &self.state)
    }

    pub fn is_complete(&self) -> bool {
        self.gate().is_complete()
    }

    /// Start resolving from the root, picking remembered values as options arrive
    pub fn seed(&mut self) {
        self.seed_with(BTreeMap::new());
    }

    /// Like [`Chain::seed`], but `presets` win over remembered values.
    ///
    /// Presets are checked against the fetched options like cached values,
    /// and each one is used at most once.
    pub fn seed_with(&mut self, presets: BTreeMap<LevelId, String>) {
        self.presets = presets;
        let mode = self.mode();
        self.emit(ChainEvent::Seeded { mode });

        let root = self.definition.root().clone();
        self.reset_subtree(&root, OptionsState::Loading);
        self.issue_fetch(&root);
    }

    /// Explicit user selection: records the choice in the cache and marks the
    /// level touched.
    pub fn select(&mut self, id: &str, value: Option<&str>) -> Result<(), SelectionError> {
        self.set_value(id, value, SelectionOrigin::User)
    }

    /// Set `id` to `value` (or clear it) and re-resolve everything below it.
    ///
    /// `value` must be one of the level's current options. Descendants are
    /// cleared before this returns; their new options arrive through
    /// [`Chain::next_completion`].
    pub fn set_value(
        &mut self,
        id: &str,
        value: Option<&str>,
        origin: SelectionOrigin,
    ) -> Result<(), SelectionError> {
        let Some(level_state) = self.state.get(id) else {
            tracing::warn!(level = %id, "ignoring selection on unknown level");
            return Err(SelectionError::UnknownLevel {
                level: id.to_string(),
            });
        };

        if let Some(v) = value {
            if !level_state.options.contains(v) {
                tracing::warn!(
                    level = %id,
                    value = %v,
                    options = level_state.options.label(),
                    "ignoring selection not present in current options"
                );
                return Err(SelectionError::InvalidSelection {
                    level: id.to_string(),
                    value: v.to_string(),
                });
            }
        }

        self.apply_selection(id, value.map(str::to_string), origin);
        Ok(())
    }

    /// Mark a level as interacted with (e.g. the dropdown lost focus)
    pub fn touch(&mut self, id: &str) -> Result<(), SelectionError> {
        let Some(level_state) = self.state.get_mut(id) else {
            return Err(SelectionError::UnknownLevel {
                level: id.to_string(),
            });
        };
        if !level_state.touched {
            level_state.touched = true;
            self.emit(ChainEvent::Touched {
                level: id.to_string(),
            });
        }
        Ok(())
    }

    /// Resolved values, if the chain can be submitted
    pub fn prepare_submit(&self) -> Result<Resolution, SubmitError> {
        let gate = self.gate();
        gate.resolution().ok_or_else(|| SubmitError::Incomplete {
            blocking: gate.blocking(),
        })
    }

    /// Hand the resolved chain to `sink`; never calls the sink while incomplete
    pub async fn submit(&self, sink: &dyn SubmitSink) -> Result<SubmitReceipt, SubmitError> {
        submit_resolution(sink, self.prepare_submit()?).await
    }

    pub(crate) fn apply_selection(
        &mut self,
        id: &str,
        value: Option<String>,
        origin: SelectionOrigin,
    ) {
        if let Some(level_state) = self.state.get_mut(id) {
            level_state.selected = value.clone();
            if origin == SelectionOrigin::User {
                level_state.touched = true;
            }
        }
        self.emit(ChainEvent::Selected {
            level: id.to_string(),
            value: value.clone(),
            origin,
        });

        if origin == SelectionOrigin::User {
            if let (Some(v), Some(level)) = (&value, self.definition.level(id)) {
                self.cache.record(level, v);
            }
        }

        self.invalidate_below(id, value.is_some());
    }

    pub(crate) fn emit(&mut self, event: ChainEvent) {
        let _ = self.events.send(EventEnvelope {
            id: self.next_event_id,
            at: SystemTime::now(),
            event,
        });
        self.next_event_id += 1;
    }
}

/// Hand an already gated resolution to `sink`
pub(crate) async fn submit_resolution(
    sink: &dyn SubmitSink,
    resolution: Resolution,
) -> Result<SubmitReceipt, SubmitError> {
    let receipt = sink.submit(&resolution).await?;
    tracing::info!(receipt = %receipt.id, levels = resolution.len(), "chain submitted");
    Ok(receipt)
}
