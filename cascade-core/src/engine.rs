//! Resolution: keeping every level's options consistent with its parent.
//!
//! Changing a level clears everything below it before any fetch starts, so no
//! observer ever sees a child populated while an ancestor is mid-change.
//! Each fetch carries the generation its level had when the fetch was issued;
//! a result whose generation no longer matches was superseded and is dropped.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::chain::{Chain, SelectionError};
use crate::model::{AutoSelect, LevelId, SelectOption};
use crate::reducer::{ChainEvent, SelectionOrigin};
use crate::source::{FetchError, FetchRequest};
use crate::state::OptionsState;

/// Result of one fetch, sent back to the chain's owner
#[derive(Debug)]
pub(crate) struct FetchCompletion {
    pub(crate) level: LevelId,
    pub(crate) generation: u64,
    pub(crate) result: Result<Vec<SelectOption>, FetchError>,
}

impl Chain {
    /// Fetches issued but not yet applied, superseded ones included
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn has_in_flight(&self) -> bool {
        self.in_flight > 0
    }

    /// Wait for the next fetch result and apply it.
    ///
    /// Returns the level the result belonged to (even if it was discarded as
    /// stale), or `None` when nothing is in flight. Cancel-safe: a result is
    /// either fully applied or still queued.
    pub async fn next_completion(&mut self) -> Option<LevelId> {
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.completions_rx.recv().await?;
        let level = completion.level.clone();
        self.apply_completion(completion);
        Some(level)
    }

    /// Apply results until no fetch is in flight
    pub async fn settle(&mut self) {
        while self.next_completion().await.is_some() {}
    }

    /// Refetch a level's options, e.g. after a failed fetch.
    ///
    /// The level's parent must have a value (the root can always be retried).
    pub fn retry(&mut self, id: &str) -> Result<(), SelectionError> {
        let Some(level) = self.definition.level(id) else {
            return Err(SelectionError::UnknownLevel {
                level: id.to_string(),
            });
        };
        if let Some(parent) = &level.parent {
            if self.state.selected(parent).is_none() {
                return Err(SelectionError::ParentUnresolved {
                    level: id.to_string(),
                });
            }
        }

        tracing::debug!(level = %id, "retrying fetch");
        self.reset_subtree(id, OptionsState::Loading);
        self.issue_fetch(id);
        Ok(())
    }

    /// Clear every level below `id`, then fetch its direct children if it
    /// now has a value.
    pub(crate) fn invalidate_below(&mut self, id: &str, has_value: bool) {
        let children = self.definition.children(id).to_vec();
        let options = if has_value {
            OptionsState::Loading
        } else {
            OptionsState::Idle
        };

        for child in &children {
            self.reset_subtree(child, options.clone());
        }
        if has_value {
            for child in &children {
                self.issue_fetch(child);
            }
        }
    }

    /// Give `id` and all its descendants `options`, no selection and a fresh
    /// generation.
    pub(crate) fn reset_subtree(&mut self, id: &str, options: OptionsState) {
        let mut ids = vec![id.to_string()];
        ids.extend(self.definition.descendants(id));

        for level in ids {
            let Some(level_state) = self.state.get_mut(&level) else {
                continue;
            };
            level_state.generation += 1;
            level_state.selected = None;
            level_state.options = options.clone();
            let generation = level_state.generation;

            let event = match options {
                OptionsState::Loading => ChainEvent::OptionsLoading { level, generation },
                _ => ChainEvent::OptionsIdle { level, generation },
            };
            self.emit(event);
        }
    }

    /// Spawn a fetch for `id` tagged with its current generation
    pub(crate) fn issue_fetch(&mut self, id: &str) {
        let Some(level) = self.definition.level(id) else {
            return;
        };
        let Some(generation) = self.state.get(id).map(|l| l.generation) else {
            return;
        };

        let parent = level
            .parent
            .as_deref()
            .and_then(|p| self.state.selected(p))
            .map(str::to_string);
        let ancestors = self
            .definition
            .ancestors(id)
            .into_iter()
            .filter_map(|a| self.state.selected(&a).map(|v| (a.clone(), v.to_string())))
            .collect();
        let request = FetchRequest {
            level: id.to_string(),
            parent,
            ancestors,
            mode: self.mode(),
        };

        tracing::debug!(
            level = %id,
            generation,
            parent = ?request.parent,
            source = level.source.name(),
            "fetching options"
        );

        let source = Arc::clone(&level.source);
        let tx = self.completions_tx.clone();
        let level_id = request.level.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            // a panicking source must still report back, or in_flight never drains
            let fetch = tokio::spawn(async move { source.fetch(&request).await });
            let result = match fetch.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(level = %level_id, error = %e, "data source task failed");
                    Err(FetchError::new(format!("data source task failed: {}", e)))
                }
            };
            let _ = tx.send(FetchCompletion {
                level: level_id,
                generation,
                result,
            });
        });
    }

    pub(crate) fn apply_completion(&mut self, completion: FetchCompletion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        let FetchCompletion {
            level,
            generation,
            result,
        } = completion;

        let Some(current) = self.state.get(&level) else {
            return;
        };
        if current.generation != generation || !current.options.is_loading() {
            tracing::trace!(
                level = %level,
                generation,
                current = current.generation,
                "discarding superseded fetch result"
            );
            self.emit(ChainEvent::StaleDiscarded { level, generation });
            return;
        }

        let result = result.and_then(|options| match first_duplicate(&options) {
            Some(dup) => Err(FetchError::new(format!(
                "source returned duplicate option value '{}'",
                dup
            ))),
            None => Ok(options),
        });

        match result {
            Err(error) => {
                tracing::debug!(level = %level, %error, "fetch failed");
                if let Some(level_state) = self.state.get_mut(&level) {
                    level_state.options = OptionsState::Error(error.message.clone());
                }
                self.emit(ChainEvent::FetchFailed {
                    level: level.clone(),
                    generation,
                    message: error.message,
                });
                self.invalidate_below(&level, false);
            }
            Ok(options) => {
                tracing::debug!(level = %level, count = options.len(), "options loaded");
                if let Some(level_state) = self.state.get_mut(&level) {
                    level_state.options = OptionsState::Ready(options.clone());
                }
                self.emit(ChainEvent::OptionsReady {
                    level: level.clone(),
                    generation,
                    options,
                });

                match self.pick_automatic(&level) {
                    Some((value, origin)) => self.apply_selection(&level, Some(value), origin),
                    None => self.invalidate_below(&level, false),
                }
            }
        }
    }

    /// Value to select on the user's behalf once `id` has options: a preset,
    /// then the remembered value, then (if the level allows) the first option.
    fn pick_automatic(&mut self, id: &str) -> Option<(String, SelectionOrigin)> {
        let level = self.definition.level(id)?;
        let options = self.state.get(id)?.options.clone();

        if let Some(preset) = self.presets.remove(id) {
            if options.contains(&preset) {
                return Some((preset, SelectionOrigin::Preset));
            }
            tracing::debug!(level = %id, value = %preset, "preset no longer offered");
        }

        if level.auto_select == AutoSelect::Never {
            return None;
        }

        if let Some(cached) = self.cache.lookup(level) {
            if options.contains(&cached) {
                return Some((cached, SelectionOrigin::Cached));
            }
            tracing::debug!(level = %id, value = %cached, "cached value no longer offered");
        }

        if level.auto_select == AutoSelect::CachedOrFirst {
            return options
                .options()
                .first()
                .map(|o| (o.value.clone(), SelectionOrigin::First));
        }

        None
    }
}

fn first_duplicate(options: &[SelectOption]) -> Option<&str> {
    let mut seen = BTreeSet::new();
    options
        .iter()
        .find(|o| !seen.insert(o.value.as_str()))
        .map(|o| o.value.as_str())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::cache::{CacheStore, MemoryCacheStore};
    use crate::chain::define_chain;
    use crate::model::{Level, SelectionMode};
    use crate::source::DataSource;
    use crate::state::ChainState;
    use crate::testing::ScriptedSource;

    fn cluster_namespace(source: &Arc<ScriptedSource>, store: Arc<MemoryCacheStore>) -> Chain {
        define_chain(vec![
            Level::root("cluster", source.clone()).cache_key("selectedClusterName"),
            Level::child("namespace", "cluster", source.clone())
                .cache_key("selectedNamespace")
                .mode_scoped(),
        ])
        .unwrap()
        .instantiate(SelectionMode::Platform, store)
    }

    fn clb_chain(source: &Arc<ScriptedSource>, store: Arc<MemoryCacheStore>) -> Chain {
        define_chain(vec![
            Level::root("cluster", source.clone()).cache_key("selectedClusterName"),
            Level::child("namespace", "cluster", source.clone()).mode_scoped(),
            Level::child("instance", "namespace", source.clone()),
            Level::child("listener", "instance", source.clone()).without_cache(),
        ])
        .unwrap()
        .instantiate(SelectionMode::Platform, store)
    }

    /// No level holds a value outside its options, and nothing below an
    /// empty level holds a value.
    fn assert_invariants(chain: &Chain) {
        let state: &ChainState = chain.state();
        for (id, level) in state.iter() {
            if let Some(selected) = &level.selected {
                assert!(
                    level.options.contains(selected),
                    "{} selected {} outside its options",
                    id,
                    selected
                );
            } else {
                for below in chain.definition().descendants(id) {
                    assert_eq!(
                        state.selected(&below),
                        None,
                        "{} has a value while ancestor {} is empty",
                        below,
                        id
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn test_cluster_then_namespace_scenario() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1", "cls-2"]);
        source.respond("namespace", Some("cls-1"), &["kube-system", "default"]);
        let mut chain = cluster_namespace(&source, Arc::new(MemoryCacheStore::new()));

        chain.seed();
        chain.settle().await;
        assert_eq!(chain.state().selected("cluster"), None);
        assert!(!chain.is_complete());

        chain.select("cluster", Some("cls-1")).unwrap();
        assert!(chain.state().get("namespace").unwrap().options.is_loading());
        assert!(!chain.is_complete());
        assert_invariants(&chain);

        chain.settle().await;
        let values: Vec<&str> = chain
            .state()
            .options("namespace")
            .iter()
            .map(|o| o.value.as_str())
            .collect();
        assert_eq!(values, vec!["kube-system", "default"]);
        assert!(!chain.is_complete());

        chain.select("namespace", Some("default")).unwrap();
        assert!(chain.is_complete());
        assert_invariants(&chain);
    }

    #[tokio::test]
    async fn test_late_result_from_superseded_selection_is_discarded() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1", "cls-2"]);
        let first = source.gate("namespace", Some("cls-1"), &["from-cls-1"]);
        let second = source.gate("namespace", Some("cls-2"), &["from-cls-2"]);
        let mut chain = cluster_namespace(&source, Arc::new(MemoryCacheStore::new()));

        chain.seed();
        chain.settle().await;

        chain.select("cluster", Some("cls-1")).unwrap();
        chain.select("cluster", Some("cls-2")).unwrap();
        assert_eq!(chain.in_flight(), 2);

        // the newer fetch lands first, the older one arrives late
        second.release();
        assert_eq!(chain.next_completion().await.as_deref(), Some("namespace"));
        first.release();
        assert_eq!(chain.next_completion().await.as_deref(), Some("namespace"));
        assert!(!chain.has_in_flight());

        let values: Vec<&str> = chain
            .state()
            .options("namespace")
            .iter()
            .map(|o| o.value.as_str())
            .collect();
        assert_eq!(values, vec!["from-cls-2"]);
        assert_invariants(&chain);
    }

    #[tokio::test]
    async fn test_superseded_result_discarded_in_issue_order() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1", "cls-2"]);
        let first = source.gate("namespace", Some("cls-1"), &["from-cls-1"]);
        let second = source.gate("namespace", Some("cls-2"), &["from-cls-2"]);
        let mut chain = cluster_namespace(&source, Arc::new(MemoryCacheStore::new()));
        let mut events = chain.subscribe();

        chain.seed();
        chain.settle().await;
        chain.select("cluster", Some("cls-1")).unwrap();
        chain.select("cluster", Some("cls-2")).unwrap();

        first.release();
        chain.next_completion().await;
        // the stale result must not show up, even momentarily
        assert!(chain.state().get("namespace").unwrap().options.is_loading());

        second.release();
        chain.next_completion().await;
        assert!(chain.state().get("namespace").unwrap().options.contains("from-cls-2"));
        assert!(!chain.state().get("namespace").unwrap().options.contains("from-cls-1"));

        let mut stale = 0;
        while let Ok(env) = events.try_recv() {
            match env.event {
                ChainEvent::StaleDiscarded { level, .. } => {
                    assert_eq!(level, "namespace");
                    stale += 1;
                }
                ChainEvent::OptionsReady { level, options, .. } if level == "namespace" => {
                    assert_eq!(options, vec![SelectOption::plain("from-cls-2")]);
                }
                _ => {}
            }
        }
        assert_eq!(stale, 1);
    }

    #[tokio::test]
    async fn test_cascade_clears_every_descendant_before_fetching() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1", "cls-2"]);
        source.respond("namespace", Some("cls-1"), &["default"]);
        source.respond("namespace", Some("cls-2"), &["default"]);
        source.respond("instance", Some("default"), &["lb-1"]);
        source.respond("listener", Some("lb-1"), &["http-80"]);
        let mut chain = clb_chain(&source, Arc::new(MemoryCacheStore::new()));

        chain.seed();
        chain.settle().await;
        chain.select("cluster", Some("cls-1")).unwrap();
        chain.settle().await;
        chain.select("namespace", Some("default")).unwrap();
        chain.settle().await;
        chain.select("instance", Some("lb-1")).unwrap();
        chain.settle().await;
        chain.select("listener", Some("http-80")).unwrap();
        assert!(chain.is_complete());

        let fetches_before = source.calls().len();
        chain.select("cluster", Some("cls-2")).unwrap();

        // synchronous: nothing below cluster has a value, all pending
        for id in ["namespace", "instance", "listener"] {
            let level = chain.state().get(id).unwrap();
            assert_eq!(level.selected, None);
            assert!(level.options.is_loading());
        }
        assert_invariants(&chain);

        chain.settle().await;
        // remembered values carry the chain down to the uncached listener
        assert_eq!(source.calls().len(), fetches_before + 3);
        assert_eq!(chain.state().selected("namespace"), Some("default"));
        assert_eq!(chain.state().selected("instance"), Some("lb-1"));
        assert_eq!(chain.state().selected("listener"), None);
        assert!(chain.state().get("listener").unwrap().options.contains("http-80"));
        assert!(!chain.is_complete());
        assert_invariants(&chain);
    }

    #[tokio::test]
    async fn test_clearing_a_level_empties_descendants() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1"]);
        source.respond("namespace", Some("cls-1"), &["default"]);
        let mut chain = cluster_namespace(&source, Arc::new(MemoryCacheStore::new()));

        chain.seed();
        chain.settle().await;
        chain.select("cluster", Some("cls-1")).unwrap();
        chain.settle().await;
        chain.select("namespace", Some("default")).unwrap();

        chain.select("cluster", None).unwrap();
        assert!(!chain.has_in_flight());
        let ns = chain.state().get("namespace").unwrap();
        assert_eq!(ns.options, OptionsState::Idle);
        assert_eq!(ns.selected, None);
        assert_invariants(&chain);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_state_not_error() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1"]);
        source.fail("namespace", Some("cls-1"), "503 from apiserver");
        let mut chain = clb_chain(&source, Arc::new(MemoryCacheStore::new()));

        chain.seed();
        chain.settle().await;
        assert!(chain.select("cluster", Some("cls-1")).is_ok());
        chain.settle().await;

        let ns = chain.state().get("namespace").unwrap();
        assert_eq!(ns.options, OptionsState::Error("503 from apiserver".into()));
        assert_eq!(chain.state().get("instance").unwrap().options, OptionsState::Idle);
        assert!(!chain.is_complete());

        // manual retry once the source recovers
        source.respond("namespace", Some("cls-1"), &["default"]);
        chain.retry("namespace").unwrap();
        assert!(chain.state().get("namespace").unwrap().options.is_loading());
        chain.settle().await;
        assert!(chain.state().get("namespace").unwrap().options.contains("default"));
    }

    struct PanickingSource;

    #[async_trait::async_trait]
    impl DataSource for PanickingSource {
        async fn fetch(&self, _request: &FetchRequest) -> Result<Vec<SelectOption>, FetchError> {
            panic!("cluster listing blew up")
        }
    }

    #[tokio::test]
    async fn test_panicking_source_becomes_fetch_failure() {
        let source: Arc<dyn DataSource> = Arc::new(PanickingSource);
        let mut chain = define_chain(vec![Level::root("cluster", source)])
            .unwrap()
            .instantiate(SelectionMode::Platform, Arc::new(MemoryCacheStore::new()));

        chain.seed();
        tokio::time::timeout(std::time::Duration::from_secs(2), chain.settle())
            .await
            .expect("settle returns once the failed fetch is applied");

        assert_eq!(chain.in_flight(), 0);
        assert!(matches!(
            chain.state().get("cluster").unwrap().options,
            OptionsState::Error(_)
        ));
        assert!(!chain.is_complete());
    }

    #[tokio::test]
    async fn test_retry_requires_resolved_parent() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1"]);
        let mut chain = cluster_namespace(&source, Arc::new(MemoryCacheStore::new()));

        chain.seed();
        chain.settle().await;
        assert_eq!(
            chain.retry("namespace"),
            Err(SelectionError::ParentUnresolved {
                level: "namespace".into()
            })
        );
        assert!(chain.retry("cluster").is_ok());
        chain.settle().await;
    }

    #[tokio::test]
    async fn test_duplicate_option_values_fail_the_fetch() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1", "cls-1"]);
        let mut chain = cluster_namespace(&source, Arc::new(MemoryCacheStore::new()));

        chain.seed();
        chain.settle().await;
        assert!(chain.state().get("cluster").unwrap().options.is_error());
    }

    #[tokio::test]
    async fn test_cache_round_trip_across_chains() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1", "cls-2"]);
        source.respond("namespace", Some("cls-2"), &["kube-system", "default"]);
        let store = Arc::new(MemoryCacheStore::new());

        let mut first = cluster_namespace(&source, store.clone());
        first.seed();
        first.settle().await;
        first.select("cluster", Some("cls-2")).unwrap();
        first.settle().await;
        first.select("namespace", Some("default")).unwrap();
        drop(first);

        assert_eq!(store.get("selectedClusterName").as_deref(), Some("cls-2"));
        assert_eq!(
            store.get("selectedNamespaceForPlatform").as_deref(),
            Some("default")
        );

        let mut second = cluster_namespace(&source, store);
        second.seed();
        second.settle().await;
        assert_eq!(second.state().selected("cluster"), Some("cls-2"));
        assert_eq!(second.state().selected("namespace"), Some("default"));
        assert!(second.is_complete());
        // restored values are not user interaction
        assert!(!second.state().get("cluster").unwrap().touched);
    }

    #[tokio::test]
    async fn test_stale_cached_value_is_not_selected() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1", "cls-2"]);
        let store = Arc::new(MemoryCacheStore::new());
        store.set("selectedClusterName", "cls-9");

        let mut chain = cluster_namespace(&source, store.clone());
        chain.seed();
        chain.settle().await;

        assert_eq!(chain.state().selected("cluster"), None);
        assert_eq!(chain.state().get("namespace").unwrap().options, OptionsState::Idle);
        // a miss is not rewritten or cleared
        assert_eq!(store.get("selectedClusterName").as_deref(), Some("cls-9"));
    }

    #[tokio::test]
    async fn test_auto_selected_values_are_not_recorded() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1", "cls-2"]);
        source.respond("namespace", Some("cls-1"), &["default"]);
        let store = Arc::new(MemoryCacheStore::new());
        store.set("selectedClusterName", "cls-1");

        let mut chain = cluster_namespace(&source, store.clone());
        chain.seed();
        chain.settle().await;
        assert_eq!(chain.state().selected("cluster"), Some("cls-1"));
        assert_eq!(store.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_cached_child_reapplied_after_parent_change() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1", "cls-2"]);
        source.respond("namespace", Some("cls-1"), &["default", "team-a"]);
        source.respond("namespace", Some("cls-2"), &["team-a"]);
        let store = Arc::new(MemoryCacheStore::new());
        store.set("selectedNamespaceForPlatform", "team-a");

        let mut chain = cluster_namespace(&source, store);
        chain.seed();
        chain.settle().await;
        chain.select("cluster", Some("cls-2")).unwrap();
        chain.settle().await;
        assert_eq!(chain.state().selected("namespace"), Some("team-a"));
    }

    #[tokio::test]
    async fn test_mode_scoped_cache_keeps_sides_apart() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1"]);
        source.respond("namespace", Some("cls-1"), &["default", "team-a"]);
        let store = Arc::new(MemoryCacheStore::new());
        store.set("selectedClusterName", "cls-1");
        store.set("selectedNamespaceForBusiness", "team-a");

        let levels = || {
            vec![
                Level::root("cluster", source.clone()).cache_key("selectedClusterName"),
                Level::child("namespace", "cluster", source.clone())
                    .cache_key("selectedNamespace")
                    .mode_scoped(),
            ]
        };

        let mut platform = define_chain(levels())
            .unwrap()
            .instantiate(SelectionMode::Platform, store.clone());
        platform.seed();
        platform.settle().await;
        assert_eq!(platform.state().selected("namespace"), None);

        let mut business = define_chain(levels())
            .unwrap()
            .instantiate(SelectionMode::Business, store);
        business.seed();
        business.settle().await;
        assert_eq!(business.state().selected("namespace"), Some("team-a"));
    }

    #[tokio::test]
    async fn test_presets_win_over_cache_and_apply_once() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1", "cls-2"]);
        source.respond("namespace", Some("cls-1"), &["default"]);
        source.respond("namespace", Some("cls-2"), &["default"]);
        let store = Arc::new(MemoryCacheStore::new());
        store.set("selectedClusterName", "cls-2");

        let mut chain = cluster_namespace(&source, store);
        let mut presets = BTreeMap::new();
        presets.insert("cluster".to_string(), "cls-1".to_string());
        chain.seed_with(presets);
        chain.settle().await;
        assert_eq!(chain.state().selected("cluster"), Some("cls-1"));

        // a later root refetch falls back to the cache
        chain.retry("cluster").unwrap();
        chain.settle().await;
        assert_eq!(chain.state().selected("cluster"), Some("cls-2"));
    }

    #[tokio::test]
    async fn test_cached_or_first_policy() {
        let source = ScriptedSource::new();
        source.respond("project", None, &["prj-a", "prj-b"]);
        source.respond("namespace", Some("prj-a"), &["ns-1", "ns-2"]);
        source.respond("workload", Some("ns-1"), &[]);
        let mut chain = define_chain(vec![
            Level::root("project", source.clone()).auto_select(AutoSelect::CachedOrFirst),
            Level::child("namespace", "project", source.clone())
                .auto_select(AutoSelect::CachedOrFirst),
            Level::child("workload", "namespace", source.clone())
                .auto_select(AutoSelect::CachedOrFirst),
        ])
        .unwrap()
        .instantiate(SelectionMode::Business, Arc::new(MemoryCacheStore::new()));

        chain.seed();
        chain.settle().await;
        assert_eq!(chain.state().selected("project"), Some("prj-a"));
        assert_eq!(chain.state().selected("namespace"), Some("ns-1"));
        // nothing to pick from an empty list
        assert_eq!(chain.state().selected("workload"), None);
        assert!(!chain.is_complete());
    }

    #[tokio::test]
    async fn test_never_policy_ignores_cache() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1"]);
        let store = Arc::new(MemoryCacheStore::new());
        store.set("cluster", "cls-1");

        let mut chain = define_chain(vec![
            Level::root("cluster", source.clone()).auto_select(AutoSelect::Never),
        ])
        .unwrap()
        .instantiate(SelectionMode::Platform, store);
        chain.seed();
        chain.settle().await;
        assert_eq!(chain.state().selected("cluster"), None);
    }

    #[tokio::test]
    async fn test_fetch_request_carries_ancestors() {
        let source = ScriptedSource::new();
        source.respond("cluster", None, &["cls-1"]);
        source.respond("namespace", Some("cls-1"), &["default"]);
        source.respond("instance", Some("default"), &["lb-1"]);
        source.respond("listener", Some("lb-1"), &["http-80"]);
        let mut chain = clb_chain(&source, Arc::new(MemoryCacheStore::new()));

        chain.seed();
        chain.settle().await;
        chain.select("cluster", Some("cls-1")).unwrap();
        chain.settle().await;
        chain.select("namespace", Some("default")).unwrap();
        chain.settle().await;
        chain.select("instance", Some("lb-1")).unwrap();
        chain.settle().await;

        let request = source
            .calls()
            .into_iter()
            .find(|r| r.level == "listener")
            .unwrap();
        assert_eq!(request.parent.as_deref(), Some("lb-1"));
        assert_eq!(request.ancestor("cluster"), Some("cls-1"));
        assert_eq!(request.ancestor("namespace"), Some("default"));
        assert_eq!(request.mode, SelectionMode::Platform);
    }
}
