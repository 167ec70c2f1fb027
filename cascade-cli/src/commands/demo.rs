use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::broadcast;

use cascade_core::cache::MemoryCacheStore;
use cascade_core::chain::Chain;
use cascade_core::config::ChainConfig;
use cascade_core::model::SelectionMode;
use cascade_core::reducer::{ChainEvent, EventEnvelope};
use cascade_core::source::{DataSource, SubmitReceipt};

use super::build_chain;
use crate::render;
use crate::sink::StdoutSink;
use crate::sources::{Inventory, InventorySource};

const CLB_CONFIG: &str = r#"
name: clb-listener-rule
mode: platform
levels:
  - id: cluster
    label: Cluster
    cache_key: selectedClusterName
  - id: namespace
    parent: cluster
    label: Namespace
    cache_key: selectedNamespace
    mode_scoped: true
  - id: instance
    parent: namespace
    label: CLB instance
  - id: listener
    parent: instance
    label: Listener
    cache: false
"#;

const CLB_INVENTORY: &str = r#"
latency_ms: 20
levels:
  cluster:
    options:
      "":
        - { value: cls-1, label: prod }
        - { value: cls-2, label: staging }
  namespace:
    latency_ms:
      cls-1: 300
    options:
      cls-1: [kube-system, default]
      cls-2: [default, team-a]
  instance:
    options:
      default:
        - { value: lb-1a2b, label: web-gateway, raw: { vip: 10.0.0.12 } }
        - { value: lb-3c4d, label: internal-api }
      team-a:
        - { value: lb-5e6f, label: team-a-ingress }
  listener:
    options:
      lb-1a2b:
        - { value: lsn-80, label: "HTTP:80" }
        - { value: lsn-443, label: "HTTPS:443" }
      lb-3c4d:
        - { value: lsn-8080, label: "TCP:8080" }
"#;

const POLARIS_CONFIG: &str = r#"
name: polaris-route-rule
mode: business
levels:
  - id: project
    label: Project
    cache_key: selectedProject
    auto_select: cached_or_first
  - id: namespace
    parent: project
    label: Namespace
    cache_key: selectedNamespace
    mode_scoped: true
    auto_select: cached_or_first
  - id: workload
    parent: namespace
    label: Workload
    required: false
"#;

const POLARIS_INVENTORY: &str = r#"
latency_ms: 20
levels:
  project:
    options:
      "":
        - { value: prj-a, label: payments }
        - { value: prj-b, label: search }
  namespace:
    options:
      prj-a:
        - { value: pay-prod, group: { key: cls-1, label: prod } }
        - { value: pay-staging, group: { key: cls-2, label: staging } }
      prj-b:
        - { value: search-prod, group: { key: cls-1, label: prod } }
  workload:
    options:
      pay-prod: [checkout, ledger]
      search-prod: [indexer]
"#;

/// What a demo run ended with
#[derive(Debug)]
pub struct DemoOutcome {
    pub stale_discarded: usize,
    pub receipt: SubmitReceipt,
}

pub async fn run_demo(mode: SelectionMode) -> anyhow::Result<DemoOutcome> {
    match mode {
        SelectionMode::Platform => run_clb_demo().await,
        SelectionMode::Business => run_polaris_demo().await,
    }
}

fn demo_chain(
    config: &str,
    inventory: &str,
    store: Arc<MemoryCacheStore>,
) -> anyhow::Result<Chain> {
    let config = ChainConfig::from_str(config)?;
    let source: Arc<dyn DataSource> = Arc::new(InventorySource::new(Inventory::from_str(inventory)?));
    build_chain(&config, source, config.mode, store)
}

/// Print what happened since the last step, returning how many results
/// were discarded as superseded
fn step(title: &str, chain: &Chain, events: &mut broadcast::Receiver<EventEnvelope>) -> usize {
    println!("-- {}", title);
    let mut stale = 0;
    while let Ok(env) = events.try_recv() {
        if matches!(env.event, ChainEvent::StaleDiscarded { .. }) {
            stale += 1;
        }
        println!("   {}", render::event_line(&env));
    }
    print!("{}", render::state_table(chain.definition(), chain.state()));
    print!("{}", render::gate_summary(&chain.gate()));
    println!();
    stale
}

fn first_option(chain: &Chain, level: &str) -> Option<String> {
    chain.state().options(level).first().map(|o| o.value.clone())
}

async fn run_clb_demo() -> anyhow::Result<DemoOutcome> {
    println!("CLB listener rule form (platform)\n");

    // remembered from a cluster that has since been deleted
    let store = Arc::new(MemoryCacheStore::with_entries([("selectedClusterName", "cls-9")]));
    let mut chain = demo_chain(CLB_CONFIG, CLB_INVENTORY, store)?;
    let mut events = chain.subscribe();
    let mut stale = 0;

    chain.seed();
    chain.settle().await;
    stale += step(
        "form opened; remembered cluster cls-9 is no longer listed",
        &chain,
        &mut events,
    );

    chain.select("cluster", Some("cls-1"))?;
    chain.select("cluster", Some("cls-2"))?;
    chain.settle().await;
    stale += step(
        "picked cls-1, then cls-2 before cls-1's namespaces arrived",
        &chain,
        &mut events,
    );

    chain.select("namespace", Some("default"))?;
    chain.settle().await;
    if let Some(instance) = first_option(&chain, "instance") {
        chain.select("instance", Some(&instance))?;
        chain.settle().await;
    }
    if let Some(listener) = first_option(&chain, "listener") {
        chain.select("listener", Some(&listener))?;
    }
    stale += step("filled in the rest of the chain", &chain, &mut events);

    let receipt = chain.submit(&StdoutSink::new(chain.mode())).await?;
    Ok(DemoOutcome {
        stale_discarded: stale,
        receipt,
    })
}

async fn run_polaris_demo() -> anyhow::Result<DemoOutcome> {
    println!("Polaris route rule form (business)\n");

    let store = Arc::new(MemoryCacheStore::new());
    let mut chain = demo_chain(POLARIS_CONFIG, POLARIS_INVENTORY, store)?;
    let mut events = chain.subscribe();
    let mut stale = 0;

    chain.seed_with(BTreeMap::new());
    chain.settle().await;
    stale += step(
        "form opened; selectors default to their first option",
        &chain,
        &mut events,
    );

    chain.select("project", Some("prj-b"))?;
    chain.settle().await;
    stale += step("switched project; namespace re-resolved", &chain, &mut events);

    let receipt = chain.submit(&StdoutSink::new(chain.mode())).await?;
    Ok(DemoOutcome {
        stale_discarded: stale,
        receipt,
    })
}
