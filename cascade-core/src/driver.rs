//! Owning task for a chain.
//!
//! A [`ChainDriver`] holds the chain and serializes everything that touches
//! it: commands from any number of [`ChainHandle`]s and fetch results,
//! applied in arrival order. Observers follow along through the chain's
//! event channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::chain::{Chain, SelectionError, submit_resolution};
use crate::model::LevelId;
use crate::reducer::EventEnvelope;
use crate::source::{Resolution, SubmitError, SubmitReceipt, SubmitSink};
use crate::state::ChainState;

const COMMAND_CAPACITY: usize = 64;

/// Commands accepted by a running driver
#[derive(Debug)]
pub enum ChainCommand {
    /// Start (or restart) resolution from the root
    Seed {
        presets: BTreeMap<LevelId, String>,
    },
    /// Explicit user selection
    Select {
        level: LevelId,
        value: Option<String>,
        reply: oneshot::Sender<Result<(), SelectionError>>,
    },
    Touch {
        level: LevelId,
        reply: oneshot::Sender<Result<(), SelectionError>>,
    },
    Retry {
        level: LevelId,
        reply: oneshot::Sender<Result<(), SelectionError>>,
    },
    /// Reply once no fetch is in flight
    Settle { reply: oneshot::Sender<ChainState> },
    Snapshot { reply: oneshot::Sender<ChainState> },
    Submit {
        reply: oneshot::Sender<Result<SubmitReceipt, SubmitError>>,
    },
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("chain driver has stopped")]
    Closed,
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

pub struct ChainDriver {
    chain: Chain,
    sink: Option<Arc<dyn SubmitSink>>,
}

impl ChainDriver {
    pub fn new(chain: Chain) -> Self {
        Self { chain, sink: None }
    }

    pub fn with_sink(mut self, sink: Arc<dyn SubmitSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Process commands and fetch results until `Shutdown` or every handle
    /// is dropped, then hand the chain back.
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<ChainCommand>) -> Chain {
        let mut settle_waiters: Vec<oneshot::Sender<ChainState>> = Vec::new();

        loop {
            tokio::select! {
                maybe_cmd = command_rx.recv() => {
                    let Some(cmd) = maybe_cmd else {
                        break;
                    };
                    if !self.handle(cmd, &mut settle_waiters).await {
                        break;
                    }
                }
                Some(level) = self.chain.next_completion(), if self.chain.has_in_flight() => {
                    tracing::trace!(level = %level, in_flight = self.chain.in_flight(), "fetch result applied");
                }
            }

            if !self.chain.has_in_flight() && !settle_waiters.is_empty() {
                let state = self.chain.snapshot();
                for waiter in settle_waiters.drain(..) {
                    let _ = waiter.send(state.clone());
                }
            }
        }

        tracing::debug!("chain driver stopped");
        self.chain
    }

    /// Returns false when the driver should stop
    async fn handle(
        &mut self,
        cmd: ChainCommand,
        settle_waiters: &mut Vec<oneshot::Sender<ChainState>>,
    ) -> bool {
        match cmd {
            ChainCommand::Seed { presets } => self.chain.seed_with(presets),
            ChainCommand::Select {
                level,
                value,
                reply,
            } => {
                let _ = reply.send(self.chain.select(&level, value.as_deref()));
            }
            ChainCommand::Touch { level, reply } => {
                let _ = reply.send(self.chain.touch(&level));
            }
            ChainCommand::Retry { level, reply } => {
                let _ = reply.send(self.chain.retry(&level));
            }
            ChainCommand::Settle { reply } => settle_waiters.push(reply),
            ChainCommand::Snapshot { reply } => {
                let _ = reply.send(self.chain.snapshot());
            }
            ChainCommand::Submit { reply } => {
                let result = match self.prepare_submit() {
                    Ok((sink, resolution)) => submit_resolution(sink.as_ref(), resolution).await,
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            ChainCommand::Shutdown => return false,
        }
        true
    }

    fn prepare_submit(&self) -> Result<(Arc<dyn SubmitSink>, Resolution), SubmitError> {
        let Some(sink) = self.sink.clone() else {
            return Err(SubmitError::Rejected {
                message: "no submit sink configured".into(),
            });
        };
        Ok((sink, self.chain.prepare_submit()?))
    }
}

/// Cloneable sender side of a running driver
#[derive(Clone)]
pub struct ChainHandle {
    command_tx: mpsc::Sender<ChainCommand>,
    events: broadcast::Sender<EventEnvelope>,
}

impl ChainHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    async fn send(&self, cmd: ChainCommand) -> Result<(), DriverError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| DriverError::Closed)
    }

    pub async fn seed(&self, presets: BTreeMap<LevelId, String>) -> Result<(), DriverError> {
        self.send(ChainCommand::Seed { presets }).await
    }

    pub async fn select(&self, level: &str, value: Option<&str>) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(ChainCommand::Select {
            level: level.to_string(),
            value: value.map(str::to_string),
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| DriverError::Closed)??)
    }

    pub async fn touch(&self, level: &str) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(ChainCommand::Touch {
            level: level.to_string(),
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| DriverError::Closed)??)
    }

    pub async fn retry(&self, level: &str) -> Result<(), DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(ChainCommand::Retry {
            level: level.to_string(),
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| DriverError::Closed)??)
    }

    /// State once every in-flight fetch has been applied
    pub async fn settle(&self) -> Result<ChainState, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(ChainCommand::Settle { reply }).await?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    pub async fn snapshot(&self) -> Result<ChainState, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(ChainCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| DriverError::Closed)
    }

    pub async fn submit(&self) -> Result<SubmitReceipt, DriverError> {
        let (reply, rx) = oneshot::channel();
        self.send(ChainCommand::Submit { reply }).await?;
        Ok(rx.await.map_err(|_| DriverError::Closed)??)
    }

    pub async fn shutdown(&self) -> Result<(), DriverError> {
        self.send(ChainCommand::Shutdown).await
    }
}

/// Run `driver` on its own task
pub fn spawn(driver: ChainDriver) -> (ChainHandle, JoinHandle<Chain>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let handle = ChainHandle {
        command_tx,
        events: driver.chain.events.clone(),
    };
    let task = tokio::spawn(driver.run(command_rx));
    (handle, task)
}
