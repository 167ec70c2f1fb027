//! Scripted collaborators for unit tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::model::SelectOption;
use crate::source::{
    DataSource, FetchError, FetchRequest, Resolution, SubmitError, SubmitReceipt, SubmitSink,
};

type Key = (String, String);

fn key(level: &str, parent: Option<&str>) -> Key {
    (level.to_string(), parent.unwrap_or_default().to_string())
}

/// Data source answering from a table keyed by `(level, parent value)`.
///
/// Gated responses are held until their [`Gate`] is released, which lets a
/// test decide the order fetches complete in.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    responses: Mutex<BTreeMap<Key, Result<Vec<SelectOption>, FetchError>>>,
    gates: Mutex<BTreeMap<Key, oneshot::Receiver<()>>>,
    calls: Mutex<Vec<FetchRequest>>,
}

pub(crate) struct Gate {
    tx: oneshot::Sender<()>,
}

impl Gate {
    pub(crate) fn release(self) {
        let _ = self.tx.send(());
    }
}

impl ScriptedSource {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, level: &str, parent: Option<&str>, values: &[&str]) {
        let options = values.iter().map(|v| SelectOption::plain(*v)).collect();
        self.responses.lock().insert(key(level, parent), Ok(options));
    }

    pub(crate) fn fail(&self, level: &str, parent: Option<&str>, message: &str) {
        self.responses
            .lock()
            .insert(key(level, parent), Err(FetchError::new(message)));
    }

    /// Like [`ScriptedSource::respond`], but the next matching fetch waits
    /// for the returned gate.
    pub(crate) fn gate(&self, level: &str, parent: Option<&str>, values: &[&str]) -> Gate {
        self.respond(level, parent, values);
        let (tx, rx) = oneshot::channel();
        self.gates.lock().insert(key(level, parent), rx);
        Gate { tx }
    }

    /// Every request received so far, in arrival order
    pub(crate) fn calls(&self) -> Vec<FetchRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl DataSource for ScriptedSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<SelectOption>, FetchError> {
        self.calls.lock().push(request.clone());
        let slot = key(&request.level, request.parent.as_deref());

        let gate = self.gates.lock().remove(&slot);
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let response = self.responses.lock().get(&slot).cloned();
        response.unwrap_or_else(|| {
            Err(FetchError::new(format!(
                "no scripted response for {} under {:?}",
                slot.0, slot.1
            )))
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Sink that records every resolution it accepts
#[derive(Default)]
pub(crate) struct RecordingSink {
    submitted: Mutex<Vec<Resolution>>,
    reject_with: Option<String>,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn rejecting(message: &str) -> Self {
        Self {
            reject_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn submitted(&self) -> Vec<Resolution> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl SubmitSink for RecordingSink {
    async fn submit(&self, resolution: &Resolution) -> Result<SubmitReceipt, SubmitError> {
        if let Some(message) = &self.reject_with {
            return Err(SubmitError::Rejected {
                message: message.clone(),
            });
        }
        let mut submitted = self.submitted.lock();
        submitted.push(resolution.clone());
        Ok(SubmitReceipt {
            id: format!("receipt-{}", submitted.len()),
            message: None,
        })
    }
}
