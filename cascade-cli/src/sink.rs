use async_trait::async_trait;
use serde::Serialize;

use cascade_core::model::SelectionMode;
use cascade_core::source::{Resolution, SubmitError, SubmitReceipt, SubmitSink};

/// Request body the console would send on create/update
#[derive(Debug, Serialize)]
pub struct SubmitPayload<'a> {
    pub request_id: String,
    pub mode: SelectionMode,
    pub selections: &'a Resolution,
}

/// Prints the submit payload as JSON instead of calling an API
pub struct StdoutSink {
    mode: SelectionMode,
}

impl StdoutSink {
    pub fn new(mode: SelectionMode) -> Self {
        Self { mode }
    }

    pub fn payload<'a>(&self, resolution: &'a Resolution) -> SubmitPayload<'a> {
        SubmitPayload {
            request_id: uuid::Uuid::new_v4().to_string(),
            mode: self.mode,
            selections: resolution,
        }
    }
}

#[async_trait]
impl SubmitSink for StdoutSink {
    async fn submit(&self, resolution: &Resolution) -> Result<SubmitReceipt, SubmitError> {
        let payload = self.payload(resolution);
        let json = serde_json::to_string_pretty(&payload).map_err(|e| SubmitError::Rejected {
            message: e.to_string(),
        })?;
        println!("{}", json);
        Ok(SubmitReceipt {
            id: payload.request_id,
            message: Some("printed to stdout".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let mut resolution = Resolution::new();
        resolution.insert("cluster".into(), "cls-1".into());
        resolution.insert("namespace".into(), "default".into());

        let sink = StdoutSink::new(SelectionMode::Business);
        let payload = sink.payload(&resolution);
        assert!(uuid::Uuid::parse_str(&payload.request_id).is_ok());

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["mode"], "business");
        assert_eq!(json["selections"]["namespace"], "default");
    }

    #[tokio::test]
    async fn test_submit_returns_request_id() {
        let mut resolution = Resolution::new();
        resolution.insert("project".into(), "prj-a".into());
        let receipt = StdoutSink::new(SelectionMode::Platform)
            .submit(&resolution)
            .await
            .unwrap();
        assert!(uuid::Uuid::parse_str(&receipt.id).is_ok());
    }
}
