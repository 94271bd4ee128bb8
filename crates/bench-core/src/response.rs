use crate::{CoreError, ExperimentKind, MetricsMapping};
use serde::{Deserialize, Serialize};

/// `(event timestamp, latency)`; the timestamp is in the stream's clock
/// (microseconds), the latency in nanoseconds since the stream read started.
pub type LatencyPoint = (u64, u64);

/// The document a framework adapter writes on standard output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    pub hashes: MetricsMapping,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<LatencyPoint>>,
}

impl AdapterResponse {
    /// Parses an adapter's standard output and checks it has the fields the
    /// experiment requires.
    pub fn parse(bytes: &[u8], kind: ExperimentKind) -> Result<Self, CoreError> {
        let response: AdapterResponse = serde_json::from_slice(bytes)
            .map_err(|e| CoreError::MalformedResponse(e.to_string()))?;
        response.check_shape(kind)?;
        Ok(response)
    }

    pub fn check_shape(&self, kind: ExperimentKind) -> Result<(), CoreError> {
        match kind {
            ExperimentKind::Duration if self.duration.is_none() => Err(
                CoreError::MalformedResponse("duration response without 'duration'".to_string()),
            ),
            ExperimentKind::Latencies if self.points.is_none() => Err(
                CoreError::MalformedResponse("latencies response without 'points'".to_string()),
            ),
            _ => Ok(()),
        }
    }
}
