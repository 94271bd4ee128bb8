use crate::{AdapterResponse, CoreError, ExperimentKind, LatencyPoint, MetricsMapping};
use serde_json::Value;

/// Accepts a JSON number or a decimal string; pipelines report nanosecond
/// wall-clock times as strings when they do not fit a double.
pub fn parse_timestamp(value: &Value) -> Result<u64, CoreError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| CoreError::BadTimestamp(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| CoreError::BadTimestamp(s.clone())),
        other => Err(CoreError::BadTimestamp(other.to_string())),
    }
}

pub fn duration(reference: u64, end: u64) -> Result<u64, CoreError> {
    end.checked_sub(reference)
        .ok_or(CoreError::NegativeDuration { reference, end })
}

/// Rewrites each `(t, time)` point as `(t, time - reference)`, keeping order.
pub fn latencies(reference: u64, points: &[(u64, u64)]) -> Result<Vec<LatencyPoint>, CoreError> {
    points
        .iter()
        .map(|&(t, time)| duration(reference, time).map(|latency| (t, latency)))
        .collect()
}

/// Builds an adapter response from a pipeline's raw sink output.
///
/// For `duration` the sink is `[end_time, metric...]`; for `latencies` it is
/// `[metric..., [[t, time], ...]]`. Metric values are copied verbatim under
/// `metric_names`, in order.
pub fn normalize(
    kind: ExperimentKind,
    reference: &Value,
    sink: &Value,
    metric_names: &[String],
) -> Result<AdapterResponse, CoreError> {
    let reference = parse_timestamp(reference)?;
    let items = sink
        .as_array()
        .ok_or_else(|| CoreError::BadSink("expected a JSON array".to_string()))?;
    if items.len() != metric_names.len() + 1 {
        return Err(CoreError::BadSink(format!(
            "expected {} entries ({} metrics + 1), found {}",
            metric_names.len() + 1,
            metric_names.len(),
            items.len()
        )));
    }
    match kind {
        ExperimentKind::Duration => {
            let end = parse_timestamp(&items[0])?;
            Ok(AdapterResponse {
                duration: Some(duration(reference, end)?),
                hashes: collect_metrics(metric_names, &items[1..]),
                points: None,
            })
        }
        ExperimentKind::Latencies => {
            let (metrics, tail) = items.split_at(metric_names.len());
            let raw_points = tail[0]
                .as_array()
                .ok_or_else(|| CoreError::BadSink("points must be an array".to_string()))?
                .iter()
                .map(parse_point)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AdapterResponse {
                duration: None,
                hashes: collect_metrics(metric_names, metrics),
                points: Some(latencies(reference, &raw_points)?),
            })
        }
    }
}

fn collect_metrics(names: &[String], values: &[Value]) -> MetricsMapping {
    names.iter().cloned().zip(values.iter().cloned()).collect()
}

fn parse_point(value: &Value) -> Result<(u64, u64), CoreError> {
    match value.as_array().map(Vec::as_slice) {
        Some([t, time]) => Ok((parse_timestamp(t)?, parse_timestamp(time)?)),
        _ => Err(CoreError::BadSink(format!(
            "point must be a [t, time] pair: {}",
            value
        ))),
    }
}
