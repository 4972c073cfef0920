//! Conversions between the JSON wire item and the gRPC `Metric` message.

use crate::proto;
use crate::proto::metric::Value;
use crate::types::{MetricKind, ModelError, Record, RequestMetric, Result};

impl From<&RequestMetric> for proto::Metric {
    fn from(item: &RequestMetric) -> Self {
        let value = match item.kind {
            MetricKind::Counter => item.delta.map(Value::Counter),
            MetricKind::Gauge => item.value.map(Value::Gauge),
        };
        proto::Metric {
            id: item.id.clone(),
            mtype: item.kind.to_string(),
            value,
        }
    }
}

impl From<&Record> for proto::Metric {
    fn from(record: &Record) -> Self {
        proto::Metric::from(&RequestMetric::from(record))
    }
}

impl TryFrom<proto::Metric> for RequestMetric {
    type Error = ModelError;

    /// Fails on an unknown `mtype` or a value variant that does not match it.
    fn try_from(msg: proto::Metric) -> Result<Self> {
        let kind: MetricKind = msg.mtype.parse()?;
        let mut item = RequestMetric::query(msg.id, kind);
        match (kind, msg.value) {
            (_, None) => {}
            (MetricKind::Counter, Some(Value::Counter(d))) => item.delta = Some(d),
            (MetricKind::Gauge, Some(Value::Gauge(v))) => item.value = Some(v),
            (kind, Some(_)) => {
                return Err(ModelError::MissingValue { id: item.id, kind });
            }
        }
        Ok(item)
    }
}
