use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Validation failures of the metric model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("metric name is empty")]
    EmptyName,
    #[error("unknown metric kind: {0}")]
    InvalidKind(String),
    #[error("invalid {kind} value: {raw}")]
    InvalidValue { kind: MetricKind, raw: String },
    #[error("{kind} metric '{id}' carries no value")]
    MissingValue { id: String, kind: MetricKind },
    #[error("counter '{0}' overflowed")]
    CounterOverflow(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// The two metric kinds.
///
/// # Examples
///
/// ```
/// use metrix_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(MetricKind::Gauge.to_string(), "gauge");
/// assert!("Counter".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            _ => Err(ModelError::InvalidKind(s.to_string())),
        }
    }
}

/// A metric measurement; the kind is carried by the variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(i64),
    Gauge(f64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Counter(_) => MetricKind::Counter,
            MetricValue::Gauge(_) => MetricKind::Gauge,
        }
    }

    /// Parses `raw` as an `i64` for counters or an `f64` for gauges.
    ///
    /// # Examples
    ///
    /// ```
    /// use metrix_common::types::{MetricKind, MetricValue};
    ///
    /// assert_eq!(
    ///     MetricValue::parse(MetricKind::Counter, "12").unwrap(),
    ///     MetricValue::Counter(12)
    /// );
    /// assert!(MetricValue::parse(MetricKind::Counter, "1.5").is_err());
    /// ```
    pub fn parse(kind: MetricKind, raw: &str) -> Result<Self> {
        let invalid = || ModelError::InvalidValue {
            kind,
            raw: raw.to_string(),
        };
        match kind {
            MetricKind::Counter => raw.parse().map(MetricValue::Counter).map_err(|_| invalid()),
            MetricKind::Gauge => {
                let v: f64 = raw.parse().map_err(|_| invalid())?;
                if v.is_finite() {
                    Ok(MetricValue::Gauge(v))
                } else {
                    Err(invalid())
                }
            }
        }
    }

    pub fn as_counter(&self) -> Option<i64> {
        match self {
            MetricValue::Counter(d) => Some(*d),
            MetricValue::Gauge(_) => None,
        }
    }

    pub fn as_gauge(&self) -> Option<f64> {
        match self {
            MetricValue::Gauge(v) => Some(*v),
            MetricValue::Counter(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Counter(d) => write!(f, "{d}"),
            MetricValue::Gauge(v) if *v == 0.0 => f.write_str("0.000"),
            MetricValue::Gauge(v) => write!(f, "{v}"),
        }
    }
}

/// A stored (name, value) pair. The name is never empty.
///
/// Serializes as `{"name", "type", "delta"?, "value"?}`, the shape used by
/// the file snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordRepr", into = "RecordRepr")]
pub struct Record {
    name: String,
    value: MetricValue,
}

impl Record {
    pub fn new(name: impl Into<String>, value: MetricValue) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ModelError::EmptyName);
        }
        Ok(Self { name, value })
    }

    pub fn counter(name: impl Into<String>, delta: i64) -> Result<Self> {
        Self::new(name, MetricValue::Counter(delta))
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Result<Self> {
        Self::new(name, MetricValue::Gauge(value))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> MetricValue {
        self.value
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    pub fn with_value(mut self, value: MetricValue) -> Self {
        self.value = value;
        self
    }
}

#[derive(Serialize, Deserialize)]
struct RecordRepr {
    name: String,
    #[serde(rename = "type")]
    kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
}

impl TryFrom<RecordRepr> for Record {
    type Error = ModelError;

    fn try_from(repr: RecordRepr) -> Result<Self> {
        let value = typed_value(&repr.name, repr.kind, repr.delta, repr.value)?;
        Record::new(repr.name, value)
    }
}

impl From<Record> for RecordRepr {
    fn from(record: Record) -> Self {
        RecordRepr {
            kind: record.kind(),
            delta: record.value.as_counter(),
            value: record.value.as_gauge(),
            name: record.name,
        }
    }
}

fn typed_value(
    id: &str,
    kind: MetricKind,
    delta: Option<i64>,
    value: Option<f64>,
) -> Result<MetricValue> {
    let missing = || ModelError::MissingValue {
        id: id.to_string(),
        kind,
    };
    match kind {
        MetricKind::Counter => delta.map(MetricValue::Counter).ok_or_else(missing),
        MetricKind::Gauge => value.map(MetricValue::Gauge).ok_or_else(missing),
    }
}

/// One item of the JSON wire format.
///
/// # Examples
///
/// ```
/// use metrix_common::types::RequestMetric;
///
/// let item: RequestMetric =
///     serde_json::from_str(r#"{"id":"PollCount","type":"counter","delta":3}"#).unwrap();
/// assert_eq!(item, RequestMetric::counter("PollCount", 3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl RequestMetric {
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    /// A value-less item, as sent to `/value` lookups.
    pub fn query(id: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            id: id.into(),
            kind,
            delta: None,
            value: None,
        }
    }

    /// Validates the item and converts it into a [`Record`].
    pub fn to_record(&self) -> Result<Record> {
        let value = typed_value(&self.id, self.kind, self.delta, self.value)?;
        Record::new(self.id.clone(), value)
    }
}

impl From<&Record> for RequestMetric {
    fn from(record: &Record) -> Self {
        match record.value() {
            MetricValue::Counter(d) => RequestMetric::counter(record.name(), d),
            MetricValue::Gauge(v) => RequestMetric::gauge(record.name(), v),
        }
    }
}

impl From<Record> for RequestMetric {
    fn from(record: Record) -> Self {
        RequestMetric::from(&record)
    }
}
