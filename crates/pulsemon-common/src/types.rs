use serde::{Deserialize, Serialize};

/// Metric kind, which decides how a write merges with the stored value.
///
/// # Examples
///
/// ```
/// use pulsemon_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("histogram".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// The stored value is replaced on every write.
    Gauge,
    /// The stored value accumulates every write.
    Counter,
}

impl MetricKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(RecordError::UnknownKind(s.to_string())),
        }
    }
}

/// A key plus a value, used for single and batch writes alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value<T> {
    pub key: String,
    pub value: T,
}

impl<T> Value<T> {
    pub fn new(key: impl Into<String>, value: T) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Metric as it travels over HTTP.
///
/// `delta` is set for counters and `value` for gauges. The kind is kept as a
/// plain string so that the server can tell an empty kind from an unknown one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub id: String,
    #[serde(rename = "type")]
    pub mtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metrics {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            mtype: MetricKind::Gauge.to_string(),
            delta: None,
            value: Some(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            mtype: MetricKind::Counter.to_string(),
            delta: Some(delta),
            value: None,
        }
    }

    /// Validates the kind and id without requiring a value, as a lookup does.
    pub fn lookup_kind(&self) -> Result<MetricKind, RecordError> {
        if self.mtype.is_empty() {
            return Err(RecordError::EmptyKind);
        }
        if self.id.is_empty() {
            return Err(RecordError::EmptyId);
        }
        self.mtype.parse()
    }
}

/// A validated metric: exactly one of gauge value or counter delta, matching
/// the kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricRecord {
    Gauge { id: String, value: f64 },
    Counter { id: String, delta: i64 },
}

impl MetricRecord {
    pub fn id(&self) -> &str {
        match self {
            MetricRecord::Gauge { id, .. } | MetricRecord::Counter { id, .. } => id,
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricRecord::Gauge { .. } => MetricKind::Gauge,
            MetricRecord::Counter { .. } => MetricKind::Counter,
        }
    }
}

impl TryFrom<Metrics> for MetricRecord {
    type Error = RecordError;

    fn try_from(m: Metrics) -> Result<Self, Self::Error> {
        match m.lookup_kind()? {
            MetricKind::Gauge => {
                let value = m.value.ok_or(RecordError::MissingValue)?;
                Ok(MetricRecord::Gauge { id: m.id, value })
            }
            MetricKind::Counter => {
                let delta = m.delta.ok_or(RecordError::MissingDelta)?;
                Ok(MetricRecord::Counter { id: m.id, delta })
            }
        }
    }
}

impl From<MetricRecord> for Metrics {
    fn from(record: MetricRecord) -> Self {
        match record {
            MetricRecord::Gauge { id, value } => Metrics::gauge(id, value),
            MetricRecord::Counter { id, delta } => Metrics::counter(id, delta),
        }
    }
}

/// Reasons a wire metric cannot become a [`MetricRecord`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("metric type is empty")]
    EmptyKind,
    #[error("metric id is empty")]
    EmptyId,
    #[error("unknown metric type '{0}'")]
    UnknownKind(String),
    #[error("gauge metric has no value")]
    MissingValue,
    #[error("counter metric has no delta")]
    MissingDelta,
}
