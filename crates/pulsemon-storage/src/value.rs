//! Per-kind merge and string encoding rules.

use crate::error::{Result, StorageError};
use pulsemon_common::types::{MetricKind, MetricRecord};

/// A value type that one store kind holds.
///
/// `f64` is the gauge type and is replaced on every write; `i64` is the
/// counter type and accumulates.
pub trait MetricValue:
    Copy
    + PartialEq
    + std::fmt::Debug
    + Send
    + Sync
    + Into<sea_orm::Value>
    + sea_orm::TryGetable
    + 'static
{
    const KIND: MetricKind;

    /// Combines the stored value (if any) with a newly written one.
    fn merge(old: Option<Self>, new: Self) -> Self;

    fn encode(&self) -> Result<String>;

    fn decode(s: &str) -> Result<Self>;

    fn into_record(self, id: String) -> MetricRecord;
}

impl MetricValue for f64 {
    const KIND: MetricKind = MetricKind::Gauge;

    fn merge(_old: Option<Self>, new: Self) -> Self {
        new
    }

    fn encode(&self) -> Result<String> {
        if !self.is_finite() {
            return Err(invalid(Self::KIND, self.to_string(), "value is not finite"));
        }
        // Display never switches to exponent notation for f64.
        Ok(format!("{self}"))
    }

    fn decode(s: &str) -> Result<Self> {
        let v: f64 = s
            .trim()
            .parse()
            .map_err(|e: std::num::ParseFloatError| invalid(Self::KIND, s, e.to_string()))?;
        if !v.is_finite() {
            return Err(invalid(Self::KIND, s, "value is not finite"));
        }
        Ok(v)
    }

    fn into_record(self, id: String) -> MetricRecord {
        MetricRecord::Gauge { id, value: self }
    }
}

impl MetricValue for i64 {
    const KIND: MetricKind = MetricKind::Counter;

    fn merge(old: Option<Self>, new: Self) -> Self {
        old.unwrap_or(0).wrapping_add(new)
    }

    fn encode(&self) -> Result<String> {
        Ok(self.to_string())
    }

    fn decode(s: &str) -> Result<Self> {
        s.trim()
            .parse()
            .map_err(|e: std::num::ParseIntError| invalid(Self::KIND, s, e.to_string()))
    }

    fn into_record(self, id: String) -> MetricRecord {
        MetricRecord::Counter { id, delta: self }
    }
}

fn invalid(kind: MetricKind, value: impl Into<String>, reason: impl Into<String>) -> StorageError {
    StorageError::InvalidValue {
        kind,
        value: value.into(),
        reason: reason.into(),
    }
}
