use crate::Collector;
use anyhow::Result;
use pulsemon_common::types::Value;

pub const POLL_COUNT: &str = "PollCount";

/// Yields one `PollCount` increment per poll.
#[derive(Debug, Default)]
pub struct PollCountCollector;

impl PollCountCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for PollCountCollector {
    type Value = i64;

    fn name(&self) -> &str {
        "poll_count"
    }

    fn collect(&mut self) -> Result<Vec<Value<i64>>> {
        Ok(vec![Value::new(POLL_COUNT, 1)])
    }
}
