use crate::Collector;
use anyhow::Result;
use pulsemon_common::types::Value;
use rand::Rng;

/// Yields `RandomValue`, a uniform sample in `[0, 1)`, so that a changing
/// gauge is always present.
#[derive(Debug, Default)]
pub struct RandomCollector;

impl RandomCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for RandomCollector {
    type Value = f64;

    fn name(&self) -> &str {
        "random"
    }

    fn collect(&mut self) -> Result<Vec<Value<f64>>> {
        let v: f64 = rand::thread_rng().gen();
        Ok(vec![Value::new("RandomValue", v)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_in_unit_range() {
        let mut c = RandomCollector::new();
        for _ in 0..100 {
            let v = c.collect().unwrap().remove(0);
            assert_eq!(v.key, "RandomValue");
            assert!((0.0..1.0).contains(&v.value));
        }
    }
}
