use crate::Collector;
use anyhow::Result;
use pulsemon_common::types::Value;
use sysinfo::System;

pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    type Value = f64;

    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&mut self) -> Result<Vec<Value<f64>>> {
        self.system.refresh_memory();

        Ok(vec![
            Value::new("TotalMemory", self.system.total_memory() as f64),
            Value::new("FreeMemory", self.system.free_memory() as f64),
            Value::new("UsedMemory", self.system.used_memory() as f64),
            // Swap
            Value::new("TotalSwap", self.system.total_swap() as f64),
            Value::new("UsedSwap", self.system.used_swap() as f64),
        ])
    }
}
