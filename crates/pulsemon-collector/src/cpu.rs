use crate::Collector;
use anyhow::Result;
use pulsemon_common::types::Value;
use sysinfo::System;

pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    type Value = f64;

    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self) -> Result<Vec<Value<f64>>> {
        self.system.refresh_cpu_all();
        let mut points = Vec::with_capacity(self.system.cpus().len() + 1);

        points.push(Value::new(
            "CPUutilization",
            self.system.global_cpu_usage() as f64,
        ));

        // Per-core readings are numbered from 1.
        for (i, cpu) in self.system.cpus().iter().enumerate() {
            points.push(Value::new(
                format!("CPUutilization{}", i + 1),
                cpu.cpu_usage() as f64,
            ));
        }

        Ok(points)
    }
}
