//! Node memory collector reading /proc/meminfo.

use std::path::PathBuf;

use futures::future::BoxFuture;

use super::Collector;
use crate::error::SourceError;
use crate::exposition::MetricFamily;

const MEMINFO_PATH: &str = "/proc/meminfo";

/// Memory totals in bytes. Fields are `None` when missing from the file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemInfo {
    pub total_bytes: Option<u64>,
    pub available_bytes: Option<u64>,
}

/// Parses the `MemTotal` and `MemAvailable` lines (values in kB).
pub fn parse_meminfo(content: &str) -> MemInfo {
    let mut info = MemInfo::default();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }
        let Ok(value) = parts[1].parse::<u64>() else {
            continue;
        };
        // A third column means the value carries a unit, always kB here.
        let bytes = if parts.len() == 3 {
            value.saturating_mul(1024)
        } else {
            value
        };

        match parts[0] {
            "MemTotal:" => info.total_bytes = Some(bytes),
            "MemAvailable:" => info.available_bytes = Some(bytes),
            _ => {}
        }
    }

    info
}

pub struct MeminfoCollector {
    path: PathBuf,
}

impl MeminfoCollector {
    pub fn new() -> Self {
        Self::with_path(MEMINFO_PATH)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for MeminfoCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MeminfoCollector {
    fn name(&self) -> &str {
        "meminfo"
    }

    fn collect(&self) -> BoxFuture<'_, Result<Vec<MetricFamily>, SourceError>> {
        Box::pin(async move {
            let content = tokio::fs::read_to_string(&self.path).await?;
            let info = parse_meminfo(&content);

            let mut families = Vec::with_capacity(2);
            if let Some(total) = info.total_bytes {
                families.push(MetricFamily::single_gauge(
                    "supabase_memory_total_bytes",
                    "Total usable RAM in bytes.",
                    total as f64,
                ));
            }
            if let Some(available) = info.available_bytes {
                families.push(MetricFamily::single_gauge(
                    "supabase_memory_available_bytes",
                    "Memory available for starting new applications, in bytes.",
                    available as f64,
                ));
            }
            Ok(families)
        })
    }
}
