//! Host metrics attached to every snapshot
//!
//! Load averages from /proc/loadavg and online CPUs from /sys. Missing
//! files (non-Linux hosts) yield zeros and an empty CPU list.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostMetrics {
    pub hostname: String,
    /// 1, 5 and 15 minute load averages
    pub load_avg: [f64; 3],
    /// Online CPU ids
    pub cpus: Vec<u32>,
}

impl HostMetrics {
    #[must_use]
    pub fn sample(hostname: &str) -> Self {
        let load_avg = load_average().unwrap_or_else(|e| {
            debug!("{e:#}");
            [0.0; 3]
        });
        let cpus = online_cpus().unwrap_or_else(|e| {
            debug!("{e:#}");
            Vec::new()
        });
        Self {
            hostname: hostname.to_string(),
            load_avg,
            cpus,
        }
    }
}

pub fn load_average() -> Result<[f64; 3]> {
    let content =
        fs::read_to_string("/proc/loadavg").context("Failed to read /proc/loadavg")?;
    parse_load_average(&content)
}

/// Parse the first three fields of /proc/loadavg ("0.52 0.58 0.59 1/467 12345")
pub fn parse_load_average(content: &str) -> Result<[f64; 3]> {
    let mut fields = content.split_whitespace();
    let mut loads = [0.0; 3];
    for load in &mut loads {
        let field = fields.next().context("Truncated load average")?;
        *load = field
            .parse()
            .with_context(|| format!("Invalid load average '{field}'"))?;
    }
    Ok(loads)
}

/// Online CPU ids from /sys/devices/system/cpu/online
pub fn online_cpus() -> Result<Vec<u32>> {
    let content = fs::read_to_string("/sys/devices/system/cpu/online")
        .context("Failed to read /sys/devices/system/cpu/online")?;
    parse_cpu_list(&content)
}

/// Parse a kernel CPU list like "0-3" or "0-3,8-11"
pub fn parse_cpu_list(content: &str) -> Result<Vec<u32>> {
    let mut cpus = Vec::new();

    for range in content.trim().split(',') {
        if let Some((start, end)) = range.split_once('-') {
            // Range like "0-3"
            let start: u32 = start.parse()?;
            let end: u32 = end.parse()?;
            cpus.extend(start..=end);
        } else {
            // Single CPU like "5"
            cpus.push(range.parse::<u32>()?);
        }
    }

    Ok(cpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-3\n").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpu_list("0-1,8,10-11").unwrap(), vec![0, 1, 8, 10, 11]);
        assert!(parse_cpu_list("x").is_err());
    }

    #[test]
    fn test_parse_load_average() {
        let loads = parse_load_average("0.52 0.58 0.59 1/467 12345\n").unwrap();
        assert_eq!(loads, [0.52, 0.58, 0.59]);
        assert!(parse_load_average("0.5").is_err());
    }

    #[test]
    fn test_sample_on_this_host() {
        let metrics = HostMetrics::sample("box");
        assert_eq!(metrics.hostname, "box");

        #[cfg(target_os = "linux")]
        {
            // CPU 0 should always exist
            assert!(metrics.cpus.contains(&0));
        }
    }
}
