use std::collections::BTreeMap;

/// Raw CPU and memory counters as reported by one runtime stats read.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct CpuCounters {
    pub total_usage: u64,
    pub system_usage: u64,
}

pub fn compute_cpu_percent(current: &CpuCounters, previous: &CpuCounters, online_cpus: u64) -> f64 {
    let cpu_delta = current.total_usage as f64 - previous.total_usage as f64;
    let system_delta = current.system_usage as f64 - previous.system_usage as f64;
    if cpu_delta <= 0.0 || system_delta <= 0.0 {
        return 0.0;
    }
    let cpus = online_cpus.max(1) as f64;
    (cpu_delta / system_delta) * cpus * 100.0
}

pub fn compute_memory_percent(usage: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    (usage as f64) / (limit as f64) * 100.0
}

pub fn compute_disk_percent(total: u64, available: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let used = total.saturating_sub(available);
    (used as f64) / (total as f64) * 100.0
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Result of scanning log lines for error patterns.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PatternScan {
    /// Lines containing at least one pattern.
    pub error_count: usize,
    /// Matching lines per pattern (a line may count for several patterns).
    pub per_pattern: BTreeMap<String, usize>,
    /// Most recent matching lines, at most `max_matches`.
    pub matches: Vec<String>,
    pub truncated: bool,
}

/// Case-sensitive substring scan. Keeps the newest `max_matches` matching lines.
pub fn scan_for_patterns<'a, I>(lines: I, patterns: &[String], max_matches: usize) -> PatternScan
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scan = PatternScan::default();
    for line in lines {
        let mut hit = false;
        for pattern in patterns {
            if !pattern.is_empty() && line.contains(pattern.as_str()) {
                *scan.per_pattern.entry(pattern.clone()).or_insert(0) += 1;
                hit = true;
            }
        }
        if hit {
            scan.error_count += 1;
            scan.matches.push(line.trim_end().to_string());
        }
    }
    if scan.matches.len() > max_matches {
        let excess = scan.matches.len() - max_matches;
        scan.matches.drain(..excess);
        scan.truncated = true;
    }
    scan
}

pub fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Parses a JSON array of strings, e.g. `["ERROR", "FATAL"]`.
pub fn parse_json_string_list(raw: &str) -> Option<Vec<String>> {
    serde_json::from_str::<Vec<String>>(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_cpu_percent() {
        let prev = CpuCounters { total_usage: 1_000, system_usage: 10_000 };
        let cur = CpuCounters { total_usage: 1_500, system_usage: 20_000 };
        // 500 / 10000 * 4 * 100
        assert!((compute_cpu_percent(&cur, &prev, 4) - 20.0).abs() < 1e-9);

        // zero cpus treated as one
        assert!((compute_cpu_percent(&cur, &prev, 0) - 5.0).abs() < 1e-9);

        // no system progress
        let same = CpuCounters { total_usage: 1_500, system_usage: 10_000 };
        assert_eq!(compute_cpu_percent(&same, &prev, 2), 0.0);

        // counter reset
        let reset = CpuCounters { total_usage: 10, system_usage: 5 };
        assert_eq!(compute_cpu_percent(&reset, &prev, 2), 0.0);
    }

    #[test]
    fn test_compute_memory_percent() {
        assert_eq!(compute_memory_percent(512, 1024), 50.0);
        assert_eq!(compute_memory_percent(512, 0), 0.0);
        assert_eq!(compute_memory_percent(0, 1024), 0.0);
    }

    #[test]
    fn test_compute_disk_percent() {
        assert_eq!(compute_disk_percent(1000, 250), 75.0);
        assert_eq!(compute_disk_percent(0, 0), 0.0);
        assert_eq!(compute_disk_percent(100, 200), 0.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.345678), 12.35);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn test_scan_for_patterns() {
        let patterns = vec!["ERROR".to_string(), "FATAL".to_string()];
        let logs = "ok line\nERROR db down\nerror lowercase\nFATAL ERROR crash\n";
        let scan = scan_for_patterns(logs.lines(), &patterns, 10);
        assert_eq!(scan.error_count, 2);
        assert_eq!(scan.per_pattern.get("ERROR"), Some(&2));
        assert_eq!(scan.per_pattern.get("FATAL"), Some(&1));
        assert_eq!(scan.matches, vec!["ERROR db down", "FATAL ERROR crash"]);
        assert!(!scan.truncated);
    }

    #[test]
    fn test_scan_caps_matches_keeping_newest() {
        let patterns = vec!["ERROR".to_string()];
        let lines: Vec<String> = (0..5).map(|i| format!("ERROR {}", i)).collect();
        let scan = scan_for_patterns(lines.iter().map(|s| s.as_str()), &patterns, 2);
        assert_eq!(scan.error_count, 5);
        assert_eq!(scan.matches, vec!["ERROR 3", "ERROR 4"]);
        assert!(scan.truncated);
    }

    #[test]
    fn test_parse_bool() {
        for v in ["1", "true", "TRUE", "True", "yes", "on"] {
            assert!(parse_bool(v), "value {}", v);
        }
        for v in ["0", "false", "no", "off", ""] {
            assert!(!parse_bool(v), "value {}", v);
        }
    }

    #[test]
    fn test_parse_json_string_list() {
        assert_eq!(
            parse_json_string_list(r#"["ERROR", "Exception"]"#),
            Some(vec!["ERROR".to_string(), "Exception".to_string()])
        );
        assert_eq!(parse_json_string_list("not json"), None);
        assert_eq!(parse_json_string_list("[]"), Some(vec![]));
    }
}
