use std::sync::LazyLock;

use regex::Regex;

static ISO_DURATION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").ok());

pub fn format_ram_mb(ram_mb: u64) -> String {
    if ram_mb < 1024 { format!("{} MB", ram_mb) } else { format!("{:.1} GB", ram_mb as f64 / 1024.0) }
}

/// `m:ss`, hours folded into minutes.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds.floor() as u64 } else { 0 };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Compact view/like counter: `1.2M`, `3.4K`, plain below a thousand.
pub fn format_count(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}

/// Parses catalog durations such as `PT1H2M3S` into seconds.
pub fn parse_iso_duration(raw: &str) -> Option<u64> {
    let re = ISO_DURATION.as_ref()?;
    let caps = re.captures(raw.trim())?;
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok()).unwrap_or(0);
    Some(part(1) * 3600 + part(2) * 60 + part(3))
}
