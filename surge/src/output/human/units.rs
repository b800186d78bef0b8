//! Compact unit formatting shared by progress lines and the summary.

use std::time::Duration;

const BYTE_UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

/// Binary units with two decimals; plain bytes below 1 KiB.
pub(crate) fn format_bytes(b: u64) -> String {
    let mut value = b as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < BYTE_UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    match unit {
        0 => format!("{b}B"),
        _ => format!("{value:.2}{}", BYTE_UNITS[unit]),
    }
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

pub(crate) fn format_percent(ratio: f64) -> String {
    if ratio.is_finite() {
        format!("{:.2}%", ratio * 100.0)
    } else {
        "-".to_string()
    }
}

/// Largest whole unit among s, ms and us, rounded half up.
pub(crate) fn format_duration_single(d: Duration) -> String {
    let ns = d.as_nanos();
    let (unit, suffix): (u128, &str) = match ns {
        n if n >= 1_000_000_000 => (1_000_000_000, "s"),
        n if n >= 1_000_000 => (1_000_000, "ms"),
        _ => (1_000, "us"),
    };
    format!("{}{suffix}", (ns + unit / 2) / unit)
}

/// Trend samples are microseconds; `-` when there is no sample.
pub(crate) fn format_micros_opt(v: Option<f64>) -> String {
    let Some(us) = v.filter(|us| us.is_finite() && *us >= 0.0) else {
        return "-".to_string();
    };
    if us >= 1e6 {
        format!("{:.2}s", us / 1e6)
    } else if us >= 1e3 {
        format!("{:.2}ms", us / 1e3)
    } else {
        format!("{us:.0}us")
    }
}
