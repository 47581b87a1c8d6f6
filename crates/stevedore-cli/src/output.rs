//! Human-readable formatting of resource samples.

/// Formats a byte count using binary units (e.g., "128.0 MiB").
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(u64, &str); 3] = [(1 << 30, "GiB"), (1 << 20, "MiB"), (1 << 10, "KiB")];

    UNITS
        .iter()
        .find(|(size, _)| bytes >= *size)
        .map_or_else(
            || format!("{bytes} B"),
            |(size, unit)| format!("{:.1} {unit}", bytes as f64 / *size as f64),
        )
}

/// Formats a CPU percentage with one decimal.
#[must_use]
pub fn format_cpu(percent: f64) -> String {
    if percent.is_finite() && percent >= 0.0 {
        format!("{percent:.1}%")
    } else {
        "-".to_string()
    }
}
