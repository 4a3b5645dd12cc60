//! Human readable byte sizes

const UNITS: &[&str] = &["Bytes", "KB", "MB", "GB", "TB"];

/// Format a byte count with binary (1024) multiples.
///
/// Values are rounded to two decimals and trailing zeros are dropped, so
/// `1536` becomes `"1.5 KB"` and `2048` becomes `"2 KB"`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
