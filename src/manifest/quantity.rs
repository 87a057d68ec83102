//! Storage quantity normalization

use tracing::warn;

/// Fixed minimum used whenever a size is missing or unusable
pub const DEFAULT_STORAGE: &str = "1Gi";

const SUFFIXES: &[&str] = &["Ki", "Mi", "Gi", "Ti", "k", "M", "G", "T"];

/// Normalize a storage size to a `<integer><unit>` quantity string.
///
/// Accepts binary (`Ki`, `Mi`, `Gi`, `Ti`) and decimal (`k`, `M`, `G`, `T`)
/// magnitude suffixes as well as bare byte counts. Blank or missing input
/// yields [`DEFAULT_STORAGE`]; malformed input also yields the default but
/// logs a warning, since a mis-sized volume is recoverable and a failed
/// generation is not.
pub fn normalize_quantity(input: Option<&str>) -> String {
    let raw = match input {
        Some(s) if !s.trim().is_empty() => s.trim(),
        _ => return DEFAULT_STORAGE.to_string(),
    };

    if let Some(valid) = parse(raw) {
        return valid;
    }

    warn!(input = %raw, default = DEFAULT_STORAGE, "unparseable storage size, using default");
    DEFAULT_STORAGE.to_string()
}

fn parse(raw: &str) -> Option<String> {
    let (digits, suffix) = match SUFFIXES.iter().find(|s| raw.ends_with(*s)) {
        Some(suffix) => (&raw[..raw.len() - suffix.len()], *suffix),
        None => (raw, ""),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;
    if value == 0 {
        return None;
    }
    Some(format!("{value}{suffix}"))
}
