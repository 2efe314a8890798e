//! Small stateless helpers shared across handlers

use chrono::{DateTime, TimeZone, Utc};
use itertools::Itertools;

/// Sanitize a client-supplied filename per spec §3: strip path components, remove
/// null bytes, strip leading dots, and fall back to "unnamed_file" when left empty.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw
        .replace('\\', "/")
        .rsplit('/')
        .next()
        .unwrap_or("")
        .replace('\0', "");

    let trimmed = base.trim_start_matches('.');

    if trimmed.is_empty() {
        "unnamed_file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Render a byte count as a human-friendly string, e.g. "25.00 MB".
pub fn pretty_print_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// Render the delta between two timestamps as a compact "1w 2d 3h 4m" style string.
pub fn pretty_print_delta<Tz1: TimeZone, Tz2: TimeZone>(a: DateTime<Tz1>, b: DateTime<Tz2>) -> String {
    let time_delta = a.signed_duration_since(b);

    let values = [
        time_delta.num_weeks(),
        time_delta.num_days() % 7,
        time_delta.num_hours() % 24,
        time_delta.num_minutes() % 60,
    ];
    if values.iter().all(|v| *v == 0) {
        return "<1m".into();
    }
    let characters = ['w', 'd', 'h', 'm'];
    values
        .iter()
        .map(|v| v.abs())
        .zip(characters.iter())
        .filter(|(v, _)| *v > 0)
        .map(|(v, c)| format!("{v}{c}"))
        .join(" ")
}

/// Detect the content MIME type by sniffing the first bytes, falling back to the
/// client-declared type and finally to `application/octet-stream` per spec §4.E.
pub fn detect_mime_type(bytes: &[u8], declared: Option<&str>) -> String {
    infer::get(bytes)
        .map(|k| k.mime_type().to_string())
        .or_else(|| declared.map(|s| s.to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_path_components() {
        assert_eq!(sanitize_filename("/etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\bob\\file.txt"), "file.txt");
    }

    #[test]
    fn strips_null_bytes_and_leading_dots() {
        assert_eq!(sanitize_filename("..\0secret"), "secret");
        assert_eq!(sanitize_filename("...hidden"), "hidden");
    }

    #[test]
    fn empty_becomes_unnamed() {
        assert_eq!(sanitize_filename(""), "unnamed_file");
        assert_eq!(sanitize_filename("..."), "unnamed_file");
        assert_eq!(sanitize_filename("/"), "unnamed_file");
    }

    #[test]
    fn pretty_bytes_scales_units() {
        assert_eq!(pretty_print_bytes(5), "5 B");
        assert_eq!(pretty_print_bytes(5_000), "5.00 KB");
        assert_eq!(pretty_print_bytes(5_000_000), "5.00 MB");
    }

    #[test]
    fn mime_sniff_falls_back_through_chain() {
        assert_eq!(detect_mime_type(b"", Some("text/plain")), "text/plain");
        assert_eq!(detect_mime_type(b"", None), "application/octet-stream");
        // PNG magic bytes
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(detect_mime_type(&png, None), "image/png");
    }
}
