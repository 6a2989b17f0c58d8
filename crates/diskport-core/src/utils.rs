//! Common utility functions

use std::time::Duration;
use uuid::Uuid;

pub const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Generate a short lowercase identifier suitable for resource names
pub fn generate_execution_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Round a byte count up to whole GiB. Zero bytes is zero GiB.
pub fn bytes_to_gib_ceil(bytes: u64) -> i64 {
    if bytes == 0 {
        return 0;
    }
    ((bytes - 1) / BYTES_PER_GIB + 1) as i64
}

/// Zonal disk URI in the `zones/<zone>/disks/<name>` form
pub fn zonal_disk_uri(zone: &str, disk_name: &str) -> String {
    format!("zones/{}/disks/{}", zone, disk_name)
}

/// Last path segment of a resource URI (`zones/z/disks/d` -> `d`)
pub fn resource_name(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

/// Parse a workflow-style duration such as `90s`, `20m` or `2h`.
///
/// A bare number is read as seconds.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let (digits, unit) = match input.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => input.split_at(idx),
        None => (input, "s"),
    };
    let value: u64 = digits.parse().ok()?;

    let seconds = match unit {
        "s" => value,
        "m" => value.checked_mul(60)?,
        "h" => value.checked_mul(3600)?,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}

/// Render a duration the way workflow definitions spell it (`20m`, `90s`)
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_gib_ceil() {
        assert_eq!(bytes_to_gib_ceil(0), 0);
        assert_eq!(bytes_to_gib_ceil(1), 1);
        assert_eq!(bytes_to_gib_ceil(BYTES_PER_GIB), 1);
        assert_eq!(bytes_to_gib_ceil(BYTES_PER_GIB + 1), 2);
        assert_eq!(bytes_to_gib_ceil(10 * BYTES_PER_GIB - 3), 10);
    }

    #[test]
    fn test_zonal_disk_uri_and_resource_name() {
        let uri = zonal_disk_uri("us-west1-a", "disk-abc");
        assert_eq!(uri, "zones/us-west1-a/disks/disk-abc");
        assert_eq!(resource_name(&uri), "disk-abc");
        assert_eq!(resource_name("plain-name"), "plain-name");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("20m"), Some(Duration::from_secs(1200)));
        assert_eq!(parse_duration("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("10d"), None);
        assert_eq!(parse_duration("m"), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(1200)), "20m");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
        assert_eq!(format_duration(Duration::from_secs(95)), "95s");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_generate_execution_id() {
        let id = generate_execution_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
