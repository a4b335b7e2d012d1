//! ID generation utilities
//!
//! Provides functions for generating unique identifiers for persisted courses
//! and schedule definitions.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn generate_prefixed_id(prefix: &str) -> String {
    let timestamp = now_ms();
    let random: u32 = rand::rng().random();
    format!("{}-{}-{:08x}", prefix, timestamp, random)
}

/// Generate a course record ID
///
/// Format: `crs-{timestamp_ms}-{random_hex}`
/// Example: `crs-1738300800123-a1b2c3d4`
pub fn generate_course_id() -> String {
    generate_prefixed_id("crs")
}

/// Generate a schedule definition ID
///
/// Format: `sch-{timestamp_ms}-{random_hex}`
pub fn generate_schedule_id() -> String {
    generate_prefixed_id("sch")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        let ts = now_ms();
        // Should be after 2020-01-01 and before 2100-01-01
        assert!(ts > 1577836800000);
        assert!(ts < 4102444800000);
    }

    #[test]
    fn test_generate_course_id_format() {
        let id = generate_course_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "crs");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_course_id_uniqueness() {
        let id1 = generate_course_id();
        let id2 = generate_course_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_generate_schedule_id_prefix() {
        let id = generate_schedule_id();
        assert!(id.starts_with("sch-"));
    }
}
