use chrono::{DateTime, Datelike, Utc};

/// Current UTC time
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Fresh random identifier for an entity
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Day-stamped document number: `{prefix}{yyyyMMdd}{sequence:04}`
///
/// Used for order (`BRD`) and invoice (`INV`) numbers. The sequence is a
/// global counter, so numbers stay unique across days.
pub fn day_number(prefix: &str, date: DateTime<Utc>, sequence: u64) -> String {
    format!("{prefix}{}{sequence:04}", date.format("%Y%m%d"))
}

/// Year-stamped document number: `{prefix}-{yyyy}-{sequence:03}`
///
/// Used for quote (`Q`) and receipt (`R`) numbers.
pub fn year_number(prefix: &str, date: DateTime<Utc>, sequence: u64) -> String {
    format!("{prefix}-{}-{sequence:03}", date.year())
}

/// Case-insensitive substring match
pub fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}
