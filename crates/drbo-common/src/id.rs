//! Run identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

const RUN_ID_PREFIX: &str = "drbo-";
const RUN_ID_LEN: usize = 25;

/// Identifier for one optimization run.
///
/// Format: `drbo-YYYYMMDD-HHMMSS-XXXX`
/// Example: `drbo-20261019-143022-a7xq`
///
/// Ids sort chronologically as plain strings, which the run store relies on
/// when listing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new run ID from the current UTC time.
    pub fn new() -> Self {
        let now = chrono::Utc::now();
        RunId(format!(
            "{}{}-{}-{}",
            RUN_ID_PREFIX,
            now.format("%Y%m%d"),
            now.format("%H%M%S"),
            generate_base32_suffix()
        ))
    }

    /// Parse an existing run ID string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != RUN_ID_LEN || !s.starts_with(RUN_ID_PREFIX) {
            return None;
        }
        let bytes = s.as_bytes();
        if bytes.get(13) != Some(&b'-') || bytes.get(20) != Some(&b'-') {
            return None;
        }
        let date = &s[5..13];
        let time = &s[14..20];
        let suffix = &s[21..25];
        if !date.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !time.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if !suffix.chars().all(|c| matches!(c, 'a'..='z' | '2'..='7')) {
            return None;
        }
        Some(RunId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn generate_base32_suffix() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    let value = ((bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32) & 0x000F_FFFF;
    let alphabet = b"abcdefghijklmnopqrstuvwxyz234567";
    [15_u32, 10, 5, 0]
        .iter()
        .map(|shift| alphabet[((value >> shift) & 0x1F) as usize] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_format() {
        let id = RunId::new();
        assert!(id.0.starts_with("drbo-"));
        assert_eq!(id.0.len(), RUN_ID_LEN);
    }

    #[test]
    fn test_run_id_roundtrip_parse() {
        let id = RunId::new();
        assert_eq!(RunId::parse(id.as_str()), Some(id));
    }

    #[test]
    fn test_run_id_rejects_garbage() {
        assert!(RunId::parse("drbo-2026-10-19-a7xq").is_none());
        assert!(RunId::parse("xx-20261019-143022-a7xq").is_none());
        assert!(RunId::parse("drbo-20261019-143022-A7XQ").is_none());
        assert!(RunId::parse("drbo-20261019x143022-a7xq").is_none());
    }

    #[test]
    fn test_run_id_parse_known() {
        assert!(RunId::parse("drbo-20261019-143022-a7xq").is_some());
    }
}
