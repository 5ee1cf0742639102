//! Draft record types
//!
//! These are the persisted record plus the views handed back to callers.
//! Persisted records use snake_case keys; views are camelCase to match the
//! HTTP contract (`updatedAt`).

use crate::payload::Document;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Format used for every embedded timestamp: 27 characters, always UTC.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const TIMESTAMP_LEN: usize = 27;

/// Opaque draft identifier (ULID).
///
/// Ids are parsed, never trusted as raw strings, so a malformed id can never
/// reach a filesystem path or database key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(Ulid);

impl DraftId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Parse an identifier supplied by a caller.
    ///
    /// Returns `None` for anything that is not a canonical ULID string.
    pub fn parse(raw: &str) -> Option<Self> {
        Ulid::from_string(raw).ok().map(Self)
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Digest of a session credential.
///
/// The raw credential is never persisted or logged; ownership checks compare
/// digests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerKey(String);

impl OwnerKey {
    /// Derive the owner key for a session credential.
    ///
    /// # Examples
    ///
    /// ```
    /// use metadraft::store::OwnerKey;
    ///
    /// let a = OwnerKey::from_credential("session-a");
    /// assert_eq!(a, OwnerKey::from_credential("session-a"));
    /// assert_ne!(a, OwnerKey::from_credential("session-b"));
    /// assert_eq!(a.as_str().len(), 64);
    /// ```
    pub fn from_credential(credential: &str) -> Self {
        let digest = Sha256::digest(credential.as_bytes());
        Self(format!("{:x}", digest))
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix suitable for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }

    /// Whether this looks like a digest produced by [`OwnerKey::from_credential`].
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 64 && self.0.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

/// Fixed-width ISO-8601 UTC timestamp with microsecond resolution.
///
/// Because every value has the same width and zone, string order equals
/// chronological order, which is what the "latest" scan relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(String);

impl Timestamp {
    /// Format an instant, truncating to microseconds.
    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        Self(instant.format(TIMESTAMP_FORMAT).to_string())
    }

    /// The next timestamp for a record last stamped at `previous`.
    ///
    /// Never returns a value less than or equal to `previous`, even when the
    /// clock is coarse or has stepped backwards.
    pub fn next_after(previous: &Timestamp, now: DateTime<Utc>) -> Self {
        let floor = previous.to_datetime() + Duration::microseconds(1);
        Self::from_datetime(if now >= floor { now } else { floor })
    }

    /// Parsed instant.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        // Validated on construction.
        NaiveDateTime::parse_from_str(&self.0, TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .unwrap_or_default()
    }

    /// String form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Timestamp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.len() != TIMESTAMP_LEN {
            return Err(format!("timestamp must be {} characters: {}", TIMESTAMP_LEN, s));
        }
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
            .map_err(|e| format!("invalid timestamp {}: {}", s, e))?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Timestamp {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    /// Unique, immutable identifier
    pub id: DraftId,
    /// Digest of the owning session credential
    pub owner: OwnerKey,
    /// When the draft was first saved
    pub created_at: Timestamp,
    /// Last accepted save; the sole ordering key for "latest"
    pub updated_at: Timestamp,
    /// Checksum of `payload`
    pub checksum: String,
    /// Opaque form snapshot
    pub payload: Document,
}

impl DraftRecord {
    /// Project the caller-facing view.
    pub fn view(&self) -> DraftView {
        DraftView {
            id: self.id,
            payload: self.payload.clone(),
            updated_at: self.updated_at.clone(),
            checksum: self.checksum.clone(),
        }
    }
}

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftCreated {
    /// Assigned identifier
    pub id: DraftId,
    /// Creation timestamp
    pub updated_at: Timestamp,
    /// Checksum of the stored payload
    pub checksum: String,
}

/// Result of a successful update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftUpdated {
    /// Checksum of the replacement payload
    pub checksum: String,
    /// New `updatedAt`
    pub updated_at: Timestamp,
}

/// A draft as returned to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftView {
    /// Identifier
    pub id: DraftId,
    /// Stored payload, verbatim
    pub payload: Document,
    /// Last accepted save
    pub updated_at: Timestamp,
    /// Checksum of `payload`
    #[serde(default)]
    pub checksum: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let ts = Timestamp::from_datetime(whole);
        assert_eq!(ts.as_str(), "2024-01-01T00:00:00.000000Z");
        assert_eq!(ts.as_str().len(), TIMESTAMP_LEN);
    }

    #[test]
    fn test_timestamp_string_order_matches_time_order() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 9, 59, 59).unwrap();
        let a = Timestamp::from_datetime(base + Duration::microseconds(999_999));
        let b = Timestamp::from_datetime(base + Duration::seconds(1));
        assert!(a < b);
        assert!(a.as_str() < b.as_str());
    }

    #[test]
    fn test_next_after_is_strictly_greater_with_frozen_clock() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let first = Timestamp::from_datetime(now);
        let second = Timestamp::next_after(&first, now);
        assert!(second > first);
        assert_eq!(second.as_str(), "2024-01-01T00:00:00.000001Z");
    }

    #[test]
    fn test_next_after_with_clock_step_back() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let first = Timestamp::from_datetime(now);
        let second = Timestamp::next_after(&first, now - Duration::hours(1));
        assert!(second > first);
    }

    #[test]
    fn test_timestamp_rejects_other_formats() {
        assert!("2024-01-01T00:00:00Z".parse::<Timestamp>().is_err());
        assert!("2024-01-01 00:00:00.000000Z".parse::<Timestamp>().is_err());
        assert!("2024-01-01T00:00:00.000000Z".parse::<Timestamp>().is_ok());
    }

    #[test]
    fn test_timestamp_round_trips_through_datetime() {
        let ts: Timestamp = "2024-03-05T10:11:12.345678Z".parse().unwrap();
        assert_eq!(Timestamp::from_datetime(ts.to_datetime()), ts);
    }

    #[test]
    fn test_draft_id_parse_rejects_path_segments() {
        assert!(DraftId::parse("../../etc/passwd").is_none());
        assert!(DraftId::parse("").is_none());
        let id = DraftId::generate();
        assert_eq!(DraftId::parse(&id.to_string()), Some(id));
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let view = DraftView {
            id: DraftId::generate(),
            payload: Document::new(),
            updated_at: "2024-01-01T00:00:00.000000Z".parse().unwrap(),
            checksum: "abc".into(),
        };
        let value = serde_json::to_value(&view).unwrap();
        assert!(value.get("updatedAt").is_some());
        assert!(value.get("updated_at").is_none());
    }

    #[test]
    fn test_owner_key_well_formed() {
        assert!(OwnerKey::from_credential("s").is_well_formed());
        assert!(!OwnerKey("../x".into()).is_well_formed());
    }
}
