// ABOUTME: Timestamp-derived release identifiers (YYYYMMDDHHMMSS, UTC).
// ABOUTME: Fixed width makes lexical order equal chronological order.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

const FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReleaseIdError {
    #[error("release id must be 14 digits (YYYYMMDDHHMMSS), got '{0}'")]
    Malformed(String),

    #[error("release id is not a valid timestamp: '{0}'")]
    InvalidTimestamp(String),
}

/// Identity of one release directory under `releases/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReleaseId(String);

impl ReleaseId {
    pub fn parse(value: &str) -> Result<Self, ReleaseIdError> {
        if value.len() != 14 || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ReleaseIdError::Malformed(value.to_string()));
        }
        NaiveDateTime::parse_from_str(value, FORMAT)
            .map_err(|_| ReleaseIdError::InvalidTimestamp(value.to_string()))?;
        Ok(Self(value.to_string()))
    }

    /// Id for a release created at `at`, truncated to the second.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format(FORMAT).to_string())
    }

    /// Id for a release created at `now` that sorts after `latest`.
    ///
    /// Two deploys within the same second (or a clock that went backwards)
    /// get `latest + 1s` instead of a duplicate or older id.
    pub fn next_after(now: DateTime<Utc>, latest: Option<&ReleaseId>) -> Self {
        let candidate = Self::from_datetime(now);
        match latest {
            Some(latest) if candidate <= *latest => {
                Self::from_datetime(latest.timestamp() + TimeDelta::seconds(1))
            }
            _ => candidate,
        }
    }

    /// The creation time encoded in the id.
    pub fn timestamp(&self) -> DateTime<Utc> {
        // Validated in every constructor.
        NaiveDateTime::parse_from_str(&self.0, FORMAT)
            .map(|naive| naive.and_utc())
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ReleaseId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ReleaseId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        ReleaseId::parse(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, h, m, s).unwrap()
    }

    #[test]
    fn formats_as_fourteen_digits() {
        let id = ReleaseId::from_datetime(at(9, 5, 7));
        assert_eq!(id.as_str(), "20250314090507");
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(matches!(
            ReleaseId::parse("2025031409050"),
            Err(ReleaseIdError::Malformed(_))
        ));
    }

    #[test]
    fn parse_rejects_non_digits() {
        assert!(matches!(
            ReleaseId::parse("2025031409050x"),
            Err(ReleaseIdError::Malformed(_))
        ));
    }

    #[test]
    fn parse_rejects_impossible_dates() {
        assert!(matches!(
            ReleaseId::parse("20251399000000"),
            Err(ReleaseIdError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn lexical_order_is_chronological() {
        let earlier = ReleaseId::from_datetime(at(9, 59, 59));
        let later = ReleaseId::from_datetime(at(10, 0, 0));
        assert!(earlier < later);
    }

    #[test]
    fn next_after_uses_clock_when_ahead() {
        let latest = ReleaseId::from_datetime(at(9, 0, 0));
        let next = ReleaseId::next_after(at(9, 0, 5), Some(&latest));
        assert_eq!(next, ReleaseId::from_datetime(at(9, 0, 5)));
    }

    #[test]
    fn next_after_bumps_within_same_second() {
        let latest = ReleaseId::from_datetime(at(9, 0, 0));
        let next = ReleaseId::next_after(at(9, 0, 0), Some(&latest));
        assert_eq!(next.as_str(), "20250314090001");
    }

    #[test]
    fn next_after_bumps_when_clock_is_behind() {
        let latest = ReleaseId::from_datetime(at(12, 0, 0));
        let next = ReleaseId::next_after(at(11, 0, 0), Some(&latest));
        assert!(next > latest);
    }

    #[test]
    fn timestamp_round_trips() {
        let id = ReleaseId::from_datetime(at(23, 59, 58));
        assert_eq!(id.timestamp(), at(23, 59, 58));
    }

    #[test]
    fn deserialize_validates() {
        let ok: Result<ReleaseId, _> = serde_json::from_str("\"20250314090507\"");
        assert!(ok.is_ok());
        let bad: Result<ReleaseId, _> = serde_json::from_str("\"latest\"");
        assert!(bad.is_err());
    }
}
