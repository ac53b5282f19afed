use rocket::serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// Types allowed in the database through the `Any` driver:
// i32
// i64
// f32
// f64
// bool
// &'r str
// String
//
// Timestamps therefore travel as i64 unix milliseconds.

pub type GameScore = i32;
pub type ScoreId = i64;

/// A single score row.
///
/// `pending_claim` marks the one record currently waiting for a display name.
/// Once cleared it is never set again for the same record.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Debug)]
#[serde(crate = "rocket::serde")]
pub struct ScoreRecord {
    pub id: ScoreId,
    pub name: Option<String>,
    pub score: GameScore,
    pub gamemode: String,
    #[serde(with = "time::serde::rfc3339")]
    pub achieved_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub pending_claim: bool,
}

/// Values of a row about to be inserted. `created_at` is always set by the server.
#[derive(Clone, Debug)]
pub struct NewScore {
    pub score: GameScore,
    pub gamemode: String,
    pub achieved_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

pub(crate) fn to_millis(timestamp: OffsetDateTime) -> i64 {
    (timestamp.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(millis: i64) -> Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
}
