use thiserror::Error;
use time::OffsetDateTime;

use super::{GameScore, NewScore, ScoreId, ScoreRecord};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unsupported database url {url:?}: expected a sqlite: or postgres: url")]
    UnsupportedBackend { url: String },
    #[error("stored timestamp {millis} is out of range")]
    Timestamp {
        millis: i64,
        #[source]
        source: time::error::ComponentRange,
    },
}

/// Result of trying to put a new score into the claim slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotOutcome {
    /// The score was inserted as the new pending claim.
    /// `expired` lists a stale claim that was given the fallback name first.
    Claimed {
        id: ScoreId,
        expired: Option<ScoreId>,
    },
    /// Another record still holds the slot; nothing was written.
    Occupied,
}

/// Storage contract the claim resolver relies on.
///
/// Every mutating call that touches `pending_claim` must be a single atomic
/// conditional write, so that concurrent callers can never observe two
/// pending records.
#[rocket::async_trait]
pub trait ScoreStore: Send + Sync {
    /// Atomically expires a pending claim created before `stale_before`
    /// (assigning `fallback_name`) and inserts `score` as the new pending
    /// claim, unless a pending claim remains afterwards.
    async fn occupy_claim_slot(
        &self,
        score: NewScore,
        stale_before: OffsetDateTime,
        fallback_name: &str,
    ) -> StoreResult<SlotOutcome>;

    /// The record currently holding the claim slot, stale or not.
    async fn pending(&self) -> StoreResult<Option<ScoreRecord>>;

    async fn find(&self, id: ScoreId) -> StoreResult<Option<ScoreRecord>>;

    /// Names the record `id` if it is still pending and was created at or
    /// after `stale_before`. Returns the updated record, or `None` if the
    /// guard did not match.
    async fn name_pending(
        &self,
        id: ScoreId,
        name: &str,
        stale_before: OffsetDateTime,
    ) -> StoreResult<Option<ScoreRecord>>;

    /// Ids of pending records created before `stale_before`.
    async fn stale_pending(&self, stale_before: OffsetDateTime) -> StoreResult<Vec<ScoreId>>;

    /// Gives `id` the fallback name if it is still pending.
    /// Returns whether this call cleared the flag.
    async fn expire(&self, id: ScoreId, fallback_name: &str) -> StoreResult<bool>;

    /// Number of records with this score and mode created at or after `since`.
    async fn count_recent(
        &self,
        score: GameScore,
        gamemode: &str,
        since: OffsetDateTime,
    ) -> StoreResult<u64>;

    /// Best scores of a mode: score descending, then earliest `created_at`.
    async fn top_scores(&self, gamemode: &str, limit: u32) -> StoreResult<Vec<ScoreRecord>>;

    async fn gamemodes(&self) -> StoreResult<Vec<String>>;

    /// Inserts an already named record that never enters the claim slot.
    async fn insert_named(&self, score: NewScore, name: &str) -> StoreResult<ScoreId>;

    /// Removes every record and returns how many were deleted.
    async fn clear(&self) -> StoreResult<u64>;
}
