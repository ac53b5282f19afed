//! The pending-score claim protocol.
//!
//! Exactly one score at a time may wait for a display name. New scores are
//! refused with [`ClaimError::ClaimInProgress`] while that claim is fresh; once
//! it is older than the claim timeout it is given a generated name, either
//! lazily by the next submission or by [`ClaimResolver::sweep_expired`].

use std::sync::Arc;

use rocket::serde::Serialize;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use validator::Validate;

use crate::database::{GameScore, NewScore, ScoreId, ScoreRecord, ScoreStore, SlotOutcome};
use crate::gamemodes::GameMode;
use crate::leaderboard::{Leaderboard, RankedScore};
use crate::names::{generate_name, sanitize_name};

mod clock;
mod error;

pub use clock::*;
pub use error::*;

pub const DEFAULT_CLAIM_TIMEOUT: Duration = Duration::minutes(5);
pub const DEFAULT_DUPLICATE_WINDOW: Duration = Duration::seconds(60);
pub const DEFAULT_LEADERBOARD_LIMIT: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimPolicy {
    /// How long a score may wait for its name.
    pub claim_timeout: Duration,
    /// Window in which an identical score counts as a redelivery.
    pub duplicate_window: Duration,
}

impl Default for ClaimPolicy {
    fn default() -> Self {
        Self {
            claim_timeout: DEFAULT_CLAIM_TIMEOUT,
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
        }
    }
}

/// A score reported by the machine.
#[derive(Clone, Debug, Validate)]
pub struct ScoreSubmission {
    #[validate(range(min = 0))]
    pub score: GameScore,
    #[validate(length(min = 1, max = 50))]
    pub gamemode: String,
    /// When the score was made; defaults to the time of submission.
    pub achieved_at: Option<OffsetDateTime>,
}

impl ScoreSubmission {
    pub fn new(score: GameScore, gamemode: impl Into<String>) -> Self {
        Self {
            score,
            gamemode: gamemode.into(),
            achieved_at: None,
        }
    }

    pub fn achieved_at(mut self, achieved_at: OffsetDateTime) -> Self {
        self.achieved_at = Some(achieved_at);
        self
    }

    fn normalized(mut self) -> Self {
        self.gamemode = self.gamemode.trim().to_owned();
        self
    }
}

#[derive(Clone, Debug, Validate)]
pub struct LeaderboardQuery {
    #[validate(length(min = 1, max = 50))]
    pub gamemode: String,
    #[validate(range(min = 1, max = 100))]
    pub limit: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SubmitReceipt {
    pub record_id: ScoreId,
    /// A stale claim that was given a generated name to make room.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired: Option<ScoreId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct SweepReport {
    pub expired_count: u64,
}

/// Decides which score holds the claim slot, and resolves it.
///
/// The resolver keeps no state of its own: the slot lives in the store and
/// every decision is made by a guarded write there, so any number of
/// resolvers may share one database.
pub struct ClaimResolver {
    store: Arc<dyn ScoreStore>,
    clock: Arc<dyn Clock>,
    policy: ClaimPolicy,
}

impl ClaimResolver {
    pub fn new(store: Arc<dyn ScoreStore>, clock: Arc<dyn Clock>, policy: ClaimPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Claims created before this instant have expired.
    fn stale_before(&self, now: OffsetDateTime) -> OffsetDateTime {
        now - self.policy.claim_timeout
    }

    /// Records a new score as the pending claim.
    ///
    /// A stale claim is expired first; a fresh one makes this call fail with
    /// [`ClaimError::ClaimInProgress`] without writing anything.
    pub async fn submit(&self, submission: ScoreSubmission) -> ClaimResult<SubmitReceipt> {
        let submission = submission.normalized();
        submission.validate()?;

        let now = self.clock.now();
        let score = submission.score;
        let new_score = NewScore {
            score,
            gamemode: submission.gamemode,
            achieved_at: submission.achieved_at.unwrap_or(now),
            created_at: now,
        };
        let fallback_name = generate_name();

        match self
            .store
            .occupy_claim_slot(new_score, self.stale_before(now), &fallback_name)
            .await?
        {
            SlotOutcome::Claimed { id, expired } => {
                if let Some(expired) = expired {
                    info!(record_id = expired, name = %fallback_name, "stale claim expired");
                }
                info!(record_id = id, score, "score waiting for a name");
                Ok(SubmitReceipt {
                    record_id: id,
                    expired,
                })
            }
            SlotOutcome::Occupied => {
                info!(score, "score rejected, another claim is in progress");
                Err(ClaimError::ClaimInProgress)
            }
        }
    }

    /// The score waiting for a name, if any. Never writes: a claim past its
    /// timeout is reported as absent and left for the next sweep.
    pub async fn current_claim(&self) -> ClaimResult<Option<ScoreRecord>> {
        let stale_before = self.stale_before(self.clock.now());
        let pending = self.store.pending().await?;
        Ok(pending.filter(|record| record.created_at >= stale_before))
    }

    /// Attaches a player's name to the pending score `id`.
    pub async fn resolve_name(&self, id: ScoreId, proposed_name: &str) -> ClaimResult<ScoreRecord> {
        let name = sanitize_name(proposed_name).ok_or(ClaimError::EmptyName)?;
        let stale_before = self.stale_before(self.clock.now());

        if let Some(record) = self.store.name_pending(id, &name, stale_before).await? {
            info!(record_id = id, name = %name, "claim resolved");
            return Ok(record);
        }

        match self.store.find(id).await? {
            None => Err(ClaimError::NotFound { id }),
            Some(record) if record.pending_claim => {
                // Still pending after the guard failed, so it has timed out
                debug!(record_id = id, "name arrived after the claim timed out");
                self.sweep_expired().await?;
                Err(ClaimError::AlreadyResolved { id })
            }
            Some(_) => Err(ClaimError::AlreadyResolved { id }),
        }
    }

    /// Gives every timed-out claim a generated name.
    /// Records resolved concurrently by another path are skipped.
    pub async fn sweep_expired(&self) -> ClaimResult<SweepReport> {
        let stale_before = self.stale_before(self.clock.now());
        let mut expired_count = 0;

        for id in self.store.stale_pending(stale_before).await? {
            let name = generate_name();
            if self.store.expire(id, &name).await? {
                info!(record_id = id, name = %name, "stale claim expired");
                expired_count += 1;
            }
        }

        Ok(SweepReport { expired_count })
    }

    /// Whether the same score for the same mode was recorded within the
    /// duplicate window. Best effort only, for gateways that may redeliver.
    pub async fn is_recent_duplicate(&self, submission: &ScoreSubmission) -> ClaimResult<bool> {
        let since = self.clock.now() - self.policy.duplicate_window;
        let count = self
            .store
            .count_recent(submission.score, submission.gamemode.trim(), since)
            .await?;
        Ok(count > 0)
    }

    pub async fn top_scores(&self, query: LeaderboardQuery) -> ClaimResult<Leaderboard<RankedScore>> {
        query.validate()?;
        let records = self.store.top_scores(&query.gamemode, query.limit).await?;
        Ok(Leaderboard::ranked(
            records.into_iter().map(RankedScore),
            query.limit as usize,
        ))
    }

    pub async fn gamemodes(&self) -> ClaimResult<Vec<GameMode>> {
        let gamemodes = self.store.gamemodes().await?;
        Ok(gamemodes.iter().map(|id| GameMode::describe(id)).collect())
    }

    /// Inserts a score that already has a name. It never enters the claim slot.
    pub async fn add_named_score(
        &self,
        submission: ScoreSubmission,
        proposed_name: &str,
    ) -> ClaimResult<ScoreId> {
        let submission = submission.normalized();
        submission.validate()?;
        let name = sanitize_name(proposed_name).ok_or(ClaimError::EmptyName)?;

        let now = self.clock.now();
        let new_score = NewScore {
            score: submission.score,
            gamemode: submission.gamemode,
            achieved_at: submission.achieved_at.unwrap_or(now),
            created_at: now,
        };
        let id = self.store.insert_named(new_score, &name).await?;
        info!(record_id = id, name = %name, "named score added");
        Ok(id)
    }

    /// Deletes every score.
    pub async fn reset(&self) -> ClaimResult<u64> {
        let removed = self.store.clear().await?;
        info!(removed, "all scores deleted");
        Ok(removed)
    }
}
