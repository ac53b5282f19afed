use time::OffsetDateTime;
use tokio::sync::Mutex;

use super::*;
use crate::leaderboard::{Leaderboard, RankedScore};

/// Score store kept in process memory.
///
/// Each operation runs under a single lock, which gives it the same atomicity
/// the SQL store gets from conditional statements.
#[derive(Default)]
pub struct MemoryScoreStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: ScoreId,
    records: Vec<ScoreRecord>,
}

impl MemoryState {
    fn insert(&mut self, score: NewScore, name: Option<String>, pending_claim: bool) -> ScoreId {
        self.next_id += 1;
        let id = self.next_id;
        self.records.push(ScoreRecord {
            id,
            name,
            score: score.score,
            gamemode: score.gamemode,
            achieved_at: score.achieved_at,
            created_at: score.created_at,
            pending_claim,
        });
        id
    }
}

impl MemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently holding the claim slot.
    pub async fn pending_count(&self) -> usize {
        let state = self.state.lock().await;
        state.records.iter().filter(|record| record.pending_claim).count()
    }
}

#[rocket::async_trait]
impl ScoreStore for MemoryScoreStore {
    async fn occupy_claim_slot(
        &self,
        score: NewScore,
        stale_before: OffsetDateTime,
        fallback_name: &str,
    ) -> StoreResult<SlotOutcome> {
        let mut state = self.state.lock().await;

        let mut expired = None;
        for record in state.records.iter_mut() {
            if record.pending_claim && record.created_at < stale_before {
                record.pending_claim = false;
                record.name = Some(fallback_name.to_owned());
                expired = Some(record.id);
            }
        }

        if state.records.iter().any(|record| record.pending_claim) {
            return Ok(SlotOutcome::Occupied);
        }

        let id = state.insert(score, None, true);
        Ok(SlotOutcome::Claimed { id, expired })
    }

    async fn pending(&self) -> StoreResult<Option<ScoreRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .filter(|record| record.pending_claim)
            .max_by_key(|record| record.created_at)
            .cloned())
    }

    async fn find(&self, id: ScoreId) -> StoreResult<Option<ScoreRecord>> {
        let state = self.state.lock().await;
        Ok(state.records.iter().find(|record| record.id == id).cloned())
    }

    async fn name_pending(
        &self,
        id: ScoreId,
        name: &str,
        stale_before: OffsetDateTime,
    ) -> StoreResult<Option<ScoreRecord>> {
        let mut state = self.state.lock().await;
        let record = state.records.iter_mut().find(|record| {
            record.id == id && record.pending_claim && record.created_at >= stale_before
        });

        Ok(record.map(|record| {
            record.pending_claim = false;
            record.name = Some(name.to_owned());
            record.clone()
        }))
    }

    async fn stale_pending(&self, stale_before: OffsetDateTime) -> StoreResult<Vec<ScoreId>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .filter(|record| record.pending_claim && record.created_at < stale_before)
            .map(|record| record.id)
            .collect())
    }

    async fn expire(&self, id: ScoreId, fallback_name: &str) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state
            .records
            .iter_mut()
            .find(|record| record.id == id && record.pending_claim)
        {
            Some(record) => {
                record.pending_claim = false;
                record.name = Some(fallback_name.to_owned());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_recent(
        &self,
        score: GameScore,
        gamemode: &str,
        since: OffsetDateTime,
    ) -> StoreResult<u64> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .filter(|record| {
                record.score == score && record.gamemode == gamemode && record.created_at >= since
            })
            .count() as u64)
    }

    async fn top_scores(&self, gamemode: &str, limit: u32) -> StoreResult<Vec<ScoreRecord>> {
        let state = self.state.lock().await;
        let matching = state
            .records
            .iter()
            .filter(|record| record.gamemode == gamemode)
            .cloned()
            .map(RankedScore);
        Ok(Leaderboard::ranked(matching, limit as usize).into_records())
    }

    async fn gamemodes(&self) -> StoreResult<Vec<String>> {
        let state = self.state.lock().await;
        let mut gamemodes: Vec<String> = state
            .records
            .iter()
            .map(|record| record.gamemode.clone())
            .collect();
        gamemodes.sort();
        gamemodes.dedup();
        Ok(gamemodes)
    }

    async fn insert_named(&self, score: NewScore, name: &str) -> StoreResult<ScoreId> {
        let mut state = self.state.lock().await;
        Ok(state.insert(score, Some(name.to_owned()), false))
    }

    async fn clear(&self) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let removed = state.records.len() as u64;
        state.records.clear();
        Ok(removed)
    }
}
