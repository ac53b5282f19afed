use std::cmp::Ordering;

use rocket::serde::{self, Serialize};

use crate::database::ScoreRecord;

/// An ordered, size-limited list of items, best first.
pub struct Leaderboard<T: LeaderboardItem> {
    collection: Vec<T>,
}

impl<T: LeaderboardItem> Leaderboard<T> {
    pub fn new(collection: Vec<T>) -> Self {
        Self { collection }
    }

    /// Sorts `items` best first and keeps the top `limit`.
    pub fn ranked(items: impl IntoIterator<Item = T>, limit: usize) -> Self {
        let mut collection: Vec<T> = items.into_iter().collect();
        collection.sort();
        collection.truncate(limit);
        Self::new(collection)
    }
}

#[cfg(test)]
impl Leaderboard<RankedScore> {
    pub fn into_records(self) -> Vec<ScoreRecord> {
        self.collection.into_iter().map(|ranked| ranked.0).collect()
    }
}

impl<T: LeaderboardItem> Serialize for Leaderboard<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.collection.serialize(serializer)
    }
}

pub trait LeaderboardItem: Ord + Serialize {}

impl<T: Ord + Serialize> LeaderboardItem for T {}

/// A score ordered for display: higher score first, then whoever got it earlier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(crate = "rocket::serde", transparent)]
pub struct RankedScore(pub ScoreRecord);

impl Ord for RankedScore {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .score
            .cmp(&self.0.score)
            .then_with(|| self.0.created_at.cmp(&other.0.created_at))
            .then_with(|| self.0.id.cmp(&other.0.id))
    }
}

impl PartialOrd for RankedScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
