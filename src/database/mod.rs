#[cfg(test)]
mod memory;
mod score;
mod sql;
mod store;

#[cfg(test)]
pub use memory::MemoryScoreStore;
pub use score::{GameScore, NewScore, ScoreId, ScoreRecord};
pub use sql::SqlScoreStore;
pub use store::*;
