use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::Row;
use time::OffsetDateTime;
use tracing::{debug, info};

use super::score::{from_millis, to_millis};
use super::*;

pub type DatabasePool = sqlx::AnyPool;

/// Columns in the order `record_from_row` reads them.
///
/// The `Any` driver cannot decode a NULL text column and narrows SQLite
/// integers to 32 bits on the way out. Names therefore come with an explicit
/// null flag, and millisecond timestamps are read back as text.
const RECORD_COLUMNS: &str = "id, COALESCE(name, '') AS name, \
     CAST(CASE WHEN name IS NULL THEN 1 ELSE 0 END AS BIGINT) AS unnamed, \
     CAST(score AS BIGINT) AS score, gamemode, \
     CAST(achieved_at AS TEXT) AS achieved_at_millis, \
     CAST(created_at AS TEXT) AS created_at_millis, \
     CAST(CASE WHEN pending_claim THEN 1 ELSE 0 END AS BIGINT) AS pending_claim";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    Sqlite,
    Postgres,
}

impl Backend {
    fn from_url(database_url: &str) -> StoreResult<Self> {
        if database_url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else if database_url.starts_with("postgres:") || database_url.starts_with("postgresql:")
        {
            Ok(Self::Postgres)
        } else {
            Err(StoreError::UnsupportedBackend {
                url: database_url.to_owned(),
            })
        }
    }

    fn create_table(self) -> &'static str {
        match self {
            Self::Sqlite => {
                "CREATE TABLE IF NOT EXISTS scores (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT,
                    score INTEGER NOT NULL,
                    gamemode TEXT NOT NULL,
                    achieved_at BIGINT NOT NULL,
                    created_at BIGINT NOT NULL,
                    pending_claim BOOLEAN NOT NULL DEFAULT FALSE
                )"
            }
            Self::Postgres => {
                "CREATE TABLE IF NOT EXISTS scores (
                    id BIGSERIAL PRIMARY KEY,
                    name VARCHAR(255),
                    score INTEGER NOT NULL,
                    gamemode VARCHAR(50) NOT NULL,
                    achieved_at BIGINT NOT NULL,
                    created_at BIGINT NOT NULL,
                    pending_claim BOOLEAN NOT NULL DEFAULT FALSE
                )"
            }
        }
    }
}

/// Score store backed by a SQLite or PostgreSQL database.
pub struct SqlScoreStore {
    pool: DatabasePool,
}

impl SqlScoreStore {
    /// Connects to `database_url` and creates the schema if it is missing.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let backend = Backend::from_url(database_url)?;
        sqlx::any::install_default_drivers();

        let mut options = AnyPoolOptions::new();
        if database_url.contains(":memory:") {
            // Each connection would otherwise open its own empty database
            options = options
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options.connect(database_url).await?;

        let store = Self { pool };
        store.bootstrap(backend).await?;
        info!(?backend, "score store ready");
        Ok(store)
    }

    async fn bootstrap(&self, backend: Backend) -> StoreResult<()> {
        sqlx::query(backend.create_table())
            .execute(&self.pool)
            .await?;

        // At most one row may hold the claim slot
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS scores_single_pending_claim \
             ON scores (pending_claim) WHERE pending_claim = TRUE",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS scores_by_gamemode \
             ON scores (gamemode, score DESC, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn timestamp_column(row: &AnyRow, index: usize) -> StoreResult<OffsetDateTime> {
    let text = row.try_get_unchecked::<String, usize>(index)?;
    let millis = text
        .trim()
        .parse::<i64>()
        .map_err(|err| sqlx::Error::ColumnDecode {
            index: index.to_string(),
            source: Box::new(err),
        })?;
    from_millis(millis).map_err(|source| StoreError::Timestamp { millis, source })
}

fn record_from_row(row: &AnyRow) -> StoreResult<ScoreRecord> {
    let name = row.try_get_unchecked::<String, usize>(1)?;
    let unnamed = row.try_get_unchecked::<i64, usize>(2)? != 0;
    Ok(ScoreRecord {
        id: row.try_get_unchecked::<ScoreId, usize>(0)?,
        name: if unnamed { None } else { Some(name) },
        score: GameScore::try_from(row.try_get_unchecked::<i64, usize>(3)?)
            .map_err(|err| sqlx::Error::Decode(Box::new(err)))?,
        gamemode: row.try_get_unchecked::<String, usize>(4)?,
        achieved_at: timestamp_column(row, 5)?,
        created_at: timestamp_column(row, 6)?,
        pending_claim: row.try_get_unchecked::<i64, usize>(7)? != 0,
    })
}

#[rocket::async_trait]
impl ScoreStore for SqlScoreStore {
    async fn occupy_claim_slot(
        &self,
        score: NewScore,
        stale_before: OffsetDateTime,
        fallback_name: &str,
    ) -> StoreResult<SlotOutcome> {
        let mut transaction = self.pool.begin().await?;

        let expired = sqlx::query(
            "UPDATE scores SET name = $1, pending_claim = FALSE \
             WHERE pending_claim = TRUE AND created_at < $2 RETURNING id",
        )
        .bind(fallback_name)
        .bind(to_millis(stale_before))
        .fetch_all(&mut *transaction)
        .await?;
        let expired = match expired.first() {
            Some(row) => Some(row.try_get_unchecked::<ScoreId, usize>(0)?),
            None => None,
        };

        let inserted = sqlx::query(
            "INSERT INTO scores (score, gamemode, achieved_at, created_at, pending_claim) \
             SELECT $1, $2, $3, $4, TRUE \
             WHERE NOT EXISTS (SELECT 1 FROM scores WHERE pending_claim = TRUE) \
             RETURNING id",
        )
        .bind(score.score)
        .bind(score.gamemode.as_str())
        .bind(to_millis(score.achieved_at))
        .bind(to_millis(score.created_at))
        .fetch_optional(&mut *transaction)
        .await;

        match inserted {
            Ok(Some(row)) => {
                let id = row.try_get_unchecked::<ScoreId, usize>(0)?;
                transaction.commit().await?;
                Ok(SlotOutcome::Claimed { id, expired })
            }
            Ok(None) => {
                transaction.rollback().await?;
                Ok(SlotOutcome::Occupied)
            }
            // A concurrent insert won the race past the NOT EXISTS check
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                debug!(error = %err, "claim slot taken concurrently");
                transaction.rollback().await?;
                Ok(SlotOutcome::Occupied)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn pending(&self) -> StoreResult<Option<ScoreRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM scores WHERE pending_claim = TRUE ORDER BY created_at DESC LIMIT 1",
            RECORD_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn find(&self, id: ScoreId) -> StoreResult<Option<ScoreRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM scores WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn name_pending(
        &self,
        id: ScoreId,
        name: &str,
        stale_before: OffsetDateTime,
    ) -> StoreResult<Option<ScoreRecord>> {
        let row = sqlx::query(&format!(
            "UPDATE scores SET name = $1, pending_claim = FALSE \
             WHERE id = $2 AND pending_claim = TRUE AND created_at >= $3 \
             RETURNING {}",
            RECORD_COLUMNS
        ))
        .bind(name)
        .bind(id)
        .bind(to_millis(stale_before))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn stale_pending(&self, stale_before: OffsetDateTime) -> StoreResult<Vec<ScoreId>> {
        let rows = sqlx::query(
            "SELECT id FROM scores WHERE pending_claim = TRUE AND created_at < $1 ORDER BY id",
        )
        .bind(to_millis(stale_before))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok(row.try_get_unchecked::<ScoreId, usize>(0)?))
            .collect()
    }

    async fn expire(&self, id: ScoreId, fallback_name: &str) -> StoreResult<bool> {
        let response = sqlx::query(
            "UPDATE scores SET name = $1, pending_claim = FALSE \
             WHERE id = $2 AND pending_claim = TRUE",
        )
        .bind(fallback_name)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(response.rows_affected() == 1)
    }

    async fn count_recent(
        &self,
        score: GameScore,
        gamemode: &str,
        since: OffsetDateTime,
    ) -> StoreResult<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM scores WHERE score = $1 AND gamemode = $2 AND created_at >= $3",
        )
        .bind(score)
        .bind(gamemode)
        .bind(to_millis(since))
        .fetch_one(&self.pool)
        .await?;

        let count = row.try_get_unchecked::<i64, usize>(0)?;
        Ok(count.max(0) as u64)
    }

    async fn top_scores(&self, gamemode: &str, limit: u32) -> StoreResult<Vec<ScoreRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM scores WHERE gamemode = $1 \
             ORDER BY score DESC, created_at ASC, id ASC LIMIT $2",
            RECORD_COLUMNS
        ))
        .bind(gamemode)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn gamemodes(&self) -> StoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT gamemode FROM scores ORDER BY gamemode")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| Ok(row.try_get_unchecked::<String, usize>(0)?))
            .collect()
    }

    async fn insert_named(&self, score: NewScore, name: &str) -> StoreResult<ScoreId> {
        let row = sqlx::query(
            "INSERT INTO scores (name, score, gamemode, achieved_at, created_at, pending_claim) \
             VALUES ($1, $2, $3, $4, $5, FALSE) RETURNING id",
        )
        .bind(name)
        .bind(score.score)
        .bind(score.gamemode.as_str())
        .bind(to_millis(score.achieved_at))
        .bind(to_millis(score.created_at))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get_unchecked::<ScoreId, usize>(0)?)
    }

    async fn clear(&self) -> StoreResult<u64> {
        let response = sqlx::query("DELETE FROM scores")
            .execute(&self.pool)
            .await?;

        Ok(response.rows_affected())
    }
}
