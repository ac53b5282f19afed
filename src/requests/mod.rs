use rocket::http::Status;
use rocket::serde::{json::Json, Deserialize, Serialize};
use rocket::{catch, catchers, delete, get, post, routes, Catcher, Request, Route, State};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

use crate::access_keys::{ApiKey, AuthorityLevel};
use crate::claim::{
    ClaimResolver, LeaderboardQuery, ScoreSubmission, SubmitReceipt, SweepReport,
    DEFAULT_LEADERBOARD_LIMIT,
};
use crate::config::AppConfig;
use crate::database::{GameScore, ScoreId, ScoreRecord};
use crate::gamemodes::GameMode;
use crate::leaderboard::{Leaderboard, RankedScore};

mod no_store;
mod request_error;

pub use no_store::NoStore;
pub use request_error::*;

pub fn routes() -> Vec<Route> {
    routes![
        index,
        submit_score,
        ingest_score,
        current_claim,
        resolve_name,
        sweep_expired,
        gamemodes,
        top_scores,
        add_named_score,
        reset_scores,
    ]
}

pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}

/// A score as sent by the arcade machine.
#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct SubmitScoreRequest {
    pub score: GameScore,
    pub gamemode: String,
    /// RFC 3339, or `"default"` for "now".
    #[serde(default, alias = "datetime")]
    pub achieved_at: Option<String>,
}

impl SubmitScoreRequest {
    fn into_submission(self) -> RequestResult<ScoreSubmission> {
        let submission = ScoreSubmission::new(self.score, self.gamemode);
        Ok(match parse_achieved_at(self.achieved_at.as_deref())? {
            Some(achieved_at) => submission.achieved_at(achieved_at),
            None => submission,
        })
    }
}

/// Bridges post either the bare score or the message-bus webhook envelope.
#[derive(Deserialize)]
#[serde(crate = "rocket::serde", untagged)]
pub enum IngestRequest {
    Envelope { payload: SubmitScoreRequest },
    Flat(SubmitScoreRequest),
}

impl IngestRequest {
    fn into_inner(self) -> SubmitScoreRequest {
        match self {
            Self::Envelope { payload } => payload,
            Self::Flat(request) => request,
        }
    }
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde", tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Accepted(SubmitReceipt),
    /// The same score arrived moments ago; this delivery was dropped.
    Duplicate,
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct NameRequest {
    pub name: String,
}

#[derive(Deserialize)]
#[serde(crate = "rocket::serde")]
pub struct NamedScoreRequest {
    pub name: String,
    #[serde(flatten)]
    pub submission: SubmitScoreRequest,
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct AddedScore {
    pub record_id: ScoreId,
}

#[derive(Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ResetReport {
    pub removed: u64,
}

fn parse_achieved_at(raw: Option<&str>) -> RequestResult<Option<OffsetDateTime>> {
    match raw.map(str::trim) {
        None | Some("") | Some("default") => Ok(None),
        Some(value) => OffsetDateTime::parse(value, &Rfc3339)
            .map(Some)
            .map_err(|_| RequestError::InvalidTimestamp {
                value: value.to_owned(),
            }),
    }
}

fn parse_limit(raw: Option<&str>) -> RequestResult<u32> {
    match raw {
        None => Ok(DEFAULT_LEADERBOARD_LIMIT),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| RequestError::InvalidLimit {
                value: value.to_owned(),
            }),
    }
}

/// Fails unless `api_key` grants at least `required`.
/// A known key without enough authority is forbidden rather than unauthorized.
fn check_authority(
    config: &AppConfig,
    api_key: &ApiKey<'_>,
    required: AuthorityLevel,
) -> RequestResult<()> {
    match config.keys.authority(api_key) {
        granted if granted >= required => Ok(()),
        AuthorityLevel::Unauthorized => Err(RequestError::Unauthorized),
        _ => Err(RequestError::Forbidden),
    }
}

#[get("/")]
pub fn index() -> &'static str {
    "This is an arcade leaderboard server!"
}

/// Records a new score as the one waiting for a name.
/// Answers `409` with `Retry-After` while another score is still waiting.
#[post("/scores", format = "json", data = "<submission>")]
pub async fn submit_score(
    submission: Json<SubmitScoreRequest>,
    api_key: ApiKey<'_>,
    config: &State<AppConfig>,
    resolver: &State<ClaimResolver>,
) -> RequestResult<(Status, Json<SubmitReceipt>)> {
    check_authority(config, &api_key, AuthorityLevel::Device)?;

    let submission = submission.0.into_submission()?;
    let receipt = resolver.submit(submission).await?;
    Ok((Status::Created, Json(receipt)))
}

/// Entry point for bridges that may deliver the same score more than once.
#[post("/scores/ingest", format = "json", data = "<request>")]
pub async fn ingest_score(
    request: Json<IngestRequest>,
    api_key: ApiKey<'_>,
    config: &State<AppConfig>,
    resolver: &State<ClaimResolver>,
) -> RequestResult<(Status, Json<IngestOutcome>)> {
    check_authority(config, &api_key, AuthorityLevel::Device)?;

    let submission = request.0.into_inner().into_submission()?;
    if resolver.is_recent_duplicate(&submission).await? {
        info!(
            score = submission.score,
            gamemode = %submission.gamemode,
            "duplicate delivery skipped"
        );
        return Ok((Status::Ok, Json(IngestOutcome::Duplicate)));
    }

    let receipt = resolver.submit(submission).await?;
    Ok((Status::Created, Json(IngestOutcome::Accepted(receipt))))
}

/// The score currently waiting for a name, or `null`.
#[get("/claim")]
pub async fn current_claim(
    resolver: &State<ClaimResolver>,
) -> RequestResult<NoStore<Json<Option<ScoreRecord>>>> {
    let claim = resolver.current_claim().await?;
    Ok(NoStore(Json(claim)))
}

#[post("/claim/<id>/name", format = "json", data = "<request>")]
pub async fn resolve_name(
    id: ScoreId,
    request: Json<NameRequest>,
    resolver: &State<ClaimResolver>,
) -> RequestResult<Json<ScoreRecord>> {
    let record = resolver.resolve_name(id, &request.name).await?;
    Ok(Json(record))
}

/// Expires timed-out claims. Presentation clients call this on page load.
#[post("/claim/sweep")]
pub async fn sweep_expired(resolver: &State<ClaimResolver>) -> RequestResult<Json<SweepReport>> {
    let report = resolver.sweep_expired().await?;
    Ok(Json(report))
}

#[get("/games")]
pub async fn gamemodes(
    resolver: &State<ClaimResolver>,
) -> RequestResult<NoStore<Json<Vec<GameMode>>>> {
    let gamemodes = resolver.gamemodes().await?;
    Ok(NoStore(Json(gamemodes)))
}

#[get("/games/<gamemode>/scores?<limit>")]
pub async fn top_scores(
    gamemode: &str,
    limit: Option<&str>,
    resolver: &State<ClaimResolver>,
) -> RequestResult<NoStore<Json<Leaderboard<RankedScore>>>> {
    let query = LeaderboardQuery {
        gamemode: gamemode.to_owned(),
        limit: parse_limit(limit)?,
    };
    let leaderboard = resolver.top_scores(query).await?;
    Ok(NoStore(Json(leaderboard)))
}

/// Adds a score with a name already attached.
#[post("/admin/scores", format = "json", data = "<request>")]
pub async fn add_named_score(
    request: Json<NamedScoreRequest>,
    api_key: ApiKey<'_>,
    config: &State<AppConfig>,
    resolver: &State<ClaimResolver>,
) -> RequestResult<(Status, Json<AddedScore>)> {
    check_authority(config, &api_key, AuthorityLevel::Admin)?;

    let request = request.0;
    let submission = request.submission.into_submission()?;
    let record_id = resolver.add_named_score(submission, &request.name).await?;
    Ok((Status::Created, Json(AddedScore { record_id })))
}

/// Deletes every score.
#[delete("/admin/scores")]
pub async fn reset_scores(
    api_key: ApiKey<'_>,
    config: &State<AppConfig>,
    resolver: &State<ClaimResolver>,
) -> RequestResult<Json<ResetReport>> {
    check_authority(config, &api_key, AuthorityLevel::Admin)?;

    let removed = resolver.reset().await?;
    Ok(Json(ResetReport { removed }))
}

#[catch(default)]
pub fn default_catcher(status: Status, _request: &Request<'_>) -> (Status, Json<ErrorBody>) {
    let error = match status.code {
        400 | 422 => "VALIDATION",
        401 => "UNAUTHORIZED",
        403 => "FORBIDDEN",
        404 => "NOT_FOUND",
        _ => "REQUEST_FAILED",
    };
    let body = ErrorBody {
        error,
        message: status.reason().unwrap_or("request failed").to_owned(),
    };
    (status, Json(body))
}
