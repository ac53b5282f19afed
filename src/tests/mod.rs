use std::sync::Arc;

use rocket::{
    http::{Header, Status},
    local::asynchronous::{Client, LocalResponse},
    serde::json::{json, Value},
};
use time::{Duration, OffsetDateTime};

use crate::{
    access_keys::{AccessKeys, StringKey},
    claim::{ClaimPolicy, ClaimResolver, Clock, ManualClock},
    config::AppConfig,
    database::{ScoreRecord, SqlScoreStore},
};

const DEVICE_KEY: &str = "device-test-key";
const ADMIN_KEY: &str = "admin-test-key";

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_owned(),
        policy: ClaimPolicy::default(),
        keys: AccessKeys {
            device_key: StringKey::new(DEVICE_KEY),
            admin_key: StringKey::new(ADMIN_KEY),
        },
    }
}

/// Builds the server on a fresh in-memory database with a clock the test controls.
async fn spawn_client() -> (Client, Arc<ManualClock>) {
    let config = test_config();
    let store = SqlScoreStore::connect(&config.database_url)
        .await
        .expect("in-memory database");
    let clock = Arc::new(ManualClock::new(OffsetDateTime::now_utc()));
    let resolver = ClaimResolver::new(Arc::new(store), clock.clone(), config.policy);

    let rocket = super::server(config).manage(resolver);
    let client = Client::tracked(rocket)
        .await
        .expect("valid rocket instance");
    (client, clock)
}

async fn deserialize_response<'a, T: rocket::serde::DeserializeOwned>(
    response: LocalResponse<'a>,
) -> rocket::serde::json::serde_json::Result<T> {
    let string = response.into_string().await.unwrap();
    rocket::serde::json::serde_json::from_str(&string)
}

/// Submits a score as the arcade machine and returns the response.
async fn submit_score<'a>(
    client: &'a Client,
    score: i32,
    gamemode: &str,
    api_key: &str,
) -> LocalResponse<'a> {
    client
        .post("/scores")
        .header(Header::new("api-key", api_key.to_owned()))
        .json(&json!({ "score": score, "gamemode": gamemode, "datetime": "default" }))
        .dispatch()
        .await
}

/// Submits a score that must be accepted and returns its id.
async fn submit_accepted(client: &Client, score: i32, gamemode: &str) -> i64 {
    let response = submit_score(client, score, gamemode, DEVICE_KEY).await;
    assert_eq!(response.status(), Status::Created);
    let body = deserialize_response::<Value>(response).await.unwrap();
    body["record_id"].as_i64().unwrap()
}

async fn resolve_name<'a>(client: &'a Client, id: i64, name: &str) -> LocalResponse<'a> {
    client
        .post(format!("/claim/{}/name", id))
        .json(&json!({ "name": name }))
        .dispatch()
        .await
}

async fn current_claim(client: &Client) -> Option<ScoreRecord> {
    let response = client.get("/claim").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    deserialize_response(response).await.unwrap()
}

async fn add_named_score(client: &Client, name: &str, score: i32, gamemode: &str) {
    let response = client
        .post("/admin/scores")
        .header(Header::new("api-key", ADMIN_KEY))
        .json(&json!({ "name": name, "score": score, "gamemode": gamemode }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
}

async fn error_code(response: LocalResponse<'_>) -> String {
    let body = deserialize_response::<Value>(response).await.unwrap();
    body["error"].as_str().unwrap().to_owned()
}

/// Submits a score, names it, and fails to name it again
#[rocket::async_test]
async fn submit_and_claim_a_score() {
    let (client, clock) = spawn_client().await;

    let id = submit_accepted(&client, 500, "reflex").await;
    let claim = current_claim(&client).await.unwrap();
    assert_eq!(claim.id, id);
    assert_eq!(claim.score, 500);
    assert!(claim.pending_claim);

    clock.advance(Duration::seconds(10));
    let response = resolve_name(&client, id, "  Ace  ").await;
    assert_eq!(response.status(), Status::Ok);
    let record = deserialize_response::<ScoreRecord>(response).await.unwrap();
    assert_eq!(record.name.as_deref(), Some("Ace"));
    assert!(!record.pending_claim);

    let response = resolve_name(&client, id, "Other").await;
    assert_eq!(response.status(), Status::Conflict);
    assert_eq!(error_code(response).await, "ALREADY_RESOLVED");

    assert_eq!(current_claim(&client).await, None);
}

/// Polled endpoints must never be cached
#[rocket::async_test]
async fn polled_endpoints_disable_caching() {
    let (client, _) = spawn_client().await;

    for uri in ["/claim", "/games", "/games/reflex/scores"] {
        let response = client.get(uri).dispatch().await;
        assert_eq!(response.status(), Status::Ok, "{}", uri);
        assert_eq!(
            response.headers().get_one("Cache-Control"),
            Some("no-store, no-cache, must-revalidate, proxy-revalidate")
        );
        assert_eq!(response.headers().get_one("Pragma"), Some("no-cache"));
    }
}

/// A second score waits until the first one is named or times out
#[rocket::async_test]
async fn second_score_conflicts_until_the_claim_times_out() {
    let (client, clock) = spawn_client().await;

    let first = submit_accepted(&client, 100, "endless").await;

    let response = submit_score(&client, 200, "endless", DEVICE_KEY).await;
    assert_eq!(response.status(), Status::Conflict);
    assert_eq!(response.headers().get_one("Retry-After"), Some("5"));
    assert_eq!(error_code(response).await, "CLAIM_IN_PROGRESS");

    clock.advance(Duration::seconds(301));
    let response = submit_score(&client, 200, "endless", DEVICE_KEY).await;
    assert_eq!(response.status(), Status::Created);
    let body = deserialize_response::<Value>(response).await.unwrap();
    assert_eq!(body["expired"].as_i64(), Some(first));

    let claim = current_claim(&client).await.unwrap();
    assert_eq!(claim.id, body["record_id"].as_i64().unwrap());
    assert_eq!(claim.score, 200);
}

/// Only the device or admin key may submit scores
#[rocket::async_test]
async fn submissions_require_a_device_key() {
    let (client, _) = spawn_client().await;

    let response = client
        .post("/scores")
        .json(&json!({ "score": 1, "gamemode": "reflex" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);

    let response = submit_score(&client, 1, "reflex", "thatisarandomkey").await;
    assert_eq!(response.status(), Status::Unauthorized);
    assert_eq!(error_code(response).await, "UNAUTHORIZED");

    let response = submit_score(&client, 1, "reflex", ADMIN_KEY).await;
    assert_eq!(response.status(), Status::Created);
}

/// Malformed submissions and names are rejected before reaching the store
#[rocket::async_test]
async fn invalid_input_is_rejected() {
    let (client, _) = spawn_client().await;

    let response = submit_score(&client, -5, "reflex", DEVICE_KEY).await;
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(error_code(response).await, "VALIDATION");

    let response = client
        .post("/scores")
        .header(Header::new("api-key", DEVICE_KEY))
        .json(&json!({ "score": 5, "gamemode": "reflex", "achieved_at": "last tuesday" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let id = submit_accepted(&client, 5, "reflex").await;
    let response = resolve_name(&client, id, "   ").await;
    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(error_code(response).await, "EMPTY_NAME");
    assert!(current_claim(&client).await.unwrap().pending_claim);

    let response = resolve_name(&client, id + 1000, "Ace").await;
    assert_eq!(response.status(), Status::NotFound);
    assert_eq!(error_code(response).await, "NOT_FOUND");
}

/// Redelivered bridge messages are dropped within the duplicate window
#[rocket::async_test]
async fn ingest_skips_redelivered_scores() {
    let (client, clock) = spawn_client().await;
    let envelope = json!({ "payload": { "score": 900, "gamemode": "asteroids" } });

    let response = client
        .post("/scores/ingest")
        .header(Header::new("Authorization", format!("Bearer {}", DEVICE_KEY)))
        .json(&envelope)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Created);
    let body = deserialize_response::<Value>(response).await.unwrap();
    assert_eq!(body["status"], "accepted");
    let id = body["record_id"].as_i64().unwrap();
    assert_eq!(resolve_name(&client, id, "Ace").await.status(), Status::Ok);

    clock.advance(Duration::seconds(20));
    let response = client
        .post("/scores/ingest")
        .header(Header::new("api-key", DEVICE_KEY))
        .json(&envelope)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body = deserialize_response::<Value>(response).await.unwrap();
    assert_eq!(body["status"], "duplicate");
    assert_eq!(current_claim(&client).await, None);
}

/// Equal scores are ranked by who got there first
#[rocket::async_test]
async fn leaderboard_ranks_ties_by_creation_time() {
    let (client, clock) = spawn_client().await;

    for (name, score) in [("Early", 300), ("Low", 100), ("Later", 300)] {
        add_named_score(&client, name, score, "endless").await;
        clock.advance(Duration::seconds(1));
    }
    add_named_score(&client, "Elsewhere", 999, "reflex").await;

    let response = client.get("/games/endless/scores?limit=10").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let records = deserialize_response::<Vec<ScoreRecord>>(response)
        .await
        .unwrap();
    let order: Vec<(i32, String)> = records
        .into_iter()
        .map(|record| (record.score, record.name.unwrap_or_default()))
        .collect();
    assert_eq!(
        order,
        vec![
            (300, "Early".to_owned()),
            (300, "Later".to_owned()),
            (100, "Low".to_owned())
        ]
    );

    let response = client.get("/games/endless/scores?limit=0").dispatch().await;
    assert_eq!(response.status(), Status::BadRequest);
}

/// A limit that is not a whole number is a validation error, not the default
#[rocket::async_test]
async fn malformed_leaderboard_limit_is_rejected() {
    let (client, _) = spawn_client().await;
    add_named_score(&client, "Ace", 10, "endless").await;

    for limit in ["abc", "-1", "99999999999"] {
        let response = client
            .get(format!("/games/endless/scores?limit={}", limit))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest, "{}", limit);
        assert_eq!(error_code(response).await, "VALIDATION");
    }

    let response = client.get("/games/endless/scores").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
}

/// A fresh claim stays visible with its real creation time, and pending
/// scores show up unnamed on the leaderboard
#[rocket::async_test]
async fn current_claim_keeps_its_creation_time() {
    let (client, clock) = spawn_client().await;
    let id = submit_accepted(&client, 700, "endless").await;

    let claim = current_claim(&client).await.unwrap();
    assert_eq!(claim.id, id);
    assert_eq!(claim.name, None);
    assert!((clock.now() - claim.created_at).abs() < Duration::seconds(1));

    let response = client.get("/games/endless/scores").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let records = deserialize_response::<Vec<ScoreRecord>>(response)
        .await
        .unwrap();
    assert_eq!(records, vec![claim]);
}

/// Game modes present in the store are listed with display details
#[rocket::async_test]
async fn game_modes_are_listed() {
    let (client, _) = spawn_client().await;
    add_named_score(&client, "Ace", 10, "frogger").await;
    add_named_score(&client, "Ace", 10, "space-race").await;

    let response = client.get("/games").dispatch().await;
    let modes = deserialize_response::<Value>(response).await.unwrap();
    assert_eq!(
        modes,
        json!([
            { "id": "frogger", "name": "FROGGER", "icon": "🐸" },
            { "id": "space-race", "name": "Space Race", "icon": "🕹️" },
        ])
    );
}

/// The sweep names a timed-out claim once
#[rocket::async_test]
async fn sweep_expires_a_stale_claim_once() {
    let (client, clock) = spawn_client().await;
    let id = submit_accepted(&client, 100, "endless").await;

    clock.advance(Duration::seconds(301));
    assert_eq!(current_claim(&client).await, None);

    let response = client.post("/claim/sweep").dispatch().await;
    let report = deserialize_response::<Value>(response).await.unwrap();
    assert_eq!(report["expired_count"], 1);

    let response = client.post("/claim/sweep").dispatch().await;
    let report = deserialize_response::<Value>(response).await.unwrap();
    assert_eq!(report["expired_count"], 0);

    let response = resolve_name(&client, id, "TooLate").await;
    assert_eq!(response.status(), Status::Conflict);
}

/// Admin endpoints need the admin key
#[rocket::async_test]
async fn admin_endpoints_require_the_admin_key() {
    let (client, _) = spawn_client().await;

    let response = client
        .post("/admin/scores")
        .header(Header::new("api-key", DEVICE_KEY))
        .json(&json!({ "name": "Ace", "score": 10, "gamemode": "reflex" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);
    assert_eq!(error_code(response).await, "FORBIDDEN");

    let response = client
        .post("/admin/scores")
        .header(Header::new("api-key", "thatisarandomkey"))
        .json(&json!({ "name": "Ace", "score": 10, "gamemode": "reflex" }))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);

    add_named_score(&client, "Ace", 10, "reflex").await;
    submit_accepted(&client, 20, "reflex").await;

    let response = client
        .delete("/admin/scores")
        .header(Header::new("api-key", DEVICE_KEY))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let response = client
        .delete("/admin/scores")
        .header(Header::new("api-key", ADMIN_KEY))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let report = deserialize_response::<Value>(response).await.unwrap();
    assert_eq!(report["removed"], 2);
    assert_eq!(current_claim(&client).await, None);
}
