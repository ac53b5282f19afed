use std::sync::Arc;

use rocket::fairing::{self, AdHoc};
use rocket::{launch, Build, Rocket};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use claim::{ClaimResolver, SystemClock};
use config::AppConfig;
use database::SqlScoreStore;

mod access_keys;
mod claim;
mod config;
mod database;
mod gamemodes;
mod leaderboard;
mod names;
mod requests;
#[cfg(test)]
mod tests;

#[launch]
fn rocket() -> _ {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env();
    server(config).attach(AdHoc::try_on_ignite("Score store", open_score_store))
}

/// Routes, catchers and configuration. The claim resolver is managed separately.
fn server(config: AppConfig) -> Rocket<Build> {
    rocket::build()
        .mount("/", requests::routes())
        .register("/", requests::catchers())
        .manage(config)
}

async fn open_score_store(rocket: Rocket<Build>) -> fairing::Result {
    let (database_url, policy) = match rocket.state::<AppConfig>() {
        Some(config) => (config.database_url.clone(), config.policy),
        None => {
            error!("configuration is not managed");
            return Err(rocket);
        }
    };

    match SqlScoreStore::connect(&database_url).await {
        Ok(store) => {
            info!(
                claim_timeout = %policy.claim_timeout,
                duplicate_window = %policy.duplicate_window,
                "claim resolver ready"
            );
            let resolver = ClaimResolver::new(Arc::new(store), Arc::new(SystemClock), policy);
            Ok(rocket.manage(resolver))
        }
        Err(err) => {
            error!(error = %err, "failed to open the score store");
            Err(rocket)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
