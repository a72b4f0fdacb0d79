use std::path::PathBuf;

use anyhow::Context;

mod app;
mod auth;
mod config;
mod error;
mod extract;
mod images;
mod ingredients;
mod pagination;
mod recipes;
mod relations;
mod shopping;
mod state;
mod storage;
mod tags;
#[cfg(test)]
mod testing;
mod users;

use crate::{config::AppConfig, state::AppState};

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "foodgram=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let (state, db) = AppState::init(config).await?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("serve") => app::serve(app::build_app(state)).await,
        Some("load-ingredients") => {
            let path = args
                .next()
                .map(PathBuf::from)
                .context("usage: foodgram load-ingredients <path>")?;
            ingredients::import::load_from_path(state.ingredients.as_ref(), &path).await?;
            Ok(())
        }
        Some(other) => anyhow::bail!("unknown command `{other}`; expected `serve` or `load-ingredients <path>`"),
    }
}
