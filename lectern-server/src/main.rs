use std::{net::SocketAddr, str::FromStr};

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use lectern_api::{AuthToken, Uuid};
use structopt::StructOpt;
use tower_http::trace::TraceLayer;

mod db;
mod error;
mod extractors;
mod fuzz;
mod handlers;

use error::Error;
use extractors::*;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Videos can get big
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

#[derive(Debug, StructOpt)]
#[structopt(name = "lectern-server", about = "Serves the content portal API")]
struct Opt {
    /// Address to listen on
    #[structopt(long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// sqlite database to use, eg. `sqlite://lectern.db`
    #[structopt(long, env = "DATABASE_URL")]
    database_url: String,

    /// Bearer token allowed to create and delete users. User management is
    /// disabled if unset.
    #[structopt(long, env = "ADMIN_TOKEN")]
    admin_token: Option<Uuid>,

    #[structopt(long, default_value = "8")]
    max_db_connections: u32,
}

pub async fn create_sqlx_pool(db_url: &str, max_connections: u32) -> anyhow::Result<sqlx::SqlitePool> {
    let options = sqlx::sqlite::SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database url {db_url:?}"))?
        .create_if_missing(true)
        .foreign_keys(true);
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("opening database {db_url:?}"))
}

pub fn app(db: sqlx::SqlitePool, admin_token: Option<AuthToken>) -> Router {
    let state = AppState {
        db: DbPool::new(db),
        admin_token,
    };
    Router::new()
        .route("/api/admin/create-user", post(handlers::admin_create_user))
        .route("/api/admin/delete-user", post(handlers::admin_delete_user))
        .route("/api/auth", post(handlers::auth))
        .route("/api/unauth", post(handlers::unauth))
        .route("/api/whoami", get(handlers::whoami))
        .route("/api/update-profile", post(handlers::update_profile))
        .route("/api/fetch-users", get(handlers::fetch_users))
        .route("/api/items/:kind", get(handlers::list_items))
        .route("/api/items/:kind/:id", get(handlers::fetch_item))
        .route("/api/submit-action", post(handlers::submit_action))
        .route(
            "/api/blobs",
            post(handlers::upload_blob).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/blobs/*path", get(handlers::fetch_blob))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();

    let db = create_sqlx_pool(&opt.database_url, opt.max_db_connections).await?;
    MIGRATOR
        .run(&db)
        .await
        .context("running pending migrations")?;

    if opt.admin_token.is_none() {
        tracing::warn!("no admin token set, users cannot be created or deleted");
    }
    let app = app(db, opt.admin_token.map(AuthToken));

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app.into_make_service())
        .await
        .context("serving axum webserver")
}
