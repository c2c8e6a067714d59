//! # expensectl: expense management backend
//!
//! `expensectl` turns photographed bills into structured expense records and runs the review
//! workflow around them. Employees upload bill images; a vision model transcribes each one, a chat
//! model pulls out the fields, and a deterministic pass normalizes and validates the result before
//! it is stored. HR users review, approve or reject, and export reports.
//!
//! ## Architecture
//!
//! Built on [Axum](https://github.com/tokio-rs/axum) with PostgreSQL:
//!
//! - **API Layer** ([`api`]): REST handlers for auth, expenses, HR review, profiles and files
//! - **Authentication** ([`auth`]): Argon2 password hashing and JWT bearer sessions
//! - **Extraction** ([`extraction`]): Vision and chat completion clients, normalization, validation
//! - **Database Layer** ([`db`]): The [`db::Store`] trait with Postgres and in-memory implementations
//! - **Storage** ([`storage`]): Uploaded bill files on local disk
//! - **Export** ([`export`]): CSV and XLSX reports
//! - **Configuration** ([`config`]): YAML file plus environment overrides
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use expensectl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = expensectl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     expensectl::telemetry::init_telemetry(&config.log_level)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Database Setup
//!
//! Migrations run automatically on startup; they can also be applied by hand:
//!
//! ```no_run
//! # use sqlx::PgPool;
//! # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
//! expensectl::migrator().run(&pool).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod export;
pub mod extraction;
pub mod storage;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod types;

use std::sync::Arc;

use api::handlers::{auth as auth_handlers, expenses, files, hr, users};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{self, HeaderValue},
    routing::{get, patch, post},
};
use bon::Builder;
pub use config::Config;
use config::CorsOrigin;
use db::{PostgresStore, Store};
use extraction::{ChatFieldExtractor, ExtractionPipeline, HttpExchangeRate, VisionTextExtractor, completions::CompletionsClient};
use storage::FileStore;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};

pub use types::{ExpenseId, UserId};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .store(Arc::new(store))
///     .config(config)
///     .pipeline(pipeline)
///     .files(files)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Config,
    pub pipeline: ExtractionPipeline,
    pub files: FileStore,
}

/// Get the expensectl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// A wildcard anywhere in `allowed_origins` allows every origin, and cannot be combined with
/// credentials.
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;
    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        if cors_config.allow_credentials {
            anyhow::bail!("CORS allow_credentials cannot be combined with a wildcard origin");
        }
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::PATCH, http::Method::OPTIONS])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(cors_config.allow_credentials)
        .expose_headers(vec![http::header::CONTENT_DISPOSITION]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// Upload routes carry a body limit of `uploads.max_request_size`; per-file limits are enforced by
/// [`FileStore::validate`]. Unknown paths answer with the JSON error envelope.
///
/// # Errors
///
/// Returns an error if the CORS configuration is invalid.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let body_limit = usize::try_from(state.config.uploads.max_request_size).unwrap_or(usize::MAX);

    let upload_routes = Router::new()
        .route("/expenses/upload", post(expenses::upload))
        .route("/expenses/upload/batch", post(expenses::upload_batch))
        .layer(DefaultBodyLimit::max(body_limit));

    let router = Router::new()
        .route("/health", get(files::health))
        // Authentication
        .route("/auth/register", post(auth_handlers::register))
        .route("/auth/login", post(auth_handlers::login))
        // Expenses
        .merge(upload_routes)
        .route("/expenses/my", get(expenses::list_mine))
        .route("/expenses/export", get(expenses::export_mine))
        .route("/expenses/{id}/file", get(expenses::download_file))
        // HR review
        .route("/hr/expenses", get(hr::list_all))
        .route("/hr/expenses/export", get(hr::export_all))
        .route("/hr/expenses/{id}/status", patch(hr::update_status))
        .route("/hr/expenses/bulk-status", patch(hr::bulk_update_status))
        // Users
        .route("/users/profile", get(users::get_profile).patch(users::update_profile))
        .route("/users/change-password", post(users::change_password))
        .route("/users/all", get(users::list_users))
        // Uploaded files
        .route("/files/{*path}", get(files::serve_upload))
        .fallback(files::not_found)
        .with_state(state.clone());

    let router = router.layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(create_cors_layer(&state.config)?),
    );

    Ok(router)
}

/// Wire the production extraction pipeline: vision transcription and field extraction share one
/// completions client, so they also share its concurrency limit.
fn create_pipeline(config: &Config) -> anyhow::Result<ExtractionPipeline> {
    let completions = Arc::new(CompletionsClient::new(&config.extraction)?);
    Ok(ExtractionPipeline::new(
        Arc::new(VisionTextExtractor::new(completions.clone())),
        Arc::new(ChatFieldExtractor::new(completions)),
        Arc::new(HttpExchangeRate::new(&config.exchange_rate)?),
    ))
}

/// The running service.
///
/// 1. **Create**: [`Application::new`] connects to the database, runs migrations and wires the
///    extraction providers
/// 2. **Serve**: [`Application::serve`] binds to `host:port` and handles requests until the shutdown
///    future resolves
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<sqlx::PgPool>,
}

impl Application {
    /// Create a new application instance backed by PostgreSQL.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting expensectl with configuration: {:#?}", config);

        let store = PostgresStore::connect(&config.database).await?;
        store.migrate().await?;
        info!("Database migrations applied");

        let pool = store.pool().clone();
        let mut app = Self::with_store(config, Arc::new(store))?;
        app.pool = Some(pool);
        Ok(app)
    }

    /// Create an application over an existing store, with the configured extraction providers.
    pub fn with_store(config: Config, store: Arc<dyn Store>) -> anyhow::Result<Self> {
        let state = AppState::builder()
            .store(store)
            .pipeline(create_pipeline(&config)?)
            .files(FileStore::new(&config.uploads))
            .config(config.clone())
            .build();

        let router = build_router(state)?;
        Ok(Self { router, config, pool: None })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("expensectl listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        Ok(())
    }
}
