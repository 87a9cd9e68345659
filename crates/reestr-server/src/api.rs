//! Trigger surface: fire-and-forget crawl, replay, and backfill endpoints.
//!
//! Every trigger spawns its work onto the runtime and answers 202
//! immediately; crawls run for hours and nothing should hold an HTTP
//! connection open that long. Progress is observable through the logs and
//! the ledger.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing::error;

use reestr_core::Category;
use reestr_db::PgStore;
use reestr_harvest::{
    replay_failed, ChromeSessionFactory, Crawler, DetailFetcher, Direction, ImageBackfill,
};

pub type ServerCrawler = Crawler<ChromeSessionFactory, PgStore>;
pub type ServerBackfill = ImageBackfill<ChromeSessionFactory, PgStore>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub crawler: ServerCrawler,
    pub detail: DetailFetcher<PgStore>,
    pub backfill: ServerBackfill,
    pub store: PgStore,
    pub base_url: String,
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/crawl", post(crawl_all_both))
        .route("/api/v1/crawl/forward", post(crawl_all_forward))
        .route("/api/v1/crawl/backward", post(crawl_all_backward))
        .route("/api/v1/crawl/{category}", post(crawl_category))
        .route(
            "/api/v1/crawl/{category}/from-end",
            post(crawl_category_from_end),
        )
        .route("/api/v1/crawl/{category}/both", post(crawl_category_both))
        .route("/api/v1/replay-failed", post(replay))
        .route("/api/v1/backfill-images", post(backfill_images))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match reestr_db::ping(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "up" })),
        ),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "down" })),
            )
        }
    }
}

fn accepted(job: String) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "job": job })),
    )
}

fn unknown_category(name: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": format!("unknown category: {name}") })),
    )
}

async fn crawl_all_both(State(state): State<AppState>) -> impl IntoResponse {
    tokio::spawn(async move {
        state.crawler.run_all_categories_both().await;
    });
    accepted("crawl all categories, both directions".to_owned())
}

async fn crawl_all_forward(State(state): State<AppState>) -> impl IntoResponse {
    tokio::spawn(async move {
        state.crawler.run_all_categories(Direction::Forward).await;
    });
    accepted("crawl all categories, forward".to_owned())
}

async fn crawl_all_backward(State(state): State<AppState>) -> impl IntoResponse {
    tokio::spawn(async move {
        state.crawler.run_all_categories(Direction::Backward).await;
    });
    accepted("crawl all categories, backward".to_owned())
}

async fn crawl_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> impl IntoResponse {
    let Ok(category) = Category::parse(&category) else {
        return unknown_category(&category);
    };
    tokio::spawn(async move {
        if let Err(e) = state.crawler.run_category(category).await {
            error!(category = %category, error = %e, "crawl failed");
        }
    });
    accepted(format!("crawl {category}, forward"))
}

async fn crawl_category_from_end(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> impl IntoResponse {
    let Ok(category) = Category::parse(&category) else {
        return unknown_category(&category);
    };
    tokio::spawn(async move {
        if let Err(e) = state
            .crawler
            .run_category_from(category, Direction::Backward)
            .await
        {
            error!(category = %category, error = %e, "crawl failed");
        }
    });
    accepted(format!("crawl {category}, backward"))
}

async fn crawl_category_both(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> impl IntoResponse {
    let Ok(category) = Category::parse(&category) else {
        return unknown_category(&category);
    };
    tokio::spawn(async move {
        if let Err(e) = state.crawler.run_category_both(category).await {
            error!(category = %category, error = %e, "crawl failed");
        }
    });
    accepted(format!("crawl {category}, both directions"))
}

async fn replay(State(state): State<AppState>) -> impl IntoResponse {
    tokio::spawn(async move {
        if let Err(e) = replay_failed(&state.detail, &state.store, &state.base_url).await {
            error!(error = %e, "replay failed");
        }
    });
    accepted("replay failed ledger entries".to_owned())
}

#[derive(Debug, Deserialize)]
struct BackfillParams {
    category: Option<String>,
}

async fn backfill_images(
    State(state): State<AppState>,
    Query(params): Query<BackfillParams>,
) -> impl IntoResponse {
    let category = match params.category.as_deref() {
        Some(name) => match Category::parse(name) {
            Ok(category) => Some(category),
            Err(_) => return unknown_category(name),
        },
        None => None,
    };
    tokio::spawn(async move {
        let result = match category {
            Some(category) => state.backfill.run_category(category).await,
            None => state.backfill.run().await,
        };
        if let Err(e) = result {
            error!(error = %e, "image backfill failed");
        }
    });
    accepted(match category {
        Some(category) => format!("backfill images for {category}"),
        None => "backfill images for all imagery categories".to_owned(),
    })
}
