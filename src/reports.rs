//! Reporting endpoints. Aggregates are not computed yet; the admin-only
//! reports are gated already so their contract is fixed.
use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use crate::auth::middleware::{authorize, protect, Roles};
use crate::state::AppState;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogSummary {
    pub post_count: i64,
    pub comment_count: i64,
    pub user_count: i64,
    pub total_views: i64,
}

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/reports/summary", get(summary))
        .route("/reports/popular-tags", get(popular_tags))
        .route("/reports/comment-engagement", get(comment_engagement));

    let admin = Router::new()
        .route("/reports/post-analytics", get(post_analytics))
        .route("/reports/user-activity", get(user_activity))
        .route_layer(from_fn_with_state(Roles::ADMINS, authorize))
        .route_layer(from_fn_with_state(state.clone(), protect));

    public.merge(admin)
}

async fn summary() -> Json<Value> {
    Json(json!({ "success": true, "data": BlogSummary::default() }))
}

async fn popular_tags() -> Json<Value> {
    Json(json!({ "success": true, "data": [] }))
}

async fn comment_engagement() -> Json<Value> {
    Json(json!({ "success": true, "data": {} }))
}

async fn post_analytics() -> Json<Value> {
    Json(json!({ "success": true, "data": {} }))
}

async fn user_activity() -> Json<Value> {
    Json(json!({ "success": true, "data": {} }))
}
