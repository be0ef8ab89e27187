//! Comment endpoints. Reads are public; writes require a session.
//! Storage for comments does not exist yet, so every handler answers with an
//! empty envelope.
use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};

use crate::auth::middleware::{protect, CurrentUser};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/comments", get(list_comments))
        .route("/comments/:id", get(get_comment));

    let writes = Router::new()
        .route("/comments", post(add_comment))
        .route("/comments/:id", put(update_comment).delete(delete_comment))
        .route_layer(from_fn_with_state(state.clone(), protect));

    public.merge(writes)
}

async fn list_comments() -> Json<Value> {
    Json(json!({ "success": true, "data": [] }))
}

async fn get_comment() -> Json<Value> {
    Json(json!({ "success": true, "data": {} }))
}

async fn add_comment(CurrentUser(_user): CurrentUser) -> (StatusCode, Json<Value>) {
    (
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": {} })),
    )
}

async fn update_comment(CurrentUser(_user): CurrentUser) -> Json<Value> {
    Json(json!({ "success": true, "data": {} }))
}

async fn delete_comment(CurrentUser(_user): CurrentUser) -> Json<Value> {
    Json(json!({ "success": true, "data": {} }))
}
