use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::middleware::{authorize, protect, CurrentUser, Roles},
    error::AppError,
    extract::{JsonBody, PathParam},
    state::AppState,
    users::model::{AccountStatus, Role},
};

/// Admin-editable account fields.
#[derive(Debug, Deserialize)]
pub struct AccountUpdate {
    pub role: Option<Role>,
    pub status: Option<AccountStatus>,
}

/// All user administration is admin-only.
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user).put(update_user).delete(delete_user))
        .route_layer(from_fn_with_state(Roles::ADMINS, authorize))
        .route_layer(from_fn_with_state(state.clone(), protect))
}

// TODO: paginated listing once the store grows a search query
async fn list_users() -> Json<Value> {
    Json(json!({ "success": true, "data": [] }))
}

async fn create_user() -> (StatusCode, Json<Value>) {
    (
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": {} })),
    )
}

async fn delete_user() -> Json<Value> {
    Json(json!({ "success": true, "data": {} }))
}

fn parse_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|_| AppError::resource_not_found())
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    PathParam(id): PathParam<String>,
) -> Result<Json<Value>, AppError> {
    let user = state
        .users
        .find_by_id(parse_id(&id)?)
        .await?
        .ok_or_else(AppError::resource_not_found)?;
    Ok(Json(json!({ "success": true, "data": user })))
}

/// Change a user's role or status. Takes effect on that user's next request,
/// whatever their token says.
#[instrument(skip(state, admin, body))]
pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    PathParam(id): PathParam<String>,
    JsonBody(body): JsonBody<AccountUpdate>,
) -> Result<Json<Value>, AppError> {
    if body.role.is_none() && body.status.is_none() {
        return Err(AppError::BadRequest("Nothing to update".into()));
    }
    let user = state
        .users
        .update_account(parse_id(&id)?, body.role, body.status)
        .await?
        .ok_or_else(AppError::resource_not_found)?;

    info!(
        admin_id = %admin.id,
        user_id = %user.id,
        role = %user.role,
        status = ?user.status,
        "account updated"
    );
    Ok(Json(json!({ "success": true, "data": user })))
}
