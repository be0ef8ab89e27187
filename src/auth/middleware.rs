//! Request authorization pipeline.
//!
//! Layer order on a route is `protect` (or `optional_auth`), then
//! `authorize`, then `check_ownership`. Each stage either short-circuits
//! with an `AppError` or hands the request on with more context attached.
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::PathParam,
    state::AppState,
    users::model::{Role, User},
};

/// The principal resolved for this request, freshly loaded from the store.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Principal if the request carried a usable token, otherwise `None`.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

/// A fixed set of roles permitted on a route.
#[derive(Debug, Clone, Copy)]
pub struct Roles(pub &'static [Role]);

impl Roles {
    pub const AUTHORS: Roles = Roles(&[Role::Author, Role::Admin]);
    pub const ADMINS: Roles = Roles(&[Role::Admin]);

    pub fn permits(&self, role: Role) -> bool {
        self.0.contains(&role)
    }
}

/// Bearer header first, then the session cookie.
pub(crate) fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Verify the token and re-load the principal. The role and status on
/// record win over whatever the token claims.
async fn resolve_principal(state: &AppState, token: &str) -> Result<User, AppError> {
    let claims = state.jwt.verify(token).map_err(|e| {
        debug!(error = %e, "token rejected");
        AppError::TokenInvalid
    })?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or(AppError::TokenInvalid)?;

    if !user.is_active() {
        return Err(AppError::AccountInactive);
    }
    Ok(user)
}

/// Required authentication.
pub async fn protect(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(req.headers(), &state.config.jwt.cookie_name)
        .ok_or(AppError::TokenMissing)?;
    let user = resolve_principal(&state, &token).await?;
    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Optional authentication: never rejects.
pub async fn optional_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(token) = extract_token(req.headers(), &state.config.jwt.cookie_name) {
        match resolve_principal(&state, &token).await {
            Ok(user) => {
                req.extensions_mut().insert(CurrentUser(user));
            }
            Err(AppError::Internal(e)) => {
                warn!(error = %format!("{e:#}"), "optional auth lookup failed; continuing anonymously")
            }
            Err(e) => debug!(reason = ?e, "optional auth continuing anonymously"),
        }
    }
    next.run(req).await
}

/// Role gate; must sit behind `protect`.
pub async fn authorize(
    State(allowed): State<Roles>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let role = req
        .extensions()
        .get::<CurrentUser>()
        .map(|CurrentUser(user)| user.role)
        .ok_or(AppError::TokenMissing)?;

    if !allowed.permits(role) {
        warn!(role = %role, "role not permitted on route");
        return Err(AppError::RoleForbidden(role));
    }
    Ok(next.run(req).await)
}

/// A stored resource with a recorded owner.
#[async_trait]
pub trait OwnedResource: Clone + Send + Sync + 'static {
    async fn load(state: &AppState, id: Uuid) -> anyhow::Result<Option<Self>>;

    fn owner_id(&self) -> Uuid;
}

/// Ownership gate for routes with an `:id` segment; must sit behind `protect`.
///
/// The loaded resource is placed in request extensions for the handler.
pub async fn check_ownership<R: OwnedResource>(
    State(state): State<AppState>,
    PathParam(id): PathParam<String>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (user_id, role) = req
        .extensions()
        .get::<CurrentUser>()
        .map(|CurrentUser(user)| (user.id, user.role))
        .ok_or(AppError::TokenMissing)?;

    let id = Uuid::parse_str(&id).map_err(|_| AppError::resource_not_found())?;
    let resource = R::load(&state, id)
        .await?
        .ok_or_else(AppError::resource_not_found)?;

    if role != Role::Admin && resource.owner_id() != user_id {
        warn!(user_id = %user_id, resource_id = %id, "ownership check failed");
        return Err(AppError::OwnershipForbidden);
    }

    req.extensions_mut().insert(resource);
    Ok(next.run(req).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AppError::TokenMissing)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts
                .extensions
                .get::<CurrentUser>()
                .map(|CurrentUser(user)| user.clone()),
        ))
    }
}
