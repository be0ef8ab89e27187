use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, RegisterRequest,
            ResetPasswordRequest, TokenIssued,
        },
        middleware::{protect, CurrentUser},
        services::{self, normalize_email, Registration},
    },
    config::AppConfig,
    error::AppError,
    extract::{JsonBody, PathParam},
    state::AppState,
    users::model::{AccountStatus, User},
};

type SetCookie = [(header::HeaderName, String); 1];

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout))
        .route("/auth/forgotpassword", post(forgot_password))
        .route("/auth/resetpassword/:token", put(reset_password))
        .route("/auth/verifyemail/:token", get(confirm_email))
}

pub fn session_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(get_me))
        .route("/auth/verifyemail", post(request_verification))
        .route_layer(from_fn_with_state(state.clone(), protect))
}

fn session_cookie(config: &AppConfig, token: &str) -> SetCookie {
    let max_age = config.jwt.ttl_minutes.max(0) * 60;
    let secure = if config.environment == "production" {
        "; Secure"
    } else {
        ""
    };
    [(
        header::SET_COOKIE,
        format!(
            "{}={token}; HttpOnly; Path=/; Max-Age={max_age}; SameSite=Lax{secure}",
            config.jwt.cookie_name
        ),
    )]
}

fn signed_in(
    state: &AppState,
    status: StatusCode,
    user: User,
) -> Result<(StatusCode, SetCookie, Json<AuthResponse>), AppError> {
    let token = state.jwt.sign(&user)?;
    let cookie = session_cookie(&state.config, &token);
    Ok((status, cookie, Json(AuthResponse::new(token, user))))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, SetCookie, Json<AuthResponse>), AppError> {
    let user = services::register(
        state.users.as_ref(),
        &state.hasher,
        Registration {
            name: payload.name,
            email: payload.email,
            password: payload.password,
        },
    )
    .await?;
    signed_in(&state, StatusCode::CREATED, user)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<(StatusCode, SetCookie, Json<AuthResponse>), AppError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest(
            "Please provide an email and password".into(),
        ));
    }
    let user = services::authenticate(
        state.users.as_ref(),
        &state.hasher,
        &state.config.lockout,
        &payload.email,
        &payload.password,
        OffsetDateTime::now_utc(),
    )
    .await?;
    signed_in(&state, StatusCode::OK, user)
}

pub async fn logout(State(state): State<AppState>) -> (SetCookie, Json<Value>) {
    let cookie = [(
        header::SET_COOKIE,
        format!(
            "{}=none; HttpOnly; Path=/; Max-Age=0",
            state.config.jwt.cookie_name
        ),
    )];
    (cookie, Json(json!({ "success": true, "data": {} })))
}

pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<Value> {
    Json(json!({ "success": true, "data": user }))
}

/// Always answers 200 so the endpoint reveals nothing about which accounts exist.
#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ForgotPasswordRequest>,
) -> Result<Json<TokenIssued>, AppError> {
    let email = normalize_email(&payload.email);
    let user = state
        .users
        .find_by_email(&email, Some(AccountStatus::Active))
        .await?;

    let token = match user {
        Some(user) => Some(
            services::issue_reset_token(state.users.as_ref(), user.id, OffsetDateTime::now_utc())
                .await?,
        ),
        None => {
            info!("password reset requested for unknown email");
            None
        }
    };

    Ok(Json(TokenIssued {
        success: true,
        data: "If that email is registered, a reset link has been sent".into(),
        token: token.filter(|_| state.config.is_development()),
    }))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    PathParam(token): PathParam<String>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> Result<(StatusCode, SetCookie, Json<AuthResponse>), AppError> {
    let user = services::reset_password(
        state.users.as_ref(),
        &state.hasher,
        &token,
        &payload.password,
        OffsetDateTime::now_utc(),
    )
    .await?;
    signed_in(&state, StatusCode::OK, user)
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn request_verification(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<TokenIssued>, AppError> {
    if user.email_verified {
        return Err(AppError::BadRequest("Email is already verified".into()));
    }
    let token =
        services::issue_verification_token(state.users.as_ref(), user.id, OffsetDateTime::now_utc())
            .await?;

    Ok(Json(TokenIssued {
        success: true,
        data: "Verification email sent".into(),
        token: Some(token).filter(|_| state.config.is_development()),
    }))
}

#[instrument(skip(state, token))]
pub async fn confirm_email(
    State(state): State<AppState>,
    PathParam(token): PathParam<String>,
) -> Result<Json<Value>, AppError> {
    let user =
        services::verify_email(state.users.as_ref(), &token, OffsetDateTime::now_utc()).await?;
    Ok(Json(json!({ "success": true, "data": user })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::router;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, Response};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn dev_state() -> AppState {
        let base = AppState::fake();
        let mut config = (*base.config).clone();
        config.environment = "development".into();
        AppState::from_parts(Arc::new(config), base.users.clone(), base.blogs.clone()).unwrap()
    }

    async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        router(state).with_state(state.clone()).oneshot(req).await.unwrap()
    }

    async fn json_body(res: Response<Body>) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register_alice(state: &AppState) -> Value {
        let res = send(
            state,
            "POST",
            "/auth/register",
            None,
            Some(json!({ "name": "Alice", "email": "Alice@Example.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        json_body(res).await
    }

    fn login_body(password: &str) -> Option<Value> {
        Some(json!({ "email": "alice@example.com", "password": password }))
    }

    #[tokio::test]
    async fn register_sets_cookie_and_hides_secrets() {
        let state = AppState::fake();
        let res = send(
            &state,
            "POST",
            "/auth/register",
            None,
            Some(json!({ "name": "Alice", "email": "alice@example.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("token="));
        assert!(cookie.contains("HttpOnly"));

        let body = json_body(res).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["user"]["role"], "user");
        assert!(body["data"]["user"].get("password_hash").is_none());
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    }

    #[tokio::test]
    async fn duplicate_email_differing_in_case_is_409() {
        let state = AppState::fake();
        register_alice(&state).await;
        let res = send(
            &state,
            "POST",
            "/auth/register",
            None,
            Some(json!({ "name": "Imposter", "email": "ALICE@example.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_look_the_same() {
        let state = AppState::fake();
        register_alice(&state).await;

        let wrong = send(&state, "POST", "/auth/login", None, login_body("nope-nope")).await;
        let unknown = send(
            &state,
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "bob@example.com", "password": "nope-nope" })),
        )
        .await;
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(wrong).await, json_body(unknown).await);
    }

    #[tokio::test]
    async fn five_failures_lock_out_even_the_right_password() {
        let state = AppState::fake();
        register_alice(&state).await;

        for _ in 0..5 {
            let res = send(&state, "POST", "/auth/login", None, login_body("wrong-pass")).await;
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        }

        let res = send(&state, "POST", "/auth/login", None, login_body("secret123")).await;
        assert_eq!(res.status(), StatusCode::LOCKED);
        assert_eq!(
            json_body(res).await,
            json!({
                "success": false,
                "error": "Account temporarily locked due to too many failed login attempts"
            })
        );
    }

    #[tokio::test]
    async fn me_returns_the_session_user() {
        let state = AppState::fake();
        let registered = register_alice(&state).await;
        let token = registered["token"].as_str().unwrap();

        let res = send(&state, "GET", "/auth/me", Some(token), None).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["data"]["email"], "alice@example.com");

        let res = send(&state, "GET", "/auth/me", None, None).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_login_body_uses_the_error_envelope() {
        let state = AppState::fake();
        let res = send(
            &state,
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "a@b.co" })),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let content_type = res.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("application/json"));
        let body = json_body(res).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("password"));
    }

    #[tokio::test]
    async fn logout_expires_the_cookie() {
        let state = AppState::fake();
        let res = send(&state, "GET", "/auth/logout", None, None).await;
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn forgot_password_never_leaks_outside_development() {
        let state = AppState::fake();
        register_alice(&state).await;

        let known = send(
            &state,
            "POST",
            "/auth/forgotpassword",
            None,
            Some(json!({ "email": "alice@example.com" })),
        )
        .await;
        let unknown = send(
            &state,
            "POST",
            "/auth/forgotpassword",
            None,
            Some(json!({ "email": "nobody@example.com" })),
        )
        .await;
        assert_eq!(known.status(), StatusCode::OK);
        assert_eq!(unknown.status(), StatusCode::OK);
        let known = json_body(known).await;
        assert!(known.get("token").is_none());
        assert_eq!(known, json_body(unknown).await);
    }

    #[tokio::test]
    async fn reset_flow_clears_lockout_and_is_single_use() {
        let state = dev_state();
        register_alice(&state).await;
        for _ in 0..5 {
            send(&state, "POST", "/auth/login", None, login_body("wrong-pass")).await;
        }

        let res = send(
            &state,
            "POST",
            "/auth/forgotpassword",
            None,
            Some(json!({ "email": "alice@example.com" })),
        )
        .await;
        let reset_token = json_body(res).await["token"].as_str().unwrap().to_string();

        let uri = format!("/auth/resetpassword/{reset_token}");
        let res = send(&state, "PUT", &uri, None, Some(json!({ "password": "brand-new" }))).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(json_body(res).await["token"].is_string());

        let res = send(&state, "POST", "/auth/login", None, login_body("brand-new")).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = send(&state, "PUT", &uri, None, Some(json!({ "password": "again-new" }))).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn email_verification_round_trip() {
        let state = dev_state();
        let registered = register_alice(&state).await;
        let session = registered["token"].as_str().unwrap();

        let res = send(&state, "POST", "/auth/verifyemail", Some(session), None).await;
        assert_eq!(res.status(), StatusCode::OK);
        let token = json_body(res).await["token"].as_str().unwrap().to_string();

        let res = send(&state, "GET", &format!("/auth/verifyemail/{token}"), None, None).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["data"]["email_verified"], true);

        let res = send(&state, "POST", "/auth/verifyemail", Some(session), None).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
