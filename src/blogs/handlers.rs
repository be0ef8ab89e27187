use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::middleware::{
        authorize, check_ownership, optional_auth, protect, CurrentUser, MaybeUser, Roles,
    },
    blogs::{
        model::{Blog, BlogInput, BlogPatch, Category},
        repo::BlogFilter,
    },
    error::AppError,
    extract::{JsonBody, PathParam, QueryParams},
    state::AppState,
    users::model::{Role, User},
};

pub const MAX_LIMIT: i64 = 100;
/// Deepest page served; keeps `(page - 1) * limit` far from overflow.
pub const MAX_PAGE: i64 = 1_000_000;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub category: Option<Category>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub category: Option<Category>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}
fn default_limit() -> i64 {
    10
}

/// Clamped page and limit, and the filter they produce.
fn paginate(page: i64, limit: i64, category: Option<Category>) -> (i64, i64, BlogFilter) {
    let page = page.clamp(1, MAX_PAGE);
    let limit = limit.clamp(1, MAX_LIMIT);
    let filter = BlogFilter {
        category,
        limit,
        offset: (page - 1) * limit,
    };
    (page, limit, filter)
}

fn listing(blogs: Vec<Blog>, page: i64, limit: i64, total: i64) -> Json<Value> {
    Json(json!({
        "success": true,
        "count": blogs.len(),
        "pagination": { "page": page, "limit": limit, "total": total },
        "data": blogs,
    }))
}

fn may_view(blog: &Blog, viewer: Option<&User>) -> bool {
    blog.published || viewer.map_or(false, |u| u.role == Role::Admin || u.id == blog.author)
}

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/blogs", get(list_blogs))
        .route("/blogs/search", get(search_blogs))
        .route("/blogs/category/:category", get(blogs_by_category))
        .route("/blogs/:id", get(get_blog))
        .route_layer(from_fn_with_state(state.clone(), optional_auth));

    let create = Router::new()
        .route("/blogs", post(create_blog))
        .route_layer(from_fn_with_state(Roles::AUTHORS, authorize))
        .route_layer(from_fn_with_state(state.clone(), protect));

    let reader = Router::new()
        .route("/blogs/:id/like", post(toggle_like))
        .route_layer(from_fn_with_state(state.clone(), protect));

    let owned = Router::new()
        .route("/blogs/:id", put(update_blog).delete(delete_blog))
        .route_layer(from_fn_with_state(state.clone(), check_ownership::<Blog>))
        .route_layer(from_fn_with_state(Roles::AUTHORS, authorize))
        .route_layer(from_fn_with_state(state.clone(), protect));

    public.merge(create).merge(reader).merge(owned)
}

#[instrument(skip(state))]
pub async fn list_blogs(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let (page, limit, filter) = paginate(q.page, q.limit, q.category);
    let (blogs, total) = state.blogs.list_published(filter).await?;
    Ok(listing(blogs, page, limit, total))
}

#[instrument(skip(state))]
pub async fn search_blogs(
    State(state): State<AppState>,
    QueryParams(q): QueryParams<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let term = q.q.as_deref().map(str::trim).unwrap_or_default();
    if term.is_empty() {
        return Err(AppError::BadRequest("Please provide a search term".into()));
    }
    let (page, limit, filter) = paginate(q.page, q.limit, q.category);
    let (blogs, total) = state.blogs.search(term, filter).await?;
    Ok(listing(blogs, page, limit, total))
}

#[instrument(skip(state))]
pub async fn blogs_by_category(
    State(state): State<AppState>,
    PathParam(category): PathParam<Category>,
    QueryParams(q): QueryParams<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let (page, limit, filter) = paginate(q.page, q.limit, Some(category));
    let (blogs, total) = state.blogs.list_published(filter).await?;
    Ok(listing(blogs, page, limit, total))
}

/// Published posts are public; drafts are only visible to their author and admins.
#[instrument(skip(state, viewer))]
pub async fn get_blog(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    PathParam(id): PathParam<String>,
) -> Result<Json<Value>, AppError> {
    let blog = visible_blog(&state, &id, viewer.as_ref()).await?;
    if blog.published {
        state.blogs.increment_views(blog.id).await?;
    }
    Ok(Json(json!({ "success": true, "data": blog })))
}

async fn visible_blog(state: &AppState, id: &str, viewer: Option<&User>) -> Result<Blog, AppError> {
    let id = Uuid::parse_str(id).map_err(|_| AppError::resource_not_found())?;
    state
        .blogs
        .find_by_id(id)
        .await?
        .filter(|blog| may_view(blog, viewer))
        .ok_or_else(AppError::resource_not_found)
}

/// Like a post, or take the like back if the caller already liked it.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn toggle_like(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParam(id): PathParam<String>,
) -> Result<Json<Value>, AppError> {
    let blog = visible_blog(&state, &id, Some(&user)).await?;
    let toggle = state.blogs.toggle_like(blog.id, user.id).await?;
    info!(blog_id = %blog.id, liked = toggle.liked, "like toggled");
    Ok(Json(json!({ "success": true, "data": toggle })))
}

#[instrument(skip(state, user, input))]
pub async fn create_blog(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(input): JsonBody<BlogInput>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let blog = Blog::create(user.id, input, OffsetDateTime::now_utc()).map_err(AppError::BadRequest)?;
    if state.blogs.slug_taken(&blog.slug, None).await? {
        return Err(AppError::Conflict("A blog with this title already exists".into()));
    }
    state.blogs.insert(&blog).await?;

    info!(blog_id = %blog.id, author = %user.id, "blog created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": blog })),
    ))
}

#[instrument(skip(state, blog, patch), fields(blog_id = %blog.id))]
pub async fn update_blog(
    State(state): State<AppState>,
    Extension(mut blog): Extension<Blog>,
    JsonBody(patch): JsonBody<BlogPatch>,
) -> Result<Json<Value>, AppError> {
    blog.apply(patch, OffsetDateTime::now_utc())
        .map_err(AppError::BadRequest)?;
    if state.blogs.slug_taken(&blog.slug, Some(blog.id)).await? {
        return Err(AppError::Conflict("A blog with this title already exists".into()));
    }
    state.blogs.save(&blog).await?;

    info!(blog_id = %blog.id, "blog updated");
    Ok(Json(json!({ "success": true, "data": blog })))
}

#[instrument(skip(state, blog), fields(blog_id = %blog.id))]
pub async fn delete_blog(
    State(state): State<AppState>,
    Extension(blog): Extension<Blog>,
) -> Result<Json<Value>, AppError> {
    if !state.blogs.delete(blog.id).await? {
        return Err(AppError::resource_not_found());
    }
    info!(blog_id = %blog.id, "blog deleted");
    Ok(Json(json!({ "success": true, "data": {} })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::services::{register, Registration};
    use crate::users::model::User;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn principal(state: &AppState, email: &str, role: Role) -> (User, String) {
        let user = register(
            state.users.as_ref(),
            &state.hasher,
            Registration {
                name: "Writer".into(),
                email: email.into(),
                password: "password123".into(),
            },
        )
        .await
        .unwrap();
        let user = state
            .users
            .update_account(user.id, Some(role), None)
            .await
            .unwrap()
            .unwrap();
        let token = state.jwt.sign(&user).unwrap();
        (user, token)
    }

    async fn send(
        state: &AppState,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let app = router(state).with_state(state.clone());
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
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn seed_blog(state: &AppState, author: Uuid, title: &str, published: bool) -> Blog {
        let blog = Blog::create(
            author,
            BlogInput {
                title: title.into(),
                content: "Some meaningful content about projects.".into(),
                category: Category::Tools,
                excerpt: None,
                tags: vec!["pm".into()],
                published,
                featured: false,
                featured_image: None,
            },
            OffsetDateTime::now_utc(),
        )
        .unwrap();
        state.blogs.insert(&blog).await.unwrap();
        blog
    }

    #[tokio::test]
    async fn author_creates_post_with_derived_fields() {
        let state = AppState::fake();
        let (user, token) = principal(&state, "author@example.com", Role::Author).await;
        let (status, body) = send(
            &state,
            "POST",
            "/blogs",
            Some(&token),
            Some(json!({
                "title": "Getting Started with Scrum!",
                "content": "Scrum is a lightweight framework for teams.",
                "category": "methodologies",
                "tags": ["Agile"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["slug"], "getting-started-with-scrum");
        assert_eq!(body["data"]["read_time"], 1);
        assert_eq!(body["data"]["author"], json!(user.id));
        assert_eq!(body["data"]["tags"], json!(["agile"]));
    }

    #[tokio::test]
    async fn plain_user_cannot_create() {
        let state = AppState::fake();
        let (_, token) = principal(&state, "reader@example.com", Role::User).await;
        let (status, body) = send(
            &state,
            "POST",
            "/blogs",
            Some(&token),
            Some(json!({ "title": "Nope", "content": "not allowed to post", "category": "tools" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body["error"],
            "User role 'user' is not authorized to access this route"
        );
    }

    #[tokio::test]
    async fn anonymous_create_is_401() {
        let state = AppState::fake();
        let (status, body) = send(
            &state,
            "POST",
            "/blogs",
            None,
            Some(json!({ "title": "Nope", "content": "not allowed to post", "category": "tools" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Not authorized to access this route");
    }

    #[tokio::test]
    async fn non_owner_author_gets_403() {
        let state = AppState::fake();
        let (owner, _) = principal(&state, "owner@example.com", Role::Author).await;
        let (_, other_token) = principal(&state, "other@example.com", Role::Author).await;
        let blog = seed_blog(&state, owner.id, "Owned Post", true).await;

        let (status, body) = send(
            &state,
            "PUT",
            &format!("/blogs/{}", blog.id),
            Some(&other_token),
            Some(json!({ "title": "Hijacked" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body,
            json!({ "success": false, "error": "Not authorized to access this resource" })
        );
    }

    #[tokio::test]
    async fn admin_passes_ownership_check() {
        let state = AppState::fake();
        let (owner, _) = principal(&state, "owner@example.com", Role::Author).await;
        let (_, admin_token) = principal(&state, "admin@example.com", Role::Admin).await;
        let blog = seed_blog(&state, owner.id, "Owned Post", true).await;

        let (status, body) = send(
            &state,
            "PUT",
            &format!("/blogs/{}", blog.id),
            Some(&admin_token),
            Some(json!({ "title": "Edited By Admin" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["slug"], "edited-by-admin");
        assert_eq!(body["data"]["author"], json!(owner.id));
    }

    #[tokio::test]
    async fn owner_can_delete() {
        let state = AppState::fake();
        let (owner, token) = principal(&state, "owner@example.com", Role::Author).await;
        let blog = seed_blog(&state, owner.id, "Short Lived", true).await;

        let (status, _) = send(&state, "DELETE", &format!("/blogs/{}", blog.id), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.blogs.find_by_id(blog.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_resource_is_404_before_ownership() {
        let state = AppState::fake();
        let (_, token) = principal(&state, "someone@example.com", Role::Author).await;

        let (status, body) = send(
            &state,
            "DELETE",
            &format!("/blogs/{}", Uuid::new_v4()),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "success": false, "error": "Resource not found" }));

        let (status, _) = send(&state, "DELETE", "/blogs/not-a-uuid", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listing_shows_only_published() {
        let state = AppState::fake();
        let (owner, _) = principal(&state, "owner@example.com", Role::Author).await;
        seed_blog(&state, owner.id, "Public One", true).await;
        seed_blog(&state, owner.id, "Public Two", true).await;
        seed_blog(&state, owner.id, "Secret Draft", false).await;

        let (status, body) = send(&state, "GET", "/blogs", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["pagination"]["total"], 2);

        let (_, body) = send(&state, "GET", "/blogs?category=basics", None, None).await;
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn listing_tolerates_a_bad_token() {
        let state = AppState::fake();
        let (status, body) = send(&state, "GET", "/blogs", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn drafts_are_hidden_from_strangers() {
        let state = AppState::fake();
        let (owner, owner_token) = principal(&state, "owner@example.com", Role::Author).await;
        let draft = seed_blog(&state, owner.id, "Work In Progress", false).await;
        let uri = format!("/blogs/{}", draft.id);

        let (status, _) = send(&state, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&state, "GET", &uri, Some(&owner_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["published"], false);
    }

    #[tokio::test]
    async fn reading_a_published_post_counts_a_view() {
        let state = AppState::fake();
        let (owner, _) = principal(&state, "owner@example.com", Role::Author).await;
        let blog = seed_blog(&state, owner.id, "Popular", true).await;

        send(&state, "GET", &format!("/blogs/{}", blog.id), None, None).await;
        send(&state, "GET", &format!("/blogs/{}", blog.id), None, None).await;
        let stored = state.blogs.find_by_id(blog.id).await.unwrap().unwrap();
        assert_eq!(stored.views, 2);
    }

    #[tokio::test]
    async fn huge_page_number_returns_an_empty_page() {
        let state = AppState::fake();
        let (owner, _) = principal(&state, "owner@example.com", Role::Author).await;
        seed_blog(&state, owner.id, "Only Post", true).await;

        let uri = format!("/blogs?page={}&limit=100", i64::MAX);
        let (status, body) = send(&state, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
        assert_eq!(body["pagination"]["page"], MAX_PAGE);
        assert_eq!(body["pagination"]["total"], 1);

        let (status, body) = send(&state, "GET", "/blogs?page=-5&limit=0", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["page"], 1);
        assert_eq!(body["pagination"]["limit"], 1);
    }

    #[tokio::test]
    async fn malformed_query_and_body_use_the_error_envelope() {
        let state = AppState::fake();
        let (status, body) = send(&state, "GET", "/blogs?page=first", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (_, token) = principal(&state, "author@example.com", Role::Author).await;
        let (status, body) = send(
            &state,
            "POST",
            "/blogs",
            Some(&token),
            Some(json!({ "title": "No Category", "content": "category is missing here" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("category"));
    }

    #[tokio::test]
    async fn punctuation_only_title_is_rejected() {
        let state = AppState::fake();
        let (_, token) = principal(&state, "author@example.com", Role::Author).await;
        let (status, body) = send(
            &state,
            "POST",
            "/blogs",
            Some(&token),
            Some(json!({ "title": "!!!", "content": "perfectly fine content", "category": "tools" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Title must contain at least one letter or digit");
    }

    #[tokio::test]
    async fn search_finds_published_matches_only() {
        let state = AppState::fake();
        let (owner, _) = principal(&state, "owner@example.com", Role::Author).await;
        seed_blog(&state, owner.id, "Sprint Reviews", true).await;
        seed_blog(&state, owner.id, "Sprint Secrets", false).await;
        seed_blog(&state, owner.id, "Daily Standups", true).await;

        let (status, body) = send(&state, "GET", "/blogs/search?q=sprint", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["title"], "Sprint Reviews");

        let (status, body) = send(&state, "GET", "/blogs/search?q=%20", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Please provide a search term");

        let (status, _) = send(&state, "GET", "/blogs/search", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn category_route_filters_and_rejects_unknown_names() {
        let state = AppState::fake();
        let (owner, _) = principal(&state, "owner@example.com", Role::Author).await;
        seed_blog(&state, owner.id, "Tooling Tour", true).await;

        let (status, body) = send(&state, "GET", "/blogs/category/tools", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (_, body) = send(&state, "GET", "/blogs/category/case-studies", None, None).await;
        assert_eq!(body["count"], 0);

        let (status, body) = send(&state, "GET", "/blogs/category/gossip", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn liking_twice_takes_the_like_back() {
        let state = AppState::fake();
        let (owner, _) = principal(&state, "owner@example.com", Role::Author).await;
        let (_, reader) = principal(&state, "reader@example.com", Role::User).await;
        let blog = seed_blog(&state, owner.id, "Likeable", true).await;
        let uri = format!("/blogs/{}/like", blog.id);

        let (status, body) = send(&state, "POST", &uri, Some(&reader), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({ "liked": true, "likes_count": 1 }));

        let (_, body) = send(&state, "GET", &format!("/blogs/{}", blog.id), None, None).await;
        assert_eq!(body["data"]["likes_count"], 1);

        let (_, body) = send(&state, "POST", &uri, Some(&reader), None).await;
        assert_eq!(body["data"], json!({ "liked": false, "likes_count": 0 }));
    }

    #[tokio::test]
    async fn liking_requires_login_and_a_visible_post() {
        let state = AppState::fake();
        let (owner, _) = principal(&state, "owner@example.com", Role::Author).await;
        let (_, reader) = principal(&state, "reader@example.com", Role::User).await;
        let draft = seed_blog(&state, owner.id, "Hidden Draft", false).await;
        let uri = format!("/blogs/{}/like", draft.id);

        let (status, _) = send(&state, "POST", &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&state, "POST", &uri, Some(&reader), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Resource not found");

        let missing = format!("/blogs/{}/like", Uuid::new_v4());
        let (status, _) = send(&state, "POST", &missing, Some(&reader), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
