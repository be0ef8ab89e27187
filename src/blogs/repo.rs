use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::blogs::model::{Blog, Category};

#[derive(Debug, Clone, Copy)]
pub struct BlogFilter {
    pub category: Option<Category>,
    pub limit: i64,
    pub offset: i64,
}

/// Outcome of a like toggle: whether the caller now likes the post, and the
/// post's like count after the toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, sqlx::FromRow)]
pub struct LikeToggle {
    pub liked: bool,
    pub likes_count: i64,
}

/// `%`, `_` and `\` are literal in a search term.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
pub trait BlogStore: Send + Sync {
    async fn insert(&self, blog: &Blog) -> anyhow::Result<()>;

    /// Overwrite every mutable column of an existing post.
    async fn save(&self, blog: &Blog) -> anyhow::Result<()>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Blog>>;

    async fn slug_taken(&self, slug: &str, except: Option<Uuid>) -> anyhow::Result<bool>;

    /// Published posts, newest first, plus the total matching count.
    async fn list_published(&self, filter: BlogFilter) -> anyhow::Result<(Vec<Blog>, i64)>;

    /// Published posts whose title, content or a tag contains `term`,
    /// case-insensitively.
    async fn search(&self, term: &str, filter: BlogFilter) -> anyhow::Result<(Vec<Blog>, i64)>;

    async fn increment_views(&self, id: Uuid) -> anyhow::Result<()>;

    /// Like the post if `user_id` has not yet, otherwise unlike it, as one step.
    async fn toggle_like(&self, blog_id: Uuid, user_id: Uuid) -> anyhow::Result<LikeToggle>;

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

const BLOG_COLUMNS: &str = "id, title, content, excerpt, slug, tags, category, author, featured, \
    published, published_at, featured_image, read_time, views, created_at, updated_at, \
    (SELECT COUNT(*) FROM blog_likes l WHERE l.blog_id = blogs.id) AS likes_count";

#[derive(Clone)]
pub struct PgBlogStore {
    db: PgPool,
}

impl PgBlogStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BlogStore for PgBlogStore {
    async fn insert(&self, blog: &Blog) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO blogs (id, title, content, excerpt, slug, tags, category, author,
                               featured, published, published_at, featured_image, read_time,
                               views, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(blog.id)
        .bind(&blog.title)
        .bind(&blog.content)
        .bind(&blog.excerpt)
        .bind(&blog.slug)
        .bind(&blog.tags)
        .bind(blog.category)
        .bind(blog.author)
        .bind(blog.featured)
        .bind(blog.published)
        .bind(blog.published_at)
        .bind(&blog.featured_image)
        .bind(blog.read_time)
        .bind(blog.views)
        .bind(blog.created_at)
        .bind(blog.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn save(&self, blog: &Blog) -> anyhow::Result<()> {
        // views are left out: they only move through increment_views
        sqlx::query(
            r#"
            UPDATE blogs SET
                title = $2, content = $3, excerpt = $4, slug = $5, tags = $6, category = $7,
                featured = $8, published = $9, published_at = $10, featured_image = $11,
                read_time = $12, updated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(blog.id)
        .bind(&blog.title)
        .bind(&blog.content)
        .bind(&blog.excerpt)
        .bind(&blog.slug)
        .bind(&blog.tags)
        .bind(blog.category)
        .bind(blog.featured)
        .bind(blog.published)
        .bind(blog.published_at)
        .bind(&blog.featured_image)
        .bind(blog.read_time)
        .bind(blog.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Blog>> {
        let sql = format!("SELECT {BLOG_COLUMNS} FROM blogs WHERE id = $1");
        let blog = sqlx::query_as::<_, Blog>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(blog)
    }

    async fn slug_taken(&self, slug: &str, except: Option<Uuid>) -> anyhow::Result<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM blogs WHERE slug = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(slug)
        .bind(except)
        .fetch_one(&self.db)
        .await?;
        Ok(taken)
    }

    async fn list_published(&self, filter: BlogFilter) -> anyhow::Result<(Vec<Blog>, i64)> {
        let sql = format!(
            r#"
            SELECT {BLOG_COLUMNS}
            FROM blogs
            WHERE published AND ($1::blog_category IS NULL OR category = $1)
            ORDER BY published_at DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, Blog>(&sql)
            .bind(filter.category)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.db)
            .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM blogs
            WHERE published AND ($1::blog_category IS NULL OR category = $1)
            "#,
        )
        .bind(filter.category)
        .fetch_one(&self.db)
        .await?;

        Ok((rows, total))
    }

    async fn search(&self, term: &str, filter: BlogFilter) -> anyhow::Result<(Vec<Blog>, i64)> {
        const MATCHES: &str = r#"
            published
            AND ($2::blog_category IS NULL OR category = $2)
            AND (title ILIKE $1 OR content ILIKE $1
                 OR EXISTS (SELECT 1 FROM unnest(tags) t WHERE t ILIKE $1))
        "#;
        let pattern = like_pattern(term);

        let sql = format!(
            "SELECT {BLOG_COLUMNS} FROM blogs WHERE {MATCHES} \
             ORDER BY published_at DESC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query_as::<_, Blog>(&sql)
            .bind(&pattern)
            .bind(filter.category)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.db)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM blogs WHERE {MATCHES}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&pattern)
            .bind(filter.category)
            .fetch_one(&self.db)
            .await?;

        Ok((rows, total))
    }

    async fn increment_views(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE blogs SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn toggle_like(&self, blog_id: Uuid, user_id: Uuid) -> anyhow::Result<LikeToggle> {
        // removed and added are exclusive; the count reads the pre-statement snapshot
        let toggle = sqlx::query_as::<_, LikeToggle>(
            r#"
            WITH removed AS (
                DELETE FROM blog_likes WHERE blog_id = $1 AND user_id = $2
                RETURNING 1
            ),
            added AS (
                INSERT INTO blog_likes (blog_id, user_id)
                SELECT $1, $2 WHERE NOT EXISTS (SELECT 1 FROM removed)
                ON CONFLICT DO NOTHING
                RETURNING 1
            )
            SELECT EXISTS (SELECT 1 FROM added) AS liked,
                   (SELECT COUNT(*) FROM blog_likes WHERE blog_id = $1)
                   + (SELECT COUNT(*) FROM added)
                   - (SELECT COUNT(*) FROM removed) AS likes_count
            "#,
        )
        .bind(blog_id)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(toggle)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM blogs WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
