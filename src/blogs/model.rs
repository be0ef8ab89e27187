use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const MAX_TITLE_LEN: usize = 200;
pub const MIN_CONTENT_LEN: usize = 10;
pub const MAX_EXCERPT_LEN: usize = 300;
const WORDS_PER_MINUTE: usize = 200;
const AUTO_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "blog_category", rename_all = "kebab-case")]
pub enum Category {
    Basics,
    Methodologies,
    Tools,
    Productivity,
    CaseStudies,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Blog {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub slug: String,
    pub tags: Vec<String>,
    pub category: Category,
    pub author: Uuid, // owning user
    pub featured: bool,
    pub published: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    pub featured_image: String,
    pub read_time: i32, // minutes
    pub views: i64,
    pub likes_count: i64, // derived from blog_likes on read
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Request body for creating a post.
#[derive(Debug, Clone, Deserialize)]
pub struct BlogInput {
    pub title: String,
    pub content: String,
    pub category: Category,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub featured_image: Option<String>,
}

/// Partial update; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlogPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<Category>,
    pub excerpt: Option<String>,
    pub tags: Option<Vec<String>>,
    pub published: Option<bool>,
    pub featured: Option<bool>,
    pub featured_image: Option<String>,
}

/// URL slug: lowercase, `[a-z0-9 -]` only, whitespace to hyphens, no
/// repeated or edge hyphens.
pub fn slugify(title: &str) -> String {
    lazy_static! {
        static ref DISALLOWED: Regex = Regex::new(r"[^a-z0-9 -]").unwrap();
        static ref SPACES: Regex = Regex::new(r"\s+").unwrap();
        static ref HYPHENS: Regex = Regex::new(r"-+").unwrap();
    }
    let lower = title.to_lowercase();
    let cleaned = DISALLOWED.replace_all(&lower, "");
    let hyphenated = SPACES.replace_all(&cleaned, "-");
    let collapsed = HYPHENS.replace_all(&hyphenated, "-");
    collapsed.trim_matches('-').to_string()
}

/// Minutes to read at 200 words per minute, rounded up.
pub fn read_time(content: &str) -> i32 {
    let words = content.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE) as i32
}

pub fn auto_excerpt(content: &str) -> String {
    let head: String = content.chars().take(AUTO_EXCERPT_CHARS).collect();
    format!("{head}...")
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Validates a trimmed title and returns the slug it derives.
fn title_slug(title: &str) -> Result<String, String> {
    if title.is_empty() {
        return Err("Please add a title".into());
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(format!("Title cannot be more than {MAX_TITLE_LEN} characters"));
    }
    let slug = slugify(title);
    if slug.is_empty() {
        return Err("Title must contain at least one letter or digit".into());
    }
    Ok(slug)
}

fn validate_content(content: &str) -> Result<(), String> {
    if content.chars().count() < MIN_CONTENT_LEN {
        return Err(format!("Content must be at least {MIN_CONTENT_LEN} characters"));
    }
    Ok(())
}

fn validate_excerpt(excerpt: &Option<String>) -> Result<(), String> {
    match excerpt {
        Some(e) if e.chars().count() > MAX_EXCERPT_LEN => Err(format!(
            "Excerpt cannot be more than {MAX_EXCERPT_LEN} characters"
        )),
        _ => Ok(()),
    }
}

impl Blog {
    /// Build a new post, deriving slug, read time, excerpt and publish date.
    pub fn create(author: Uuid, input: BlogInput, now: OffsetDateTime) -> Result<Blog, String> {
        let title = input.title.trim().to_string();
        let slug = title_slug(&title)?;
        validate_content(&input.content)?;
        let excerpt = input.excerpt.filter(|e| !e.trim().is_empty());
        validate_excerpt(&excerpt)?;

        Ok(Blog {
            id: Uuid::new_v4(),
            slug,
            read_time: read_time(&input.content),
            excerpt: Some(excerpt.unwrap_or_else(|| auto_excerpt(&input.content))),
            published_at: input.published.then_some(now),
            title,
            content: input.content,
            tags: normalize_tags(input.tags),
            category: input.category,
            author,
            featured: input.featured,
            published: input.published,
            featured_image: input
                .featured_image
                .unwrap_or_else(|| "no-photo.jpg".to_string()),
            views: 0,
            likes_count: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a patch, re-deriving whatever depends on the changed fields.
    pub fn apply(&mut self, patch: BlogPatch, now: OffsetDateTime) -> Result<(), String> {
        if let Some(title) = patch.title {
            let title = title.trim().to_string();
            self.slug = title_slug(&title)?;
            self.title = title;
        }
        if let Some(excerpt) = patch.excerpt {
            let excerpt = Some(excerpt).filter(|e| !e.trim().is_empty());
            validate_excerpt(&excerpt)?;
            self.excerpt = excerpt;
        }
        if let Some(content) = patch.content {
            validate_content(&content)?;
            self.read_time = read_time(&content);
            if self.excerpt.is_none() {
                self.excerpt = Some(auto_excerpt(&content));
            }
            self.content = content;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(tags) = patch.tags {
            self.tags = normalize_tags(tags);
        }
        if let Some(featured) = patch.featured {
            self.featured = featured;
        }
        if let Some(image) = patch.featured_image {
            self.featured_image = image;
        }
        if let Some(published) = patch.published {
            if published && self.published_at.is_none() {
                self.published_at = Some(now);
            }
            self.published = published;
        }
        self.updated_at = now;
        Ok(())
    }
}
