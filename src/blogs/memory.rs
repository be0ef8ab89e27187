use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use uuid::Uuid;

use crate::blogs::model::Blog;
use crate::blogs::repo::{BlogFilter, BlogStore, LikeToggle};

#[derive(Default)]
struct Tables {
    blogs: HashMap<Uuid, Blog>,
    likes: HashMap<Uuid, HashSet<Uuid>>,
}

impl Tables {
    fn read(&self, blog: &Blog) -> Blog {
        Blog {
            likes_count: self.likes.get(&blog.id).map_or(0, |l| l.len() as i64),
            ..blog.clone()
        }
    }

    fn page(&self, filter: BlogFilter, matches: impl Fn(&Blog) -> bool) -> (Vec<Blog>, i64) {
        let mut matching: Vec<&Blog> = self
            .blogs
            .values()
            .filter(|b| b.published && filter.category.map_or(true, |c| b.category == c))
            .filter(|b| matches(*b))
            .collect();
        matching.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .map(|b| self.read(b))
            .collect();
        (page, total)
    }
}

#[derive(Default)]
pub struct MemoryBlogStore {
    tables: Mutex<Tables>,
}

impl MemoryBlogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> anyhow::Result<T> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| anyhow!("blog store mutex poisoned"))?;
        Ok(f(&mut tables))
    }
}

#[async_trait]
impl BlogStore for MemoryBlogStore {
    async fn insert(&self, blog: &Blog) -> anyhow::Result<()> {
        self.with_tables(|t| {
            t.blogs.insert(blog.id, blog.clone());
        })
    }

    async fn save(&self, blog: &Blog) -> anyhow::Result<()> {
        self.with_tables(|t| {
            if let Some(existing) = t.blogs.get_mut(&blog.id) {
                let views = existing.views;
                *existing = Blog {
                    views,
                    ..blog.clone()
                };
            }
        })
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Blog>> {
        self.with_tables(|t| t.blogs.get(&id).map(|b| t.read(b)))
    }

    async fn slug_taken(&self, slug: &str, except: Option<Uuid>) -> anyhow::Result<bool> {
        self.with_tables(|t| {
            t.blogs
                .values()
                .any(|b| b.slug == slug && Some(b.id) != except)
        })
    }

    async fn list_published(&self, filter: BlogFilter) -> anyhow::Result<(Vec<Blog>, i64)> {
        self.with_tables(|t| t.page(filter, |_| true))
    }

    async fn search(&self, term: &str, filter: BlogFilter) -> anyhow::Result<(Vec<Blog>, i64)> {
        let term = term.to_lowercase();
        self.with_tables(|t| {
            t.page(filter, |b| {
                b.title.to_lowercase().contains(&term)
                    || b.content.to_lowercase().contains(&term)
                    || b.tags.iter().any(|tag| tag.to_lowercase().contains(&term))
            })
        })
    }

    async fn increment_views(&self, id: Uuid) -> anyhow::Result<()> {
        self.with_tables(|t| {
            if let Some(blog) = t.blogs.get_mut(&id) {
                blog.views += 1;
            }
        })
    }

    async fn toggle_like(&self, blog_id: Uuid, user_id: Uuid) -> anyhow::Result<LikeToggle> {
        self.with_tables(|t| {
            let likes = t.likes.entry(blog_id).or_default();
            let liked = if likes.remove(&user_id) {
                false
            } else {
                likes.insert(user_id)
            };
            LikeToggle {
                liked,
                likes_count: likes.len() as i64,
            }
        })
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        self.with_tables(|t| {
            t.likes.remove(&id);
            t.blogs.remove(&id).is_some()
        })
    }
}
