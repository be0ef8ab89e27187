use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::middleware::OwnedResource;
use crate::state::AppState;

pub mod handlers;
pub mod memory;
pub mod model;
pub mod repo;

pub use handlers::router;
pub use model::Blog;

#[async_trait]
impl OwnedResource for Blog {
    async fn load(state: &AppState, id: Uuid) -> anyhow::Result<Option<Self>> {
        state.blogs.find_by_id(id).await
    }

    fn owner_id(&self) -> Uuid {
        self.author
    }
}
