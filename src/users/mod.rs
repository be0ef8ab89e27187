pub mod handlers;
pub mod memory;
pub mod model;
pub mod repo;

pub use handlers::router;
