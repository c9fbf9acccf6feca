//! HTTP API handlers for mise-api

pub mod auth;
pub mod extract;
pub mod health;
pub mod pagination;
pub mod recipes;
pub mod upload;
pub mod users;

pub use auth::auth_routes;
pub use extract::AuthUser;
pub use health::health_routes;
pub use recipes::recipe_routes;
pub use upload::upload_routes;
pub use users::user_routes;
