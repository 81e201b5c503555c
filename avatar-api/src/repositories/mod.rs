mod avatar_repo;
pub mod mock;
mod push_subscriptions_repo;
mod repo_error;
mod user_repo;

pub use avatar_repo::*;
pub use push_subscriptions_repo::*;
pub use repo_error::RepositoryError;
pub use user_repo::*;
