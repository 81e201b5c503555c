pub mod dispatch;
mod error;
pub mod geometry;
pub mod models;
mod notifier;
pub mod redirect;
pub mod selection;
mod user;

pub use error::AvatarError;
pub use notifier::{AvatarNotifier, NoopNotifier};
pub use user::User;
