pub(crate) mod avatars;
pub(crate) mod error;
pub(crate) mod notifications;

pub(crate) use error::ApiError;
