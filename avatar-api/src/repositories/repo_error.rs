use thiserror::Error;

use crate::domain::AvatarError;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<RepositoryError> for AvatarError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(_) => AvatarError::NotFound,
            RepositoryError::DatabaseError(e) => AvatarError::storage(e.to_string()),
        }
    }
}
