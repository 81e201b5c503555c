use thiserror::Error;

/// Errors that can occur during avatar operations.
#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("avatar not found")]
    NotFound,
    #[error("invalid image payload")]
    InvalidImage,
    #[error("avatar payload exceeds limit")]
    PayloadTooLarge,
    #[error("unsupported media type")]
    UnsupportedMediaType,
    #[error("crop region outside image bounds")]
    InvalidCrop,
    #[error("selection includes avatars that do not exist or are not yours")]
    InvalidSelection,
    #[error("{0}")]
    Storage(String),
}

impl AvatarError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Validation failures re-render the form; everything else escalates.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidImage
                | Self::PayloadTooLarge
                | Self::UnsupportedMediaType
                | Self::InvalidCrop
                | Self::InvalidSelection
        )
    }
}
