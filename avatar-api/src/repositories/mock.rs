//! In-memory avatar store for tests and local development.

use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::domain::models::{Avatar, AvatarId, AvatarImage, UserId};

use super::{repo_error::RepositoryError, AvatarRepository};

#[derive(Default)]
pub struct InMemoryAvatarRepository {
    rows: RwLock<Vec<(Avatar, Vec<u8>)>>,
    next_id: AtomicI32,
}

impl InMemoryAvatarRepository {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            next_id: AtomicI32::new(1),
        }
    }

    /// Total row count across all users, for no-mutation assertions.
    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl AvatarRepository for InMemoryAvatarRepository {
    async fn create(
        &self,
        owner: UserId,
        image: &AvatarImage,
        primary: bool,
    ) -> Result<Avatar, RepositoryError> {
        let mut rows = self.rows.write().await;

        if primary {
            for (avatar, _) in rows.iter_mut().filter(|(a, _)| a.user_id == owner) {
                avatar.primary = false;
            }
        }

        let now = OffsetDateTime::now_utc();
        let avatar = Avatar {
            id: AvatarId::new(self.next_id.fetch_add(1, Ordering::SeqCst)),
            user_id: owner,
            mime_type: image.mime_type.clone(),
            width: image.width as i32,
            height: image.height as i32,
            primary,
            created_at: now,
            updated_at: now,
        };
        rows.push((avatar.clone(), image.bytes.clone()));

        Ok(avatar)
    }

    async fn list_for_user(&self, owner: UserId) -> Result<Vec<Avatar>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|(a, _)| a.user_id == owner)
            .map(|(a, _)| a.clone())
            .collect())
    }

    async fn get_owned(
        &self,
        owner: UserId,
        id: AvatarId,
    ) -> Result<Option<Avatar>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|(a, _)| a.id == id && a.user_id == owner)
            .map(|(a, _)| a.clone()))
    }

    async fn set_primary(&self, owner: UserId, id: AvatarId) -> Result<(), RepositoryError> {
        let mut rows = self.rows.write().await;

        if !rows.iter().any(|(a, _)| a.id == id && a.user_id == owner) {
            return Err(RepositoryError::NotFound(format!("avatar {id}")));
        }

        for (avatar, _) in rows.iter_mut().filter(|(a, _)| a.user_id == owner) {
            avatar.primary = avatar.id == id;
            if avatar.primary {
                avatar.updated_at = OffsetDateTime::now_utc();
            }
        }

        Ok(())
    }

    async fn update_image(
        &self,
        id: AvatarId,
        image: &AvatarImage,
    ) -> Result<(), RepositoryError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .iter_mut()
            .find(|(a, _)| a.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("avatar {id}")))?;

        row.0.mime_type = image.mime_type.clone();
        row.0.width = image.width as i32;
        row.0.height = image.height as i32;
        row.0.updated_at = OffsetDateTime::now_utc();
        row.1 = image.bytes.clone();

        Ok(())
    }

    async fn delete_many(&self, owner: UserId, ids: &[AvatarId]) -> Result<u64, RepositoryError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|(a, _)| !(a.user_id == owner && ids.contains(&a.id)));
        Ok((before - rows.len()) as u64)
    }

    async fn image_bytes(&self, id: AvatarId) -> Result<Option<AvatarImage>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|(a, _)| a.id == id).map(|(a, bytes)| {
            AvatarImage::new(
                bytes.clone(),
                a.mime_type.clone(),
                a.width as u32,
                a.height as u32,
            )
        }))
    }
}
