use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::models::{Avatar, AvatarId, AvatarImage, UserId};

use super::repo_error::RepositoryError;

const AVATAR_COLUMNS: &str = "id, user_id, mime_type, width, height, is_primary, created_at, updated_at";

/// The avatar store. Rows come back in natural (insertion) order.
///
/// The single-primary invariant is enforced here: any write that flags a row
/// as primary clears the owner's other flags in the same transaction.
#[async_trait]
pub trait AvatarRepository: Send + Sync + 'static {
    async fn create(
        &self,
        owner: UserId,
        image: &AvatarImage,
        primary: bool,
    ) -> Result<Avatar, RepositoryError>;

    async fn list_for_user(&self, owner: UserId) -> Result<Vec<Avatar>, RepositoryError>;

    /// Fetch an avatar scoped to its owner; someone else's id is absent.
    async fn get_owned(&self, owner: UserId, id: AvatarId)
        -> Result<Option<Avatar>, RepositoryError>;

    async fn set_primary(&self, owner: UserId, id: AvatarId) -> Result<(), RepositoryError>;

    async fn update_image(&self, id: AvatarId, image: &AvatarImage)
        -> Result<(), RepositoryError>;

    async fn delete_many(&self, owner: UserId, ids: &[AvatarId])
        -> Result<u64, RepositoryError>;

    async fn image_bytes(&self, id: AvatarId) -> Result<Option<AvatarImage>, RepositoryError>;
}

pub struct PostgresAvatarRepository {
    pool: PgPool,
}

impl PostgresAvatarRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AvatarRepository for PostgresAvatarRepository {
    async fn create(
        &self,
        owner: UserId,
        image: &AvatarImage,
        primary: bool,
    ) -> Result<Avatar, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if primary {
            sqlx::query("UPDATE avatars SET is_primary = false WHERE user_id = $1 AND is_primary")
                .bind(owner)
                .execute(&mut *tx)
                .await?;
        }

        let avatar = sqlx::query_as::<_, Avatar>(&format!(
            r#"
            INSERT INTO avatars (user_id, image, mime_type, width, height, is_primary)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {AVATAR_COLUMNS}
            "#
        ))
        .bind(owner)
        .bind(&image.bytes)
        .bind(&image.mime_type)
        .bind(image.width as i32)
        .bind(image.height as i32)
        .bind(primary)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(avatar)
    }

    async fn list_for_user(&self, owner: UserId) -> Result<Vec<Avatar>, RepositoryError> {
        let avatars = sqlx::query_as::<_, Avatar>(&format!(
            r#"
            SELECT {AVATAR_COLUMNS}
            FROM avatars
            WHERE user_id = $1
            ORDER BY id
            "#
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        Ok(avatars)
    }

    async fn get_owned(
        &self,
        owner: UserId,
        id: AvatarId,
    ) -> Result<Option<Avatar>, RepositoryError> {
        let avatar = sqlx::query_as::<_, Avatar>(&format!(
            r#"
            SELECT {AVATAR_COLUMNS}
            FROM avatars
            WHERE id = $1 AND user_id = $2
            "#
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        Ok(avatar)
    }

    async fn set_primary(&self, owner: UserId, id: AvatarId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE avatars SET is_primary = false WHERE user_id = $1 AND id <> $2")
            .bind(owner)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let updated = sqlx::query(
            "UPDATE avatars SET is_primary = true, updated_at = now() WHERE user_id = $1 AND id = $2",
        )
        .bind(owner)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("avatar {id}")));
        }

        tx.commit().await?;

        Ok(())
    }

    async fn update_image(
        &self,
        id: AvatarId,
        image: &AvatarImage,
    ) -> Result<(), RepositoryError> {
        let updated = sqlx::query(
            r#"
            UPDATE avatars
            SET image = $2, mime_type = $3, width = $4, height = $5, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&image.bytes)
        .bind(&image.mime_type)
        .bind(image.width as i32)
        .bind(image.height as i32)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("avatar {id}")));
        }

        Ok(())
    }

    async fn delete_many(&self, owner: UserId, ids: &[AvatarId]) -> Result<u64, RepositoryError> {
        let raw_ids: Vec<i32> = ids.iter().map(|id| id.as_i32()).collect();

        let deleted = sqlx::query("DELETE FROM avatars WHERE user_id = $1 AND id = ANY($2)")
            .bind(owner)
            .bind(&raw_ids)
            .execute(&self.pool)
            .await?;

        Ok(deleted.rows_affected())
    }

    async fn image_bytes(&self, id: AvatarId) -> Result<Option<AvatarImage>, RepositoryError> {
        let row = sqlx::query_as::<_, (Vec<u8>, String, i32, i32)>(
            "SELECT image, mime_type, width, height FROM avatars WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(bytes, mime_type, width, height)| {
            AvatarImage::new(bytes, mime_type, width as u32, height as u32)
        }))
    }
}
