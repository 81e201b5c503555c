use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::models::UserId;

use super::repo_error::RepositoryError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PushSubscription {
    pub id: i32,
    pub user_id: UserId,
    pub device: String,
    pub endpoint: String,
    pub auth: String,
    pub p256dh: String,
    pub created_at: OffsetDateTime,
}

pub trait PushSubscriptionRepository {
    async fn subscriptions_for_users(
        &self,
        user_ids: &[UserId],
    ) -> Result<Vec<PushSubscription>, RepositoryError>;
    async fn upsert_push_subscription(
        &self,
        push_subscription: NewPushSubscription,
    ) -> Result<(), RepositoryError>;
}

#[derive(Clone)]
pub struct PushSubscriptionRepositoryImpl {
    pool: PgPool,
}

impl PushSubscriptionRepositoryImpl {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PushSubscriptionRepository for PushSubscriptionRepositoryImpl {
    async fn subscriptions_for_users(
        &self,
        user_ids: &[UserId],
    ) -> Result<Vec<PushSubscription>, RepositoryError> {
        let raw_ids: Vec<i32> = user_ids.iter().map(|id| id.as_i32()).collect();

        let push_subscriptions = sqlx::query_as::<_, PushSubscription>(
            r#"
            SELECT id, user_id, device, endpoint, auth, p256dh, created_at
            FROM push_subscriptions
            WHERE user_id = ANY($1)
            "#,
        )
        .bind(&raw_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(push_subscriptions)
    }

    async fn upsert_push_subscription(
        &self,
        push_subscription: NewPushSubscription,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO push_subscriptions (user_id, device, endpoint, auth, p256dh)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, device) DO UPDATE
            SET endpoint = EXCLUDED.endpoint,
                auth = EXCLUDED.auth,
                p256dh = EXCLUDED.p256dh
            "#,
        )
        .bind(push_subscription.user_id)
        .bind(&push_subscription.device)
        .bind(&push_subscription.endpoint)
        .bind(&push_subscription.auth)
        .bind(&push_subscription.p256dh)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub struct NewPushSubscription {
    pub user_id: UserId,
    pub device: String,
    pub endpoint: String,
    pub auth: String,
    pub p256dh: String,
}
