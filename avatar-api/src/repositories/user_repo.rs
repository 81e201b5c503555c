use sqlx::PgPool;

use crate::domain::{models::UserId, User};

use super::repo_error::RepositoryError;

pub trait UserRepository {
    async fn get_user(&self, id: UserId) -> Result<User, RepositoryError>;
    async fn upsert_user(&self, user: &NewUser) -> Result<User, RepositoryError>;
    /// Social-graph edges for notification fan-out.
    async fn connected_user_ids(&self, id: UserId) -> Result<Vec<UserId>, RepositoryError>;
}

pub struct UserRepositoryImpl {
    pool: PgPool,
}

impl UserRepositoryImpl {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl UserRepository for UserRepositoryImpl {
    async fn get_user(&self, id: UserId) -> Result<User, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, full_name, access_token
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn upsert_user(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, full_name, access_token)
            VALUES ($1, $2, $3)
            ON CONFLICT(email) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                access_token = EXCLUDED.access_token
            RETURNING id, email, full_name, access_token
            "#,
        )
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.access_token)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn connected_user_ids(&self, id: UserId) -> Result<Vec<UserId>, RepositoryError> {
        let connections = sqlx::query_scalar::<_, UserId>(
            r#"
            SELECT connection_id
            FROM user_connections
            WHERE user_id = $1
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(connections)
    }
}

pub struct NewUser {
    email: String,
    full_name: String,
    access_token: String,
}

impl NewUser {
    pub fn new(email: String, full_name: String, access_token: String) -> Self {
        Self {
            email,
            full_name,
            access_token,
        }
    }
}
