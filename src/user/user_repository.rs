use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::Result,
    user::user_models::{User, UserProfile},
};

/// Read-only view of the identity subsystem. The messaging core never
/// writes users or friendships; it only resolves profiles and checks the
/// friend relation.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Whether the two users are mutually connected.
    async fn are_friends(&self, user_id: Uuid, other_id: Uuid) -> Result<bool>;

    async fn friend_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>>;

    async fn friend_profiles(&self, user_id: Uuid) -> Result<Vec<UserProfile>>;
}

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn are_friends(&self, user_id: Uuid, other_id: Uuid) -> Result<bool> {
        let found: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM friendships WHERE user_id = $1 AND friend_id = $2",
        )
        .bind(user_id)
        .bind(other_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    async fn friend_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT friend_id FROM friendships WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids)
    }

    async fn friend_profiles(&self, user_id: Uuid) -> Result<Vec<UserProfile>> {
        let profiles = sqlx::query_as::<_, UserProfile>(
            "SELECT u.id, u.fullname, u.profile_pic
             FROM friendships f
             JOIN users u ON u.id = f.friend_id
             WHERE f.user_id = $1
             ORDER BY u.fullname",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(profiles)
    }
}
