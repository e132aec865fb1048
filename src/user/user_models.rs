use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub fullname: String,
    pub email: String,
    pub profile_pic: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// The display fields attached to messages, conversation summaries and
/// presence events.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub fullname: String,
    pub profile_pic: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            fullname: user.fullname,
            profile_pic: user.profile_pic,
        }
    }
}
