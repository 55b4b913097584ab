use serde::Serialize;
use sqlx::prelude::{FromRow, Type};

/// Soft-delete state shared by follow and fan rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize)]
#[repr(i16)]
pub enum FollowStatus {
    Deleted = 0,
    Normal = 1,
}

/// `user_id` follows `followed_uid`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FollowEntity {
    pub id: i64,
    pub user_id: i64,
    pub followed_uid: i64,
    pub status: FollowStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// `follower_uid` follows `user_id`; the reverse-indexed copy of a follow row.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FanEntity {
    pub id: i64,
    pub user_id: i64,
    pub follower_uid: i64,
    pub status: FollowStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct UserStatEntity {
    pub user_id: i64,
    pub following_count: i64,
    pub follower_count: i64,
}
