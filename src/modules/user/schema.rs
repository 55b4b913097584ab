use sqlx::prelude::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct UserEntity {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<i64>,
    pub hash_password: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
