use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    api::error,
    modules::{follow::schema::UserStatEntity, user::schema::UserEntity},
    utils::double_option,
};

#[derive(Deserialize, Validate)]
pub struct RegisterModel {
    #[validate(length(min = 3, message = "Username must be at least 3 characters long"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,
}

#[derive(Deserialize, Validate)]
pub struct EmailLoginModel {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,
}

#[derive(Deserialize, Validate)]
pub struct PhoneLoginModel {
    #[validate(range(min = 1_000_000, message = "Invalid phone number"))]
    pub phone: i64,
    #[validate(length(equal = 6, message = "Verification code must be 6 digits"))]
    pub code: String,
}

#[derive(Deserialize, Validate)]
pub struct VerifyCodeModel {
    #[validate(range(min = 1_000_000, message = "Invalid phone number"))]
    pub phone: i64,
}

#[derive(Deserialize, Validate)]
pub struct BatchUsersModel {
    #[validate(length(max = 200, message = "At most 200 ids per request"))]
    pub ids: Vec<i64>,
}

#[derive(Deserialize, Validate)]
pub struct UpdateUserModel {
    #[validate(length(min = 3, message = "Username must be at least 3 characters long"))]
    pub username: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub avatar_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub bio: Option<Option<String>>,
}

pub struct InsertUser {
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<i64>,
    pub hash_password: Option<String>,
}

#[derive(Default)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<Option<String>>,
    pub bio: Option<Option<String>>,
}

impl UpdateUser {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.avatar_url.is_none()
            && self.bio.is_none()
    }
}

impl From<UpdateUserModel> for UpdateUser {
    fn from(model: UpdateUserModel) -> Self {
        UpdateUser {
            username: model.username,
            email: model.email,
            avatar_url: model.avatar_url,
            bio: model.bio,
        }
    }
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub id: i64,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<i64>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<UserEntity> for UserResponse {
    fn from(entity: UserEntity) -> Self {
        UserResponse {
            id: entity.id,
            username: entity.username,
            email: entity.email,
            phone: entity.phone,
            avatar_url: entity.avatar_url,
            bio: entity.bio,
            created_at: entity.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserStat {
    pub following_count: i64,
    pub follower_count: i64,
}

impl TryFrom<UserStatEntity> for UserStat {
    type Error = error::SystemError;

    fn try_from(stat: UserStatEntity) -> Result<Self, Self::Error> {
        if stat.following_count < 0 || stat.follower_count < 0 {
            return Err(error::SystemError::DatabaseError(
                format!("negative counters in user_stat for user {}", stat.user_id).into(),
            ));
        }
        Ok(UserStat { following_count: stat.following_count, follower_count: stat.follower_count })
    }
}

/// Profile plus the requester's relationship to it, built per request.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    #[serde(flatten)]
    pub user: UserResponse,
    /// The requester follows this user.
    pub is_follow: bool,
    /// This user follows the requester.
    pub is_follower: bool,
    pub stat: Option<UserStat>,
}
