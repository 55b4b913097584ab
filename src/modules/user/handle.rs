use actix_web::{HttpRequest, get, patch, post, web};

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{
        follow::repository_pg::{FollowRepositoryPg, UserStatRepositoryPg},
        user::{model, repository_pg::UserRepositoryPg, service::UserService},
    },
    utils::ValidatedJson,
};

pub type UserSvc = UserService<UserRepositoryPg, FollowRepositoryPg, UserStatRepositoryPg>;

#[post("/register")]
pub async fn register(
    user_service: web::Data<UserSvc>,
    user_data: ValidatedJson<model::RegisterModel>,
) -> Result<success::Success<model::RegisterResponse>, error::Error> {
    let user_id = user_service.register(user_data.0).await?;
    Ok(success::Success::created(Some(model::RegisterResponse { id: user_id }))
        .message("Register successful"))
}

#[post("/login/email")]
pub async fn email_login(
    user_service: web::Data<UserSvc>,
    user_data: ValidatedJson<model::EmailLoginModel>,
) -> Result<success::Success<model::LoginResponse>, error::Error> {
    let access_token = user_service.email_login(&user_data.0.email, &user_data.0.password).await?;
    Ok(success::Success::ok(Some(model::LoginResponse { access_token }))
        .message("Login successful"))
}

#[post("/login/phone")]
pub async fn phone_login(
    user_service: web::Data<UserSvc>,
    user_data: ValidatedJson<model::PhoneLoginModel>,
) -> Result<success::Success<model::LoginResponse>, error::Error> {
    let access_token = user_service.phone_login(user_data.0.phone, &user_data.0.code).await?;
    Ok(success::Success::ok(Some(model::LoginResponse { access_token }))
        .message("Login successful"))
}

#[post("/verify-code")]
pub async fn send_verify_code(
    user_service: web::Data<UserSvc>,
    user_data: ValidatedJson<model::VerifyCodeModel>,
) -> Result<success::Success<()>, error::Error> {
    user_service.send_verify_code(user_data.0.phone).await?;
    Ok(success::Success::ok(None).message("Verification code sent"))
}

#[get("/profile")]
pub async fn get_profile(
    user_service: web::Data<UserSvc>,
    req: HttpRequest,
) -> Result<success::Success<model::UserInfo>, error::Error> {
    let id = get_claims(&req)?.sub;
    let user = user_service.get_user_info_by_id(id).await?;
    Ok(success::Success::ok(Some(user)).message("Profile retrieved successfully"))
}

#[patch("/profile")]
pub async fn update_profile(
    user_service: web::Data<UserSvc>,
    user_data: ValidatedJson<model::UpdateUserModel>,
    req: HttpRequest,
) -> Result<success::Success<model::UserResponse>, error::Error> {
    let id = get_claims(&req)?.sub;
    let user = user_service.update_user(id, user_data.0.into()).await?;
    Ok(success::Success::ok(Some(user)).message("User updated successfully"))
}

#[get("/{id:\\d+}")]
pub async fn get_user(
    user_service: web::Data<UserSvc>,
    user_id: web::Path<i64>,
    req: HttpRequest,
) -> Result<success::Success<model::UserInfo>, error::Error> {
    let requester = get_claims(&req)?.sub;
    let info = user_service
        .batch_get_users(requester, &[user_id.into_inner()])
        .await?
        .pop()
        .flatten()
        .ok_or_else(|| error::Error::not_found("User not found"))?;

    Ok(success::Success::ok(Some(info)).message("User retrieved successfully"))
}

#[post("/batch")]
pub async fn batch_users(
    user_service: web::Data<UserSvc>,
    body: ValidatedJson<model::BatchUsersModel>,
    req: HttpRequest,
) -> Result<success::Success<Vec<Option<model::UserInfo>>>, error::Error> {
    let requester = get_claims(&req)?.sub;
    let infos = user_service.batch_get_users(requester, &body.0.ids).await?;
    Ok(success::Success::ok(Some(infos)).message("Users retrieved successfully"))
}
