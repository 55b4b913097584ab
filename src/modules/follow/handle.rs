use actix_web::{HttpRequest, delete, get, post, web};

use crate::{
    api::{
        error,
        success::{self, CursorPage},
    },
    middlewares::get_claims,
    modules::{
        follow::{
            model::{FollowStatusResponse, ListQuery, normalize_limit},
            repository_pg::{FollowRepositoryPg, UserStatRepositoryPg},
            service::FollowService,
        },
        user::{handle::UserSvc, model::UserInfo, repository_pg::UserRepositoryPg},
    },
    utils::ValidatedQuery,
};

pub type FollowSvc = FollowService<UserRepositoryPg, FollowRepositoryPg, UserStatRepositoryPg>;

#[post("/{id:\\d+}")]
pub async fn follow(
    follow_service: web::Data<FollowSvc>,
    followed_uid: web::Path<i64>,
    req: HttpRequest,
) -> Result<success::Success<FollowStatusResponse>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    follow_service.follow(user_id, followed_uid.into_inner()).await?;
    Ok(success::Success::ok(Some(FollowStatusResponse { is_followed: true }))
        .message("Followed successfully"))
}

#[delete("/{id:\\d+}")]
pub async fn unfollow(
    follow_service: web::Data<FollowSvc>,
    followed_uid: web::Path<i64>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    follow_service.unfollow(user_id, followed_uid.into_inner()).await?;
    Ok(success::Success::no_content())
}

#[get("/{id:\\d+}/status")]
pub async fn follow_status(
    follow_service: web::Data<FollowSvc>,
    followed_uid: web::Path<i64>,
    req: HttpRequest,
) -> Result<success::Success<FollowStatusResponse>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let is_followed = follow_service.is_followed(user_id, followed_uid.into_inner()).await;
    Ok(success::Success::ok(Some(FollowStatusResponse { is_followed })))
}

#[get("/{id:\\d+}/following")]
pub async fn following_list(
    follow_service: web::Data<FollowSvc>,
    user_service: web::Data<UserSvc>,
    user_id: web::Path<i64>,
    query: ValidatedQuery<ListQuery>,
    req: HttpRequest,
) -> Result<success::Success<CursorPage<UserInfo>>, error::Error> {
    let requester = get_claims(&req)?.sub;
    let (last_id, limit) = page_params(&query.0);

    let rows = follow_service.get_following_list(user_id.into_inner(), last_id, limit).await?;
    let next_cursor = rows.last().map(|row| row.id);
    let ids: Vec<i64> = rows.iter().map(|row| row.followed_uid).collect();

    let page = build_page(&user_service, requester, &ids, next_cursor, limit).await?;
    Ok(success::Success::ok(Some(page)).message("Following list retrieved successfully"))
}

#[get("/{id:\\d+}/followers")]
pub async fn follower_list(
    follow_service: web::Data<FollowSvc>,
    user_service: web::Data<UserSvc>,
    user_id: web::Path<i64>,
    query: ValidatedQuery<ListQuery>,
    req: HttpRequest,
) -> Result<success::Success<CursorPage<UserInfo>>, error::Error> {
    let requester = get_claims(&req)?.sub;
    let (last_id, limit) = page_params(&query.0);

    let rows = follow_service.get_follower_list(user_id.into_inner(), last_id, limit).await?;
    let next_cursor = rows.last().map(|row| row.id);
    let ids: Vec<i64> = rows.iter().map(|row| row.follower_uid).collect();

    let page = build_page(&user_service, requester, &ids, next_cursor, limit).await?;
    Ok(success::Success::ok(Some(page)).message("Follower list retrieved successfully"))
}

fn page_params(query: &ListQuery) -> (i64, i64) {
    (query.last_id.unwrap_or(0), normalize_limit(query.limit.unwrap_or(0)))
}

async fn build_page(
    user_service: &UserSvc,
    requester: i64,
    ids: &[i64],
    next_cursor: Option<i64>,
    limit: i64,
) -> Result<CursorPage<UserInfo>, error::Error> {
    // Rows whose user has since disappeared are skipped.
    let items = user_service.batch_get_users(requester, ids).await?.into_iter().flatten().collect();
    Ok(CursorPage::new(items, next_cursor, ids.len(), limit))
}
