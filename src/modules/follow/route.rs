use crate::modules::follow::handle::*;
use actix_web::web::{ServiceConfig, scope};

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/follows")
            .service(follow)
            .service(unfollow)
            .service(follow_status)
            .service(following_list)
            .service(follower_list),
    );
}
