use actix_web::{
    self, App, HttpServer,
    middleware::{Logger, from_fn},
    web,
};
use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use crate::{
    configs::{RedisCache, connect_database},
    middlewares::authentication,
    modules::{
        follow::{
            repository_pg::{FollowRepositoryPg, UserStatRepositoryPg},
            service::FollowService,
        },
        user::{aggregate::UserAggregator, repository_pg::UserRepositoryPg, service::UserService},
    },
    utils::{Argon2Credentials, JwtIssuer},
};

mod api;
mod configs;
mod constants;
mod middlewares;
mod modules;
mod utils;

pub static ENV: LazyLock<constants::Env> = LazyLock::new(|| {
    dotenvy::dotenv().ok();
    env_logger::init();
    log::info!("Environment variables loaded from .env file");
    constants::Env::default()
});

#[actix_web::get("/")]
async fn health_check() -> &'static str {
    "Server is running"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let db_pool =
        connect_database().await.map_err(|_| std::io::Error::other("Database connection error"))?;

    let redis_pool =
        RedisCache::new().await.map_err(|_| std::io::Error::other("Redis connection error"))?;

    let user_repo = Arc::new(UserRepositoryPg::new(db_pool.clone()));
    let follow_repo = Arc::new(FollowRepositoryPg::new(db_pool.clone()));
    let stat_repo = Arc::new(UserStatRepositoryPg::new(db_pool));

    let aggregator = UserAggregator::with_dependencies(
        user_repo.clone(),
        follow_repo.clone(),
        stat_repo.clone(),
        Duration::from_millis(ENV.aggregate_timeout_ms),
    );
    let user_service = UserService::with_dependencies(
        user_repo.clone(),
        aggregator,
        Arc::new(Argon2Credentials),
        Arc::new(JwtIssuer::new(ENV.jwt_secret.as_str(), ENV.access_token_expiration)),
        Arc::new(redis_pool),
        ENV.verify_code_ttl,
    );
    let follow_service = FollowService::with_dependencies(user_repo, follow_repo, stat_repo);

    println!("Starting server at http://{}:{}", ENV.ip.as_str(), ENV.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(user_service.clone()))
            .app_data(web::Data::new(follow_service.clone()))
            .service(health_check)
            .service(
                web::scope("/api").configure(modules::user::route::public_api_configure).service(
                    web::scope("")
                        .wrap(from_fn(authentication))
                        .configure(modules::user::route::configure)
                        .configure(modules::follow::route::configure),
                ),
            )
    })
    .bind((ENV.ip.as_str(), ENV.port))?
    .workers(2)
    .run()
    .await
}
