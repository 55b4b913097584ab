/// Cursor sentinel for "start from the newest row".
pub const MAX_ID: i64 = 0xffff_ffff_ffff;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

pub struct Env {
    pub jwt_secret: String,
    pub access_token_expiration: u64,
    pub database_url: String,
    pub redis_url: String,
    pub frontend_url: String,
    pub ip: String,
    pub port: u16,
    pub aggregate_timeout_ms: u64,
    pub verify_code_ttl: u64,
}

impl Env {
    fn new() -> Self {
        let jwt_secret = std::env::var("SECRET_KEY")
            .expect("SECRET_KEY must be set in .env file or environment variable");

        let access_token_expiration = std::env::var("ACCESS_TOKEN_EXPIRATION")
            .unwrap_or_else(|_| "900".to_string())
            .parse::<u64>()
            .expect("ACCESS_TOKEN_EXPIRATION must be a valid u64 integer");

        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set in .env file or environment variable");
        let redis_url = std::env::var("REDIS_URL")
            .expect("REDIS_URL must be set in .env file or environment variable");

        let frontend_url =
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let ip = std::env::var("IP").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .expect("PORT must be a valid u16 integer");

        let aggregate_timeout_ms = std::env::var("AGGREGATE_TIMEOUT_MS")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u64>()
            .expect("AGGREGATE_TIMEOUT_MS must be a valid u64 integer");
        let verify_code_ttl = std::env::var("VERIFY_CODE_TTL")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()
            .expect("VERIFY_CODE_TTL must be a valid u64 integer");
        Env {
            jwt_secret,
            access_token_expiration,
            database_url,
            redis_url,
            frontend_url,
            ip,
            port,
            aggregate_timeout_ms,
            verify_code_ttl,
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
