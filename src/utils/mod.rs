use actix_web::{web, FromRequest};
use argon2::{
    password_hash::{Error as PasswordHashError, PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use serde::{de::Deserializer, Deserialize, Serialize};
use validator::Validate;

use crate::api::error;

lazy_static::lazy_static! {
  static ref ARGON2: Argon2<'static> = Argon2::default();
}

pub fn hash_password(password: &str) -> Result<String, error::SystemError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = ARGON2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, password: &str) -> Result<bool, error::SystemError> {
    let parsed_hash = PasswordHash::new(hash)?;
    match ARGON2.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(e) => Err(error::SystemError::HashError(e)),
    }
}

/// Password hashing capability.
pub trait Credentials: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, error::SystemError>;

    /// `Ok(())` when `plaintext` matches `hash`, `Unauthorized` when it does not.
    fn verify(&self, hash: &str, plaintext: &str) -> Result<(), error::SystemError>;
}

#[derive(Clone, Copy, Default)]
pub struct Argon2Credentials;

impl Credentials for Argon2Credentials {
    fn hash(&self, plaintext: &str) -> Result<String, error::SystemError> {
        hash_password(plaintext)
    }

    fn verify(&self, hash: &str, plaintext: &str) -> Result<(), error::SystemError> {
        if verify_password(hash, plaintext)? {
            Ok(())
        } else {
            Err(error::SystemError::unauthorized("Invalid email or password"))
        }
    }
}

/// Identity carried into an issued token.
#[derive(Debug, Clone)]
pub struct TokenContext {
    pub user_id: i64,
    pub username: String,
}

pub trait TokenIssuer: Send + Sync {
    fn issue_token(&self, ctx: &TokenContext) -> Result<String, error::SystemError>;
}

#[derive(Clone)]
pub struct JwtIssuer {
    secret: String,
    expiration: u64,
}

impl JwtIssuer {
    pub fn new(secret: impl Into<String>, expiration: u64) -> Self {
        Self { secret: secret.into(), expiration }
    }
}

impl TokenIssuer for JwtIssuer {
    fn issue_token(&self, ctx: &TokenContext) -> Result<String, error::SystemError> {
        let jti = uuid::Uuid::new_v7(uuid::Timestamp::now(uuid::NoContext));
        Claims::new(ctx.user_id, &ctx.username, self.expiration)
            .with_jti(jti)
            .encode(self.secret.as_bytes())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub iat: u64,
    pub exp: u64,
    pub jti: Option<uuid::Uuid>,
}

impl Claims {
    pub fn new(sub: i64, username: &str, exp: u64) -> Self {
        let now = chrono::Utc::now().timestamp() as u64;
        Claims { sub, username: username.to_string(), iat: now, exp: now + exp, jti: None }
    }

    pub fn with_jti(mut self, jti: uuid::Uuid) -> Self {
        self.jti = Some(jti);
        self
    }

    pub fn encode(&self, secret: &[u8]) -> Result<String, error::SystemError> {
        let header = Header::new(Algorithm::HS256);
        let token = encode(&header, self, &EncodingKey::from_secret(secret))?;
        Ok(token)
    }

    pub fn decode(token: &str, secret: &[u8]) -> Result<Self, error::SystemError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        let token_data = decode::<Self>(token, &DecodingKey::from_secret(secret), &validation)?;
        Ok(token_data.claims)
    }
}

pub fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

pub struct ValidatedJson<T>(pub T);

impl<T> FromRequest for ValidatedJson<T>
where
    T: Validate + serde::de::DeserializeOwned + 'static,
{
    type Error = error::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        let fut = web::Json::<T>::from_request(req, payload);

        Box::pin(async move {
            let json = fut.await.map_err(|e| error::Error::BadRequest(e.to_string().into()))?;
            let model = json.into_inner();
            model.validate().map_err(|e| error::Error::BadRequest(e.to_string().into()))?;
            Ok(ValidatedJson(model))
        })
    }
}

pub struct ValidatedQuery<T>(pub T);

impl<T> FromRequest for ValidatedQuery<T>
where
    T: Validate + serde::de::DeserializeOwned + 'static,
{
    type Error = error::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        let fut = web::Query::<T>::from_request(req, payload);

        Box::pin(async move {
            let query = fut.await.map_err(|e| error::Error::BadRequest(e.to_string().into()))?;
            query.validate().map_err(|e| error::Error::BadRequest(e.to_string().into()))?;
            Ok(ValidatedQuery(query.into_inner()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argon2_credentials_accept_only_the_hashed_password() {
        let creds = Argon2Credentials;
        let hash = creds.hash("correct horse").unwrap();

        assert!(creds.verify(&hash, "correct horse").is_ok());
        let err = creds.verify(&hash, "battery staple").unwrap_err();
        assert!(matches!(err, error::SystemError::Unauthorized(_)));
    }

    #[test]
    fn issued_token_decodes_to_the_same_identity() {
        let issuer = JwtIssuer::new("test-secret", 60);
        let token =
            issuer.issue_token(&TokenContext { user_id: 42, username: "alice".into() }).unwrap();

        let claims = Claims::decode(&token, b"test-secret").unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.username, "alice");
        assert!(claims.jti.is_some());
        assert!(Claims::decode(&token, b"other-secret").is_err());
    }
}
