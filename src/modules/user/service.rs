use log::{debug, info};
use rand::Rng;
use std::sync::Arc;

use crate::api::error::{self, ResultExt};
use crate::configs::VerifyCodeStore;
use crate::modules::follow::repository::{FollowRepository, StatRepository};
use crate::modules::user::aggregate::UserAggregator;
use crate::modules::user::model::{
    InsertUser, RegisterModel, UpdateUser, UserInfo, UserResponse,
};
use crate::modules::user::{repository::UserRepository, schema::UserEntity};
use crate::utils::{Credentials, TokenContext, TokenIssuer};

const PHONE_CONSTRAINT: &str = "users_phone";

pub struct UserService<U, F, S>
where
    U: UserRepository + 'static,
    F: FollowRepository + 'static,
    S: StatRepository + 'static,
{
    repo: Arc<U>,
    aggregator: UserAggregator<U, F, S>,
    credentials: Arc<dyn Credentials>,
    tokens: Arc<dyn TokenIssuer>,
    codes: Arc<dyn VerifyCodeStore>,
    verify_code_ttl: u64,
}

impl<U, F, S> Clone for UserService<U, F, S>
where
    U: UserRepository + 'static,
    F: FollowRepository + 'static,
    S: StatRepository + 'static,
{
    fn clone(&self) -> Self {
        UserService {
            repo: self.repo.clone(),
            aggregator: self.aggregator.clone(),
            credentials: self.credentials.clone(),
            tokens: self.tokens.clone(),
            codes: self.codes.clone(),
            verify_code_ttl: self.verify_code_ttl,
        }
    }
}

impl<U, F, S> UserService<U, F, S>
where
    U: UserRepository + 'static,
    F: FollowRepository + 'static,
    S: StatRepository + 'static,
{
    pub fn with_dependencies(
        repo: Arc<U>,
        aggregator: UserAggregator<U, F, S>,
        credentials: Arc<dyn Credentials>,
        tokens: Arc<dyn TokenIssuer>,
        codes: Arc<dyn VerifyCodeStore>,
        verify_code_ttl: u64,
    ) -> Self {
        info!("UserService initialized with dependencies");
        UserService { repo, aggregator, credentials, tokens, codes, verify_code_ttl }
    }

    pub async fn register(&self, user: RegisterModel) -> Result<i64, error::SystemError> {
        let hash_password = self.credentials.hash(&user.password).context("encrypt password")?;

        let new_user = InsertUser {
            username: user.username,
            email: Some(normalize_email(&user.email)),
            phone: None,
            hash_password: Some(hash_password),
        };

        let user_id = self.repo.create(&new_user).await.context("create user")?;
        info!("User {} registered", user_id);
        Ok(user_id)
    }

    pub async fn email_login(&self, email: &str, password: &str) -> Result<String, error::SystemError> {
        let user = self
            .repo
            .find_by_email(&normalize_email(email))
            .await
            .context("get user by email")?
            .ok_or_else(|| error::SystemError::unauthorized("Invalid email or password"))?;

        let hash = user
            .hash_password
            .as_deref()
            .ok_or_else(|| error::SystemError::unauthorized("Invalid email or password"))?;
        self.credentials.verify(hash, password)?;

        self.issue_token(&user)
    }

    /// Signs in by phone, registering the number on first use.
    pub async fn phone_login(&self, phone: i64, code: &str) -> Result<String, error::SystemError> {
        if !self.codes.check_code(phone, code).await.context("[login] check verify code")? {
            return Err(error::SystemError::unauthorized("Invalid verification code"));
        }

        let user = match self.repo.find_by_phone(phone).await.context("[login] get user by phone")? {
            Some(user) => user,
            None => self.register_phone(phone).await?,
        };

        self.issue_token(&user)
    }

    pub async fn send_verify_code(&self, phone: i64) -> Result<(), error::SystemError> {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        self.codes
            .save_code(phone, &code, self.verify_code_ttl)
            .await
            .context("save verify code")?;
        debug!("Verify code sent to phone {}", phone);
        Ok(())
    }

    pub async fn update_user(
        &self,
        id: i64,
        mut user: UpdateUser,
    ) -> Result<UserResponse, error::SystemError> {
        if user.is_empty() {
            return Err(error::SystemError::bad_request("No fields to update"));
        }
        user.email = user.email.as_deref().map(normalize_email);

        let entity = self.repo.update(id, &user).await.context("update user")?;
        Ok(UserResponse::from(entity))
    }

    pub async fn get_user_info_by_id(&self, id: i64) -> Result<UserInfo, error::SystemError> {
        self.aggregator
            .batch_get_users(id, &[id])
            .await?
            .pop()
            .flatten()
            .ok_or_else(|| error::SystemError::not_found("User not found"))
    }

    pub async fn batch_get_users(
        &self,
        user_id: i64,
        user_ids: &[i64],
    ) -> Result<Vec<Option<UserInfo>>, error::SystemError> {
        self.aggregator.batch_get_users(user_id, user_ids).await
    }

    async fn register_phone(&self, phone: i64) -> Result<UserEntity, error::SystemError> {
        let new_user = InsertUser {
            username: phone.to_string(),
            email: None,
            phone: Some(phone),
            hash_password: None,
        };

        match self.repo.create(&new_user).await {
            Ok(id) => info!("User {} registered by phone", id),
            // Lost a race with a concurrent login for the same number.
            Err(e) if e.conflict_constraint() == Some(PHONE_CONSTRAINT) => {
                debug!("Phone {} registered concurrently", phone)
            }
            Err(e) => return Err(e.context("[login] create user")),
        }

        self.repo
            .find_by_phone(phone)
            .await
            .context("[login] get user by phone")?
            .ok_or_else(|| error::SystemError::not_found("User not found"))
    }

    fn issue_token(&self, user: &UserEntity) -> Result<String, error::SystemError> {
        self.tokens
            .issue_token(&TokenContext { user_id: user.id, username: user.username.clone() })
            .context("gen token sign")
    }
}

/// Emails are stored and looked up lowercased.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test::memory::{Fault, MemoryCodes, MemoryStore};
    use crate::utils::{Argon2Credentials, Claims, JwtIssuer};

    const SECRET: &str = "test-secret";

    fn setup() -> (Arc<MemoryStore>, Arc<MemoryCodes>, UserService<MemoryStore, MemoryStore, MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let codes = Arc::new(MemoryCodes::default());
        let aggregator = UserAggregator::with_dependencies(
            store.clone(),
            store.clone(),
            store.clone(),
            Duration::from_secs(5),
        );
        let service = UserService::with_dependencies(
            store.clone(),
            aggregator,
            Arc::new(Argon2Credentials),
            Arc::new(JwtIssuer::new(SECRET, 60)),
            codes.clone(),
            300,
        );
        (store, codes, service)
    }

    fn register_model(username: &str, email: &str, password: &str) -> RegisterModel {
        RegisterModel {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn register_then_login_by_email() {
        let (_, _, service) = setup();
        let id = service.register(register_model("alice", "alice@example.com", "secret1")).await.unwrap();

        let token = service.email_login("alice@example.com", "secret1").await.unwrap();
        let claims = Claims::decode(&token, SECRET.as_bytes()).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.username, "alice");

        let err = service.email_login("alice@example.com", "wrong-pass").await.unwrap_err();
        assert!(matches!(err, error::SystemError::Unauthorized(_)));
        let err = service.email_login("nobody@example.com", "secret1").await.unwrap_err();
        assert!(matches!(err, error::SystemError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict() {
        let (_, _, service) = setup();
        service.register(register_model("alice", "alice@example.com", "secret1")).await.unwrap();

        let err = service
            .register(register_model("alice", "other@example.com", "secret1"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn phone_login_registers_unseen_numbers_once() {
        let (store, codes, service) = setup();
        let phone = 13_800_138_000;

        service.send_verify_code(phone).await.unwrap();
        let code = codes.code_for(phone).unwrap();
        let token = service.phone_login(phone, &code).await.unwrap();

        let claims = Claims::decode(&token, SECRET.as_bytes()).unwrap();
        assert_eq!(claims.username, phone.to_string());
        assert_eq!(store.users_with_phone(phone), 1);

        service.send_verify_code(phone).await.unwrap();
        let code = codes.code_for(phone).unwrap();
        let second = service.phone_login(phone, &code).await.unwrap();

        assert_eq!(Claims::decode(&second, SECRET.as_bytes()).unwrap().sub, claims.sub);
        assert_eq!(store.users_with_phone(phone), 1);
    }

    #[tokio::test]
    async fn phone_login_rejects_wrong_or_reused_codes() {
        let (store, codes, service) = setup();
        let phone = 13_900_139_000;

        service.send_verify_code(phone).await.unwrap();
        let code = codes.code_for(phone).unwrap();
        assert_eq!(code.len(), 6);

        let wrong = if code == "000000" { "111111" } else { "000000" };
        let err = service.phone_login(phone, wrong).await.unwrap_err();
        assert!(matches!(err, error::SystemError::Unauthorized(_)));
        assert_eq!(store.users_with_phone(phone), 0);

        service.phone_login(phone, &code).await.unwrap();
        assert!(service.phone_login(phone, &code).await.is_err());
    }

    #[tokio::test]
    async fn phone_login_surfaces_storage_errors_with_context() {
        let (store, codes, service) = setup();
        let phone = 13_700_137_000;
        service.send_verify_code(phone).await.unwrap();
        let code = codes.code_for(phone).unwrap();
        store.inject("create", Fault::Error);

        let err = service.phone_login(phone, &code).await.unwrap_err();

        assert!(err.to_string().starts_with("[login] create user"));
        assert_eq!(store.users_with_phone(phone), 0);
    }

    struct CapturedLogs(std::sync::Mutex<Vec<String>>);

    impl log::Log for CapturedLogs {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            self.0.lock().unwrap().push(record.args().to_string());
        }

        fn flush(&self) {}
    }

    static LOGS: CapturedLogs = CapturedLogs(std::sync::Mutex::new(Vec::new()));

    #[tokio::test]
    async fn verify_codes_stay_out_of_the_logs() {
        let _ = log::set_logger(&LOGS);
        log::set_max_level(log::LevelFilter::Trace);
        let (_, codes, service) = setup();
        let phone = 13_500_135_000;

        service.send_verify_code(phone).await.unwrap();
        let code = codes.code_for(phone).unwrap();

        let phone = phone.to_string();
        let lines: Vec<String> = LOGS
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|line| line.contains(&phone))
            .map(|line| line.replace(&phone, ""))
            .collect();
        assert!(!lines.is_empty());
        assert!(lines.iter().all(|line| !line.contains(&code)));
    }

    #[tokio::test]
    async fn phone_login_rereads_when_the_number_was_registered_concurrently() {
        let (store, codes, service) = setup();
        let phone = 13_600_136_000;
        service.send_verify_code(phone).await.unwrap();
        let code = codes.code_for(phone).unwrap();
        store.inject("create", Fault::Raced("users_phone"));

        let token = service.phone_login(phone, &code).await.unwrap();

        let claims = Claims::decode(&token, SECRET.as_bytes()).unwrap();
        assert_eq!(claims.username, phone.to_string());
        assert_eq!(store.users_with_phone(phone), 1);
    }

    #[tokio::test]
    async fn phone_login_reports_a_username_taken_by_another_account() {
        let (store, codes, service) = setup();
        let phone = 13_800_138_000;
        service
            .register(register_model(&phone.to_string(), "owner@example.com", "secret1"))
            .await
            .unwrap();
        service.send_verify_code(phone).await.unwrap();
        let code = codes.code_for(phone).unwrap();

        let err = service.phone_login(phone, &code).await.unwrap_err();

        assert_eq!(err.conflict_constraint(), Some("users_username"));
        assert!(err.to_string().starts_with("[login] create user"));
        assert_eq!(store.users_with_phone(phone), 0);
    }

    #[tokio::test]
    async fn emails_are_unique_regardless_of_case() {
        let (_, _, service) = setup();
        let id = service.register(register_model("bob", "Bob@x.com", "pw1111")).await.unwrap();

        let err = service.register(register_model("bobby", "bob@x.com", "pw2222")).await.unwrap_err();
        assert_eq!(err.conflict_constraint(), Some("users_email"));

        let token = service.email_login("BOB@X.COM", "pw1111").await.unwrap();
        assert_eq!(Claims::decode(&token, SECRET.as_bytes()).unwrap().sub, id);
    }

    #[tokio::test]
    async fn update_cannot_take_another_users_email() {
        let (_, _, service) = setup();
        service.register(register_model("alice", "alice@x.com", "pw1111")).await.unwrap();
        let bob = service.register(register_model("bob", "bob@x.com", "pw2222")).await.unwrap();

        let err = service
            .update_user(bob, UpdateUser { email: Some("ALICE@x.com".into()), ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err.conflict_constraint(), Some("users_email"));

        let updated = service
            .update_user(bob, UpdateUser { email: Some("Robert@X.com".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.email.as_deref(), Some("robert@x.com"));
    }

    #[tokio::test]
    async fn update_user_requires_some_field() {
        let (store, _, service) = setup();
        store.seed_user(1, "alice");

        let err = service.update_user(1, UpdateUser::default()).await.unwrap_err();
        assert!(matches!(err, error::SystemError::BadRequest(_)));

        let updated = service
            .update_user(1, UpdateUser { bio: Some(Some("hi".into())), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.bio.as_deref(), Some("hi"));
        assert_eq!(updated.username, "alice");
    }

    #[tokio::test]
    async fn user_info_by_id_is_the_single_id_batch() {
        let (store, _, service) = setup();
        store.seed_user(1, "alice");
        store.seed_stat(1, 3, 4);

        let info = service.get_user_info_by_id(1).await.unwrap();
        assert_eq!(info.user.username, "alice");
        assert!(!info.is_follow && !info.is_follower);
        assert_eq!(info.stat.map(|s| s.follower_count), Some(4));

        let err = service.get_user_info_by_id(2).await.unwrap_err();
        assert!(matches!(err, error::SystemError::NotFound(_)));
    }
}
