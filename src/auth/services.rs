use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    auth::{
        dto::{present, RegisterRequest},
        jwt::SessionIssuer,
        password::PasswordHasher,
        repo::CredentialStore,
        repo_types::{NewUser, Role, User},
        reset_token::{self, RESET_TOKEN_TTL},
    },
    email::{templates, EmailSender},
    error::{AppError, AppResult},
};

/// Acknowledgement for every non-faulting forgot-password request, whether or
/// not the address belongs to an account.
pub const FORGOT_PASSWORD_ACK: &str =
    "If the email is registered, a password reset link has been sent. Please check your inbox.";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub token: String,
    pub user: User,
}

/// Registration, login and email-based password recovery.
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn EmailSender>,
    hasher: PasswordHasher,
    sessions: SessionIssuer,
    reset_url_base: Url,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn EmailSender>,
        hasher: PasswordHasher,
        sessions: SessionIssuer,
        reset_url_base: Url,
    ) -> Self {
        Self {
            store,
            mailer,
            hasher,
            sessions,
            reset_url_base,
        }
    }

    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    pub async fn register(&self, req: &RegisterRequest) -> AppResult<User> {
        let (Some(nama), Some(email), Some(username), Some(password)) = (
            present(&req.nama),
            present(&req.email),
            present(&req.username),
            req.password.as_deref().filter(|p| !p.is_empty()),
        ) else {
            return Err(AppError::validation(
                "Nama, email, username and password are required.",
            ));
        };

        if !is_valid_email(email) {
            warn!(email = %email, "invalid email");
            return Err(AppError::validation("Invalid email."));
        }

        // Cheap pre-check so a duplicate never pays for a hash.
        if self.store.identity_taken(username, email).await? {
            warn!(username = %username, email = %email, "duplicate registration");
            return Err(AppError::DuplicateIdentity);
        }

        let password_hash = self.hash_password(password).await?;
        let user = self
            .store
            .create(NewUser {
                nama,
                email,
                satker: present(&req.satker),
                no_hp: present(&req.no_hp),
                username,
                password_hash: &password_hash,
                role: Role::User,
            })
            .await?;

        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    pub async fn login(&self, identifier: &str, password: &str) -> AppResult<LoginOutcome> {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(AppError::validation("Username and password are required."));
        }

        let user = self.store.find_by_username_or_email(identifier).await?;
        let digest = user.as_ref().map(|u| u.password_hash.clone());
        let matches = self.verify_password(password, digest).await?;

        let user = match user {
            Some(user) if matches => user,
            Some(user) => {
                warn!(user_id = %user.id, "login invalid password");
                return Err(AppError::InvalidCredentials);
            }
            None => {
                warn!(identifier = %identifier, "login unknown identifier");
                return Err(AppError::InvalidCredentials);
            }
        };

        // Recorded before the session exists so the two never disagree.
        self.store.touch_last_login(user.id).await?;
        let token = self.sessions.issue(&user).map_err(AppError::Server)?;

        info!(user_id = %user.id, username = %user.username, "user logged in");
        Ok(LoginOutcome { token, user })
    }

    /// Issues a reset token and mails it. An unknown email is not an error.
    pub async fn forgot_password(&self, email: &str) -> AppResult<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::validation("Email is required."));
        }

        let Some(user) = self.store.find_by_email(email).await? else {
            debug!("password reset requested for unknown email");
            return Ok(());
        };

        let issued = reset_token::issue(OffsetDateTime::now_utc());
        self.store
            .set_reset_token(user.id, &issued.hash, issued.expires_at)
            .await?;

        let link = self.reset_link(&issued.plaintext, &user.email);
        let message =
            templates::password_reset(&user.email, &link, RESET_TOKEN_TTL.whole_minutes());

        if let Err(e) = self.mailer.send(message).await {
            // An unsent token must not stay live.
            if let Err(rollback) = self.store.clear_reset_token(user.id).await {
                error!(user_id = %user.id, error = %rollback, "reset token rollback failed");
            }
            return Err(AppError::Delivery(e));
        }

        info!(user_id = %user.id, "password reset email sent");
        Ok(())
    }

    pub async fn reset_password(
        &self,
        token: &str,
        email: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let (token, email) = (token.trim(), email.trim());
        if token.is_empty() || email.is_empty() || new_password.is_empty() {
            return Err(AppError::validation(
                "Token, email and password are required.",
            ));
        }

        let now = OffsetDateTime::now_utc();
        let Some(user) = reset_token::verify(self.store.as_ref(), token, email, now).await? else {
            warn!("password reset with invalid or expired token");
            return Err(AppError::InvalidOrExpiredToken);
        };

        let password_hash = self.hash_password(new_password).await?;
        let consumed = self
            .store
            .complete_password_reset(user.id, &reset_token::hash_token(token), &password_hash)
            .await?;
        if !consumed {
            // Another reset used or replaced the token in the meantime.
            warn!(user_id = %user.id, "reset token consumed concurrently");
            return Err(AppError::InvalidOrExpiredToken);
        }

        info!(user_id = %user.id, "password reset");
        Ok(())
    }

    pub async fn profile(&self, user_id: Uuid) -> AppResult<User> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    fn reset_link(&self, token: &str, email: &str) -> String {
        let mut url = self.reset_url_base.clone();
        url.query_pairs_mut()
            .append_pair("token", token)
            .append_pair("email", email);
        url.into()
    }

    async fn hash_password(&self, plain: &str) -> AppResult<String> {
        let hasher = self.hasher.clone();
        let plain = plain.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .map_err(AppError::server)?
            .map_err(AppError::Server)
    }

    /// `None` still runs one verification so a miss costs the same as a mismatch.
    async fn verify_password(&self, plain: &str, digest: Option<String>) -> AppResult<bool> {
        let hasher = self.hasher.clone();
        let plain = plain.to_owned();
        tokio::task::spawn_blocking(move || match digest {
            Some(digest) => hasher.verify(&plain, &digest),
            None => hasher.verify_dummy(&plain),
        })
        .await
        .map_err(AppError::server)
    }
}

#[cfg(test)]
pub(crate) fn test_service(
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn EmailSender>,
) -> AuthService {
    AuthService::new(
        store,
        mailer,
        crate::auth::password::test_hasher(),
        crate::auth::jwt::test_issuer("test-secret"),
        Url::parse("https://halo.example/lupa-password.html").unwrap(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        repo::CredentialStore,
        testing::{FailingMailer, InMemoryStore, RecordingMailer},
    };
    use time::Duration;

    struct Harness {
        store: Arc<InMemoryStore>,
        mailer: Arc<RecordingMailer>,
        service: AuthService,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::default());
        let mailer = Arc::new(RecordingMailer::default());
        let service = test_service(store.clone(), mailer.clone());
        Harness {
            store,
            mailer,
            service,
        }
    }

    fn registration(nama: &str, email: &str, username: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            nama: Some(nama.into()),
            email: Some(email.into()),
            satker: None,
            no_hp: None,
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    async fn register_alice(h: &Harness) -> User {
        h.service
            .register(&registration("Alice", "a@x.com", "alice", "alicepw"))
            .await
            .expect("register alice")
    }

    #[tokio::test]
    async fn register_then_login_returns_user_role() {
        let h = harness();
        let user = register_alice(&h).await;
        assert_eq!(user.role, Role::User);
        assert_ne!(user.password_hash, "alicepw");

        let outcome = h.service.login("alice", "alicepw").await.expect("login");
        assert_eq!(outcome.user.id, user.id);
        assert_eq!(outcome.user.role, Role::User);
        let claims = h.service.sessions().verify(&outcome.token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::User);
    }

    #[tokio::test]
    async fn login_accepts_email_as_identifier_and_touches_last_login() {
        let h = harness();
        let user = register_alice(&h).await;
        assert!(h.store.get(user.id).unwrap().last_login_at.is_none());

        h.service.login("a@x.com", "alicepw").await.expect("login by email");
        assert!(h.store.get(user.id).unwrap().last_login_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_username_or_email_is_rejected() {
        let h = harness();
        register_alice(&h).await;

        let same_username = h
            .service
            .register(&registration("Other", "other@x.com", "alice", "pw"))
            .await;
        assert!(matches!(same_username, Err(AppError::DuplicateIdentity)));

        let same_email = h
            .service
            .register(&registration("Other", "a@x.com", "other", "pw"))
            .await;
        assert!(matches!(same_email, Err(AppError::DuplicateIdentity)));
    }

    #[tokio::test]
    async fn username_equal_to_another_users_email_is_allowed() {
        let h = harness();
        register_alice(&h).await;
        let user = h
            .service
            .register(&registration("Bob", "b@x.com", "a@x.com", "bobpw"))
            .await
            .expect("username only clashes with usernames");
        assert_eq!(user.username, "a@x.com");
    }

    #[tokio::test]
    async fn register_requires_fields_and_valid_email() {
        let h = harness();
        let mut req = registration("Alice", "a@x.com", "alice", "pw");
        req.nama = Some("  ".into());
        assert!(matches!(h.service.register(&req).await, Err(AppError::Validation(_))));

        let mut req = registration("Alice", "a@x.com", "alice", "pw");
        req.password = None;
        assert!(matches!(h.service.register(&req).await, Err(AppError::Validation(_))));

        let req = registration("Alice", "not-an-email", "alice", "pw");
        assert!(matches!(h.service.register(&req).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_identical() {
        let h = harness();
        register_alice(&h).await;

        let wrong = h.service.login("alice", "nope").await.unwrap_err();
        let unknown = h.service.login("mallory", "nope").await.unwrap_err();
        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.status(), unknown.status());
    }

    #[tokio::test]
    async fn failed_login_does_not_touch_last_login() {
        let h = harness();
        let user = register_alice(&h).await;
        let _ = h.service.login("alice", "nope").await;
        assert!(h.store.get(user.id).unwrap().last_login_at.is_none());
    }

    #[tokio::test]
    async fn forgot_password_is_silent_for_unknown_email() {
        let h = harness();
        register_alice(&h).await;
        h.service.forgot_password("ghost@x.com").await.expect("generic ok");
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn forgot_password_stores_only_hash_and_mails_link() {
        let h = harness();
        let user = register_alice(&h).await;
        h.service.forgot_password("a@x.com").await.expect("sent");

        let sent = h.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "a@x.com");
        assert!(sent[0]
            .html_body
            .contains("https://halo.example/lupa-password.html?token="));
        assert!(sent[0].html_body.contains("email=a%40x.com"));

        let token = h.mailer.last_token().expect("token in link");
        let stored = h.store.get(user.id).unwrap();
        assert_eq!(stored.reset_token_hash, Some(reset_token::hash_token(&token)));
        assert_ne!(stored.reset_token_hash.as_deref(), Some(token.as_str()));
        let expires = stored.reset_token_expires_at.expect("expiry set");
        let remaining = expires - OffsetDateTime::now_utc();
        assert!(remaining > Duration::minutes(9) && remaining <= Duration::minutes(10));
    }

    #[tokio::test]
    async fn delivery_failure_rolls_back_token() {
        let store = Arc::new(InMemoryStore::default());
        let service = test_service(store.clone(), Arc::new(FailingMailer));
        let user = service
            .register(&registration("Alice", "a@x.com", "alice", "alicepw"))
            .await
            .unwrap();

        let err = service.forgot_password("a@x.com").await.unwrap_err();
        assert!(matches!(err, AppError::Delivery(_)));
        let stored = store.get(user.id).unwrap();
        assert!(stored.reset_token_hash.is_none());
        assert!(stored.reset_token_expires_at.is_none());
    }

    #[tokio::test]
    async fn full_password_reset_flow() {
        let h = harness();
        let user = register_alice(&h).await;
        h.service.forgot_password("a@x.com").await.unwrap();
        let token = h.mailer.last_token().unwrap();

        h.service
            .reset_password(&token, "a@x.com", "newpw")
            .await
            .expect("reset");

        assert!(matches!(
            h.service.login("alice", "alicepw").await,
            Err(AppError::InvalidCredentials)
        ));
        h.service.login("alice", "newpw").await.expect("new password works");

        let stored = h.store.get(user.id).unwrap();
        assert!(stored.reset_token_hash.is_none());
        assert!(stored.reset_token_expires_at.is_none());
    }

    #[tokio::test]
    async fn reset_token_is_single_use() {
        let h = harness();
        register_alice(&h).await;
        h.service.forgot_password("a@x.com").await.unwrap();
        let token = h.mailer.last_token().unwrap();

        h.service.reset_password(&token, "a@x.com", "first").await.unwrap();
        let replay = h.service.reset_password(&token, "a@x.com", "second").await;
        assert!(matches!(replay, Err(AppError::InvalidOrExpiredToken)));
        h.service.login("alice", "first").await.expect("first reset stands");
    }

    #[tokio::test]
    async fn token_consumed_between_check_and_commit_is_rejected() {
        let h = harness();
        let user = register_alice(&h).await;
        h.service.forgot_password("a@x.com").await.unwrap();
        let token = h.mailer.last_token().unwrap();

        // A competing reset commits right after this one verified the token.
        h.store.after_next_email_lookup(|u| {
            u.password_hash = "$argon2id$winner".into();
            u.reset_token_hash = None;
            u.reset_token_expires_at = None;
        });

        let err = h
            .service
            .reset_password(&token, "a@x.com", "loser")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpiredToken));
        assert_eq!(h.store.get(user.id).unwrap().password_hash, "$argon2id$winner");
    }

    #[tokio::test]
    async fn token_replaced_between_check_and_commit_is_rejected() {
        let h = harness();
        let user = register_alice(&h).await;
        h.service.forgot_password("a@x.com").await.unwrap();
        let token = h.mailer.last_token().unwrap();

        let fresh = reset_token::issue(OffsetDateTime::now_utc());
        let (fresh_hash, fresh_expiry) = (fresh.hash.clone(), fresh.expires_at);
        h.store.after_next_email_lookup(move |u| {
            u.reset_token_hash = Some(fresh_hash);
            u.reset_token_expires_at = Some(fresh_expiry);
        });

        let err = h
            .service
            .reset_password(&token, "a@x.com", "newpw")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpiredToken));
        h.service.login("alice", "alicepw").await.expect("password unchanged");
        assert_eq!(
            h.store.get(user.id).unwrap().reset_token_hash.as_deref(),
            Some(fresh.hash.as_str())
        );
    }

    #[tokio::test]
    async fn overwritten_password_hash_is_used_at_login() {
        let h = harness();
        let user = register_alice(&h).await;
        let digest = crate::auth::password::test_hasher().hash("rotated").unwrap();
        h.store.update_password_hash(user.id, &digest).await.unwrap();

        assert!(matches!(
            h.service.login("alice", "alicepw").await,
            Err(AppError::InvalidCredentials)
        ));
        h.service.login("alice", "rotated").await.expect("new digest verifies");
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected() {
        let h = harness();
        let user = register_alice(&h).await;
        h.service.forgot_password("a@x.com").await.unwrap();
        let token = h.mailer.last_token().unwrap();

        // Move the stored expiry past the 10-minute window.
        let stored = h.store.get(user.id).unwrap();
        let past = OffsetDateTime::now_utc() - Duration::seconds(1);
        h.store
            .set_reset_token(user.id, stored.reset_token_hash.as_deref().unwrap(), past)
            .await
            .unwrap();

        let err = h
            .service
            .reset_password(&token, "a@x.com", "newpw")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidOrExpiredToken));
        h.service.login("alice", "alicepw").await.expect("password unchanged");
    }

    #[tokio::test]
    async fn unknown_and_mismatched_tokens_share_one_error() {
        let h = harness();
        register_alice(&h).await;
        h.service.forgot_password("a@x.com").await.unwrap();

        let mismatched = h
            .service
            .reset_password("00ff", "a@x.com", "pw")
            .await
            .unwrap_err();
        let unknown_email = h
            .service
            .reset_password("00ff", "ghost@x.com", "pw")
            .await
            .unwrap_err();
        assert_eq!(mismatched.to_string(), unknown_email.to_string());
        assert!(matches!(unknown_email, AppError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn new_forgot_request_replaces_previous_token() {
        let h = harness();
        register_alice(&h).await;
        h.service.forgot_password("a@x.com").await.unwrap();
        let first = h.mailer.last_token().unwrap();
        h.service.forgot_password("a@x.com").await.unwrap();
        let second = h.mailer.last_token().unwrap();
        assert_ne!(first, second);

        let stale = h.service.reset_password(&first, "a@x.com", "pw1").await;
        assert!(matches!(stale, Err(AppError::InvalidOrExpiredToken)));
        h.service.reset_password(&second, "a@x.com", "pw2").await.unwrap();
    }

    #[tokio::test]
    async fn reset_requires_all_fields() {
        let h = harness();
        let err = h.service.reset_password("", "a@x.com", "pw").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn profile_of_missing_user_is_unauthorized() {
        let h = harness();
        let err = h.service.profile(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
        let user = register_alice(&h).await;
        assert_eq!(h.service.profile(user.id).await.unwrap().username, "alice");
        assert!(h.store.by_username("alice").is_some());
    }

    #[test]
    fn email_validation_matches_basic_shape() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("a x@y.com"));
    }
}
