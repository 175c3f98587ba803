//! In-memory doubles for the credential store and the mailer.

use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{
        repo::{CredentialStore, StoreError, StoreResult},
        repo_types::{NewUser, Role, User},
    },
    email::{DeliveryError, EmailSender, OutgoingEmail},
};

pub fn sample_user(username: &str, email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        username: username.into(),
        email: email.into(),
        nama: format!("{username} Example"),
        satker: None,
        no_hp: None,
        password_hash: "$argon2id$not-a-real-hash".into(),
        role: Role::User,
        last_login_at: None,
        reset_token_hash: None,
        reset_token_expires_at: None,
        created_at: OffsetDateTime::now_utc(),
    }
}

type UserHook = Box<dyn FnOnce(&mut User) + Send>;

#[derive(Default)]
pub struct InMemoryStore {
    users: Mutex<Vec<User>>,
    after_email_lookup: Mutex<Option<UserHook>>,
}

impl InMemoryStore {
    pub fn insert(&self, user: User) -> User {
        self.users.lock().unwrap().push(user.clone());
        user
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    pub fn by_username(&self, username: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username)
            .cloned()
    }

    /// Runs `hook` against the stored row right after the next `find_by_email`
    /// has taken its snapshot, simulating a concurrent writer.
    pub fn after_next_email_lookup<F>(&self, hook: F)
    where
        F: FnOnce(&mut User) + Send + 'static,
    {
        *self.after_email_lookup.lock().unwrap() = Some(Box::new(hook));
    }

    fn update<F: FnOnce(&mut User)>(&self, id: Uuid, f: F) {
        if let Some(user) = self.users.lock().unwrap().iter_mut().find(|u| u.id == id) {
            f(user);
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_by_username_or_email(&self, identifier: &str) -> StoreResult<Option<User>> {
        let users = self.users.lock().unwrap();
        let by_name = users.iter().find(|u| u.username == identifier);
        Ok(by_name
            .or_else(|| users.iter().find(|u| u.email == identifier))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.iter_mut().find(|u| u.email == email) else {
            return Ok(None);
        };
        let snapshot = user.clone();
        if let Some(hook) = self.after_email_lookup.lock().unwrap().take() {
            hook(user);
        }
        Ok(Some(snapshot))
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.get(id))
    }

    async fn identity_taken(&self, username: &str, email: &str) -> StoreResult<bool> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().any(|u| u.username == username || u.email == email))
    }

    async fn create(&self, new_user: NewUser<'_>) -> StoreResult<User> {
        let mut users = self.users.lock().unwrap();
        if users
            .iter()
            .any(|u| u.username == new_user.username || u.email == new_user.email)
        {
            return Err(StoreError::DuplicateIdentity);
        }
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username.into(),
            email: new_user.email.into(),
            nama: new_user.nama.into(),
            satker: new_user.satker.map(Into::into),
            no_hp: new_user.no_hp.map(Into::into),
            password_hash: new_user.password_hash.into(),
            role: new_user.role,
            last_login_at: None,
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        self.update(user_id, |u| u.password_hash = password_hash.into());
        Ok(())
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<()> {
        self.update(user_id, |u| {
            u.reset_token_hash = Some(token_hash.into());
            u.reset_token_expires_at = Some(expires_at);
        });
        Ok(())
    }

    async fn clear_reset_token(&self, user_id: Uuid) -> StoreResult<()> {
        self.update(user_id, |u| {
            u.reset_token_hash = None;
            u.reset_token_expires_at = None;
        });
        Ok(())
    }

    async fn touch_last_login(&self, user_id: Uuid) -> StoreResult<()> {
        self.update(user_id, |u| u.last_login_at = Some(OffsetDateTime::now_utc()));
        Ok(())
    }

    async fn complete_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        password_hash: &str,
    ) -> StoreResult<bool> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.iter_mut().find(|u| u.id == user_id) else {
            return Ok(false);
        };
        let live = user.reset_token_hash.as_deref() == Some(token_hash)
            && user
                .reset_token_expires_at
                .is_some_and(|exp| exp > OffsetDateTime::now_utc());
        if live {
            user.password_hash = password_hash.into();
            user.reset_token_hash = None;
            user.reset_token_expires_at = None;
        }
        Ok(live)
    }
}

/// Captures outgoing mail instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    /// Pulls the plaintext token out of the most recent reset link.
    pub fn last_token(&self) -> Option<String> {
        let sent = self.sent.lock().unwrap();
        let body = &sent.last()?.html_body;
        let start = body.find("token=")? + "token=".len();
        let token: String = body[start..]
            .chars()
            .take_while(|c| c.is_ascii_hexdigit())
            .collect();
        Some(token)
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(email);
        Ok(())
    }
}

#[derive(Default)]
pub struct FailingMailer;

#[async_trait]
impl EmailSender for FailingMailer {
    async fn send(&self, _email: OutgoingEmail) -> Result<(), DeliveryError> {
        Err(DeliveryError::Disabled)
    }
}
