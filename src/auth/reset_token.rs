//! Single-use, time-boxed password reset tokens.
//!
//! The plaintext leaves the process exactly once (inside the reset email); the
//! store only ever sees its SHA-256 digest.

use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

use crate::auth::{
    repo::{CredentialStore, StoreResult},
    repo_types::User,
};

pub const RESET_TOKEN_TTL: Duration = Duration::minutes(10);
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct IssuedResetToken {
    pub plaintext: String,
    pub hash: String,
    pub expires_at: OffsetDateTime,
}

pub fn issue(now: OffsetDateTime) -> IssuedResetToken {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = hex::encode(bytes);
    IssuedResetToken {
        hash: hash_token(&plaintext),
        plaintext,
        expires_at: now + RESET_TOKEN_TTL,
    }
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns the user only if `token` matches the live token stored for `email`
/// and has not expired. Unknown email, mismatch and expiry all yield `None`.
pub async fn verify(
    store: &dyn CredentialStore,
    token: &str,
    email: &str,
    now: OffsetDateTime,
) -> StoreResult<Option<User>> {
    let Some(user) = store.find_by_email(email).await? else {
        return Ok(None);
    };
    let presented = hash_token(token);
    let live = match (&user.reset_token_hash, user.reset_token_expires_at) {
        (Some(stored), Some(expires_at)) => {
            constant_time_eq(stored.as_bytes(), presented.as_bytes()) && expires_at > now
        }
        _ => false,
    };
    Ok(live.then_some(user))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
