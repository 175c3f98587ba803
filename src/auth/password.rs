use std::sync::{Arc, OnceLock};

use argon2::{
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::{error, warn};

use crate::config::{ConfigError, PasswordHashConfig};

/// Salted Argon2id hashing. Cheap to clone; verification reads its cost
/// parameters from the stored PHC string, so raising the cost keeps old
/// digests verifiable.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    dummy: Arc<OnceLock<String>>,
}

impl PasswordHasher {
    pub fn new(cfg: &PasswordHashConfig) -> Result<Self, ConfigError> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| ConfigError::Invalid {
                var: "PASSWORD_HASH_*",
                reason: e.to_string(),
            })?;
        Ok(Self {
            params,
            dummy: Arc::new(OnceLock::new()),
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// Fails closed: a malformed digest verifies as `false`.
    pub fn verify(&self, plain: &str, digest: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "stored password digest is malformed");
                return false;
            }
        };
        self.argon2()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok()
    }

    /// Burns one verification against a throwaway digest so that a lookup miss
    /// costs the same as a wrong password.
    pub fn verify_dummy(&self, plain: &str) -> bool {
        let digest = self
            .dummy
            .get_or_init(|| self.hash("dummy-password").unwrap_or_default());
        let _ = self.verify(plain, digest);
        false
    }
}

#[cfg(test)]
pub(crate) fn test_hasher() -> PasswordHasher {
    PasswordHasher::new(&PasswordHashConfig {
        memory_kib: 256,
        iterations: 1,
        parallelism: 1,
    })
    .expect("valid test params")
}
