use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::{
    auth::{claims::SessionClaims, repo_types::User},
    config::{ConfigError, JwtConfig},
};

/// Lifetime of a session credential. Expiry is the only invalidation.
pub const SESSION_TTL: Duration = Duration::hours(3);

/// Signs and verifies HS256 session credentials with the server secret.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl SessionIssuer {
    pub fn new(cfg: &JwtConfig) -> Result<Self, ConfigError> {
        if cfg.secret.trim().is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        })
    }

    pub fn issue(&self, user: &User) -> anyhow::Result<String> {
        self.issue_at(user, OffsetDateTime::now_utc(), SESSION_TTL)
    }

    pub fn issue_at(
        &self,
        user: &User,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> anyhow::Result<String> {
        let claims = SessionClaims {
            sub: user.id,
            username: user.username.clone(),
            nama: user.nama.clone(),
            role: user.role,
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id = %user.id, "session signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<SessionClaims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, "session verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
pub(crate) fn test_issuer(secret: &str) -> SessionIssuer {
    SessionIssuer::new(&JwtConfig {
        secret: secret.into(),
        issuer: "test-issuer".into(),
        audience: "test-aud".into(),
    })
    .expect("valid jwt config")
}
