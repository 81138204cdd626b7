//! Session tokens: stateless HS256 JWTs carrying the user id and an expiry.
//!
//! Every protected request resolves its bearer token back to the current user
//! record, so a deleted account or a changed role takes effect immediately.

use crate::errors::FirError;
use crate::keys::SessionKeys;
use crate::settings::Auth;
use crate::storage::{self, Role, User};
use axum::http::HeaderMap;
use base64ct::Encoding;
use chrono::{DateTime, Utc};
use josekit::jws::{JwsHeader, HS256};
use josekit::jwt::{self, JwtPayload};
use rand::RngCore;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::time::{Duration, SystemTime};

/// Resolved caller of a request. Built once per request by
/// [`SessionIssuer::verify`] and passed explicitly to every guarded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn is_police(&self) -> bool {
        self.role == Role::Police
    }
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct SessionIssuer {
    keys: SessionKeys,
    issuer: String,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(keys: SessionKeys, cfg: &Auth) -> Self {
        let days = u64::try_from(cfg.token_ttl_days).unwrap_or(30);
        Self {
            keys,
            issuer: cfg.issuer.clone(),
            ttl: Duration::from_secs(days * 24 * 60 * 60),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &User) -> Result<SessionToken, FirError> {
        self.issue_at(user, SystemTime::now())
    }

    fn issue_at(&self, user: &User, now: SystemTime) -> Result<SessionToken, FirError> {
        let expires_at = now + self.ttl;

        let mut payload = JwtPayload::new();
        payload.set_subject(&user.id);
        payload.set_issuer(&self.issuer);
        payload.set_issued_at(&now);
        payload.set_expires_at(&expires_at);
        payload.set_jwt_id(random_jti());

        let mut header = JwsHeader::new();
        header.set_token_type("JWT");

        let signer = HS256
            .signer_from_bytes(self.keys.secret())
            .map_err(|e| FirError::Unexpected(format!("token signer: {e}")))?;
        let token = jwt::encode_with_signer(&payload, &header, &signer)
            .map_err(|e| FirError::Unexpected(format!("token signing failed: {e}")))?;

        tracing::info!(user_id = %user.id, role = %user.role, "Issued session token");
        Ok(SessionToken {
            token,
            expires_at: DateTime::<Utc>::from(expires_at),
        })
    }

    /// Check the email/password pair and issue a token for the matching user.
    pub async fn authenticate(
        &self,
        db: &DatabaseConnection,
        email: &str,
        password: &str,
    ) -> Result<(User, SessionToken), FirError> {
        let user = storage::verify_user_password(db, email, password)
            .await?
            .ok_or(FirError::InvalidCredentials)?;
        let token = self.issue(&user)?;
        Ok((user, token))
    }

    /// Validate signature, issuer and expiry, then resolve the subject to
    /// the current user record.
    pub async fn verify(&self, db: &DatabaseConnection, token: &str) -> Result<Identity, FirError> {
        let user_id = self.verify_claims(token, SystemTime::now())?;
        let user = storage::get_user_by_id(db, &user_id).await?.ok_or_else(|| {
            tracing::debug!(%user_id, "token subject no longer exists");
            FirError::Unauthorized("user not found".to_string())
        })?;
        Ok(Identity::from(&user))
    }

    /// Resolve the `Authorization: Bearer` header of a request.
    pub async fn resolve(
        &self,
        db: &DatabaseConnection,
        headers: &HeaderMap,
    ) -> Result<Identity, FirError> {
        let token = bearer_token(headers)
            .ok_or_else(|| FirError::Unauthorized("no token".to_string()))?;
        self.verify(db, token).await
    }

    fn verify_claims(&self, token: &str, now: SystemTime) -> Result<String, FirError> {
        let invalid = |reason: &str| {
            tracing::debug!(reason, "rejected session token");
            FirError::Unauthorized("invalid or expired token".to_string())
        };

        let verifier = HS256
            .verifier_from_bytes(self.keys.secret())
            .map_err(|e| FirError::Unexpected(format!("token verifier: {e}")))?;
        let (payload, _header) =
            jwt::decode_with_verifier(token, &verifier).map_err(|_| invalid("signature"))?;

        if payload.issuer() != Some(self.issuer.as_str()) {
            return Err(invalid("issuer"));
        }
        match payload.expires_at() {
            Some(exp) if exp > now => {}
            _ => return Err(invalid("expired")),
        }
        payload
            .subject()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| invalid("subject"))
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn random_jti() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}
