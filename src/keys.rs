use crate::errors::FirError;
use crate::settings::Auth;
use base64ct::Encoding;
use rand::RngCore;
use std::fs;
use std::sync::Arc;

/// HS256 needs at least as many key bytes as the digest output.
pub const MIN_SECRET_LEN: usize = 32;

/// Server-side HMAC secret used to sign session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    secret: Arc<Vec<u8>>,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

impl SessionKeys {
    /// Resolve the secret: inline config first, then the persisted file, and
    /// generate + persist a fresh one if neither exists.
    pub fn load(cfg: &Auth) -> Result<Self, FirError> {
        if let Some(inline) = &cfg.jwt_secret {
            return Self::from_secret(inline.as_bytes().to_vec());
        }

        let secret = if cfg.secret_path.exists() {
            let encoded = fs::read_to_string(&cfg.secret_path)?;
            base64ct::Base64UrlUnpadded::decode_vec(encoded.trim()).map_err(|e| {
                FirError::Validation(format!(
                    "session secret at {} is not valid base64url: {e}",
                    cfg.secret_path.display()
                ))
            })?
        } else {
            if let Some(parent) = cfg.secret_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut bytes = vec![0u8; MIN_SECRET_LEN];
            rand::thread_rng().fill_bytes(&mut bytes);
            fs::write(
                &cfg.secret_path,
                base64ct::Base64UrlUnpadded::encode_string(&bytes),
            )?;
            tracing::info!(path = %cfg.secret_path.display(), "Generated new session secret");
            bytes
        };

        Self::from_secret(secret)
    }

    pub fn from_secret(secret: Vec<u8>) -> Result<Self, FirError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(FirError::Validation(format!(
                "session secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        Ok(Self {
            secret: Arc::new(secret),
        })
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}
