//! Per-lobby shared secret.
//!
//! Lobby passwords are stored only as Argon2id PHC strings with a fresh random
//! salt each. Verification goes through the PHC verifier, which compares the
//! derived hashes in constant time.

use argon2::{Algorithm, Argon2, Params, Version};
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use thiserror::Error;

use crate::config::Argon2Config;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid argon2 parameters: {0}")]
    Params(String),
    #[error("password hash failure: {0}")]
    Hash(String),
}

#[derive(Clone)]
pub struct CredentialGate {
    argon2: Argon2<'static>,
}

impl Default for CredentialGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CredentialGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialGate").finish_non_exhaustive()
    }
}

impl CredentialGate {
    /// Argon2id with the library's default cost.
    pub fn new() -> Self {
        CredentialGate {
            argon2: Argon2::default(),
        }
    }

    pub fn with_params(params: Params) -> Self {
        CredentialGate {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Build from the `[security.argon2]` section; unset fields keep library defaults.
    pub fn from_config(cfg: Option<&Argon2Config>) -> Result<Self, CredentialError> {
        let Some(a) = cfg else {
            return Ok(Self::new());
        };
        let mem = a.memory_kib.unwrap_or(Params::DEFAULT_M_COST);
        let time = a.time_cost.unwrap_or(Params::DEFAULT_T_COST);
        let para = a.parallelism.unwrap_or(Params::DEFAULT_P_COST);
        let params =
            Params::new(mem, time, para, None).map_err(|e| CredentialError::Params(e.to_string()))?;
        Ok(Self::with_params(params))
    }

    pub fn hash(&self, plaintext: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| CredentialError::Hash(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// False for a mismatch and for a corrupt stored credential.
    pub fn verify(&self, plaintext: &str, credential: &str) -> bool {
        match PasswordHash::new(credential) {
            Ok(parsed) => self
                .argon2
                .verify_password(plaintext.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                log::warn!("Corrupt lobby credential: {}", e);
                false
            }
        }
    }
}
