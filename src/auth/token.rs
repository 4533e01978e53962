//! API tokens.
//!
//! A raw token reads `pantry_<lookup>_<secret>`. Only the lookup part is
//! stored in clear, so a presented token is found by lookup and then checked
//! against its Argon2id hash.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::Token;

const ARGON2_MEMORY_KIB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 1;
const ARGON2_PARALLELISM: u32 = 4;
const ARGON2_OUTPUT_LEN: usize = 32;

const TOKEN_PREFIX: &str = "pantry";
const LOOKUP_LENGTH: usize = 8;
const SECRET_LENGTH: usize = 24;

pub struct TokenGenerator {
    argon2: Argon2<'static>,
}

impl Default for TokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenGenerator {
    #[must_use]
    pub fn new() -> Self {
        let params = Params::new(
            ARGON2_MEMORY_KIB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(ARGON2_OUTPUT_LEN),
        )
        .unwrap_or_default();

        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    /// Builds a never-expiring token row for `user_id`.
    /// Returns the row to store and the raw token, which is shown only once.
    pub fn issue(&self, user_id: i64) -> Result<(Token, String)> {
        let lookup = random_lookup();
        let raw_token = format!("{TOKEN_PREFIX}_{lookup}_{}", random_secret());

        let token = Token {
            id: Uuid::new_v4().to_string(),
            token_hash: self.hash(&raw_token)?,
            token_lookup: lookup,
            user_id,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };
        Ok((token, raw_token))
    }

    fn hash(&self, raw_token: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(raw_token.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Config(format!("failed to hash token: {e}")))
    }

    /// Checks a presented token against the stored hash of its row.
    pub fn verify(&self, raw_token: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| Error::Config(format!("invalid token hash: {e}")))?;

        match self.argon2.verify_password(raw_token.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::Config(format!("failed to verify token: {e}"))),
        }
    }
}

fn random_lookup() -> String {
    Uuid::new_v4().simple().to_string()[..LOOKUP_LENGTH].to_string()
}

fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}

/// Splits a raw token into its lookup and secret parts.
pub fn parse_token(raw_token: &str) -> Result<(&str, &str)> {
    let rest = raw_token
        .strip_prefix(TOKEN_PREFIX)
        .and_then(|rest| rest.strip_prefix('_'))
        .ok_or(Error::InvalidTokenFormat)?;

    let (lookup, secret) = rest.split_once('_').ok_or(Error::InvalidTokenFormat)?;

    let well_formed = lookup.len() == LOOKUP_LENGTH
        && secret.len() == SECRET_LENGTH
        && lookup.bytes().all(|b| b.is_ascii_alphanumeric())
        && secret.bytes().all(|b| b.is_ascii_alphanumeric());
    if !well_formed {
        return Err(Error::InvalidTokenFormat);
    }

    Ok((lookup, secret))
}
