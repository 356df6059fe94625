use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::AuthError;

const SCHEME: &str = "pbkdf2_sha256";
pub const SALT_LENGTH: usize = 16;
pub const HASH_LENGTH: usize = 32;

/// Encode a password as `pbkdf2_sha256$<iterations>$<salt>$<hash>`.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = derive(password, &salt, iterations);
    format!(
        "{SCHEME}${iterations}${}${}",
        STANDARD.encode(salt),
        STANDARD.encode(hash)
    )
}

/// Check a password against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    match decode(encoded) {
        Ok((iterations, salt, expected)) => {
            let actual = derive(password, &salt, iterations);
            actual[..].ct_eq(&expected[..]).into()
        }
        Err(_) => false,
    }
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

fn decode(encoded: &str) -> Result<(u32, Vec<u8>, Vec<u8>), AuthError> {
    let mut parts = encoded.split('$');
    if parts.next() != Some(SCHEME) {
        return Err(AuthError::MalformedHash);
    }
    let iterations = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .ok_or(AuthError::MalformedHash)?;
    let salt = parts
        .next()
        .and_then(|s| STANDARD.decode(s).ok())
        .ok_or(AuthError::MalformedHash)?;
    let hash = parts
        .next()
        .and_then(|s| STANDARD.decode(s).ok())
        .filter(|h| h.len() == HASH_LENGTH)
        .ok_or(AuthError::MalformedHash)?;
    if parts.next().is_some() {
        return Err(AuthError::MalformedHash);
    }
    Ok((iterations, salt, hash))
}

/// Password rules applied on create and reset.
#[derive(Debug, Clone, Copy)]
pub struct PasswordPolicy {
    pub enforce: bool,
    pub min_length: usize,
}

impl PasswordPolicy {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            enforce: config.enforce_password_policy,
            min_length: config.password_min_length,
        }
    }

    pub fn check(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if !self.enforce {
            return Ok(());
        }
        if password.chars().count() < self.min_length {
            return Err(AuthError::WeakPassword("Senha curta demais".into()));
        }
        if !username.is_empty() && password.to_lowercase().contains(&username.to_lowercase()) {
            return Err(AuthError::WeakPassword(
                "Senha não pode conter o usuário".into(),
            ));
        }
        if !password.chars().any(|c| c.is_numeric()) {
            return Err(AuthError::WeakPassword("Senha precisa de dígito".into()));
        }
        if !password.chars().any(|c| c.is_alphabetic()) {
            return Err(AuthError::WeakPassword("Senha precisa de letra".into()));
        }
        Ok(())
    }
}
