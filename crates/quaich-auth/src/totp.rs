//! TOTP secrets and codes, backup codes, and AES-256-GCM sealing of
//! secrets at rest.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use sha2::{Digest, Sha256};
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AuthError;

const DIGITS: usize = 6;
/// Accept the previous and next 30-second step as well.
const SKEW: u8 = 1;
const STEP_SECS: u64 = 30;
const BACKUP_CODE_BYTES: usize = 4;
const NONCE_LEN: usize = 12;

/// Encrypt a TOTP secret with AES-256-GCM.
///
/// Returns `base64(nonce || ciphertext || tag)`.
pub fn encrypt_secret(key: &[u8; 32], plaintext: &[u8]) -> Result<String, AuthError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM encrypt: {e}")))?;

    let mut combined = nonce_bytes.to_vec();
    combined.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(combined))
}

pub fn decrypt_secret(key: &[u8; 32], encoded: &str) -> Result<Vec<u8>, AuthError> {
    let combined = STANDARD
        .decode(encoded)
        .map_err(|e| AuthError::Crypto(format!("base64 decode: {e}")))?;

    if combined.len() <= NONCE_LEN {
        return Err(AuthError::Crypto("ciphertext too short".into()));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| AuthError::Crypto(format!("AES-GCM decrypt: {e}")))
}

/// Storage form of a secret: encrypted when a key is configured, plain
/// base32 otherwise.
pub fn seal_secret(key: Option<&[u8; 32]>, secret_bytes: &[u8]) -> Result<String, AuthError> {
    match key {
        Some(key) => encrypt_secret(key, secret_bytes),
        None => Ok(Secret::Raw(secret_bytes.to_vec()).to_encoded().to_string()),
    }
}

/// Inverse of [`seal_secret`].
pub fn open_secret(key: Option<&[u8; 32]>, stored: &str) -> Result<Vec<u8>, AuthError> {
    match key {
        Some(key) => decrypt_secret(key, stored),
        None => decode_base32(stored),
    }
}

pub fn decode_base32(encoded: &str) -> Result<Vec<u8>, AuthError> {
    Secret::Encoded(encoded.trim().to_uppercase())
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret decode: {e}")))
}

fn totp(secret_bytes: &[u8], issuer: &str, account: &str, skew: u8) -> Result<TOTP, AuthError> {
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        skew,
        STEP_SECS,
        secret_bytes.to_vec(),
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| AuthError::Crypto(format!("TOTP init: {e}")))
}

/// Generate a TOTP enrollment.
///
/// Returns `(base32_secret, otpauth_uri)`.
pub fn generate_enrollment(issuer: &str, account: &str) -> Result<(String, String), AuthError> {
    let secret = Secret::generate_secret();
    let secret_bytes = secret
        .to_bytes()
        .map_err(|e| AuthError::Crypto(format!("secret bytes: {e}")))?;

    let uri = totp(&secret_bytes, issuer, account, SKEW)?.get_url();
    let base32 = secret.to_encoded().to_string();

    Ok((base32, uri))
}

/// Check a 6-digit code at `unix_time`, allowing one step of skew.
pub fn verify_code_at(
    secret_bytes: &[u8],
    code: &str,
    issuer: &str,
    account: &str,
    unix_time: u64,
) -> Result<bool, AuthError> {
    Ok(matching_step(secret_bytes, code, issuer, account, unix_time)?.is_some())
}

/// The time step `code` was generated for, searched within one step of
/// `unix_time`. `None` for a malformed or wrong code.
pub fn matching_step(
    secret_bytes: &[u8],
    code: &str,
    issuer: &str,
    account: &str,
    unix_time: u64,
) -> Result<Option<u64>, AuthError> {
    if !is_totp_format(code) {
        return Ok(None);
    }
    let exact = totp(secret_bytes, issuer, account, 0)?;
    let code = code.trim();
    let current = unix_time / STEP_SECS;
    let skew = u64::from(SKEW);

    Ok((current.saturating_sub(skew)..=current + skew)
        .find(|step| exact.check(code, step * STEP_SECS)))
}

/// Unix second from which an earlier accepted code could have been the
/// one for `step`. A use recorded before it cannot collide with `step`.
pub fn reuse_cutoff(step: u64) -> u64 {
    step.saturating_sub(u64::from(SKEW)) * STEP_SECS
}

/// `n` fresh backup codes of 8 lowercase hex characters.
pub fn generate_backup_codes(n: usize) -> Vec<String> {
    let mut rng = rand::rng();
    (0..n)
        .map(|_| {
            let bytes: [u8; BACKUP_CODE_BYTES] = rng.random();
            hex::encode(bytes)
        })
        .collect()
}

/// SHA-256 digest (hex) of a normalised backup code, as stored.
pub fn hash_backup_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

pub fn is_totp_format(token: &str) -> bool {
    let token = token.trim();
    token.len() == DIGITS && token.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_backup_code_format(token: &str) -> bool {
    let token = token.trim();
    token.len() == BACKUP_CODE_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [42u8; 32];
        let plaintext = b"totp-secret-bytes";
        let encrypted = encrypt_secret(&key, plaintext).unwrap();
        assert_eq!(decrypt_secret(&key, &encrypted).unwrap(), plaintext);
    }

    #[test]
    fn wrong_key_fails_decrypt() {
        let encrypted = encrypt_secret(&[42u8; 32], b"secret").unwrap();
        assert!(decrypt_secret(&[99u8; 32], &encrypted).is_err());
    }

    #[test]
    fn sealing_without_key_is_base32() {
        let bytes = Secret::generate_secret().to_bytes().unwrap();
        let stored = seal_secret(None, &bytes).unwrap();
        assert!(stored.chars().all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
        assert_eq!(open_secret(None, &stored).unwrap(), bytes);

        let key = [7u8; 32];
        let sealed = seal_secret(Some(&key), &bytes).unwrap();
        assert_eq!(open_secret(Some(&key), &sealed).unwrap(), bytes);
    }

    #[test]
    fn enrollment_produces_valid_uri() {
        let (base32, uri) = generate_enrollment("Quaich", "alice@example.com").unwrap();
        assert!(!base32.is_empty());
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains("Quaich"));
        assert!(uri.contains("alice"));
    }

    #[test]
    fn codes_verify_within_one_step() {
        let bytes = Secret::generate_secret().to_bytes().unwrap();
        let t = 1_700_000_000;
        let code = totp(&bytes, "Quaich", "a@b.c", SKEW).unwrap().generate(t);

        assert!(verify_code_at(&bytes, &code, "Quaich", "a@b.c", t).unwrap());
        assert!(verify_code_at(&bytes, &code, "Quaich", "a@b.c", t + STEP_SECS).unwrap());
        assert!(!verify_code_at(&bytes, &code, "Quaich", "a@b.c", t + 3 * STEP_SECS).unwrap());
    }

    #[test]
    fn matching_step_names_the_generating_step() {
        let bytes = Secret::generate_secret().to_bytes().unwrap();
        let t = 1_700_000_010;
        let step = t / STEP_SECS;
        let code = totp(&bytes, "Quaich", "a@b.c", 0).unwrap().generate(t);

        let at = |time| matching_step(&bytes, &code, "Quaich", "a@b.c", time).unwrap();
        assert_eq!(at(t), Some(step));
        assert_eq!(at(t + STEP_SECS), Some(step));
        assert_eq!(at(t - STEP_SECS), Some(step));
        assert_eq!(at(t + 2 * STEP_SECS), None);
    }

    #[test]
    fn reuse_cutoff_covers_the_skew_window() {
        assert_eq!(reuse_cutoff(100), 99 * STEP_SECS);
        assert_eq!(reuse_cutoff(0), 0);
    }

    #[test]
    fn malformed_codes_fail_without_error() {
        let bytes = Secret::generate_secret().to_bytes().unwrap();
        assert!(!verify_code_at(&bytes, "12ab56", "Quaich", "a@b.c", 0).unwrap());
        assert!(!verify_code_at(&bytes, "1234567", "Quaich", "a@b.c", 0).unwrap());
    }

    #[test]
    fn backup_codes_shape_and_hash() {
        let codes = generate_backup_codes(10);
        assert_eq!(codes.len(), 10);
        for code in &codes {
            assert!(is_backup_code_format(code), "{code}");
        }
        assert_eq!(hash_backup_code("ABCDEF12"), hash_backup_code(" abcdef12 "));
        assert_ne!(hash_backup_code("abcdef12"), hash_backup_code("abcdef13"));
    }

    #[test]
    fn token_formats() {
        assert!(is_totp_format("123456"));
        assert!(!is_totp_format("12345"));
        assert!(!is_totp_format("abcdef"));
        assert!(is_backup_code_format("deadbeef"));
        assert!(is_backup_code_format("12345678"));
        assert!(!is_backup_code_format("xyz12345"));
        assert!(!is_backup_code_format("123456"));
    }
}
