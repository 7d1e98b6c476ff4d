//! OAuth token encryption at rest.
//!
//! AES-256-GCM with a PBKDF2-HMAC-SHA512 key derived per operation from a
//! single master secret. Stored blob layout: salt(64) || iv(16) || tag(16)
//! || ciphertext, base64-encoded.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha512;
use thiserror::Error;

/// AES-256-GCM with the 16-byte IV this service stores on disk.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Length of the master secret in bytes.
const MASTER_KEY_LENGTH: usize = 32;

/// Length of the per-operation PBKDF2 salt in bytes.
const SALT_LENGTH: usize = 64;

/// Length of the GCM IV in bytes.
const IV_LENGTH: usize = 16;

/// Length of the GCM authentication tag in bytes.
const TAG_LENGTH: usize = 16;

/// PBKDF2-HMAC-SHA512 iteration count.
const PBKDF2_ROUNDS: u32 = 100_000;

/// Errors from vault operations
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Vault configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Token blob is tampered, truncated, or corrupt")]
    TamperedOrCorrupt,
}

/// Symmetric vault for OAuth access/refresh tokens.
///
/// Every operation re-derives its key from the embedded salt; nothing is
/// cached between calls.
#[derive(Clone)]
pub struct TokenVault {
    master_key: [u8; MASTER_KEY_LENGTH],
}

impl TokenVault {
    /// Create a vault from a hex-encoded 32-byte master secret.
    pub fn from_hex(hex_key: &str) -> Result<Self, VaultError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| VaultError::Configuration(format!("master secret is not hex: {}", e)))?;

        if bytes.len() != MASTER_KEY_LENGTH {
            return Err(VaultError::Configuration(format!(
                "master secret must be {} bytes ({} hex chars), got {}",
                MASTER_KEY_LENGTH,
                MASTER_KEY_LENGTH * 2,
                bytes.len()
            )));
        }

        let mut master_key = [0u8; MASTER_KEY_LENGTH];
        master_key.copy_from_slice(&bytes);
        Ok(Self { master_key })
    }

    /// Derive the AES key for one operation from the given salt.
    fn derive_key(&self, salt: &[u8]) -> [u8; MASTER_KEY_LENGTH] {
        let mut key = [0u8; MASTER_KEY_LENGTH];
        pbkdf2_hmac::<Sha512>(&self.master_key, salt, PBKDF2_ROUNDS, &mut key);
        key
    }

    /// Encrypt a token for storage.
    ///
    /// A fresh random salt and IV are generated per call, so encrypting the
    /// same plaintext twice never yields the same blob.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        if plaintext.is_empty() {
            return Err(VaultError::InvalidInput(
                "cannot encrypt an empty token".to_string(),
            ));
        }

        let mut salt = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        let mut iv = [0u8; IV_LENGTH];
        OsRng.fill_bytes(&mut iv);

        let key = self.derive_key(&salt);
        let cipher = Aes256Gcm16::new_from_slice(&key)
            .map_err(|e| VaultError::EncryptionFailed(format!("cipher init: {}", e)))?;

        let nonce = Nonce::<U16>::from_slice(&iv);
        let sealed = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| VaultError::EncryptionFailed(format!("seal: {}", e)))?;

        // The aead API appends the tag; the stored layout keeps it ahead of
        // the ciphertext.
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LENGTH);

        let mut blob = Vec::with_capacity(SALT_LENGTH + IV_LENGTH + TAG_LENGTH + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(tag);
        blob.extend_from_slice(ciphertext);

        Ok(STANDARD.encode(blob))
    }

    /// Decrypt a stored token blob.
    ///
    /// Any authentication failure (wrong key, truncation, bit flips) yields
    /// `TamperedOrCorrupt`; garbage is never returned silently.
    pub fn decrypt(&self, blob: &str) -> Result<String, VaultError> {
        let bytes = STANDARD
            .decode(blob)
            .map_err(|_| VaultError::TamperedOrCorrupt)?;

        if bytes.len() < SALT_LENGTH + IV_LENGTH + TAG_LENGTH {
            return Err(VaultError::TamperedOrCorrupt);
        }

        let (salt, rest) = bytes.split_at(SALT_LENGTH);
        let (iv, rest) = rest.split_at(IV_LENGTH);
        let (tag, ciphertext) = rest.split_at(TAG_LENGTH);

        let key = self.derive_key(salt);
        let cipher =
            Aes256Gcm16::new_from_slice(&key).map_err(|_| VaultError::TamperedOrCorrupt)?;

        // Reassemble ciphertext || tag for the aead API.
        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LENGTH);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        let nonce = Nonce::<U16>::from_slice(iv);
        let plaintext = cipher
            .decrypt(nonce, sealed.as_slice())
            .map_err(|_| VaultError::TamperedOrCorrupt)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::TamperedOrCorrupt)
    }
}

impl std::fmt::Debug for TokenVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVault")
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}
