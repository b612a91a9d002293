//! Authenticated encryption for credential blobs.
//!
//! AES-256-GCM with a random 96-bit nonce per payload. Callers derive one
//! [`EncryptionService`] per logical key scope (Calbridge derives a per-user
//! key from a process-wide master key, see [`EncryptionService::derive`]);
//! the derived key is never stored alongside the ciphertext.
//!
//! Any tampering or key mismatch fails decryption with a `Crypto` error
//! rather than returning corrupted plaintext.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const ALGORITHM: &str = "AES-256-GCM";

/// Serializable encrypted payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub algorithm: String,
}

/// AES-256-GCM encryption service bound to a single 32-byte key.
pub struct EncryptionService {
    key: [u8; KEY_LEN],
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService").field("key", &"[REDACTED]").finish()
    }
}

impl EncryptionService {
    /// Create a service from a raw 32-byte key.
    pub fn new(key: &[u8]) -> CommonResult<Self> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| CommonError::InvalidInput("encryption key must be exactly 32 bytes".into()))?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CommonError::internal(format!("failed to create cipher: {e}")))?;
        Ok(Self { key, cipher })
    }

    /// Derive a scoped key from a master key and a scope identifier.
    ///
    /// The derivation is deterministic: the same master key and scope always
    /// yield the same service, so blobs survive process restarts, while two
    /// scopes (e.g. two users) never share a key.
    pub fn derive(context: &str, master_key: &[u8], scope: &str) -> CommonResult<Self> {
        if master_key.len() < KEY_LEN {
            return Err(CommonError::InvalidInput(
                "master key must be at least 32 bytes".into(),
            ));
        }
        let mut material = Vec::with_capacity(master_key.len() + scope.len() + 1);
        material.extend_from_slice(master_key);
        material.push(0);
        material.extend_from_slice(scope.as_bytes());
        let key = blake3::derive_key(context, &material);
        Self::new(&key)
    }

    /// Generate a random 32-byte key.
    pub fn generate_key() -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    /// Encrypt bytes into an [`EncryptedData`] payload.
    pub fn encrypt(&self, data: &[u8]) -> CommonResult<EncryptedData> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), data)
            .map_err(|_| CommonError::crypto("encryption failed"))?;

        Ok(EncryptedData {
            nonce: nonce.to_vec(),
            ciphertext,
            algorithm: ALGORITHM.to_string(),
        })
    }

    /// Decrypt an [`EncryptedData`] payload back into raw bytes.
    ///
    /// Fails closed: a wrong key, a truncated payload, or a single flipped
    /// ciphertext bit all produce a `Crypto` error.
    pub fn decrypt(&self, encrypted: &EncryptedData) -> CommonResult<Vec<u8>> {
        if encrypted.algorithm != ALGORITHM {
            return Err(CommonError::crypto(format!(
                "unsupported algorithm: {}",
                encrypted.algorithm
            )));
        }
        if encrypted.nonce.len() != NONCE_LEN {
            return Err(CommonError::crypto("invalid nonce length"));
        }

        self.cipher
            .decrypt(Nonce::from_slice(&encrypted.nonce), encrypted.ciphertext.as_ref())
            .map_err(|_| CommonError::crypto("decryption failed: bad key or tampered payload"))
    }

    /// Encrypt bytes and encode the payload as a base64 string.
    pub fn encrypt_to_string(&self, data: &[u8]) -> CommonResult<String> {
        let encrypted = self.encrypt(data)?;
        let serialized = serde_json::to_vec(&encrypted)?;
        Ok(BASE64.encode(serialized))
    }

    /// Decode a base64 string and decrypt the contained payload.
    pub fn decrypt_from_string(&self, encrypted_str: &str) -> CommonResult<Vec<u8>> {
        let decoded = BASE64
            .decode(encrypted_str)
            .map_err(|e| CommonError::crypto(format!("base64 decode failed: {e}")))?;
        let encrypted: EncryptedData = serde_json::from_slice(&decoded)?;
        self.decrypt(&encrypted)
    }

    /// Short fingerprint of the current key for logging.
    pub fn key_fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }
}
