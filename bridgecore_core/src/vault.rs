//! Reversible encryption of tenant upstream passwords at rest.
//!
//! A single process-wide key is loaded from configuration at startup. The
//! interface accepts a keyset rather than one bare key so a future rotator
//! can add keys with monotonically increasing generation ids without this
//! crate needing to change shape. Rotation itself is not implemented here.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::CoreError;

/// One generation of vault key. Keys are zeroized on drop since they are
/// symmetric secrets held in process memory for the process lifetime.
pub struct VaultKey {
  pub generation: u32,
  key: [u8; 32],
}

impl Drop for VaultKey {
  fn drop(&mut self) {
    self.key.zeroize();
  }
}

impl VaultKey {
  pub fn new(generation: u32, key: [u8; 32]) -> Self {
    Self { generation, key }
  }

  /// Derives a 32-byte key from an arbitrary-length passphrase loaded from
  /// configuration, so operators can supply a human-managed secret rather
  /// than raw key bytes.
  pub fn from_passphrase(generation: u32, passphrase: &str) -> Self {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    Self { generation, key }
  }
}

/// An ordered set of vault keys. `seal` always uses the newest (last)
/// generation; `open` tries generations newest-first so ciphertext sealed
/// under a since-rotated key still opens.
pub struct VaultKeySet {
  keys: Vec<VaultKey>,
}

impl VaultKeySet {
  pub fn new(keys: Vec<VaultKey>) -> Self {
    Self { keys }
  }

  fn current(&self) -> Option<&VaultKey> {
    self.keys.last()
  }
}

pub trait CredentialVault: Send + Sync {
  fn seal(&self, plaintext: &str) -> Result<String, CoreError>;
  fn open(&self, ciphertext: &str) -> Result<String, CoreError>;
}

/// AES-256-GCM backed vault. Ciphertext is `base64(generation_byte ‖ nonce ‖
/// tag+body)` so `open` can pick the matching key generation without an
/// out-of-band lookup.
pub struct AesGcmVault {
  keys: VaultKeySet,
}

impl AesGcmVault {
  pub fn new(keys: VaultKeySet) -> Self {
    Self { keys }
  }
}

impl CredentialVault for AesGcmVault {
  fn seal(&self, plaintext: &str) -> Result<String, CoreError> {
    let key = self
      .keys
      .current()
      .ok_or_else(|| CoreError::CryptoError("no vault key configured".into()))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.key));
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
      .encrypt(nonce, plaintext.as_bytes())
      .map_err(|e| CoreError::CryptoError(format!("seal failed: {e}")))?;

    let mut out = Vec::with_capacity(1 + 12 + ciphertext.len());
    out.push(key.generation as u8);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(out))
  }

  fn open(&self, ciphertext: &str) -> Result<String, CoreError> {
    let raw = BASE64
      .decode(ciphertext)
      .map_err(|e| CoreError::CryptoError(format!("corrupt ciphertext: {e}")))?;

    if raw.len() < 1 + 12 {
      return Err(CoreError::CryptoError("corrupt ciphertext: too short".into()));
    }
    let generation = raw[0] as u32;
    let nonce = Nonce::from_slice(&raw[1..13]);
    let body = &raw[13..];

    let key = self
      .keys
      .keys
      .iter()
      .rev()
      .find(|k| k.generation == generation)
      .ok_or_else(|| CoreError::CryptoError("no matching vault key generation".into()))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.key));
    let plaintext = cipher
      .decrypt(nonce, body)
      .map_err(|e| CoreError::CryptoError(format!("open failed: {e}")))?;

    String::from_utf8(plaintext).map_err(|e| CoreError::CryptoError(format!("non-utf8 plaintext: {e}")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn single_key_vault() -> AesGcmVault {
    AesGcmVault::new(VaultKeySet::new(vec![VaultKey::from_passphrase(1, "test-key")]))
  }

  #[test]
  fn seal_then_open_round_trips() {
    let vault = single_key_vault();
    let sealed = vault.seal("s3cr3t-password").unwrap();
    assert_ne!(sealed, "s3cr3t-password");
    let opened = vault.open(&sealed).unwrap();
    assert_eq!(opened, "s3cr3t-password");
  }

  #[test]
  fn open_of_corrupt_ciphertext_fails() {
    let vault = single_key_vault();
    let err = vault.open("not-valid-base64!!").unwrap_err();
    assert!(matches!(err, CoreError::CryptoError(_)));
  }

  #[test]
  fn open_tolerates_rotated_key_generation() {
    let old_key = VaultKey::from_passphrase(1, "old-key");
    let sealed = AesGcmVault::new(VaultKeySet::new(vec![VaultKey::from_passphrase(1, "old-key")]))
      .seal("secret")
      .unwrap();
    drop(old_key);

    let rotated = AesGcmVault::new(VaultKeySet::new(vec![
      VaultKey::from_passphrase(1, "old-key"),
      VaultKey::from_passphrase(2, "new-key"),
    ]));
    assert_eq!(rotated.open(&sealed).unwrap(), "secret");
    assert_ne!(rotated.seal("secret").unwrap(), sealed);
  }
}
