//! Per-line encryption for persisted content.
//!
//! AES-256-GCM with a key derived as SHA-256 of the configured key string.
//! An encrypted line is stored as [`ENCRYPTED_PREFIX`] followed by the
//! lowercase hex of `nonce || ciphertext`.

use std::fmt::Write as _;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use sha2::{Digest, Sha256};

use crate::core::errors::{DlgError, Result};

/// Marker prepended to encrypted lines on disk.
pub const ENCRYPTED_PREFIX: &str = "~enc:";

const NONCE_LEN: usize = 12;

/// Cipher bound to one key.
#[derive(Clone)]
pub struct LineCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for LineCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LineCipher(..)")
    }
}

impl LineCipher {
    /// `None` when the key is empty: encryption is then unavailable.
    pub fn from_key(key: &str) -> Option<Self> {
        if key.is_empty() {
            return None;
        }
        let digest = Sha256::digest(key.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&digest).ok()?;
        Some(Self { cipher })
    }

    /// Encrypt one line into its on-disk form.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| DlgError::Cipher {
                details: format!("encrypt: {e}"),
            })?;

        let mut out =
            String::with_capacity(ENCRYPTED_PREFIX.len() + 2 * (NONCE_LEN + ciphertext.len()));
        out.push_str(ENCRYPTED_PREFIX);
        for b in nonce.iter().chain(ciphertext.iter()) {
            let _ = write!(out, "{b:02x}");
        }
        Ok(out)
    }

    /// Decrypt a line previously produced by [`LineCipher::seal`].
    pub fn open(&self, stored: &str) -> Result<String> {
        let hex = stored
            .strip_prefix(ENCRYPTED_PREFIX)
            .ok_or_else(|| DlgError::Cipher {
                details: "missing encrypted-line marker".to_string(),
            })?;
        let bytes = decode_hex(hex)?;
        if bytes.len() <= NONCE_LEN {
            return Err(DlgError::Cipher {
                details: "encrypted line too short".to_string(),
            });
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| DlgError::Cipher {
                details: format!("decrypt: {e}"),
            })?;
        String::from_utf8(plaintext).map_err(|e| DlgError::Cipher {
            details: format!("decrypted line is not utf-8: {e}"),
        })
    }
}

/// Render `content` for disk, encrypting it when requested and possible.
///
/// Without a cipher the line is stored in clear; its own encryption flag
/// still records that encryption was requested.
pub fn encode_for_disk(cipher: Option<&LineCipher>, content: &str, encrypt: bool) -> Result<String> {
    match (encrypt, cipher) {
        (true, Some(cipher)) => cipher.seal(content),
        _ => Ok(content.to_string()),
    }
}

/// Whether a stored line is in encrypted form.
#[must_use]
pub fn is_encrypted(stored: &str) -> bool {
    stored.starts_with(ENCRYPTED_PREFIX)
}

fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(DlgError::Cipher {
            details: "odd hex length".to_string(),
        });
    }
    hex.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let digits = std::str::from_utf8(pair).unwrap_or("zz");
            u8::from_str_radix(digits, 16).map_err(|e| DlgError::Cipher {
                details: format!("bad hex {digits:?}: {e}"),
            })
        })
        .collect()
}
