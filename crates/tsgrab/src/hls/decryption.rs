// HLS Decryption: encryption descriptor, key retrieval and AES-128 segment decryption.

use std::collections::HashMap;
use std::sync::Arc;

use aes::Aes128;
use bytes::Bytes;
use cbc::cipher::{BlockDecryptMut, KeyIvInit, block_padding::NoPadding};
use reqwest::header::HeaderMap;
use tracing::{debug, warn};
use url::Url;

use crate::hls::HlsError;
use crate::retry::RetryPolicy;
use crate::transport::Transport;

/// AES block size, also the IV and AES-128 key length.
pub const BLOCK_SIZE: usize = 16;

/// First byte of every MPEG transport stream packet.
pub const TS_SYNC_BYTE: u8 = 0x47;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionMethod {
    /// No encryption directive seen
    #[default]
    Unset,
    /// `METHOD=NONE`
    None,
    /// `METHOD=AES-128`, whole-segment AES-128-CBC
    Aes128,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncryptionDescriptor {
    pub method: EncryptionMethod,
    pub key_uri: Option<String>,
    pub iv: Option<[u8; BLOCK_SIZE]>,
    /// Raw key bytes, filled in once the key URI has been fetched
    pub key: Option<Bytes>,
}

impl EncryptionDescriptor {
    /// Builds a descriptor from the attributes of an `#EXT-X-KEY` directive.
    pub fn from_attributes(attributes: &HashMap<String, String>) -> Result<Self, HlsError> {
        let method = attributes.get("METHOD").map(String::as_str).unwrap_or("");
        match method {
            "NONE" => Ok(Self {
                method: EncryptionMethod::None,
                ..Default::default()
            }),
            "AES-128" => {
                let key_uri = attributes
                    .get("URI")
                    .filter(|uri| !uri.is_empty())
                    .cloned()
                    .ok_or_else(|| {
                        HlsError::Parse("AES-128 encryption directive without URI".to_string())
                    })?;
                let iv = attributes.get("IV").map(|iv| parse_iv(iv)).transpose()?;
                Ok(Self {
                    method: EncryptionMethod::Aes128,
                    key_uri: Some(key_uri),
                    iv,
                    key: None,
                })
            }
            other => Err(HlsError::Parse(format!(
                "Unsupported encryption method '{other}'"
            ))),
        }
    }

    /// The ready-to-use cipher, or `None` for clear content.
    pub fn cipher(&self) -> Result<Option<CipherContext>, HlsError> {
        if self.method != EncryptionMethod::Aes128 {
            return Ok(None);
        }
        let key = self.key.as_ref().ok_or_else(|| {
            HlsError::KeyFetch("Decryption key has not been fetched".to_string())
        })?;
        let key: [u8; BLOCK_SIZE] = key.as_ref().try_into().map_err(|_| {
            HlsError::KeyFetch(format!(
                "Decryption key has incorrect length: {} bytes (expected {BLOCK_SIZE})",
                key.len()
            ))
        })?;
        Ok(Some(CipherContext { key, iv: self.iv }))
    }
}

/// Key and IV needed to decrypt the segments of one playlist.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherContext {
    pub key: [u8; BLOCK_SIZE],
    /// Explicit IV from the playlist; derived from the sequence number when absent
    pub iv: Option<[u8; BLOCK_SIZE]>,
}

impl std::fmt::Debug for CipherContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherContext")
            .field("key", &"<redacted>")
            .field("iv", &self.iv.map(hex::encode))
            .finish()
    }
}

impl CipherContext {
    pub fn iv_for(&self, sequence: u64) -> [u8; BLOCK_SIZE] {
        self.iv
            .unwrap_or_else(|| (sequence as u128).to_be_bytes())
    }

    /// Decrypts a segment and drops any bytes before the first sync byte.
    pub fn decrypt_segment(&self, data: &[u8], sequence: u64) -> Result<Bytes, HlsError> {
        let plaintext = decrypt(data, &self.key, &self.iv_for(sequence))?;
        let aligned = realign_to_sync_byte(&plaintext);
        if aligned.len() != plaintext.len() {
            debug!(
                dropped = plaintext.len() - aligned.len(),
                "Discarded bytes before the first sync byte"
            );
        }
        Ok(Bytes::copy_from_slice(aligned))
    }
}

/// Decodes a hex IV, with or without a `0x` prefix, into exactly 16 bytes.
pub fn parse_iv(iv_hex_str: &str) -> Result<[u8; BLOCK_SIZE], HlsError> {
    let trimmed = iv_hex_str.trim();
    let iv_str = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let mut iv_bytes = [0u8; BLOCK_SIZE];
    hex::decode_to_slice(iv_str, &mut iv_bytes)
        .map_err(|e| HlsError::IvDecode(format!("Failed to parse IV '{iv_hex_str}': {e}")))?;
    Ok(iv_bytes)
}

/// AES-CBC decryption with lenient padding removal.
///
/// The last plaintext byte is read as the padding length and that many bytes
/// are trimmed. The padding bytes themselves are not checked, so a malformed
/// pad truncates the output by the wrong amount instead of failing.
pub fn decrypt(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, HlsError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(HlsError::Decrypt(format!(
            "Ciphertext length {} is not a positive multiple of the block size",
            ciphertext.len()
        )));
    }

    let cipher = Aes128CbcDec::new_from_slices(key, iv).map_err(|e| {
        HlsError::Decrypt(format!("Failed to initialize AES decryptor: {e}"))
    })?;

    let mut buffer = ciphertext.to_vec();
    let decrypted_len = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|e| HlsError::Decrypt(format!("Decryption failed: {e}")))?
        .len();
    buffer.truncate(decrypted_len);

    let padding = buffer.last().copied().unwrap_or(0) as usize;
    if padding == 0 || padding > BLOCK_SIZE {
        warn!(padding, "Unexpected padding length in decrypted segment");
    }
    buffer.truncate(decrypted_len.saturating_sub(padding));
    Ok(buffer)
}

/// Returns `data` starting at the first sync byte, or unchanged if there is none.
pub fn realign_to_sync_byte(data: &[u8]) -> &[u8] {
    match data.iter().position(|&b| b == TS_SYNC_BYTE) {
        Some(start) => &data[start..],
        None => data,
    }
}

/// Fetches raw key bytes. Failure is fatal for the run.
pub struct KeyFetcher {
    transport: Arc<dyn Transport>,
    retry_policy: RetryPolicy,
}

impl KeyFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            retry_policy: crate::hls::HlsConfig::default().key_retry_policy(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub async fn fetch_key(&self, key_url: &Url, headers: &HeaderMap) -> Result<Bytes, HlsError> {
        let key = self
            .retry_policy
            .run(|attempt| async move {
                self.transport.fetch(key_url, headers).await.inspect_err(|e| {
                    warn!(url = %key_url, attempt, error = %e, "Key request failed");
                })
            })
            .await
            .map_err(|e| {
                HlsError::KeyFetch(format!("Failed to fetch key from {key_url}: {e}"))
            })?;

        if key.len() != BLOCK_SIZE {
            return Err(HlsError::KeyFetch(format!(
                "Fetched decryption key from {key_url} has incorrect length: {} bytes (expected {BLOCK_SIZE})",
                key.len()
            )));
        }
        debug!(url = %key_url, "Decryption key fetched");
        Ok(key)
    }
}
