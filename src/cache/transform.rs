//! Transform Pipeline Module
//!
//! Pluggable value transforms applied on write and reversed on read.
//! Write order is compress then encrypt; read order is decrypt then decompress.

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use rand::RngCore;
use serde::Serialize;
use tracing::info;

use crate::cache::KeyClassPolicy;
use crate::error::TransformError;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length in bytes
const TAG_LEN: usize = 16;

// == Transform Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    Compress,
    Encrypt,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformKind::Compress => f.write_str("compress"),
            TransformKind::Encrypt => f.write_str("encrypt"),
        }
    }
}

// == Applied Transforms ==
/// Marker stored with each entry recording which transforms its bytes went
/// through, so reads can invert exactly those.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppliedTransforms {
    pub compressed: bool,
    pub encrypted: bool,
}

// == Transform Trait ==
/// A reversible byte transform.
pub trait Transform: Send + Sync + fmt::Debug {
    fn kind(&self) -> TransformKind;

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>, TransformError>;

    fn decode(&self, input: &[u8]) -> Result<Vec<u8>, TransformError>;
}

// == Gzip ==
/// Gzip compression backed by flate2.
#[derive(Debug, Clone)]
pub struct GzipTransform {
    level: u32,
}

impl GzipTransform {
    /// Creates a gzip transform; levels above 9 are clamped.
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Transform for GzipTransform {
    fn kind(&self) -> TransformKind {
        TransformKind::Compress
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>, TransformError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(input)
            .map_err(|e| TransformError::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| TransformError::Compression(e.to_string()))
    }

    fn decode(&self, input: &[u8]) -> Result<Vec<u8>, TransformError> {
        let mut decoder = GzDecoder::new(input);
        let mut output = Vec::new();
        decoder
            .read_to_end(&mut output)
            .map_err(|e| TransformError::Decompression(e.to_string()))?;
        Ok(output)
    }
}

// == AES-256-GCM ==
/// Authenticated encryption with a random nonce prepended to each ciphertext.
pub struct AesGcmTransform {
    cipher: Aes256Gcm,
}

impl AesGcmTransform {
    pub fn new(key: &[u8; 32]) -> Result<Self, TransformError> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| TransformError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Creates a transform with a freshly generated key. Entries written with
    /// it are unreadable after a restart, which is fine for a non-durable cache.
    pub fn with_random_key() -> Result<Self, TransformError> {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        Self::new(&key)
    }
}

impl fmt::Debug for AesGcmTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmTransform").finish_non_exhaustive()
    }
}

impl Transform for AesGcmTransform {
    fn kind(&self) -> TransformKind {
        TransformKind::Encrypt
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>, TransformError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), input)
            .map_err(|e| TransformError::Encryption(e.to_string()))?;

        let mut output = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        output.extend_from_slice(&nonce);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decode(&self, input: &[u8]) -> Result<Vec<u8>, TransformError> {
        if input.len() < NONCE_LEN + TAG_LEN {
            return Err(TransformError::Decryption(format!(
                "ciphertext too short: {} bytes",
                input.len()
            )));
        }
        let (nonce, ciphertext) = input.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| TransformError::Decryption(e.to_string()))
    }
}

// == Transform Pipeline ==
/// Ordered composition of the installed transforms.
///
/// Either slot may be empty. A policy asking for a transform whose slot is
/// empty fails with [`TransformError::Unavailable`].
#[derive(Debug, Clone, Default)]
pub struct TransformPipeline {
    compressor: Option<Arc<dyn Transform>>,
    encryptor: Option<Arc<dyn Transform>>,
}

impl TransformPipeline {
    /// Creates a pipeline with no transforms installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the gzip + AES-GCM pipeline. Without a key a random one is
    /// generated for this process.
    pub fn standard(compression_level: u32, key: Option<[u8; 32]>) -> Result<Self, TransformError> {
        let encryptor = match key {
            Some(key) => AesGcmTransform::new(&key)?,
            None => {
                info!("No encryption key configured, generated an ephemeral key");
                AesGcmTransform::with_random_key()?
            }
        };
        Ok(Self::new()
            .with_compressor(GzipTransform::new(compression_level))
            .with_encryptor(encryptor))
    }

    pub fn with_compressor(mut self, transform: impl Transform + 'static) -> Self {
        self.compressor = Some(Arc::new(transform));
        self
    }

    pub fn with_encryptor(mut self, transform: impl Transform + 'static) -> Self {
        self.encryptor = Some(Arc::new(transform));
        self
    }

    /// Applies the transforms the policy asks for, compress first.
    pub fn encode(
        &self,
        data: Vec<u8>,
        policy: &KeyClassPolicy,
    ) -> Result<(Vec<u8>, AppliedTransforms), TransformError> {
        let mut applied = AppliedTransforms::default();
        let mut bytes = data;

        if policy.compress {
            bytes = require(&self.compressor, TransformKind::Compress)?.encode(&bytes)?;
            applied.compressed = true;
        }
        if policy.encrypt {
            bytes = require(&self.encryptor, TransformKind::Encrypt)?.encode(&bytes)?;
            applied.encrypted = true;
        }

        Ok((bytes, applied))
    }

    /// Inverts the transforms recorded in `applied`, decrypt first.
    pub fn decode(&self, data: &[u8], applied: AppliedTransforms) -> Result<Vec<u8>, TransformError> {
        let mut bytes = data.to_vec();

        if applied.encrypted {
            bytes = require(&self.encryptor, TransformKind::Encrypt)?.decode(&bytes)?;
        }
        if applied.compressed {
            bytes = require(&self.compressor, TransformKind::Compress)?.decode(&bytes)?;
        }

        Ok(bytes)
    }
}

fn require(
    slot: &Option<Arc<dyn Transform>>,
    kind: TransformKind,
) -> Result<&Arc<dyn Transform>, TransformError> {
    slot.as_ref().ok_or(TransformError::Unavailable(kind))
}
