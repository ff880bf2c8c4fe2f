#![forbid(unsafe_code)]

pub mod keys;
pub mod sealed;

pub use keys::{KeyPair, PUBLIC_KEY_LEN};
pub use sealed::{open, seal, SealedBox, NONCE_LEN, SEAL_OVERHEAD};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key generation failed: os rng unavailable")]
    KeyGeneration,
    #[error("invalid public key bytes")]
    InvalidKeyBytes,
    #[error("encryption failed")]
    EncryptFailed,
    #[error("decryption failed")]
    DecryptFailed,
}

#[cfg(test)]
mod proptests;
