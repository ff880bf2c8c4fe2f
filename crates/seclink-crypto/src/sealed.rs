//! Sealed-box encryption for single envelopes.
//!
//! Each message is sealed to the recipient's static X25519 public key with a
//! fresh ephemeral key: X25519 ECDH, then HKDF-SHA256 keyed by a random
//! 24-byte envelope nonce, then ChaCha20Poly1305. The ephemeral public key
//! and nonce ride along in the box, so one `SealedBox` is self-contained and
//! consumed exactly once by the matching private key.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};

use crate::keys::{KeyPair, PUBLIC_KEY_LEN};
use crate::CryptoError;

/// Length of the per-envelope random nonce used as the HKDF salt.
pub const NONCE_LEN: usize = 24;

/// Fixed ciphertext overhead: ephemeral public key + nonce + AEAD tag.
pub const SEAL_OVERHEAD: usize = PUBLIC_KEY_LEN + NONCE_LEN + 16;

const AAD: &[u8] = b"seclink_env_v1";

/// One sealed message. Produced by [`seal`], opened by [`open`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedBox {
    pub ephemeral_pub: Vec<u8>,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

fn kdf_key_nonce(shared_secret: &[u8; 32], salt: &[u8]) -> ([u8; 32], [u8; 12]) {
    let hk = Hkdf::<Sha256>::new(Some(salt), shared_secret);

    let mut key = [0u8; 32];
    hk.expand(b"seclink_env_key", &mut key).unwrap(); // Output size matches digest size, infallible

    let mut nonce = [0u8; 12];
    hk.expand(b"seclink_env_nonce", &mut nonce).unwrap(); // Output size < digest size, infallible

    (key, nonce)
}

fn x25519_pub_from_bytes(b: &[u8]) -> Result<X25519PublicKey, CryptoError> {
    let arr: [u8; 32] = b.try_into().map_err(|_| CryptoError::InvalidKeyBytes)?;
    Ok(X25519PublicKey::from(arr))
}

/// Seal `plaintext` to `recipient_pub`.
pub fn seal(plaintext: &[u8], recipient_pub: &[u8]) -> Result<SealedBox, CryptoError> {
    let recip_pub = x25519_pub_from_bytes(recipient_pub)?;

    let mut nonce24 = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce24).map_err(|_| CryptoError::EncryptFailed)?;

    let eph = EphemeralSecret::random_from_rng(OsRng);
    let eph_pub = X25519PublicKey::from(&eph);
    let shared = eph.diffie_hellman(&recip_pub);

    let (key32, nonce12) = kdf_key_nonce(&shared.to_bytes(), &nonce24);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key32));
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce12),
            Payload {
                msg: plaintext,
                aad: AAD,
            },
        )
        .map_err(|_| CryptoError::EncryptFailed)?;

    Ok(SealedBox {
        ephemeral_pub: eph_pub.as_bytes().to_vec(),
        nonce: nonce24.to_vec(),
        ciphertext,
    })
}

/// Open a sealed box with the recipient's key pair.
pub fn open(sealed: &SealedBox, keys: &KeyPair) -> Result<Vec<u8>, CryptoError> {
    let eph_pub = x25519_pub_from_bytes(&sealed.ephemeral_pub)?;
    if sealed.nonce.len() != NONCE_LEN {
        return Err(CryptoError::DecryptFailed);
    }

    let shared = keys.secret().diffie_hellman(&eph_pub);
    let (key32, nonce12) = kdf_key_nonce(&shared.to_bytes(), &sealed.nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key32));
    cipher
        .decrypt(
            Nonce::from_slice(&nonce12),
            Payload {
                msg: &sealed.ciphertext,
                aad: AAD,
            },
        )
        .map_err(|_| CryptoError::DecryptFailed)
}
