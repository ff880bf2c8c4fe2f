//! Static key pairs for channel endpoints.
//!
//! Each party generates one pair per process lifetime. The private half
//! never leaves the owning process; the 32-byte public half is the only
//! key material ever put on the wire.

use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::CryptoError;

/// Length of an exported public key in bytes (raw X25519 encoding).
pub const PUBLIC_KEY_LEN: usize = 32;

/// A static X25519 key pair. Immutable once generated; the secret half is
/// zeroized on drop.
pub struct KeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl KeyPair {
    /// Generate a fresh pair from the OS RNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).map_err(|_| CryptoError::KeyGeneration)?;
        let secret = StaticSecret::from(seed);
        seed.zeroize();
        let public = X25519PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    /// Export the public key in its standard raw encoding.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.public.to_bytes()
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}
