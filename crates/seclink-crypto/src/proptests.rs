
#[cfg(test)]
mod tests {
    use crate::keys::KeyPair;
    use crate::sealed::{open, seal, SEAL_OVERHEAD};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn seal_open_round_trip(plaintext in prop::collection::vec(any::<u8>(), 0..4096)) {
            let kp = KeyPair::generate().unwrap();
            let sealed = seal(&plaintext, &kp.public_key_bytes()).unwrap();
            let opened = open(&sealed, &kp).unwrap();
            prop_assert_eq!(opened, plaintext);
        }

        #[test]
        fn ciphertext_length_is_plaintext_plus_overhead(len in 0usize..4096) {
            let kp = KeyPair::generate().unwrap();
            let sealed = seal(&vec![0u8; len], &kp.public_key_bytes()).unwrap();
            let total = sealed.ephemeral_pub.len() + sealed.nonce.len() + sealed.ciphertext.len();
            prop_assert_eq!(total, len + SEAL_OVERHEAD);
        }

        #[test]
        fn flipped_ciphertext_bit_never_opens(
            plaintext in prop::collection::vec(any::<u8>(), 1..256),
            byte_idx in any::<prop::sample::Index>(),
        ) {
            let kp = KeyPair::generate().unwrap();
            let mut sealed = seal(&plaintext, &kp.public_key_bytes()).unwrap();
            let idx = byte_idx.index(sealed.ciphertext.len());
            sealed.ciphertext[idx] ^= 0xFF;
            prop_assert!(open(&sealed, &kp).is_err());
        }
    }
}
