use notary_core::types::{DilithiumPublicKey, DilithiumSignature, NymId};
use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::hash::nym_id_from_pubkey;

/// A Dilithium2 keypair with its derived NymId.
///
/// The secret key is held as plain bytes but zeroized on drop; callers that
/// need it off the heap for longer should wrap access in `Zeroizing`
/// themselves, as `sign` does internally.
#[derive(Serialize, Deserialize)]
pub struct KeyPair {
    pub nym_id: NymId,
    pub public_key: DilithiumPublicKey,
    secret_key: Vec<u8>,
}

impl KeyPair {
    /// Generate a fresh Dilithium2 keypair.
    pub fn generate() -> Self {
        let (pk, sk) = dilithium2::keypair();
        let pk_bytes = pk.as_bytes().to_vec();
        let nym_id = nym_id_from_pubkey(&pk_bytes);
        Self {
            nym_id,
            public_key: DilithiumPublicKey(pk_bytes),
            secret_key: sk.as_bytes().to_vec(),
        }
    }

    /// Sign `message` using this keypair's secret key.
    pub fn sign(&self, message: &[u8]) -> DilithiumSignature {
        let sk = Zeroizing::new(self.secret_key.clone());
        crate::dilithium::sign(&sk, message).expect("sign with valid secret key is infallible")
    }

    /// Return a read-only view of the secret key bytes.
    pub fn secret_key_bytes(&self) -> &[u8] {
        &self.secret_key
    }

    /// Restore a KeyPair from raw bytes (e.g. loaded from a wallet file).
    pub fn from_raw(pk_bytes: Vec<u8>, sk_bytes: Vec<u8>) -> Self {
        let nym_id = nym_id_from_pubkey(&pk_bytes);
        Self {
            nym_id,
            public_key: DilithiumPublicKey(pk_bytes),
            secret_key: sk_bytes,
        }
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ nym_id: {:?} }}", self.nym_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keypair_signs_and_verifies() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"hello notary");
        assert!(crate::dilithium::verify_signature(&kp.public_key, b"hello notary", &sig).is_ok());
    }

    #[test]
    fn nym_id_is_derived_from_public_key() {
        let kp = KeyPair::generate();
        assert_eq!(kp.nym_id, nym_id_from_pubkey(&kp.public_key.0));
    }
}
