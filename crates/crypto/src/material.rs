//! Key material: owned signing keys with expiry tracking, and detached
//! verification keys.
//!
//! Two [`KeyMaterial`] instances exist process-wide in the daemon: the
//! long-term identity key and the current ephemeral packet-signing key.
//! The key lifecycle manager owns both; engines only ever borrow them for
//! the duration of a call.

use crate::hash::{content_id, Digest};
use crate::provider::{CryptoError, KeyAlgorithm};
use filament_core::GlobalId;
use filament_wire::PubkeyRecord;
use rand::RngCore;
use zeroize::Zeroize;

enum VerifierInner {
    Ed25519(ed25519_dalek::VerifyingKey),
    P256(p256::ecdsa::VerifyingKey),
}

/// A detached verification key parsed from wire or description bytes.
pub struct PublicKey {
    algorithm: KeyAlgorithm,
    raw: Vec<u8>,
    inner: VerifierInner,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("algorithm", &self.algorithm)
            .field("id", &self.global_id())
            .finish()
    }
}

impl PublicKey {
    /// Builds a verification key from raw bytes, failing closed on any
    /// length or point-decoding problem.
    pub fn from_raw(algorithm: KeyAlgorithm, raw: &[u8]) -> Result<Self, CryptoError> {
        if raw.len() != algorithm.key_len() {
            return Err(CryptoError::KeyLength {
                algorithm,
                got: raw.len(),
                expected: algorithm.key_len(),
            });
        }
        let inner = match algorithm {
            KeyAlgorithm::Ed25519 => {
                // Length checked above.
                let bytes: [u8; 32] = raw.try_into().unwrap();
                VerifierInner::Ed25519(ed25519_dalek::VerifyingKey::from_bytes(&bytes).map_err(
                    |e| CryptoError::InvalidKey {
                        algorithm,
                        detail: e.to_string(),
                    },
                )?)
            }
            KeyAlgorithm::EcdsaP256 => VerifierInner::P256(
                p256::ecdsa::VerifyingKey::from_sec1_bytes(raw).map_err(|e| {
                    CryptoError::InvalidKey {
                        algorithm,
                        detail: e.to_string(),
                    }
                })?,
            ),
        };
        Ok(PublicKey {
            algorithm,
            raw: raw.to_vec(),
            inner,
        })
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Verifies a signature over a digest. Any structural problem with the
    /// signature bytes counts as verification failure.
    pub fn verify(&self, digest: &Digest, signature: &[u8]) -> bool {
        if signature.len() != self.algorithm.sig_len() {
            return false;
        }
        match &self.inner {
            VerifierInner::Ed25519(vk) => {
                let Ok(sig) = ed25519_dalek::Signature::from_slice(signature) else {
                    return false;
                };
                use ed25519_dalek::Verifier;
                vk.verify(digest.as_bytes(), &sig).is_ok()
            }
            VerifierInner::P256(vk) => {
                let Ok(sig) = p256::ecdsa::Signature::from_slice(signature) else {
                    return false;
                };
                use p256::ecdsa::signature::Verifier;
                vk.verify(digest.as_bytes(), &sig).is_ok()
            }
        }
    }

    /// The public-key record body this key publishes (algorithm code
    /// followed by raw key bytes).
    pub fn record_body(&self) -> Vec<u8> {
        PubkeyRecord::encode_body(self.algorithm.code(), &self.raw)
    }

    /// The node identity a key of this value hashes to.
    pub fn global_id(&self) -> GlobalId {
        content_id(&self.record_body())
    }
}

enum SignerInner {
    Ed25519(ed25519_dalek::SigningKey),
    P256(p256::ecdsa::SigningKey),
}

/// An owned signing keypair with an end-of-life timestamp.
///
/// `end_of_life == 0` means the key never expires. Secret bytes are
/// zeroized on drop by the underlying key types.
pub struct KeyMaterial {
    algorithm: KeyAlgorithm,
    signer: SignerInner,
    raw_public: Vec<u8>,
    /// Absolute expiry in daemon seconds; 0 = never.
    pub end_of_life: u64,
}

impl KeyMaterial {
    /// Rebuilds key material from a persisted 32-byte seed.
    pub fn from_seed(algorithm: KeyAlgorithm, seed: &[u8]) -> Result<Self, CryptoError> {
        if seed.len() != 32 {
            return Err(CryptoError::KeyLength {
                algorithm,
                got: seed.len(),
                expected: 32,
            });
        }
        let (signer, raw_public) = match algorithm {
            KeyAlgorithm::Ed25519 => {
                let mut bytes: [u8; 32] = seed.try_into().unwrap();
                let sk = ed25519_dalek::SigningKey::from_bytes(&bytes);
                bytes.zeroize();
                let raw = sk.verifying_key().to_bytes().to_vec();
                (SignerInner::Ed25519(sk), raw)
            }
            KeyAlgorithm::EcdsaP256 => {
                let sk =
                    p256::ecdsa::SigningKey::from_slice(seed).map_err(|e| {
                        CryptoError::InvalidKey {
                            algorithm,
                            detail: e.to_string(),
                        }
                    })?;
                // SEC1 compressed form.
                let raw = sk.verifying_key().to_encoded_point(true).as_bytes().to_vec();
                (SignerInner::P256(sk), raw)
            }
        };
        Ok(KeyMaterial {
            algorithm,
            signer,
            raw_public,
            end_of_life: 0,
        })
    }

    /// The persistable secret seed of this key.
    pub fn seed(&self) -> Vec<u8> {
        match &self.signer {
            SignerInner::Ed25519(sk) => sk.to_bytes().to_vec(),
            SignerInner::P256(sk) => sk.to_bytes().to_vec(),
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn raw_public(&self) -> &[u8] {
        &self.raw_public
    }

    /// Signs a digest, producing `algorithm().sig_len()` bytes.
    pub fn sign(&self, digest: &Digest) -> Vec<u8> {
        match &self.signer {
            SignerInner::Ed25519(sk) => {
                use ed25519_dalek::Signer;
                sk.sign(digest.as_bytes()).to_bytes().to_vec()
            }
            SignerInner::P256(sk) => {
                use p256::ecdsa::signature::Signer;
                let sig: p256::ecdsa::Signature = sk.sign(digest.as_bytes());
                sig.to_bytes().to_vec()
            }
        }
    }

    /// Detaches the verification half.
    pub fn public_key(&self) -> PublicKey {
        // The raw public bytes came from this keypair, so parsing them
        // back cannot fail.
        PublicKey::from_raw(self.algorithm, &self.raw_public)
            .expect("own public key must parse")
    }

    /// The public-key record body this key publishes.
    pub fn record_body(&self) -> Vec<u8> {
        PubkeyRecord::encode_body(self.algorithm.code(), &self.raw_public)
    }

    /// The node identity derived from this key.
    pub fn global_id(&self) -> GlobalId {
        content_id(&self.record_body())
    }
}

/// Generates fresh key material from the process CSPRNG.
pub fn generate(algorithm: KeyAlgorithm) -> KeyMaterial {
    let mut rng = rand::thread_rng();
    loop {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        let made = KeyMaterial::from_seed(algorithm, &seed);
        seed.zeroize();
        match made {
            Ok(key) => return key,
            // A P-256 scalar outside the group order; draw again.
            Err(_) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::digest;

    #[test]
    fn test_sign_verify_round_trip_all_algorithms() {
        for alg in [KeyAlgorithm::Ed25519, KeyAlgorithm::EcdsaP256] {
            let key = generate(alg);
            let d = digest(b"route advertisement");
            let sig = key.sign(&d);
            assert_eq!(sig.len(), alg.sig_len());
            assert!(key.public_key().verify(&d, &sig));
        }
    }

    #[test]
    fn test_tampered_digest_fails_verification() {
        let key = generate(KeyAlgorithm::Ed25519);
        let sig = key.sign(&digest(b"original"));
        assert!(!key.public_key().verify(&digest(b"tampered"), &sig));
    }

    #[test]
    fn test_bad_signature_length_fails() {
        let key = generate(KeyAlgorithm::Ed25519);
        let d = digest(b"payload");
        assert!(!key.public_key().verify(&d, &[0u8; 63]));
        assert!(!key.public_key().verify(&d, &[]));
    }

    #[test]
    fn test_from_raw_rejects_bad_keys() {
        assert!(PublicKey::from_raw(KeyAlgorithm::Ed25519, &[0u8; 16]).is_err());
        // 33 bytes of zero is not a valid SEC1 compressed point.
        assert!(PublicKey::from_raw(KeyAlgorithm::EcdsaP256, &[0u8; 33]).is_err());
    }

    #[test]
    fn test_seed_round_trip_preserves_identity() {
        let key = generate(KeyAlgorithm::Ed25519);
        let again = KeyMaterial::from_seed(KeyAlgorithm::Ed25519, &key.seed()).unwrap();
        assert_eq!(key.global_id(), again.global_id());
        assert_eq!(key.raw_public(), again.raw_public());
    }

    #[test]
    fn test_global_id_matches_record_body_hash() {
        let key = generate(KeyAlgorithm::EcdsaP256);
        assert_eq!(key.global_id(), content_id(&key.record_body()));
        assert_eq!(key.global_id(), key.public_key().global_id());
    }
}
