//! Signing-algorithm registry and crypto error taxonomy.

use thiserror::Error;

/// Errors from the crypto provider.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unsupported key algorithm code {0:#04x}")]
    UnsupportedAlgorithm(u8),

    #[error("invalid public key for {algorithm:?}: {detail}")]
    InvalidKey {
        algorithm: super::KeyAlgorithm,
        detail: String,
    },

    #[error("invalid key length {got} for {algorithm:?} (expected {expected})")]
    KeyLength {
        algorithm: super::KeyAlgorithm,
        got: usize,
        expected: usize,
    },

    #[error("signing failed: {0}")]
    Signing(String),
}

/// The asymmetric signing algorithms exchangeable on the wire.
///
/// Wire code 0 means "no signature" and is deliberately not part of this
/// registry; engines treat it as the absence of an algorithm. Strength is
/// expressed as raw key bits, matching how the configuration bounds
/// acceptable verification strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// Ed25519 (code 1): 32-byte keys, 64-byte signatures.
    Ed25519,
    /// ECDSA over P-256 (code 2): 33-byte compressed SEC1 keys, 64-byte
    /// fixed-size signatures.
    EcdsaP256,
}

impl KeyAlgorithm {
    pub fn code(self) -> u8 {
        match self {
            KeyAlgorithm::Ed25519 => 1,
            KeyAlgorithm::EcdsaP256 => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<KeyAlgorithm> {
        match code {
            1 => Some(KeyAlgorithm::Ed25519),
            2 => Some(KeyAlgorithm::EcdsaP256),
            _ => None,
        }
    }

    /// Raw public-key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            KeyAlgorithm::Ed25519 => 32,
            KeyAlgorithm::EcdsaP256 => 33,
        }
    }

    /// Signature length in bytes.
    pub fn sig_len(self) -> usize {
        match self {
            KeyAlgorithm::Ed25519 => 64,
            KeyAlgorithm::EcdsaP256 => 64,
        }
    }

    /// Verification strength in key bits, the unit of the configured
    /// acceptance windows.
    pub fn strength_bits(self) -> u32 {
        (self.key_len() * 8) as u32
    }

    /// Resolves a configured strength to the algorithm generating it.
    pub fn by_strength(bits: u32) -> Option<KeyAlgorithm> {
        [KeyAlgorithm::Ed25519, KeyAlgorithm::EcdsaP256]
            .into_iter()
            .find(|a| a.strength_bits() == bits)
    }

    pub fn name(self) -> &'static str {
        match self {
            KeyAlgorithm::Ed25519 => "ed25519",
            KeyAlgorithm::EcdsaP256 => "ecdsa-p256",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for alg in [KeyAlgorithm::Ed25519, KeyAlgorithm::EcdsaP256] {
            assert_eq!(KeyAlgorithm::from_code(alg.code()), Some(alg));
        }
        assert_eq!(KeyAlgorithm::from_code(0), None);
        assert_eq!(KeyAlgorithm::from_code(0x7f), None);
    }

    #[test]
    fn test_strengths_are_distinct() {
        assert_eq!(KeyAlgorithm::Ed25519.strength_bits(), 256);
        assert_eq!(KeyAlgorithm::EcdsaP256.strength_bits(), 264);
        assert_eq!(
            KeyAlgorithm::by_strength(256),
            Some(KeyAlgorithm::Ed25519)
        );
        assert_eq!(KeyAlgorithm::by_strength(512), None);
    }
}
