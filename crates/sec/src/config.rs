//! Configuration surface of the security core.

use crate::error::SecError;
use filament_crypto::KeyAlgorithm;
use std::path::PathBuf;

/// Default maximum description-signature strength accepted (key bits).
pub const DEF_DESC_VERIFY_MAX: u32 = 4096;
/// Default minimum packet-signature strength accepted (key bits).
pub const DEF_PACKET_VERIFY_MIN: u32 = 256;
/// Default maximum packet-signature strength accepted (key bits).
pub const DEF_PACKET_VERIFY_MAX: u32 = 4096;
/// Default packet-signing strength (key bits); 0 disables packet signing.
pub const DEF_PACKET_SIGN: u32 = 256;
/// Default ephemeral packet-key lifetime in seconds (one day).
pub const DEF_PACKET_SIGN_LT: u32 = 86_400;
/// Shortest configurable non-zero packet-key lifetime.
pub const MIN_PACKET_SIGN_LT: u32 = 60;
/// Longest configurable packet-key lifetime (356 days).
pub const MAX_PACKET_SIGN_LT: u32 = 30_758_400;
/// Default bound on concurrently admitted neighbors.
pub const DEF_MAX_NEIGHBORS: u16 = 64;
/// Hard ceiling on the neighbor bound.
pub const MAX_MAX_NEIGHBORS: u16 = 1024;
/// Poll interval for trust directories without native change notification.
pub const DEF_TRUST_DIR_POLL_MS: u64 = 5_000;

/// Static configuration of the trust and authentication core.
///
/// Validated once at startup; engines treat the contained values as
/// contracts (an out-of-window signature strength is *unsupported*, not an
/// error in the configuration).
#[derive(Debug, Clone)]
pub struct SecConfig {
    /// Path to the persisted long-term identity key.
    pub key_path: PathBuf,
    /// Algorithm used when creating a fresh identity key.
    pub key_algorithm: KeyAlgorithm,

    /// Maximum accepted description-signature strength, key bits.
    pub desc_verify_max_bits: u32,
    /// Acceptance window for packet-signature strength, key bits.
    pub packet_verify_min_bits: u32,
    pub packet_verify_max_bits: u32,

    /// Packet-signing strength in key bits; 0 disables packet signing.
    pub packet_sign_bits: u32,
    /// Ephemeral packet-key lifetime in seconds; 0 = unbounded.
    pub packet_sign_lifetime_secs: u32,

    /// Compatibility version this node speaks.
    pub comp_version: u8,
    /// Accept descriptions one compatibility version away.
    pub tolerant_versions: bool,

    /// Directory of trusted node identities (hex file names).
    pub trusted_dir: Option<PathBuf>,
    /// Directory of supported node identities (hex file names).
    pub supported_dir: Option<PathBuf>,

    /// Bound on concurrently admitted neighbors (slot table size).
    pub max_neighbors: u16,
    /// Bound on tracked links.
    pub max_links: usize,
}

impl Default for SecConfig {
    fn default() -> Self {
        SecConfig {
            key_path: PathBuf::from("/etc/filament/node.key"),
            key_algorithm: KeyAlgorithm::Ed25519,
            desc_verify_max_bits: DEF_DESC_VERIFY_MAX,
            packet_verify_min_bits: DEF_PACKET_VERIFY_MIN,
            packet_verify_max_bits: DEF_PACKET_VERIFY_MAX,
            packet_sign_bits: DEF_PACKET_SIGN,
            packet_sign_lifetime_secs: DEF_PACKET_SIGN_LT,
            comp_version: 1,
            tolerant_versions: false,
            trusted_dir: None,
            supported_dir: None,
            max_neighbors: DEF_MAX_NEIGHBORS,
            max_links: 4 * DEF_MAX_NEIGHBORS as usize,
        }
    }
}

impl SecConfig {
    /// Validates value ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), SecError> {
        if self.packet_sign_bits != 0 && KeyAlgorithm::by_strength(self.packet_sign_bits).is_none()
        {
            return Err(SecError::Config(format!(
                "packet signing strength {} matches no known algorithm",
                self.packet_sign_bits
            )));
        }
        if self.packet_verify_min_bits > self.packet_verify_max_bits {
            return Err(SecError::Config(format!(
                "packet verify window inverted: min {} > max {}",
                self.packet_verify_min_bits, self.packet_verify_max_bits
            )));
        }
        let lt = self.packet_sign_lifetime_secs;
        if lt != 0 && !(MIN_PACKET_SIGN_LT..=MAX_PACKET_SIGN_LT).contains(&lt) {
            return Err(SecError::Config(format!(
                "packet key lifetime {} outside [{}, {}]",
                lt, MIN_PACKET_SIGN_LT, MAX_PACKET_SIGN_LT
            )));
        }
        if self.max_neighbors == 0 || self.max_neighbors > MAX_MAX_NEIGHBORS {
            return Err(SecError::Config(format!(
                "max neighbors {} outside [1, {}]",
                self.max_neighbors, MAX_MAX_NEIGHBORS
            )));
        }
        Ok(())
    }

    /// Whether a packet-signature strength is inside the acceptance window.
    pub fn packet_strength_acceptable(&self, bits: u32) -> bool {
        bits >= self.packet_verify_min_bits && bits <= self.packet_verify_max_bits
    }

    /// Whether a compatibility version is acceptable here.
    pub fn version_acceptable(&self, comp_version: u8) -> bool {
        let tolerance = if self.tolerant_versions { 1 } else { 0 };
        let lo = self.comp_version.saturating_sub(tolerance);
        let hi = self.comp_version.saturating_add(tolerance);
        (lo..=hi).contains(&comp_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SecConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_signing_strength() {
        let cfg = SecConfig {
            packet_sign_bits: 896,
            ..SecConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(SecError::Config(_))));
    }

    #[test]
    fn test_rejects_inverted_verify_window() {
        let cfg = SecConfig {
            packet_verify_min_bits: 512,
            packet_verify_max_bits: 256,
            ..SecConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_lifetime() {
        let cfg = SecConfig {
            packet_sign_lifetime_secs: 10,
            ..SecConfig::default()
        };
        assert!(cfg.validate().is_err());

        let unbounded = SecConfig {
            packet_sign_lifetime_secs: 0,
            ..SecConfig::default()
        };
        assert!(unbounded.validate().is_ok());
    }

    #[test]
    fn test_version_window() {
        let strict = SecConfig::default();
        assert!(strict.version_acceptable(1));
        assert!(!strict.version_acceptable(2));

        let tolerant = SecConfig {
            comp_version: 2,
            tolerant_versions: true,
            ..SecConfig::default()
        };
        assert!(tolerant.version_acceptable(1));
        assert!(tolerant.version_acceptable(3));
        assert!(!tolerant.version_acceptable(4));
    }
}
