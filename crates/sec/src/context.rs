//! The explicitly owned security state of one node.
//!
//! The original daemon kept its identity key, packet key, and republish
//! flag in global mutable singletons; here they live in one
//! [`SecurityContext`] built at startup and passed by reference into every
//! engine call. All mutation happens from the single-threaded event loop.

use crate::config::SecConfig;
use crate::error::SecError;
use filament_core::GlobalId;
use filament_crypto::{keyfile, KeyMaterial};

/// Timer identities the security core schedules on the daemon loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecTask {
    /// Ephemeral packet key has reached its renewal point.
    PacketKeyRenewal,
    /// Re-scan the trusted-identities directory.
    RescanTrusted,
    /// Re-scan the supported-identities directory.
    RescanSupported,
}

/// Owned security state: configuration, the long-term identity key, and
/// the current ephemeral packet-signing key.
pub struct SecurityContext {
    pub config: SecConfig,
    identity: KeyMaterial,
    pub(crate) packet_key: Option<KeyMaterial>,
    /// Lifetime drawn for the live packet key (may be shorter than the
    /// configured one for the first key of the process).
    pub(crate) packet_key_lifetime: u32,
    pub(crate) first_packet_key_issued: bool,
    description_dirty: bool,
}

impl SecurityContext {
    /// Builds the context at daemon startup. Loads (or creates) the
    /// identity key from `config.key_path`; any key-file or self-test
    /// failure is fatal, the daemon cannot run without a valid identity.
    pub fn new(config: SecConfig) -> Result<Self, SecError> {
        config.validate()?;
        let identity = keyfile::load_or_create(&config.key_path, config.key_algorithm)
            .map_err(|e| SecError::KeyLifecycle(e.to_string()))?;
        Ok(Self::from_parts(config, identity))
    }

    /// Builds a context around already-validated parts. Used by tests and
    /// embedders that manage key storage themselves.
    pub fn from_parts(config: SecConfig, identity: KeyMaterial) -> Self {
        SecurityContext {
            config,
            identity,
            packet_key: None,
            packet_key_lifetime: 0,
            first_packet_key_issued: false,
            description_dirty: true,
        }
    }

    /// The long-term identity key. Never used for packet signatures.
    pub fn identity(&self) -> &KeyMaterial {
        &self.identity
    }

    /// This node's permanent identity.
    pub fn global_id(&self) -> GlobalId {
        self.identity.global_id()
    }

    /// The live ephemeral packet-signing key, if packet signing is enabled
    /// and a key has been generated.
    pub fn packet_key(&self) -> Option<&KeyMaterial> {
        self.packet_key.as_ref()
    }

    /// Raise the "description must be republished" flag.
    pub fn mark_description_dirty(&mut self) {
        self.description_dirty = true;
    }

    pub fn description_dirty(&self) -> bool {
        self.description_dirty
    }

    /// Consumes the republish flag; the caller is about to rebuild and
    /// flood the description.
    pub fn take_description_dirty(&mut self) -> bool {
        std::mem::take(&mut self.description_dirty)
    }
}
