//! Error taxonomy for the security engines.
//!
//! Verification failures are split into two severities the caller must keep
//! apart: **fatal** outcomes mean the data is malformed or actively hostile
//! (malformed structure, spoofed source address, signature mismatch) and is
//! reported as a hard validation failure; **ignorable** outcomes mean the
//! data was valid but is not yet actionable (sender not trusted enough,
//! content not yet fetched, stale sequence number) and the packet is simply
//! dropped without alarm. Nothing here ever propagates as a panic.

use filament_core::GlobalId;
use filament_crypto::CryptoError;
use filament_wire::WireError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SecError>;

/// Whether a failed verification is a hard protocol violation or merely a
/// not-yet-actionable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Ignorable,
}

/// Errors raised by the trust and authentication core.
#[derive(Debug, Error)]
pub enum SecError {
    /// Structurally invalid binary data. Always fatal to the parse.
    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },

    /// Valid structure but outside the configured strength/type window.
    /// Non-fatal so a renegotiated form can be accepted later.
    #[error("unsupported {what}")]
    Unsupported { what: &'static str },

    /// References content not yet locally available; a corrective fetch is
    /// expected to resolve this.
    #[error("unresolved content for {id}")]
    Unresolved { id: GlobalId },

    /// The sender or content has not reached the required certification
    /// level yet.
    #[error("insufficient trust: {0}")]
    TrustInsufficient(&'static str),

    /// Packet source address not covered by the sender's description.
    #[error("spoofing indicator: {0}")]
    Spoofed(&'static str),

    /// Signature or key-consistency failure.
    #[error("integrity failure: {0}")]
    Integrity(&'static str),

    /// Stale sequence number.
    #[error("replayed or outdated sequence: {0}")]
    Replay(&'static str),

    /// A bounded table (links) is full; retry after churn.
    #[error("exhausted: {0}")]
    Exhausted(&'static str),

    /// A hard invariant of the slot arena was violated.
    #[error("invariant violation: {0}")]
    Invariant(&'static str),

    #[error("key lifecycle: {0}")]
    KeyLifecycle(String),

    #[error("configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl SecError {
    pub fn severity(&self) -> Severity {
        match self {
            SecError::Unsupported { .. }
            | SecError::Unresolved { .. }
            | SecError::TrustInsufficient(_)
            | SecError::Replay(_)
            | SecError::Exhausted(_) => Severity::Ignorable,

            SecError::Malformed { .. }
            | SecError::Spoofed(_)
            | SecError::Integrity(_)
            | SecError::Invariant(_)
            | SecError::KeyLifecycle(_)
            | SecError::Config(_)
            | SecError::Wire(_)
            | SecError::Crypto(_)
            | SecError::Io(_) => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    pub(crate) fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        SecError::Malformed {
            what,
            detail: detail.into(),
        }
    }
}
