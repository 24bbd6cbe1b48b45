//! Wire codec for Filament security frames.
//!
//! Descriptions and packets are sequences of tag-length-value records. This
//! crate provides:
//!
//! - a bounds-checked cursor over untrusted buffers ([`TlvCursor`]) that can
//!   never read past the end regardless of attacker-supplied length fields,
//! - an append-only record writer ([`TlvWriter`]),
//! - the typed codecs for every security record the trust core produces or
//!   consumes.
//!
//! All multi-byte integers are big-endian on the wire.

pub mod cursor;
pub mod records;

pub use cursor::{TlvCursor, TlvWriter, WireError};
pub use records::{
    read_record, ContentHashRecord, FrameType, LinkAddrRecord, PacketSigHeader, PubkeyRecord,
    RawRecord, SignatureRecord, TrustRecord, VersionRecord, LINK_ADDR_LEN, PACKET_SIG_HDR_LEN,
    TLV_HDR_LEN, TRUST_RECORD_LEN, VERSION_RECORD_LEN,
};

pub type Result<T> = std::result::Result<T, WireError>;
