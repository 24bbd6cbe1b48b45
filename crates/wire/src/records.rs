//! Typed codecs for the security frame records.
//!
//! Record layouts follow the daemon's description/packet format: a common
//! 3-byte header (`type:u8, length:u16`, length covering header and body)
//! followed by the record body. Decoders take the already-extracted body
//! and validate its exact shape; iteration and length extraction happen in
//! [`read_record`].

use crate::cursor::{TlvCursor, TlvWriter, WireError};
use filament_core::{BurstSqn, DescSqn, DevIdx, GlobalId, GLOBAL_ID_LEN};

/// Size of the record header (`type` + big-endian `length`).
pub const TLV_HDR_LEN: usize = 3;

/// Body size of a [`VersionRecord`].
pub const VERSION_RECORD_LEN: usize = 7;

/// Body size of one [`TrustRecord`].
pub const TRUST_RECORD_LEN: usize = GLOBAL_ID_LEN;

/// Body size of one [`LinkAddrRecord`] (an IPv6 link-local address).
pub const LINK_ADDR_LEN: usize = 16;

/// Size of the data header inside a packet-signature frame.
pub const PACKET_SIG_HDR_LEN: usize = 10;

/// Body size of a [`ContentHashRecord`].
const CONTENT_HASH_LEN: usize = 3 + GLOBAL_ID_LEN;

/// Wire-format frame types understood by the security core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Content-hash reference naming the description's public-key record.
    ContentHash = 0x01,
    /// Description signature over everything after itself.
    Signature = 0x02,
    /// Placeholder closing the two-phase description signature encode.
    SignatureDummy = 0x03,
    /// Compatibility version and description sequence number.
    Version = 0x04,
    /// Long-term identity public key.
    Pubkey = 0x05,
    /// Ephemeral packet-signing public key.
    PktPubkey = 0x06,
    /// Identities this node trusts as forwarders.
    Trusts = 0x07,
    /// Identities this node supports (keeps reachable).
    Supports = 0x08,
    /// Link-local addresses the node sends from.
    LinkAddr = 0x09,
    /// Per-packet authentication tag.
    PacketSignature = 0x10,
}

impl FrameType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<FrameType> {
        match code {
            0x01 => Some(FrameType::ContentHash),
            0x02 => Some(FrameType::Signature),
            0x03 => Some(FrameType::SignatureDummy),
            0x04 => Some(FrameType::Version),
            0x05 => Some(FrameType::Pubkey),
            0x06 => Some(FrameType::PktPubkey),
            0x07 => Some(FrameType::Trusts),
            0x08 => Some(FrameType::Supports),
            0x09 => Some(FrameType::LinkAddr),
            0x10 => Some(FrameType::PacketSignature),
            _ => None,
        }
    }
}

/// One record as extracted from a buffer: type code, body view, and the
/// offset of its header within the parent buffer.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    pub frame_type: u8,
    pub body: &'a [u8],
    pub offset: usize,
}

/// Reads the next record off the cursor.
///
/// The declared length is validated against the remaining buffer before any
/// body byte is touched; a hostile length yields `Truncated` or
/// `BadLength`, never an overrun.
pub fn read_record<'a>(cur: &mut TlvCursor<'a>) -> Result<RawRecord<'a>, WireError> {
    let offset = cur.pos();
    let frame_type = cur.read_u8()?;
    let len = cur.read_u16()? as usize;
    if len < TLV_HDR_LEN {
        return Err(WireError::BadLength {
            what: "record header",
            len,
        });
    }
    let body = cur.take(len - TLV_HDR_LEN)?;
    Ok(RawRecord {
        frame_type,
        body,
        offset,
    })
}

/// Record 0 of every description: a content-hash reference that must name
/// exactly one nested, uncompressed public-key record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentHashRecord {
    pub gzip: bool,
    pub max_nesting: u8,
    pub expanded_type: u8,
    pub expanded_id: GlobalId,
}

impl ContentHashRecord {
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        if body.len() != CONTENT_HASH_LEN {
            return Err(WireError::BadLength {
                what: "content-hash record",
                len: body.len(),
            });
        }
        Ok(ContentHashRecord {
            gzip: body[0] & 0x01 != 0,
            max_nesting: body[1],
            expanded_type: body[2],
            // Length checked above.
            expanded_id: GlobalId::from_slice(&body[3..]).unwrap(),
        })
    }

    pub fn encode_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(CONTENT_HASH_LEN);
        body.push(self.gzip as u8);
        body.push(self.max_nesting);
        body.push(self.expanded_type);
        body.extend_from_slice(self.expanded_id.as_bytes());
        body
    }

    pub fn write(&self, w: &mut TlvWriter) -> usize {
        w.record(FrameType::ContentHash.code(), &self.encode_body())
    }
}

/// A signature record: algorithm code followed by the raw signature bytes.
///
/// The signature view borrows from the input buffer; whether its length
/// matches the declared algorithm is checked by the identity parser, which
/// knows the algorithm registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureRecord<'a> {
    pub algorithm: u8,
    pub signature: &'a [u8],
}

impl<'a> SignatureRecord<'a> {
    pub fn decode(body: &'a [u8]) -> Result<Self, WireError> {
        if body.is_empty() {
            return Err(WireError::BadLength {
                what: "signature record",
                len: 0,
            });
        }
        Ok(SignatureRecord {
            algorithm: body[0],
            signature: &body[1..],
        })
    }

    pub fn encode_body(algorithm: u8, signature: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(1 + signature.len());
        body.push(algorithm);
        body.extend_from_slice(signature);
        body
    }
}

/// Record 2 of every description: compatibility version, capability bits,
/// and the description sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRecord {
    pub comp_version: u8,
    pub capabilities: u16,
    pub desc_sqn: DescSqn,
}

impl VersionRecord {
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        if body.len() != VERSION_RECORD_LEN {
            return Err(WireError::BadLength {
                what: "version record",
                len: body.len(),
            });
        }
        let mut cur = TlvCursor::new(body);
        Ok(VersionRecord {
            comp_version: cur.read_u8()?,
            capabilities: cur.read_u16()?,
            desc_sqn: cur.read_u32()?,
        })
    }

    pub fn encode_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(VERSION_RECORD_LEN);
        body.push(self.comp_version);
        body.extend_from_slice(&self.capabilities.to_be_bytes());
        body.extend_from_slice(&self.desc_sqn.to_be_bytes());
        body
    }

    pub fn write(&self, w: &mut TlvWriter) -> usize {
        w.record(FrameType::Version.code(), &self.encode_body())
    }
}

/// A public-key record: algorithm code followed by the raw key bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PubkeyRecord<'a> {
    pub algorithm: u8,
    pub key: &'a [u8],
}

impl<'a> PubkeyRecord<'a> {
    pub fn decode(body: &'a [u8]) -> Result<Self, WireError> {
        if body.is_empty() {
            return Err(WireError::BadLength {
                what: "public-key record",
                len: 0,
            });
        }
        Ok(PubkeyRecord {
            algorithm: body[0],
            key: &body[1..],
        })
    }

    pub fn encode_body(algorithm: u8, key: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(1 + key.len());
        body.push(algorithm);
        body.extend_from_slice(key);
        body
    }
}

/// One entry of a trusted- or supported-identity list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustRecord {
    pub global_id: GlobalId,
}

impl TrustRecord {
    /// Decodes a whole trust list body (a packed array of ids).
    pub fn decode_list(body: &[u8]) -> Result<Vec<GlobalId>, WireError> {
        if body.len() % TRUST_RECORD_LEN != 0 {
            return Err(WireError::BadLength {
                what: "trust list",
                len: body.len(),
            });
        }
        Ok(body
            .chunks_exact(TRUST_RECORD_LEN)
            // Chunk size is GLOBAL_ID_LEN.
            .map(|c| GlobalId::from_slice(c).unwrap())
            .collect())
    }

    pub fn encode_list(ids: &[GlobalId]) -> Vec<u8> {
        let mut body = Vec::with_capacity(ids.len() * TRUST_RECORD_LEN);
        for id in ids {
            body.extend_from_slice(id.as_bytes());
        }
        body
    }
}

/// One link-local address entry of a description's address list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkAddrRecord {
    pub addr: [u8; LINK_ADDR_LEN],
}

impl LinkAddrRecord {
    pub fn decode_list(body: &[u8]) -> Result<Vec<[u8; LINK_ADDR_LEN]>, WireError> {
        if body.len() % LINK_ADDR_LEN != 0 {
            return Err(WireError::BadLength {
                what: "link address list",
                len: body.len(),
            });
        }
        Ok(body
            .chunks_exact(LINK_ADDR_LEN)
            .map(|c| {
                let mut a = [0u8; LINK_ADDR_LEN];
                a.copy_from_slice(c);
                a
            })
            .collect())
    }

    pub fn encode_list(addrs: &[[u8; LINK_ADDR_LEN]]) -> Vec<u8> {
        let mut body = Vec::with_capacity(addrs.len() * LINK_ADDR_LEN);
        for a in addrs {
            body.extend_from_slice(a);
        }
        body
    }
}

/// Data header of the packet-signature frame: the sender's anti-replay and
/// description revision counters plus the originating device index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSigHeader {
    pub burst_sqn: BurstSqn,
    pub desc_sqn: DescSqn,
    pub dev_idx: DevIdx,
}

impl PacketSigHeader {
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        if body.len() < PACKET_SIG_HDR_LEN {
            return Err(WireError::BadLength {
                what: "packet signature header",
                len: body.len(),
            });
        }
        let mut cur = TlvCursor::new(body);
        Ok(PacketSigHeader {
            burst_sqn: cur.read_u32()?,
            desc_sqn: cur.read_u32()?,
            dev_idx: cur.read_u16()?,
        })
    }

    pub fn encode(&self) -> [u8; PACKET_SIG_HDR_LEN] {
        let mut out = [0u8; PACKET_SIG_HDR_LEN];
        out[0..4].copy_from_slice(&self.burst_sqn.to_be_bytes());
        out[4..8].copy_from_slice(&self.desc_sqn.to_be_bytes());
        out[8..10].copy_from_slice(&self.dev_idx.to_be_bytes());
        out
    }
}
