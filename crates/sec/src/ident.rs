//! Description identity parsing.
//!
//! Every description starts with a fixed three-record prefix: a
//! content-hash reference naming the signer's public-key record, the
//! signature over the rest of the description, and the version record
//! carrying the description sequence number. The parser walks records
//! strictly by position and fails closed on any deviation; body records
//! after the prefix are accepted verbatim and validated later by the
//! frame layer.

use crate::config::SecConfig;
use crate::error::{Result, SecError};
use filament_core::GlobalId;
use filament_crypto::KeyAlgorithm;
use filament_wire::{
    read_record, ContentHashRecord, FrameType, SignatureRecord, TlvCursor, VersionRecord,
};

/// Hard ceiling on description size, independent of configuration.
pub const MAX_DESC_SIZE: usize = 4096;

/// The verified-parseable identity prefix of a description.
#[derive(Debug)]
pub struct DescIdentity<'a> {
    /// Global id claimed by the description (hash of its public-key
    /// record body).
    pub id: GlobalId,
    pub signature: SignatureRecord<'a>,
    pub sig_algorithm: KeyAlgorithm,
    pub version: VersionRecord,
    /// Offset of the version record header; the signature covers
    /// everything from here to the end of the description.
    pub payload_offset: usize,
}

/// Parses and positionally validates the identity prefix of `desc`.
///
/// All failures are fatal: a description that deviates from the prefix
/// layout is discarded, never partially processed.
pub fn parse_identity<'a>(desc: &'a [u8], config: &SecConfig) -> Result<DescIdentity<'a>> {
    if desc.len() > MAX_DESC_SIZE {
        return Err(SecError::malformed(
            "description",
            format!("{} bytes exceeds maximum {}", desc.len(), MAX_DESC_SIZE),
        ));
    }

    let mut cur = TlvCursor::new(desc);
    let mut id = None;
    let mut signature = None;
    let mut version = None;
    let mut payload_offset = 0;
    let mut index = 0usize;

    while !cur.is_empty() {
        let rec = read_record(&mut cur)?;
        match index {
            0 => {
                if rec.frame_type != FrameType::ContentHash.code() {
                    return Err(SecError::malformed(
                        "description",
                        format!("record 0 has type {:#04x}, wanted content-hash", rec.frame_type),
                    ));
                }
                let ch = ContentHashRecord::decode(rec.body)?;
                if ch.gzip {
                    return Err(SecError::malformed("description", "compressed key reference"));
                }
                if ch.max_nesting != 1 {
                    return Err(SecError::malformed(
                        "description",
                        format!("key reference nesting {}", ch.max_nesting),
                    ));
                }
                if ch.expanded_type != FrameType::Pubkey.code() {
                    return Err(SecError::malformed(
                        "description",
                        format!("key reference expands to type {:#04x}", ch.expanded_type),
                    ));
                }
                id = Some(ch.expanded_id);
            }
            1 => {
                if rec.frame_type != FrameType::Signature.code() {
                    return Err(SecError::malformed(
                        "description",
                        format!("record 1 has type {:#04x}, wanted signature", rec.frame_type),
                    ));
                }
                let sr = SignatureRecord::decode(rec.body)?;
                let alg = KeyAlgorithm::from_code(sr.algorithm).ok_or_else(|| {
                    SecError::malformed(
                        "description",
                        format!("unrecognized signature algorithm {}", sr.algorithm),
                    )
                })?;
                if sr.signature.len() != alg.sig_len() {
                    return Err(SecError::malformed(
                        "description",
                        format!(
                            "signature length {} does not match {} ({} bytes)",
                            sr.signature.len(),
                            alg.name(),
                            alg.sig_len()
                        ),
                    ));
                }
                signature = Some((sr, alg));
            }
            2 => {
                if rec.frame_type != FrameType::Version.code() {
                    return Err(SecError::malformed(
                        "description",
                        format!("record 2 has type {:#04x}, wanted version", rec.frame_type),
                    ));
                }
                let v = VersionRecord::decode(rec.body)?;
                if !config.version_acceptable(v.comp_version) {
                    return Err(SecError::malformed(
                        "description",
                        format!("compatibility version {} outside acceptance window", v.comp_version),
                    ));
                }
                payload_offset = rec.offset;
                version = Some(v);
            }
            // Body records, validated by the frame layer.
            _ => {}
        }
        index += 1;
    }

    let id = id.ok_or_else(|| SecError::malformed("description", "missing content-hash record"))?;
    let (signature, sig_algorithm) =
        signature.ok_or_else(|| SecError::malformed("description", "missing signature record"))?;
    let version =
        version.ok_or_else(|| SecError::malformed("description", "missing version record"))?;

    Ok(DescIdentity {
        id,
        signature,
        sig_algorithm,
        version,
        payload_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use filament_wire::TlvWriter;

    fn prefix(sig_alg: u8, sig_len: usize, comp_version: u8) -> TlvWriter {
        let mut w = TlvWriter::new();
        ContentHashRecord {
            gzip: false,
            max_nesting: 1,
            expanded_type: FrameType::Pubkey.code(),
            expanded_id: GlobalId::from_bytes([7; 32]),
        }
        .write(&mut w);
        w.record(
            FrameType::Signature.code(),
            &SignatureRecord::encode_body(sig_alg, &vec![0xab; sig_len]),
        );
        VersionRecord {
            comp_version,
            capabilities: 0,
            desc_sqn: 5,
        }
        .write(&mut w);
        w
    }

    #[test]
    fn test_parses_strict_prefix() {
        let config = SecConfig::default();
        let mut w = prefix(KeyAlgorithm::Ed25519.code(), 64, config.comp_version);
        let version_offset = w.len() - (3 + 7);
        w.record(FrameType::Trusts.code(), &[0u8; 32]);

        let ident = parse_identity(w.as_slice(), &config).unwrap();
        assert_eq!(ident.id, GlobalId::from_bytes([7; 32]));
        assert_eq!(ident.sig_algorithm, KeyAlgorithm::Ed25519);
        assert_eq!(ident.version.desc_sqn, 5);
        assert_eq!(ident.payload_offset, version_offset);
    }

    #[test]
    fn test_rejects_reordered_prefix() {
        let config = SecConfig::default();
        let good = prefix(KeyAlgorithm::Ed25519.code(), 64, config.comp_version);

        // Swap records 0 and 1 by re-framing them.
        let mut cur = TlvCursor::new(good.as_slice());
        let r0 = read_record(&mut cur).unwrap();
        let r1 = read_record(&mut cur).unwrap();
        let r2 = read_record(&mut cur).unwrap();
        let mut w = TlvWriter::new();
        w.record(r1.frame_type, r1.body);
        w.record(r0.frame_type, r0.body);
        w.record(r2.frame_type, r2.body);
        assert!(matches!(
            parse_identity(w.as_slice(), &config),
            Err(SecError::Malformed { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_key_reference() {
        let config = SecConfig::default();
        for (gzip, nesting, expanded) in [
            (true, 1, FrameType::Pubkey.code()),
            (false, 2, FrameType::Pubkey.code()),
            (false, 1, FrameType::Trusts.code()),
        ] {
            let mut w = TlvWriter::new();
            ContentHashRecord {
                gzip,
                max_nesting: nesting,
                expanded_type: expanded,
                expanded_id: GlobalId::from_bytes([7; 32]),
            }
            .write(&mut w);
            assert!(parse_identity(w.as_slice(), &config).is_err());
        }
    }

    #[test]
    fn test_rejects_signature_length_mismatch() {
        let config = SecConfig::default();
        let w = prefix(KeyAlgorithm::Ed25519.code(), 63, config.comp_version);
        assert!(matches!(
            parse_identity(w.as_slice(), &config),
            Err(SecError::Malformed { .. })
        ));
        // Unknown algorithm code.
        let w = prefix(0x7f, 64, config.comp_version);
        assert!(parse_identity(w.as_slice(), &config).is_err());
    }

    #[test]
    fn test_version_window() {
        let mut config = SecConfig::default();
        config.tolerant_versions = true;
        let base = config.comp_version;
        for (v, ok) in [
            (base, true),
            (base + 1, true),
            (base - 1, true),
            (base + 2, false),
        ] {
            let w = prefix(KeyAlgorithm::Ed25519.code(), 64, v);
            assert_eq!(parse_identity(w.as_slice(), &config).is_ok(), ok, "version {v}");
        }
        config.tolerant_versions = false;
        let w = prefix(KeyAlgorithm::Ed25519.code(), 64, base + 1);
        assert!(parse_identity(w.as_slice(), &config).is_err());
    }

    #[test]
    fn test_rejects_trailing_garbage_and_truncation() {
        let config = SecConfig::default();
        let w = prefix(KeyAlgorithm::Ed25519.code(), 64, config.comp_version);

        let mut trailing = w.as_slice().to_vec();
        trailing.extend_from_slice(&[0x01, 0x02]);
        assert!(parse_identity(&trailing, &config).is_err());

        let truncated = &w.as_slice()[..w.len() - 1];
        assert!(parse_identity(truncated, &config).is_err());

        assert!(parse_identity(&[], &config).is_err());
        assert!(parse_identity(&vec![0u8; MAX_DESC_SIZE + 1], &config).is_err());
    }
}
