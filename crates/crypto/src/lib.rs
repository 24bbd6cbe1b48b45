//! Crypto provider for the Filament trust core.
//!
//! This crate wraps the asymmetric primitives the security engines consume
//! as an opaque provider:
//!
//! - BLAKE3 content hashing ([`hash`]) for digests and [`GlobalId`]
//!   derivation,
//! - the signing-algorithm registry ([`KeyAlgorithm`]) mapping wire codes
//!   to key/signature lengths,
//! - owned key material with expiry tracking ([`KeyMaterial`]) and detached
//!   verification keys ([`PublicKey`]),
//! - persisted identity-key files with a mandatory startup self-test
//!   ([`keyfile`]).
//!
//! Secret key bytes are zeroized when key material is dropped.
//!
//! [`GlobalId`]: filament_core::GlobalId

pub mod hash;
pub mod keyfile;
pub mod material;
pub mod provider;

pub use hash::{content_id, digest, Digest, DigestState, DIGEST_LEN};
pub use keyfile::{load_or_create, KeyfileError};
pub use material::{generate, KeyMaterial, PublicKey};
pub use provider::{CryptoError, KeyAlgorithm};

pub type Result<T> = std::result::Result<T, CryptoError>;
