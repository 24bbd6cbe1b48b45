//! Trust and authentication core of the filament mesh daemon.
//!
//! This crate owns everything between "bytes arrived from an untrusted
//! radio" and "this sender is an authenticated, trusted neighbor":
//!
//! - the node's long-term identity key and the ephemeral packet-signing
//!   key with its randomized rotation schedule
//! - signing and verifying node descriptions (self-certifying identity
//!   announcements with a strict three-record prefix)
//! - signing and verifying individual packets, including burst-sequence
//!   anti-replay and source-address checks
//! - the claimed-key registry with its certification ladder
//! - directory-administered trusted/supported identity sets and the
//!   per-origin neighbor trust bitmaps
//!
//! All engines are plain functions over explicit state, driven from a
//! single-threaded event loop; verification failures split into fatal
//! protocol violations and ignorable not-yet-actionable states (see
//! [`error::SecError`]).

pub mod config;
pub mod context;
pub mod desc;
pub mod dirsync;
pub mod error;
pub mod frames;
pub mod ident;
mod keys;
pub mod links;
pub mod packet;
pub mod registry;
pub mod store;
pub mod trust;

pub use config::SecConfig;
pub use context::{SecTask, SecurityContext};
pub use desc::{build_description, process_description, verify_description, DescOutcome};
pub use dirsync::{scan_dir, DirWatch};
pub use error::{Result, SecError, Severity};
pub use frames::{build_local_description, build_local_frames, FrameHandler};
pub use ident::{parse_identity, DescIdentity};
pub use links::{LinkId, LinkTable};
pub use packet::{verify_packet, Accepted, FetchRequest, PacketFrame, PacketMeta, PacketSigner};
pub use registry::{CertLevel, ClaimedKey, ClaimedKeyTable, Credits, DescContent};
pub use store::{ContentEntry, ContentStore, MemoryContentStore};
pub use trust::{SupportLevel, SyncOutcome, TrustChange, TrustGraph, TrustSetKind};
