//! Core types for the Filament mesh security stack.
//!
//! This crate provides the identifiers, sequence counters, and cooperative
//! timer wheel shared by the wire codec, the crypto provider, and the
//! security engines. Everything here is synchronous and allocation-light:
//! the daemon is a single-threaded event loop and these types are mutated
//! only from that loop.

pub mod logging;
pub mod sched;
pub mod types;

pub use sched::Scheduler;
pub use types::{BurstSqn, DescSqn, DevIdx, GlobalId, IdParseError, GLOBAL_ID_LEN};
