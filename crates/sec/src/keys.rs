//! Lifecycle of the ephemeral packet-signing key.
//!
//! The packet key is generated lazily on first need and rotated with
//! margin before it expires, so an already-expired key is never still
//! advertised. To keep a freshly started fleet from rotating in lockstep,
//! the first key of a process gets a shortened random lifetime; only
//! subsequent keys use the full configured one.

use crate::config::{MAX_PACKET_SIGN_LT, MIN_PACKET_SIGN_LT};
use crate::context::{SecTask, SecurityContext};
use crate::error::SecError;
use filament_core::Scheduler;
use filament_crypto::{KeyAlgorithm, KeyMaterial};
use rand::Rng;

impl SecurityContext {
    /// Ensures the packet key matches the configured signing state.
    ///
    /// Signing disabled: retires any live key and returns `None`. Signing
    /// enabled: generates a key if none is live, schedules its renewal
    /// timer (none for an unbounded lifetime), and returns it.
    pub fn ensure_packet_key(
        &mut self,
        now_sec: u64,
        sched: &mut Scheduler<SecTask>,
    ) -> Result<Option<&KeyMaterial>, SecError> {
        if self.config.packet_sign_bits == 0 {
            if self.packet_key.is_some() {
                self.retire_packet_key(sched);
            }
            return Ok(None);
        }

        if self.packet_key.is_none() {
            let algorithm = KeyAlgorithm::by_strength(self.config.packet_sign_bits)
                .ok_or_else(|| {
                    SecError::Config(format!(
                        "packet signing strength {} matches no known algorithm",
                        self.config.packet_sign_bits
                    ))
                })?;

            let configured = self.config.packet_sign_lifetime_secs;
            let lifetime = if !self.first_packet_key_issued && configured > 0 {
                // Desynchronize rotation across a freshly started fleet.
                if configured > 1 {
                    rand::thread_rng().gen_range(1..configured)
                } else {
                    1
                }
            } else {
                configured
            };

            let mut key = filament_crypto::generate(algorithm);
            key.end_of_life = if lifetime > 0 {
                now_sec + lifetime as u64
            } else {
                0
            };
            if lifetime > 0 {
                sched.schedule(
                    (now_sec + lifetime as u64) * 1000,
                    SecTask::PacketKeyRenewal,
                );
            }

            tracing::info!(
                algorithm = algorithm.name(),
                lifetime_secs = lifetime,
                end_of_life = key.end_of_life,
                "packet signing key generated"
            );

            self.packet_key_lifetime = lifetime;
            self.first_packet_key_issued = true;
            self.packet_key = Some(key);
        }

        Ok(self.packet_key.as_ref())
    }

    /// Timer/periodic hook: retires the live key once four fifths of its
    /// lifetime are consumed, so the next [`ensure_packet_key`] call
    /// regenerates well before actual expiry.
    ///
    /// [`ensure_packet_key`]: SecurityContext::ensure_packet_key
    pub fn maybe_rotate(&mut self, now_sec: u64, sched: &mut Scheduler<SecTask>) {
        let Some(key) = &self.packet_key else {
            return;
        };
        if key.end_of_life == 0 {
            return;
        }

        let lifetime = self.packet_key_lifetime as u64;
        debug_assert!(lifetime > 0, "finite end_of_life implies a drawn lifetime");
        let remaining = key.end_of_life.saturating_sub(now_sec);
        if remaining * 5 <= lifetime {
            tracing::debug!(remaining_secs = remaining, "retiring packet key for renewal");
            self.retire_packet_key(sched);
        }
    }

    /// Reconfigures the packet-signing strength. Any change retires the
    /// current key immediately and marks the description for
    /// re-publication.
    pub fn set_packet_signing(
        &mut self,
        bits: u32,
        sched: &mut Scheduler<SecTask>,
    ) -> Result<(), SecError> {
        if bits != 0 && KeyAlgorithm::by_strength(bits).is_none() {
            return Err(SecError::Config(format!(
                "packet signing strength {bits} matches no known algorithm"
            )));
        }
        if bits == self.config.packet_sign_bits {
            return Ok(());
        }
        self.retire_packet_key(sched);
        self.config.packet_sign_bits = bits;
        self.mark_description_dirty();
        Ok(())
    }

    /// Reconfigures the packet-key lifetime. Setting 0 makes the *live*
    /// key unbounded; any other change retires it so the next key picks up
    /// the new lifetime.
    pub fn set_packet_lifetime(
        &mut self,
        secs: u32,
        sched: &mut Scheduler<SecTask>,
    ) -> Result<(), SecError> {
        if secs != 0 && !(MIN_PACKET_SIGN_LT..=MAX_PACKET_SIGN_LT).contains(&secs) {
            return Err(SecError::Config(format!(
                "packet key lifetime {secs} outside [{MIN_PACKET_SIGN_LT}, {MAX_PACKET_SIGN_LT}]"
            )));
        }
        if secs == 0 {
            self.config.packet_sign_lifetime_secs = 0;
            if let Some(key) = &mut self.packet_key {
                key.end_of_life = 0;
                sched.cancel(SecTask::PacketKeyRenewal);
            }
        } else if secs != self.config.packet_sign_lifetime_secs {
            self.config.packet_sign_lifetime_secs = secs;
            self.retire_packet_key(sched);
            self.mark_description_dirty();
        }
        Ok(())
    }

    /// Drops the live packet key and its renewal timer. The description is
    /// dirty afterwards since it advertises the key.
    pub(crate) fn retire_packet_key(&mut self, sched: &mut Scheduler<SecTask>) {
        sched.cancel(SecTask::PacketKeyRenewal);
        if self.packet_key.take().is_some() {
            self.packet_key_lifetime = 0;
            self.mark_description_dirty();
        }
    }
}
