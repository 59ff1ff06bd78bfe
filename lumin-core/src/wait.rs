//! Deadline-bounded waiting
//!
//! Every wait in the pipeline goes through [`poll_until`], whose only
//! suspension point is the delay between polls. How the transport delivers
//! bytes (blocking, interrupt-driven, buffered) does not matter here.

use embedded_hal::delay::DelayNs;

/// Countdown measured in milliseconds fed by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Deadline {
    remaining_ms: u32,
}

impl Deadline {
    /// Deadline that expires after `timeout_ms`
    pub fn after_ms(timeout_ms: u32) -> Self {
        Self {
            remaining_ms: timeout_ms,
        }
    }

    /// Milliseconds left
    pub fn remaining_ms(&self) -> u32 {
        self.remaining_ms
    }

    /// True once the full timeout has elapsed
    pub fn is_expired(&self) -> bool {
        self.remaining_ms == 0
    }

    /// Subtract elapsed time
    pub fn consume(&mut self, elapsed_ms: u32) {
        self.remaining_ms = self.remaining_ms.saturating_sub(elapsed_ms);
    }
}

/// Call `poll` until it yields a value or an error, sleeping in between
///
/// `poll` receives the milliseconds slept since its previous call (0 on the
/// first call) and is responsible for enforcing its own deadline by
/// returning an error.
pub fn poll_until<D, T, E, F>(delay: &mut D, interval_ms: u32, mut poll: F) -> Result<T, E>
where
    D: DelayNs,
    F: FnMut(u32) -> Result<Option<T>, E>,
{
    let interval_ms = interval_ms.max(1);
    let mut elapsed_ms = 0;

    loop {
        if let Some(value) = poll(elapsed_ms)? {
            return Ok(value);
        }
        delay.delay_ms(interval_ms);
        elapsed_ms = interval_ms;
    }
}
