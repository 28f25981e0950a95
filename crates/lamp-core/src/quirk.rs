// Off-command compensation.
//
// After an "off" scene the gateway keeps answering level queries with the
// brightness from before the command. While the flag is set, level answers
// reads as 0 and clears the flag. The flag is set by a scene-0 command or
// its echo, consumed by the first level answer after that, and cleared
// again when a full level query cycle completes. Reads that decide an
// answer happen under the same lock as the writes.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct QuirkFlag {
    turned_off: Mutex<bool>,
}

impl QuirkFlag {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, bool> {
        self.turned_off.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self) {
        *self.guard() = true;
    }

    /// Clear the flag, returning whether it was set.
    pub fn clear(&self) -> bool {
        std::mem::replace(&mut *self.guard(), false)
    }

    pub fn is_set(&self) -> bool {
        *self.guard()
    }

    /// Correct a raw level answer, consuming the flag if it applies, and
    /// hand the result to `deliver` while still holding the lock.
    pub fn take_corrected<R>(&self, raw: i64, deliver: impl FnOnce(i64) -> R) -> R {
        let mut turned_off = self.guard();
        let level = if std::mem::replace(&mut *turned_off, false) {
            0
        } else {
            raw
        };
        deliver(level)
    }
}
