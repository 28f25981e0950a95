//! Single-slot rendezvous between the query caller and the listener.
//!
//! The gateway gives answers no correlation token, so only one query may
//! wait at a time. A caller takes a [`QueryLease`] for its whole query
//! cycle, arms the slot before each send, and waits on the returned
//! [`PendingAnswer`]. The listener fills the slot with [`Correlator::deliver`]
//! and empties it with [`Correlator::abandon`] when it stops.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::CoreError;

#[derive(Debug, Default)]
struct Slot {
    leased: bool,
    waiter: Option<oneshot::Sender<i64>>,
}

/// Single-slot answer handoff.
#[derive(Debug, Default)]
pub struct Correlator {
    slot: Mutex<Slot>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the slot for a query cycle. Fails fast if another caller
    /// holds it; the holder is not disturbed.
    pub fn begin(&self) -> Result<QueryLease<'_>, CoreError> {
        let mut slot = self.slot();
        if slot.leased {
            return Err(CoreError::QueryInFlight);
        }
        slot.leased = true;
        Ok(QueryLease { correlator: self })
    }

    /// Hand an answer to the armed waiter. Returns `false` if nobody was
    /// waiting (the answer is dropped).
    pub fn deliver(&self, level: i64) -> bool {
        match self.slot().waiter.take() {
            Some(tx) => tx.send(level).is_ok(),
            None => false,
        }
    }

    /// Drop the armed waiter, if any, so it fails with "abandoned".
    pub fn abandon(&self) -> bool {
        self.slot().waiter.take().is_some()
    }

    /// Whether a query cycle currently holds the slot.
    pub fn is_busy(&self) -> bool {
        self.slot().leased
    }
}

/// Exclusive right to query; released on drop.
#[derive(Debug)]
pub struct QueryLease<'a> {
    correlator: &'a Correlator,
}

impl QueryLease<'_> {
    /// Open the slot for the next answer. Must be called before the query
    /// frame is sent so a fast answer is not lost.
    pub fn arm(&self) -> PendingAnswer {
        let (tx, rx) = oneshot::channel();
        self.correlator.slot().waiter = Some(tx);
        PendingAnswer { rx }
    }
}

impl Drop for QueryLease<'_> {
    fn drop(&mut self) {
        let mut slot = self.correlator.slot();
        slot.leased = false;
        slot.waiter = None;
    }
}

/// One armed answer slot.
#[derive(Debug)]
pub struct PendingAnswer {
    rx: oneshot::Receiver<i64>,
}

impl PendingAnswer {
    /// Wait for the answer to the query for `channel`, at most `timeout`.
    pub async fn wait(self, timeout: Duration, channel: i64) -> Result<i64, CoreError> {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(level)) => Ok(level),
            Ok(Err(_)) => Err(CoreError::QueryAbandoned { channel }),
            Err(_) => Err(CoreError::QueryTimeout {
                channel,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn delivers_to_armed_waiter() {
        let correlator = Correlator::new();
        let lease = correlator.begin().unwrap();
        let pending = lease.arm();

        assert!(correlator.deliver(42));
        assert_eq!(pending.wait(WAIT, 1).await.unwrap(), 42);
    }

    #[test]
    fn answer_without_waiter_is_dropped() {
        let correlator = Correlator::new();
        assert!(!correlator.deliver(10));

        let _lease = correlator.begin().unwrap();
        // Leased but not armed: still nobody to hand it to.
        assert!(!correlator.deliver(10));
    }

    #[tokio::test]
    async fn second_query_fails_fast_without_disturbing_first() {
        let correlator = Correlator::new();
        let lease = correlator.begin().unwrap();
        let pending = lease.arm();

        assert!(matches!(correlator.begin(), Err(CoreError::QueryInFlight)));

        assert!(correlator.deliver(77));
        assert_eq!(pending.wait(WAIT, 2).await.unwrap(), 77);
    }

    #[tokio::test]
    async fn abandon_fails_the_waiter() {
        let correlator = Correlator::new();
        let lease = correlator.begin().unwrap();
        let pending = lease.arm();

        assert!(correlator.abandon());
        assert!(matches!(
            pending.wait(WAIT, 3).await,
            Err(CoreError::QueryAbandoned { channel: 3 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_is_bounded() {
        let correlator = Correlator::new();
        let lease = correlator.begin().unwrap();
        let pending = lease.arm();

        let err = pending.wait(Duration::from_millis(250), 4).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::QueryTimeout {
                channel: 4,
                timeout_ms: 250
            }
        ));
    }

    #[test]
    fn dropping_lease_frees_the_slot() {
        let correlator = Correlator::new();
        {
            let lease = correlator.begin().unwrap();
            let _pending = lease.arm();
            assert!(correlator.is_busy());
        }
        assert!(!correlator.is_busy());
        assert!(!correlator.deliver(1));
        assert!(correlator.begin().is_ok());
    }
}
