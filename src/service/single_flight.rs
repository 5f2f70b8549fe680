//! At most one in-flight execution of an operation.
//!
//! The first caller becomes the leader and runs the operation; callers that
//! arrive while it runs await the same pending result instead of starting a
//! second execution.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

type Pending = Shared<BoxFuture<'static, Result<()>>>;

/// Slot holding the pending completion of the in-flight operation.
#[derive(Default)]
pub struct SingleFlight {
    slot: Mutex<Option<Pending>>,
}

/// Role of a caller joining a [`SingleFlight`].
pub enum Flight<'a> {
    /// Run the operation, then [`FlightGuard::complete`] it
    Leader(FlightGuard<'a>),
    /// Await the leader's result
    Follower(Pending),
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self) -> Flight<'_> {
        let mut slot = self.slot.lock();
        if let Some(pending) = slot.as_ref() {
            return Flight::Follower(pending.clone());
        }

        let (tx, rx) = oneshot::channel();
        // A leader dropped mid-flight surfaces as an abort to its followers
        let pending = rx
            .map(|received| received.unwrap_or(Err(Error::Aborted)))
            .boxed()
            .shared();
        *slot = Some(pending);

        Flight::Leader(FlightGuard {
            flight: self,
            tx: Some(tx),
        })
    }

    pub fn in_flight(&self) -> bool {
        self.slot.lock().is_some()
    }
}

/// Held by the leader while the operation runs.
///
/// Dropping it without completing clears the slot, so a cancelled leader
/// never wedges later callers.
pub struct FlightGuard<'a> {
    flight: &'a SingleFlight,
    tx: Option<oneshot::Sender<Result<()>>>,
}

impl FlightGuard<'_> {
    /// Clear the slot and hand `result` to every follower.
    pub fn complete(mut self, result: Result<()>) -> Result<()> {
        self.flight.slot.lock().take();
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(result.clone());
        }
        result
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.flight.slot.lock().take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn run(flight: &SingleFlight, calls: &AtomicUsize, fail: bool) -> Result<()> {
        match flight.join() {
            Flight::Follower(pending) => pending.await,
            Flight::Leader(guard) => {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                let result = if fail {
                    Err(Error::playback("boom"))
                } else {
                    Ok(())
                };
                guard.complete(result)
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let flight = SingleFlight::new();
        let calls = AtomicUsize::new(0);

        let (a, b, c) = tokio::join!(
            run(&flight, &calls, false),
            run(&flight, &calls, false),
            run(&flight, &calls, false)
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!flight.in_flight());
    }

    #[tokio::test]
    async fn test_failure_reaches_followers_and_clears_slot() {
        let flight = SingleFlight::new();
        let calls = AtomicUsize::new(0);

        let (a, b) = tokio::join!(run(&flight, &calls, true), run(&flight, &calls, true));
        assert!(a.is_err());
        assert!(b.unwrap_err().to_string().contains("boom"));

        // Next caller leads a fresh attempt
        run(&flight, &calls, false).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_leader_aborts_followers() {
        let flight = SingleFlight::new();
        let leader = flight.join();
        let Flight::Follower(pending) = flight.join() else {
            panic!("second caller must follow");
        };

        drop(leader);
        assert!(!flight.in_flight());
        assert!(matches!(pending.await, Err(Error::Aborted)));
    }
}
