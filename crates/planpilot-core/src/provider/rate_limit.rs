//! Shared rate-limit backpressure for provider adapters.
//!
//! A [`RateGate`] is one pausable gate that every outgoing call of an
//! adapter instance awaits before proceeding. When any call hits a rate
//! limit, it pauses the gate and thereby every in-flight and queued
//! sibling -- not just itself. The gate is separate from the engine's
//! concurrency limiter, which only bounds call count.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// A pausable barrier shared by all calls of one adapter instance.
///
/// Safe for concurrent use: the lock is only held to read or extend the
/// pause deadline, never across an await point.
#[derive(Debug, Default)]
pub struct RateGate {
    paused_until: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the gate is open.
    ///
    /// Returns immediately when no pause is active. Re-checks after
    /// sleeping, so a pause extended while waiting is honored.
    pub async fn wait_ready(&self) {
        loop {
            let deadline = {
                let mut guard = self.paused_until.lock().expect("rate gate lock poisoned");
                match *guard {
                    Some(t) if t > Instant::now() => Some(t),
                    Some(_) => {
                        // Pause expired; clear it so later checks are cheap.
                        *guard = None;
                        None
                    }
                    None => None,
                }
            };
            match deadline {
                Some(t) => tokio::time::sleep_until(t).await,
                None => return,
            }
        }
    }

    /// Pause the gate for `duration` from now.
    ///
    /// An existing later deadline wins: pauses extend, they never shrink.
    pub fn pause_for(&self, duration: Duration) {
        let candidate = Instant::now() + duration;
        let mut guard = self.paused_until.lock().expect("rate gate lock poisoned");
        match *guard {
            Some(current) if current >= candidate => {}
            _ => *guard = Some(candidate),
        }
    }

    /// Whether a pause is currently active.
    pub fn is_paused(&self) -> bool {
        match *self.paused_until.lock().expect("rate gate lock poisoned") {
            Some(t) => t > Instant::now(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn open_gate_returns_immediately() {
        let gate = RateGate::new();
        assert!(!gate.is_paused());
        gate.wait_ready().await;
    }

    #[tokio::test(start_paused = true)]
    async fn paused_gate_blocks_until_deadline() {
        let gate = Arc::new(RateGate::new());
        gate.pause_for(Duration::from_millis(500));
        assert!(gate.is_paused());

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                gate.wait_ready().await;
                Instant::now()
            })
        };

        let start = Instant::now();
        let released_at = waiter.await.unwrap();
        assert!(
            released_at - start >= Duration::from_millis(500),
            "gate released too early"
        );
        assert!(!gate.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn one_pause_blocks_all_waiters() {
        let gate = Arc::new(RateGate::new());
        gate.pause_for(Duration::from_millis(200));

        let mut waiters = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            waiters.push(tokio::spawn(async move {
                gate.wait_ready().await;
                Instant::now()
            }));
        }

        let start = Instant::now();
        for waiter in waiters {
            let released_at = waiter.await.unwrap();
            assert!(released_at - start >= Duration::from_millis(200));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pause_extends_but_never_shrinks() {
        let gate = RateGate::new();
        gate.pause_for(Duration::from_millis(500));
        gate.pause_for(Duration::from_millis(100));

        let start = Instant::now();
        gate.wait_ready().await;
        assert!(
            Instant::now() - start >= Duration::from_millis(500),
            "shorter pause must not shrink the deadline"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pause_during_wait_is_honored() {
        let gate = Arc::new(RateGate::new());
        gate.pause_for(Duration::from_millis(100));

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                gate.wait_ready().await;
                Instant::now()
            })
        };

        // Extend the pause while the waiter sleeps.
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.pause_for(Duration::from_millis(300));

        let start = Instant::now() - Duration::from_millis(50);
        let released_at = waiter.await.unwrap();
        assert!(
            released_at - start >= Duration::from_millis(350),
            "extension while waiting must be honored"
        );
    }
}
