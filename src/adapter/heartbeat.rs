//! Heartbeat liveness monitor.
//!
//! Tracks the repeating probe timer and the single outstanding ack
//! deadline. The tasks themselves are spawned by the adapter core, which
//! hands their handles over so they can be aborted on any exit from
//! `Open`.
//!
//! Each probe opens a numbered cycle. A deadline only counts if its cycle
//! is still the pending one, so a deadline that raced with an ack or a
//! restart is ignored.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

// ============================================================================
// HeartbeatMonitor
// ============================================================================

/// Probe/ack bookkeeping for one adapter.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    /// Time between probes.
    interval: Duration,
    /// Time allowed for an ack.
    timeout: Duration,
    /// Repeating probe task.
    ticker: Option<JoinHandle<()>>,
    /// Ack deadline task of the pending cycle.
    deadline: Option<JoinHandle<()>>,
    /// Cycle awaiting an ack.
    pending_cycle: Option<u64>,
    /// Number given to the next cycle.
    next_cycle: u64,
    /// When the last ack arrived.
    last_ack: Option<Instant>,
}

impl HeartbeatMonitor {
    /// Creates a stopped monitor.
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            ticker: None,
            deadline: None,
            pending_cycle: None,
            next_cycle: 0,
            last_ack: None,
        }
    }

    /// Returns the probe interval.
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the ack timeout.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Starts monitoring with the given probe task, replacing any previous one.
    pub fn start(&mut self, ticker: JoinHandle<()>) {
        self.stop();
        self.ticker = Some(ticker);
        trace!(interval_ms = self.interval.as_millis() as u64, "Heartbeat started");
    }

    /// Opens a new probe cycle.
    ///
    /// Returns `None` while a previous cycle still awaits its ack; the
    /// caller skips that tick so cycles never overlap.
    pub fn begin_cycle(&mut self) -> Option<u64> {
        if self.pending_cycle.is_some() {
            trace!("Previous heartbeat still pending, skipping tick");
            return None;
        }
        let cycle = self.next_cycle;
        self.next_cycle = self.next_cycle.wrapping_add(1);
        self.pending_cycle = Some(cycle);
        Some(cycle)
    }

    /// Registers the deadline task of the pending cycle.
    pub fn set_deadline(&mut self, deadline: JoinHandle<()>) {
        if let Some(previous) = self.deadline.replace(deadline) {
            previous.abort();
        }
    }

    /// Records an ack and cancels the pending deadline.
    ///
    /// Returns `true` if a cycle was pending.
    pub fn acknowledge(&mut self) -> bool {
        self.last_ack = Some(Instant::now());
        if let Some(deadline) = self.deadline.take() {
            deadline.abort();
        }
        self.pending_cycle.take().is_some()
    }

    /// Claims the expiry of `cycle`.
    ///
    /// Returns `true` only if `cycle` is still pending; the deadline task
    /// calling this is the one that fired, so its handle is just dropped.
    pub fn expire(&mut self, cycle: u64) -> bool {
        if self.pending_cycle != Some(cycle) {
            return false;
        }
        self.pending_cycle = None;
        self.deadline = None;
        true
    }

    /// Aborts both timers and forgets the pending cycle.
    pub fn stop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
            trace!("Heartbeat stopped");
        }
        if let Some(deadline) = self.deadline.take() {
            deadline.abort();
        }
        self.pending_cycle = None;
    }

    /// Returns when the last ack arrived.
    #[inline]
    #[must_use]
    pub fn last_ack(&self) -> Option<Instant> {
        self.last_ack
    }

    /// Returns `true` while the probe timer is active.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Returns `true` while a probe awaits its ack.
    #[inline]
    #[must_use]
    pub fn is_awaiting_ack(&self) -> bool {
        self.pending_cycle.is_some()
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::future::pending;

    use tokio::sync::oneshot;

    fn idle_task() -> JoinHandle<()> {
        tokio::spawn(pending::<()>())
    }

    /// Spawns an idle task whose receiver resolves once the task is dropped.
    fn watched_task() -> (JoinHandle<()>, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let _tx = tx;
            pending::<()>().await;
        });
        (task, rx)
    }

    fn monitor() -> HeartbeatMonitor {
        HeartbeatMonitor::new(Duration::from_millis(1000), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_cycles_do_not_overlap() {
        let mut hb = monitor();
        hb.start(idle_task());

        let first = hb.begin_cycle().expect("first cycle");
        assert!(hb.begin_cycle().is_none());
        assert!(hb.is_awaiting_ack());

        assert!(hb.acknowledge());
        let second = hb.begin_cycle().expect("second cycle");
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_ack_cancels_deadline() {
        let mut hb = monitor();
        hb.start(idle_task());

        let cycle = hb.begin_cycle().unwrap();
        let (deadline, dropped) = watched_task();
        hb.set_deadline(deadline);

        assert!(hb.acknowledge());
        assert!(hb.last_ack().is_some());
        assert!(!hb.expire(cycle));

        assert!(dropped.await.is_err());
    }

    #[tokio::test]
    async fn test_expire_only_matches_pending_cycle() {
        let mut hb = monitor();
        let cycle = hb.begin_cycle().unwrap();

        assert!(!hb.expire(cycle + 1));
        assert!(hb.expire(cycle));
        assert!(!hb.expire(cycle));
        assert!(!hb.is_awaiting_ack());
    }

    #[tokio::test]
    async fn test_stop_aborts_ticker() {
        let mut hb = monitor();
        let (ticker, dropped) = watched_task();
        hb.start(ticker);
        assert!(hb.is_running());

        hb.stop();
        assert!(!hb.is_running());

        assert!(dropped.await.is_err());
    }

    #[test]
    fn test_unsolicited_ack_is_recorded() {
        let mut hb = monitor();
        assert!(!hb.acknowledge());
        assert!(hb.last_ack().is_some());
    }
}
