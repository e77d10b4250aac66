//! Background task that drives reconciliation on a fixed cadence until told
//! to stop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One polling cycle. Implementations must not fail; errors are logged.
pub trait FleetPoller: Send + Sync + 'static {
    fn poll_once(&self) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Polling,
    Sleeping,
    Stopped,
}

/// Handle to a running scheduler task.
pub struct PollingScheduler {
    cancel: CancellationToken,
    state: watch::Receiver<SchedulerState>,
    task: JoinHandle<()>,
}

impl PollingScheduler {
    /// Spawn the polling loop. The first cycle starts immediately; passes
    /// never overlap.
    pub fn spawn<P: FleetPoller>(poller: Arc<P>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
        let task = tokio::spawn(run(poller, interval, cancel.clone(), state_tx));
        Self {
            cancel,
            state: state_rx,
            task,
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }

    /// Token that stops the loop when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(err = %e, "polling task ended abnormally");
        }
    }
}

async fn run<P: FleetPoller>(
    poller: Arc<P>,
    interval: Duration,
    cancel: CancellationToken,
    state: watch::Sender<SchedulerState>,
) {
    tracing::info!(interval_secs = interval.as_secs(), "polling scheduler started");
    loop {
        state.send_replace(SchedulerState::Polling);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = poller.poll_once() => {}
        }

        state.send_replace(SchedulerState::Sleeping);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    state.send_replace(SchedulerState::Stopped);
    tracing::info!("polling scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        polls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        work: Duration,
    }

    impl FleetPoller for Counting {
        async fn poll_once(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }
            self.polls.fetch_add(1, Ordering::SeqCst);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_fixed_cadence() {
        let poller = Arc::new(Counting::default());
        let scheduler = PollingScheduler::spawn(poller.clone(), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(poller.polls.load(Ordering::SeqCst), 4);
        assert_eq!(scheduler.state(), SchedulerState::Sleeping);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_does_not_wait_for_interval() {
        let poller = Arc::new(Counting::default());
        let scheduler = PollingScheduler::spawn(poller.clone(), Duration::from_secs(3600));
        let mut state = scheduler.subscribe();
        state
            .wait_for(|s| *s == SchedulerState::Sleeping)
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        scheduler.stop().await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(*state.borrow(), SchedulerState::Stopped);
        assert_eq!(poller.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_passes_never_overlap() {
        let poller = Arc::new(Counting {
            work: Duration::from_secs(45),
            ..Default::default()
        });
        let scheduler = PollingScheduler::spawn(poller.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(poller.polls.load(Ordering::SeqCst) >= 5);
        assert_eq!(poller.max_in_flight.load(Ordering::SeqCst), 1);

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn external_cancel_token_stops_loop() {
        let poller = Arc::new(Counting::default());
        let scheduler = PollingScheduler::spawn(poller, Duration::from_secs(30));
        let mut state = scheduler.subscribe();
        scheduler.cancel_token().cancel();
        state
            .wait_for(|s| *s == SchedulerState::Stopped)
            .await
            .unwrap();
    }
}
