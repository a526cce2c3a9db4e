use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct ActivePoll {
    target: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActivePoll {
    /// Soft cancel: a tick already in flight runs to completion and is
    /// expected to check the token before applying its result.
    fn cancel(self) -> String {
        self.token.cancel();
        self.target
    }
}

/// Runs at most one repeating poll loop.
///
/// Starting a loop cancels the previous one first, so a scheduler never has
/// two live loops. The first tick fires immediately; ticks never overlap.
/// Cancellation is checked before each tick starts. Each tick receives the
/// loop's [`CancellationToken`] so work that finishes after a stop can tell
/// its result is stale.
pub struct PollScheduler {
    name: &'static str,
    interval: Duration,
    active: Mutex<Option<ActivePoll>>,
}

impl PollScheduler {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval: interval.max(MIN_INTERVAL),
            active: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling `target`, replacing any running loop.
    pub fn start<F, Fut>(&self, target: impl Into<String>, tick: F)
    where
        F: Fn(String, CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let target = target.into();
        let token = CancellationToken::new();
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.take() {
            let previous = previous.cancel();
            debug!(poller = self.name, target = %previous, "poll loop replaced");
        }

        let handle = tokio::spawn(run_loop(
            self.name,
            self.interval,
            target.clone(),
            token.clone(),
            tick,
        ));
        debug!(poller = self.name, target = %target, "poll loop started");
        *active = Some(ActivePoll {
            target,
            token,
            handle,
        });
    }

    /// Stop the running loop, returning the target it was polling.
    pub fn stop(&self) -> Option<String> {
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        let target = previous.cancel();
        debug!(poller = self.name, target = %target, "poll loop stopped");
        Some(target)
    }

    pub fn target(&self) -> Option<String> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|poll| poll.target.clone())
    }

    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|poll| !poll.handle.is_finished())
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        let active = self.active.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(poll) = active.take() {
            poll.cancel();
        }
    }
}

async fn run_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    target: String,
    token: CancellationToken,
    tick: F,
) where
    F: Fn(String, CancellationToken) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }
        tick(target.clone(), token.clone()).await;
    }
    debug!(poller = name, target = %target, "poll loop exited");
}
