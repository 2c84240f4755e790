//! Shared polling discipline for every asynchronous remote transition.
//!
//! A probe is called repeatedly until it reports [`Probe::Ready`] or fails.
//! Between probes the poller sleeps for the current interval. Both the probes
//! and the sleeps race a [`CancelSignal`] and, when configured, a deadline;
//! whichever fires first ends the wait with [`ProvisionError::Cancelled`] or
//! [`ProvisionError::Timeout`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::ProvisionError;
use crate::metrics::ProvisionMetrics;

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Ready(T),
    /// Not there yet; carries the observed state for logging.
    Pending(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Double the interval after each pending probe, up to `max`.
    Exponential { max: Duration },
}

impl Backoff {
    fn next(self, current: Duration) -> Duration {
        match self {
            Backoff::Fixed => current,
            Backoff::Exponential { max } => current.saturating_mul(2).min(max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` waits until a terminal observation or cancellation.
    pub timeout: Option<Duration>,
    pub backoff: Backoff,
}

impl PollPolicy {
    pub fn fixed(interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            interval,
            timeout,
            backoff: Backoff::Fixed,
        }
    }
}

/// Sender half: flips every linked [`CancelSignal`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiver half, cloned into every poller.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal with a linked handle.
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = Self::pair();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Pends forever if the handle is dropped first.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Drives probes under a [`PollPolicy`].
#[derive(Debug, Clone)]
pub struct Poller {
    policy: PollPolicy,
    cancel: CancelSignal,
    metrics: Option<Arc<ProvisionMetrics>>,
}

impl Poller {
    pub fn new(policy: PollPolicy, cancel: CancelSignal) -> Self {
        Self {
            policy,
            cancel,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ProvisionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Call `probe` until it is ready.
    ///
    /// Errors from the probe abort the wait immediately; callers that want to
    /// tolerate a not-yet-available resource map it to [`Probe::Pending`].
    /// The deadline and the cancel signal also interrupt a probe in flight.
    pub async fn until<T, F, Fut>(&self, what: &str, mut probe: F) -> Result<T, ProvisionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<T>, ProvisionError>>,
    {
        let started = Instant::now();
        let deadline = self.policy.timeout.map(|timeout| started + timeout);
        let mut delay = self.policy.interval;
        let mut cancel = self.cancel.clone();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(ProvisionError::Cancelled(what.to_string()));
            }

            attempt += 1;
            if let Some(metrics) = &self.metrics {
                metrics.record_poll();
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(what, attempt, "Cancelled during status check");
                    return Err(ProvisionError::Cancelled(what.to_string()));
                }
                result = probe() => result?,
                _ = expire(deadline) => return Err(self.timed_out(what, attempt, started)),
            };

            let observed = match outcome {
                Probe::Ready(value) => {
                    tracing::debug!(what, attempt, "Wait complete");
                    return Ok(value);
                }
                Probe::Pending(observed) => observed,
            };

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(self.timed_out(what, attempt, started));
                    }
                    delay.min(deadline - now)
                }
                None => delay,
            };

            tracing::debug!(what, state = %observed, attempt, "Waiting");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => {
                    tracing::warn!(what, "Wait cancelled");
                    return Err(ProvisionError::Cancelled(what.to_string()));
                }
            }

            delay = self.policy.backoff.next(delay);
        }
    }

    fn timed_out(&self, what: &str, attempt: u32, started: Instant) -> ProvisionError {
        let waited = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_poll_timeout();
        }
        tracing::error!(what, attempt, waited = ?waited, "Deadline exceeded");
        ProvisionError::Timeout {
            what: what.to_string(),
            waited,
        }
    }
}

/// Resolves at `deadline`, or never without one.
async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
