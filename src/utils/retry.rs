//! Polling and retry loops for cluster readiness and external API calls

use anyhow::Result;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Result of a single poll attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    Pending(String),
}

#[derive(Error, Debug)]
pub enum WaitError {
    #[error("Timeout waiting for {what} after {elapsed:?} (last status: {last_status})")]
    Timeout {
        what: String,
        elapsed: Duration,
        last_status: String,
    },

    #[error("Job {namespace}/{name} failed: {reason}")]
    JobFailed {
        namespace: String,
        name: String,
        reason: String,
    },
}

/// Sleeps between attempts. Tests swap in a recorder so nothing blocks.
pub type Sleeper = Box<dyn FnMut(Duration)>;

fn thread_sleeper() -> Sleeper {
    Box::new(std::thread::sleep)
}

/// Fixed-interval poll loop bounded by a timeout
pub struct Poller {
    pub interval: Duration,
    pub timeout: Duration,
    sleeper: Sleeper,
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            sleeper: thread_sleeper(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Call `check` until it reports `Ready` or the timeout passes. Errors
    /// from `check` are treated as transient. Elapsed time is the sum of
    /// the intervals slept, so an injected sleeper keeps the loop bounded.
    pub fn poll<T, F>(&mut self, what: &str, mut check: F) -> Result<T>
    where
        F: FnMut() -> Result<Poll<T>>,
    {
        let started = Instant::now();
        let mut slept = Duration::ZERO;

        loop {
            let last_status = match check() {
                Ok(Poll::Ready(value)) => return Ok(value),
                Ok(Poll::Pending(status)) => {
                    crate::log_debug!("{}: {}", what, status);
                    status
                }
                Err(e) => {
                    if e.downcast_ref::<WaitError>().is_some() {
                        return Err(e);
                    }
                    crate::log_debug!("{}: transient error: {:#}", what, e);
                    format!("{:#}", e)
                }
            };

            if slept >= self.timeout || started.elapsed() >= self.timeout {
                return Err(WaitError::Timeout {
                    what: what.to_string(),
                    elapsed: slept.max(started.elapsed()),
                    last_status,
                }
                .into());
            }

            (self.sleeper)(self.interval);
            slept += self.interval;
        }
    }
}

/// Exponential backoff policy
pub struct Backoff {
    pub initial: Duration,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
    pub multiplier: u32,
    sleeper: Sleeper,
}

impl Backoff {
    pub fn new(initial: Duration, max_elapsed: Duration) -> Self {
        Self {
            initial,
            max_interval: Duration::from_secs(10),
            max_elapsed,
            multiplier: 2,
            sleeper: thread_sleeper(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Intervals this policy would sleep for, in order
    pub fn intervals(&self) -> Vec<Duration> {
        let mut intervals = Vec::new();
        let mut total = Duration::ZERO;
        let mut next = self.initial;
        while total + next <= self.max_elapsed && !next.is_zero() {
            intervals.push(next);
            total += next;
            next = (next * self.multiplier).min(self.max_interval);
        }
        intervals
    }
}

/// Retry `op` with exponential backoff, returning the last error once the
/// policy is exhausted.
pub fn retry_with_backoff<T, F>(backoff: &mut Backoff, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let intervals = backoff.intervals();
    let mut attempt = 0usize;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => match intervals.get(attempt) {
                Some(delay) => {
                    crate::log_debug!(
                        "{} failed (attempt {}), retrying in {:?}: {:#}",
                        what,
                        attempt + 1,
                        delay,
                        e
                    );
                    (backoff.sleeper)(*delay);
                    attempt += 1;
                }
                None => {
                    return Err(e.context(format!("{} failed after {} attempts", what, attempt + 1)));
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_sleeper() -> (Sleeper, Rc<RefCell<Vec<Duration>>>) {
        let record = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&record);
        (Box::new(move |d| sink.borrow_mut().push(d)), record)
    }

    #[test]
    fn test_poll_ready_after_pending() {
        let (sleeper, record) = recording_sleeper();
        let mut poller =
            Poller::new(Duration::from_secs(2), Duration::from_secs(60)).with_sleeper(sleeper);
        let mut calls = 0;
        let value = poller
            .poll("pods", || {
                calls += 1;
                if calls < 3 {
                    Ok(Poll::Pending(format!("{} of 3", calls)))
                } else {
                    Ok(Poll::Ready(calls))
                }
            })
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(record.borrow().len(), 2);
    }

    #[test]
    fn test_poll_retries_transient_errors() {
        let (sleeper, _) = recording_sleeper();
        let mut poller =
            Poller::new(Duration::from_secs(1), Duration::from_secs(10)).with_sleeper(sleeper);
        let mut calls = 0;
        let value = poller
            .poll("deployment", || {
                calls += 1;
                if calls == 1 {
                    Err(anyhow!("connection refused"))
                } else {
                    Ok(Poll::Ready("ok"))
                }
            })
            .unwrap();
        assert_eq!(value, "ok");
    }

    #[test]
    fn test_poll_times_out() {
        let (sleeper, record) = recording_sleeper();
        let mut poller =
            Poller::new(Duration::from_secs(5), Duration::from_secs(20)).with_sleeper(sleeper);
        let err = poller
            .poll::<(), _>("job/build", || Ok(Poll::Pending("running".into())))
            .unwrap_err();
        let wait = err.downcast_ref::<WaitError>().unwrap();
        assert!(matches!(wait, WaitError::Timeout { last_status, .. } if last_status == "running"));
        assert_eq!(record.borrow().len(), 4);
    }

    #[test]
    fn test_poll_timeout_keeps_latest_status() {
        let (sleeper, _record) = recording_sleeper();
        let mut poller =
            Poller::new(Duration::from_secs(1), Duration::from_secs(2)).with_sleeper(sleeper);
        let mut attempt = 0;
        let err = poller
            .poll::<(), _>("deployment/jenkins", || {
                attempt += 1;
                if attempt < 3 {
                    Ok(Poll::Pending(format!("attempt {}", attempt)))
                } else {
                    Err(anyhow::anyhow!("connection reset"))
                }
            })
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("deployment/jenkins"));
        assert!(msg.contains("last status: connection reset"));
    }

    #[test]
    fn test_poll_stops_on_terminal_failure() {
        let (sleeper, record) = recording_sleeper();
        let mut poller =
            Poller::new(Duration::from_secs(1), Duration::from_secs(10)).with_sleeper(sleeper);
        let err = poller
            .poll::<(), _>("job/build", || {
                Err(WaitError::JobFailed {
                    namespace: "jx".into(),
                    name: "build".into(),
                    reason: "BackoffLimitExceeded".into(),
                }
                .into())
            })
            .unwrap_err();
        assert!(err.to_string().contains("BackoffLimitExceeded"));
        assert!(record.borrow().is_empty());
    }

    #[test]
    fn test_backoff_intervals_double_and_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(30));
        backoff.max_interval = Duration::from_secs(4);
        let intervals = backoff.intervals();
        assert_eq!(
            &intervals[..5],
            &[
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(4),
            ]
        );
        let total: Duration = intervals.iter().sum();
        assert!(total <= Duration::from_secs(30));
    }

    #[test]
    fn test_retry_with_backoff_eventually_succeeds() {
        let (sleeper, record) = recording_sleeper();
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(5))
            .with_sleeper(sleeper);
        let mut calls = 0;
        let value = retry_with_backoff(&mut backoff, "fetch", || {
            calls += 1;
            if calls < 3 { Err(anyhow!("503")) } else { Ok(calls) }
        })
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(
            *record.borrow(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[test]
    fn test_retry_with_backoff_gives_up() {
        let (sleeper, _) = recording_sleeper();
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(300))
            .with_sleeper(sleeper);
        let err = retry_with_backoff::<(), _>(&mut backoff, "fetch", || Err(anyhow!("503")))
            .unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("fetch failed after 3 attempts"));
        assert!(msg.contains("503"));
    }
}
