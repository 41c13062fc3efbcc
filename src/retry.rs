use std::io;
use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};

/// Run blocking file work. On a multi-threaded runtime the worker hands its
/// other tasks off first; elsewhere the closure just runs inline.
pub fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Bounded exponential backoff for local file writes.
///
/// Ledger writes are synchronous and short, so the policy sleeps the calling
/// thread between attempts (via `run_blocking`). The last error is returned
/// once attempts run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
        }
    }

    /// Single attempt, no sleeping.
    pub fn none() -> Self {
        Self::new(1, 0, 0)
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exp = 2_u64.saturating_pow(attempt);
        let delay = self.base_delay_ms.saturating_mul(exp).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    pub fn run<T>(&self, op: impl FnMut(u32) -> io::Result<T>) -> io::Result<T> {
        run_blocking(|| self.run_inline(op))
    }

    fn run_inline<T>(&self, mut op: impl FnMut(u32) -> io::Result<T>) -> io::Result<T> {
        let mut attempt = 0;
        loop {
            match op(attempt) {
                Ok(v) => return Ok(v),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(e);
                    }
                    tracing::warn!("write attempt {attempt} failed, retrying: {e}");
                    std::thread::sleep(self.next_delay(attempt - 1));
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 20, 200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_parameters() {
        let p = RetryPolicy::new(0, 50, 10);
        assert_eq!(p.max_attempts, 1);
        assert_eq!(p.max_delay_ms, 50);
    }

    #[test]
    fn delay_doubles_and_caps() {
        let p = RetryPolicy::new(5, 10, 50);
        let delays: Vec<_> = (0..4).map(|a| p.next_delay(a)).collect();
        assert_eq!(delays[0], Duration::from_millis(10));
        assert_eq!(delays[1], Duration::from_millis(20));
        assert_eq!(delays[2], Duration::from_millis(40));
        assert_eq!(delays[3], Duration::from_millis(50)); // capped
    }

    #[test]
    fn run_retries_until_success() {
        let p = RetryPolicy::new(3, 0, 0);
        let mut calls = 0;
        let result = p.run(|attempt| {
            calls += 1;
            if attempt < 2 {
                Err(io::Error::other("transient"))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 3);
    }

    #[test]
    fn run_returns_last_error() {
        let p = RetryPolicy::new(2, 0, 0);
        let mut calls = 0;
        let result: io::Result<()> = p.run(|_| {
            calls += 1;
            Err(io::Error::other(format!("fail {calls}")))
        });
        assert_eq!(result.unwrap_err().to_string(), "fail 2");
        assert_eq!(calls, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn backoff_does_not_stall_other_tasks() {
        let ticker = tokio::spawn(async {
            let start = std::time::Instant::now();
            tokio::time::sleep(Duration::from_millis(5)).await;
            start.elapsed()
        });
        let writer = tokio::spawn(async {
            let mut calls = 0;
            let result: io::Result<()> = RetryPolicy::new(3, 100, 100).run(|_| {
                calls += 1;
                Err(io::Error::other("busy"))
            });
            (result.is_err(), calls)
        });

        assert_eq!(writer.await.unwrap(), (true, 3));
        assert!(ticker.await.unwrap() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn runs_inline_on_current_thread_runtime() {
        let result = RetryPolicy::new(2, 1, 1).run(|attempt| {
            if attempt == 0 {
                Err(io::Error::other("once"))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), 1);
    }

    #[test]
    fn none_is_single_attempt() {
        let mut calls = 0;
        let _ = RetryPolicy::none().run(|_| -> io::Result<()> {
            calls += 1;
            Err(io::Error::other("nope"))
        });
        assert_eq!(calls, 1);
    }
}
