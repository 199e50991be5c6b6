use std::future::Future;
use std::time::Duration;

/// Exponential backoff: `retries` further attempts after the first, waiting `base`, then
/// twice that, and so on, never longer than `cap`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub retries: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(50),
            cap: Duration::from_secs(2),
            retries: 3,
        }
    }
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base
            .checked_mul(2_u32.saturating_pow(attempt))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Runs `op` until it succeeds, fails with an error `should_retry` rejects, or the
    /// retries run out.  The last error is returned.
    pub async fn retry<T, E, F, Fut>(
        &self,
        mut op: F,
        should_retry: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retries && should_retry(&e) => {
                    tokio::time::sleep(self.delay(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_doubles_up_to_the_cap() {
        let backoff = Backoff {
            base: Duration::from_millis(100),
            cap: Duration::from_millis(500),
            retries: 3,
        };
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(500));
        assert_eq!(backoff.delay(40), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_last_retry() {
        let calls = AtomicU32::new(0);
        let res: Result<(), &str> = Backoff::default()
            .retry(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("down") }
                },
                |_| true,
            )
            .await;
        assert_eq!(res, Err("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_permanent_errors() {
        let calls = AtomicU32::new(0);
        let res: Result<(), &str> = Backoff::default()
            .retry(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("bad input") }
                },
                |e| *e != "bad input",
            )
            .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let res = Backoff::default()
            .retry(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err("flaky")
                        } else {
                            Ok(n)
                        }
                    }
                },
                |_| true,
            )
            .await;
        assert_eq!(res, Ok(2));
    }
}
