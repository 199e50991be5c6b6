use crate::error::Error;

use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};

/// The point in time by which an operation must finish.
///
/// Passed down through every core operation; `run` aborts the wrapped future (and with it
/// any in-flight DB, cache, or broker call) once the deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn has_elapsed(&self) -> bool {
        Instant::now() >= self.0
    }

    pub async fn run<T, F>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        time::timeout_at(self.0, fut)
            .await
            .unwrap_or(Err(Error::DeadlineExceeded))
    }
}
