//! Time sources for the poller.
//!
//! Production code uses `SystemClock` and `TokioSleeper`. Tests swap in
//! fakes so the loop runs without real delays.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

/// Wall clock in seconds since the Unix epoch (UTC).
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Delay between iterations.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Plain `tokio::time::sleep`. Not a fixed-rate scheduler: the real period
/// is the delay plus however long the query took.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
