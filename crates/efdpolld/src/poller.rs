//! Poll-Batch-Flush loop.
//!
//! Each iteration stamps the time, queries the EFD for the latest sample,
//! stamps the time again and buffers the result. Every `batch_size`
//! iterations the buffer is written to the sample log and cleared. The loop
//! then waits a fixed delay and starts over, until shutdown is signalled or
//! the optional iteration limit is reached.
//!
//! Query and log failures end the loop. Whatever is still buffered at that
//! point is written out before the error is returned.

use crate::batch_log::BatchLog;
use crate::clock::{Clock, Sleeper, SystemClock, TokioSleeper};
use crate::config::Config;
use crate::efd_client::EfdClient;
use anyhow::{Context, Result};
use efd_shared::{BatchBuffer, LatestSampleQuery, Sample, StreamFields};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub query: LatestSampleQuery,
    pub batch_size: usize,
    pub sleep: Duration,
    /// Stop after this many iterations; `None` runs until shutdown
    pub max_iterations: Option<u64>,
}

impl PollerSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            query: config.query()?,
            batch_size: config.poll.batch_size,
            sleep: config.poll.sleep_interval()?,
            max_iterations: None,
        })
    }
}

/// Counters reported when the loop ends
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollerStats {
    pub iterations: u64,
    pub empty_results: u64,
    pub batches_flushed: u64,
    pub samples_flushed: u64,
    /// Round-trip latency of the most recent query, in seconds
    pub last_latency: Option<f64>,
}

pub struct Poller<C: EfdClient, K: Clock = SystemClock, S: Sleeper = TokioSleeper> {
    client: C,
    clock: K,
    sleeper: S,
    settings: PollerSettings,
    influxql: String,
    buffer: BatchBuffer,
    stats: PollerStats,
}

impl<C: EfdClient> Poller<C> {
    pub fn new(client: C, settings: PollerSettings) -> Result<Self> {
        Self::with_time(client, SystemClock, TokioSleeper, settings)
    }
}

impl<C: EfdClient, K: Clock, S: Sleeper> Poller<C, K, S> {
    pub fn with_time(client: C, clock: K, sleeper: S, settings: PollerSettings) -> Result<Self> {
        let buffer = BatchBuffer::new(settings.batch_size)?;
        let influxql = settings.query.to_influxql();
        Ok(Self {
            client,
            clock,
            sleeper,
            settings,
            influxql,
            buffer,
            stats: PollerStats::default(),
        })
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Run until shutdown, the iteration limit, or the first failure.
    /// The log is flushed and closed on every one of those paths.
    pub async fn run(
        mut self,
        mut log: BatchLog,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<PollerStats> {
        info!(
            "Polling {} every {:?} (batch size {})",
            self.settings.query.topic, self.settings.sleep, self.settings.batch_size
        );
        debug!("Query: {}", self.influxql);

        let outcome = self.run_loop(&mut log, &mut shutdown).await;
        let finished = self.finish(log);

        match (outcome, finished) {
            (Ok(()), Ok(())) => Ok(self.stats),
            (Ok(()), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(flush_err)) => {
                error!("Failed to write pending samples after error: {:#}", flush_err);
                Err(e)
            }
        }
    }

    async fn run_loop(
        &mut self,
        log: &mut BatchLog,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping poller");
                return Ok(());
            }

            self.poll_once(log).await?;

            if self.limit_reached() {
                info!("Reached {} iterations, stopping poller", self.stats.iterations);
                return Ok(());
            }

            tokio::select! {
                _ = self.sleeper.sleep(self.settings.sleep) => {}
                _ = cancelled(shutdown) => {}
            }
        }
    }

    /// One iteration: query, buffer, flush when the batch is full
    pub async fn poll_once(&mut self, log: &mut BatchLog) -> Result<()> {
        let issued_at = self.clock.now();
        let table = self
            .client
            .query(&self.influxql)
            .await
            .context("EFD query failed")?;
        let completed_at = self.clock.now();

        let fields = StreamFields::from_table(&table).context("Unexpected EFD result shape")?;
        let latency = completed_at - issued_at;

        self.stats.iterations += 1;
        self.stats.last_latency = Some(latency);
        if fields.is_missing() {
            self.stats.empty_results += 1;
            debug!("No rows within {} (latency {:.3}s)", self.settings.query.window, latency);
        } else {
            debug!("Latest sample: {} (latency {:.3}s)", fields.render(), latency);
        }

        self.buffer.push(issued_at, completed_at, fields);

        if self.buffer.is_due() {
            let samples = self.buffer.drain();
            self.write(log, &samples)?;
            self.stats.batches_flushed += 1;
            info!(
                "Flushed batch of {} samples (mean latency {:.3}s)",
                samples.len(),
                mean_latency(&samples)
            );
        }
        Ok(())
    }

    fn limit_reached(&self) -> bool {
        self.settings
            .max_iterations
            .is_some_and(|max| self.stats.iterations >= max)
    }

    fn write(&mut self, log: &mut BatchLog, samples: &[Sample]) -> Result<()> {
        let written = log.write_batch(samples)?;
        self.stats.samples_flushed += written as u64;
        Ok(())
    }

    /// Write out a partial batch, then close the log
    fn finish(&mut self, mut log: BatchLog) -> Result<()> {
        if !self.buffer.is_empty() {
            let samples = self.buffer.drain();
            warn!("Writing partial batch of {} samples", samples.len());
            self.write(&mut log, &samples)?;
        }
        log.close()
    }
}

/// Resolves once shutdown is signalled; never, if the sender is gone.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn mean_latency(samples: &[Sample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(Sample::latency).sum::<f64>() / samples.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_latency() {
        let samples = vec![
            Sample::new(0.0, 0.5, StreamFields::missing()),
            Sample::new(1.0, 2.5, StreamFields::missing()),
        ];
        assert!((mean_latency(&samples) - 1.0).abs() < 1e-12);
        assert_eq!(mean_latency(&[]), 0.0);
    }

    #[test]
    fn test_settings_from_default_config() {
        let settings = PollerSettings::from_config(&Config::default()).unwrap();
        assert_eq!(settings.batch_size, 100);
        assert_eq!(settings.sleep, Duration::from_secs(2));
        assert!(settings.max_iterations.is_none());
    }

    #[test]
    fn test_settings_reject_invalid_config() {
        let mut config = Config::default();
        config.poll.batch_size = 0;
        assert!(PollerSettings::from_config(&config).is_err());
    }

    #[test]
    fn test_settings_reject_oversized_sleep() {
        let mut config = Config::default();
        config.poll.sleep_secs = 1e30;
        assert!(PollerSettings::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_on_signal() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        cancelled(&mut rx).await;
    }
}
