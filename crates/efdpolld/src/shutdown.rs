//! Interrupt handling.
//!
//! The first interrupt asks the poller to stop after its current
//! iteration. A query that never returns would hold that stop off forever,
//! and tokio keeps SIGINT registered once `ctrl_c()` has been awaited, so a
//! second interrupt is the way out: the caller exits immediately.

use std::future::Future;
use tokio::sync::watch;
use tracing::{info, warn};

/// Exit status for a forced stop (128 + SIGINT)
pub const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// A second interrupt arrived before the poller stopped
    Forced,
    /// The signal listener could not be installed or failed
    Unavailable,
}

/// Forward interrupts from `next_interrupt` into `shutdown`.
/// Returns on the second interrupt, or when listening fails.
pub async fn forward_interrupts<F, Fut>(
    mut next_interrupt: F,
    shutdown: watch::Sender<bool>,
) -> InterruptOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = next_interrupt().await {
        warn!("Cannot listen for interrupts: {}", e);
        return InterruptOutcome::Unavailable;
    }
    info!("Interrupt received, shutting down gracefully (interrupt again to force)");
    let _ = shutdown.send(true);

    match next_interrupt().await {
        Ok(()) => {
            warn!("Second interrupt, exiting without waiting for the poller");
            InterruptOutcome::Forced
        }
        Err(e) => {
            warn!("Lost interrupt listener: {}", e);
            InterruptOutcome::Unavailable
        }
    }
}
