//! efdpolld library - exposes modules for testing.

pub mod batch_log;
pub mod clock;
pub mod config;
pub mod efd_client;
pub mod poller;
pub mod shutdown;
