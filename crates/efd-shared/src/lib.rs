//! Shared types for the EFD force-actuator poller.
//!
//! Everything here is pure: field values, samples, the batch buffer,
//! InfluxQL query building and InfluxDB response decoding. I/O lives in
//! `efdpolld`.

pub mod batch;
pub mod error;
pub mod influx;
pub mod query;
pub mod sample;

pub use batch::BatchBuffer;
pub use error::EfdError;
pub use influx::{QueryResponse, ResultTable};
pub use query::{LatestSampleQuery, QueryWindow};
pub use sample::{FieldValue, Sample, StreamFields};
