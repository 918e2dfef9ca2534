//! In-memory batch buffer.
//!
//! Three parallel sequences (issued-at, completed-at, fields) that are
//! always pushed and cleared together, so their lengths never diverge.

use crate::error::EfdError;
use crate::sample::{Sample, StreamFields};

/// Default number of samples per flushed batch
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct BatchBuffer {
    batch_size: usize,
    issued_at: Vec<f64>,
    completed_at: Vec<f64>,
    fields: Vec<StreamFields>,
}

impl BatchBuffer {
    pub fn new(batch_size: usize) -> Result<Self, EfdError> {
        if batch_size == 0 {
            return Err(EfdError::InvalidBatchSize);
        }
        Ok(Self {
            batch_size,
            issued_at: Vec::with_capacity(batch_size),
            completed_at: Vec::with_capacity(batch_size),
            fields: Vec::with_capacity(batch_size),
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn len(&self) -> usize {
        debug_assert!(
            self.issued_at.len() == self.completed_at.len()
                && self.completed_at.len() == self.fields.len()
        );
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record one iteration
    pub fn push(&mut self, issued_at: f64, completed_at: f64, fields: StreamFields) {
        self.issued_at.push(issued_at);
        self.completed_at.push(completed_at);
        self.fields.push(fields);
    }

    /// True when the length is a positive multiple of the batch size
    pub fn is_due(&self) -> bool {
        let len = self.len();
        len > 0 && len % self.batch_size == 0
    }

    /// Take every buffered entry in insertion order and reset to empty
    pub fn drain(&mut self) -> Vec<Sample> {
        let issued = std::mem::take(&mut self.issued_at);
        let completed = std::mem::take(&mut self.completed_at);
        let fields = std::mem::take(&mut self.fields);

        issued
            .into_iter()
            .zip(completed)
            .zip(fields)
            .map(|((i, c), f)| Sample::new(i, c, f))
            .collect()
    }

    /// Lengths of the three sequences (for invariant checks)
    pub fn lengths(&self) -> (usize, usize, usize) {
        (
            self.issued_at.len(),
            self.completed_at.len(),
            self.fields.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(matches!(
            BatchBuffer::new(0),
            Err(EfdError::InvalidBatchSize)
        ));
    }

    #[test]
    fn test_due_at_multiple_of_batch_size() {
        let mut buf = BatchBuffer::new(3).unwrap();
        assert!(!buf.is_due());
        buf.push(1.0, 1.1, StreamFields::missing());
        buf.push(2.0, 2.1, StreamFields::missing());
        assert!(!buf.is_due());
        buf.push(3.0, 3.1, StreamFields::missing());
        assert!(buf.is_due());
    }

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let mut buf = BatchBuffer::new(2).unwrap();
        buf.push(1.0, 1.5, StreamFields::missing());
        buf.push(2.0, 2.5, StreamFields::missing());

        let samples = buf.drain();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].query_issued_at, 1.0);
        assert_eq!(samples[1].query_completed_at, 2.5);
        assert!(buf.is_empty());
        assert_eq!(buf.lengths(), (0, 0, 0));
    }

    #[test]
    fn test_lengths_stay_equal() {
        let mut buf = BatchBuffer::new(4).unwrap();
        for i in 0..10 {
            buf.push(i as f64, i as f64 + 0.1, StreamFields::missing());
            let (a, b, c) = buf.lengths();
            assert_eq!(a, b);
            assert_eq!(b, c);
            if buf.is_due() {
                buf.drain();
                assert_eq!(buf.lengths(), (0, 0, 0));
            }
        }
        assert_eq!(buf.len(), 2);
    }
}
